mod ai;
mod collector;
mod config;
mod liveness;
mod model;
mod normalizer;
mod parser;
mod pipeline;
mod reconciler;
mod registry;
mod report;
mod scraper;
mod utils;

use ai::{OpenAiClient, PerplexitySearch};
use collector::{FallbackCollector, PrimaryCollector};
use config::{load_config, AppConfig, QueryConfig};
use futures::future::join_all;
use liveness::HttpLiveness;
use pipeline::Pipeline;
use reconciler::Reconciler;
use registry::DadataRegistry;
use report::HtmlReport;
use crate::scraper::{PulscenBackend, PulscenScraper};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("😱 Panic occurred: {:?}", panic_info);
    }));

    let config: Arc<AppConfig> = match load_config("config.json") {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    let ai = match OpenAiClient::new(&config.openai_api_key) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build AI client: {}", e);
            return;
        }
    };
    let search = match PerplexitySearch::new(&config.perplexity_api_key, ai.clone()) {
        Ok(search) => Arc::new(search),
        Err(e) => {
            error!("Failed to build search client: {}", e);
            return;
        }
    };
    let liveness = match HttpLiveness::new(
        config.liveness_timeout_seconds,
        config.liveness_retries,
    ) {
        Ok(probe) => Arc::new(probe),
        Err(e) => {
            error!("Failed to build liveness probe: {}", e);
            return;
        }
    };
    let registry = Arc::new(DadataRegistry::new(
        reqwest::Client::new(),
        config.dadata_api_key.clone(),
    ));

    info!("🚀 PriceSniper started, {} queries to process", config.queries.len());

    let tasks: Vec<_> = config
        .queries
        .iter()
        .map(|query| {
            process_query(
                query,
                config.clone(),
                ai.clone(),
                search.clone(),
                liveness.clone(),
                registry.clone(),
            )
        })
        .collect();
    join_all(tasks).await;

    info!("✅ All queries processed");
}

/// Обрабатывает один запрос: своя поисковая подсистема под город запроса,
/// общий AI-клиент и реестр.
async fn process_query(
    query: &QueryConfig,
    config: Arc<AppConfig>,
    ai: Arc<OpenAiClient>,
    search: Arc<PerplexitySearch>,
    liveness: Arc<HttpLiveness>,
    registry: Arc<DadataRegistry>,
) {
    info!("Processing query: {} (код {})", query.name, query.code);

    let subdomain = config.subdomain_for(&query.city).map(String::from);
    let scraper = match PulscenScraper::new(config.page_timeout_seconds, subdomain) {
        Ok(s) => s,
        Err(e) => {
            error!("Scraper init error for «{}»: {}", query.name, e);
            return;
        }
    };
    let backend = Arc::new(PulscenBackend::new(scraper));

    let primary = PrimaryCollector::new(backend.clone(), ai.clone(), config.max_pages);
    let fallback = FallbackCollector::new(search, liveness, config.max_attempts);
    let reconciler = Reconciler::new(
        registry,
        ai.clone(),
        ai.clone(),
        ai,
        Duration::from_secs(config.request_delay_seconds),
    );
    let output_dir = PathBuf::from(&config.output_dir);
    let pipeline = Pipeline::new(
        primary,
        fallback,
        backend,
        reconciler,
        Arc::new(HtmlReport::new(&output_dir)),
        config.target_count,
        Duration::from_secs(config.request_delay_seconds),
        output_dir,
    );

    match pipeline.run(query).await {
        Ok(outcomes) => {
            info!(
                "Finished query «{}»: {} записей",
                query.name,
                outcomes.len()
            );
        }
        Err(e) => {
            warn!("❌ Query «{}» failed: {}", query.name, e);
        }
    }
}

use crate::liveness::LivenessProbe;
use crate::model::{AiError, OfferCandidate};
use crate::normalizer::normalize_company;
use crate::utils::extract_domain;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Внешний AI-поиск: на каждую попытку — свой номер (меняет формулировку
/// запроса) и список уже отбракованных URL.
#[async_trait::async_trait]
pub trait FallbackSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        count: usize,
        attempt: u32,
        excluded_urls: &[String],
    ) -> Result<Vec<OfferCandidate>, AiError>;
}

/// Accumulated state of one fallback run: dead URLs, poisoned domains and
/// the offers accepted so far. Created fresh per run, carried by reference
/// through the attempt loop, discarded afterwards.
#[derive(Debug, Default)]
pub struct SearchAttemptState {
    pub excluded_urls: Vec<String>,
    pub excluded_domains: HashSet<String>,
    pub collected: Vec<OfferCandidate>,
    pub attempts: u32,
}

impl SearchAttemptState {
    fn contains_company(&self, company: &str) -> bool {
        let normalized = normalize_company(company);
        self.collected
            .iter()
            .any(|o| normalize_company(&o.company) == normalized)
    }

    fn contains_url(&self, url: &str) -> bool {
        self.collected.iter().any(|o| o.url == url)
    }
}

pub struct FallbackCollector {
    search: Arc<dyn FallbackSearch>,
    liveness: Arc<dyn LivenessProbe>,
    max_attempts: u32,
}

impl FallbackCollector {
    pub fn new(
        search: Arc<dyn FallbackSearch>,
        liveness: Arc<dyn LivenessProbe>,
        max_attempts: u32,
    ) -> Self {
        Self {
            search,
            liveness,
            max_attempts,
        }
    }

    /// Runs bounded, diversified search attempts until `target_count`
    /// distinct live offers are collected or attempts run out. A domain that
    /// failed the liveness probe once is never accepted again within this
    /// run. The result may be shorter than `target_count`.
    pub async fn collect(&self, query: &str, target_count: usize) -> Vec<OfferCandidate> {
        let mut state = SearchAttemptState::default();
        info!(
            "[PERPLEXITY-START] Начинаем поиск, максимум {} попыток для {} товаров",
            self.max_attempts, target_count
        );

        while state.collected.len() < target_count && state.attempts < self.max_attempts {
            state.attempts += 1;
            info!(
                "[PERPLEXITY] Попытка {}/{}: найдено {}/{}",
                state.attempts,
                self.max_attempts,
                state.collected.len(),
                target_count
            );

            let batch = match self
                .search
                .search(query, target_count, state.attempts, &state.excluded_urls)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("[PERPLEXITY] Ошибка попытки {}: {}", state.attempts, e);
                    continue;
                }
            };
            info!(
                "[PERPLEXITY] Получено {} результатов на попытке {}",
                batch.len(),
                state.attempts
            );

            for item in batch {
                if state.collected.len() >= target_count {
                    info!("[PERPLEXITY] ⏹️ Уже найдено {} товаров", target_count);
                    break;
                }
                if item.url.is_empty() {
                    continue;
                }
                let domain = extract_domain(&item.url);
                if state.excluded_domains.contains(&domain) {
                    warn!("[PERPLEXITY] 🚫 Домен {} уже в списке недоступных", domain);
                    continue;
                }
                if state.contains_company(&item.company) {
                    info!("[PERPLEXITY] 🔄 Пропуск дубля компании: {}", item.company);
                    continue;
                }
                if state.contains_url(&item.url) {
                    info!("[PERPLEXITY] 🔄 Пропуск дубля URL: {}", item.url);
                    continue;
                }

                info!("[PERPLEXITY] 🔍 Проверка доступности URL: {}", item.url);
                if self.liveness.check_live(&item.url).await {
                    info!(
                        "[PERPLEXITY] ✅ Найден валидный товар {}/{}: {} | {}",
                        state.collected.len() + 1,
                        target_count,
                        item.company,
                        item.product_name
                    );
                    state.collected.push(item);
                } else {
                    warn!("[PERPLEXITY] ❌ URL недоступен: {} | {}", item.url, item.company);
                    state.excluded_urls.push(item.url.clone());
                    state.excluded_domains.insert(domain);
                }
            }
        }

        if state.collected.len() < target_count {
            warn!(
                "[PERPLEXITY] После {} попыток найдено только {} товаров",
                state.attempts,
                state.collected.len()
            );
        }
        state.collected
    }
}

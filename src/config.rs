use serde::Deserialize;
use std::fs;

/// Один запрос материала: что ищем и куда кладём результат в таблице.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Material name as searched, e.g. «Лист хризотилцементный плоский 8 мм».
    pub name: String,
    /// Price-list code, goes into the report file name.
    pub code: String,
    /// Target unit for the price-normalization formula, e.g. «т» or «м³».
    pub target_unit: String,
    /// Starting row number in the output table.
    pub start_row: u32,
    /// Region used to pick the listings-site subdomain.
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityConfig {
    pub region: String,
    pub subdomain: String,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub perplexity_api_key: String,
    pub dadata_api_key: String,
    pub queries: Vec<QueryConfig>,
    #[serde(default)]
    pub cities: Vec<CityConfig>,
    /// Сколько разных компаний собираем на один запрос.
    #[serde(default = "default_target_count")]
    pub target_count: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_delay")]
    pub request_delay_seconds: u64,
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_seconds: u64,
    #[serde(default = "default_liveness_retries")]
    pub liveness_retries: u32,
    #[serde(default = "default_page_timeout")]
    pub page_timeout_seconds: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_target_count() -> usize {
    3
}
fn default_max_pages() -> u32 {
    5
}
fn default_max_attempts() -> u32 {
    10
}
fn default_request_delay() -> u64 {
    2
}
fn default_liveness_timeout() -> u64 {
    15
}
fn default_liveness_retries() -> u32 {
    3
}
fn default_page_timeout() -> u64 {
    30
}
fn default_output_dir() -> String {
    "output".to_string()
}

impl AppConfig {
    /// Поддомен листинг-сайта для региона, если он есть в таблице городов.
    pub fn subdomain_for(&self, region: &str) -> Option<&str> {
        self.cities
            .iter()
            .find(|c| c.region.to_lowercase() == region.to_lowercase())
            .map(|c| c.subdomain.as_str())
    }
}

pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

// URL liveness probing with bounded retries and fast-fail classification.
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Пауза между повторами для «прочих» ошибок.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[async_trait::async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Проверяет, что URL отвечает человеческим статусом. Никаких побочных
    /// эффектов кроме самого сетевого запроса.
    async fn check_live(&self, url: &str) -> bool;
}

/// Builds a single display string out of a reqwest error and its whole
/// source chain; reqwest's top-level `Display` alone hides the interesting
/// part ("Connection refused", "certificate verify failed", ...).
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        parts.push(e.to_string());
        source = e.source();
    }
    parts.join(": ")
}

/// Known-permanent probe failures: DNS, refused connection, TLS, timeout.
/// Matching any of these means retries are pointless.
pub fn is_fatal_probe_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "name or service not known",
        "dns error",
        "failed to lookup address",
        "connection refused",
        "ssl",
        "certificate",
        "timed out",
        "timeout",
        "err_connection_refused",
        "err_name_not_resolved",
        "err_ssl_protocol_error",
        "err_network_changed",
        "err_internet_disconnected",
        "err_connection_timed_out",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

pub struct HttpLiveness {
    client: Client,
    max_retries: u32,
}

impl HttpLiveness {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, max_retries })
    }

    /// HEAD-проба; при любой ошибке HEAD в том же «заходе» пробуем GET.
    async fn probe(&self, url: &str) -> Result<reqwest::StatusCode, reqwest::Error> {
        match self.client.head(url).send().await {
            Ok(resp) => Ok(resp.status()),
            Err(_) => self.client.get(url).send().await.map(|r| r.status()),
        }
    }
}

#[async_trait::async_trait]
impl LivenessProbe for HttpLiveness {
    async fn check_live(&self, url: &str) -> bool {
        for attempt in 1..=self.max_retries {
            match self.probe(url).await {
                Ok(status) if (200..400).contains(&status.as_u16()) => {
                    info!("[URL-VALID] ✅ {} → {}", url, status);
                    return true;
                }
                Ok(status) => {
                    warn!("[URL-INVALID] {} → {}", url, status);
                }
                Err(e) => {
                    let chain = error_chain(&e);
                    warn!(
                        "[URL-VALIDATION] attempt {}/{} failed for {}: {}",
                        attempt, self.max_retries, url, chain
                    );
                    if e.is_timeout() || e.is_connect() || is_fatal_probe_error(&chain) {
                        warn!("[URL-INVALID] ❌ quick reject {}: {}", url, chain);
                        return false;
                    }
                    if attempt < self.max_retries {
                        sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }
        warn!("[URL-INVALID] ❌ all {} attempts failed for {}", self.max_retries, url);
        false
    }
}

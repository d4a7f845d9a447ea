// Business-registry lookup (DaData suggest API).
use crate::model::RegistryError;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const SUGGEST_URL: &str = "https://suggestions.dadata.ru/suggestions/api/4_1/rs/suggest/party";

/// Одна подсказка реестра: отображаемое имя плюс реквизиты.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySuggestion {
    pub value: String,
    pub inn: Option<String>,
    pub kpp: Option<String>,
    pub address: Option<String>,
    pub status: Option<String>,
}

#[async_trait::async_trait]
pub trait RegistryLookup: Send + Sync {
    async fn suggest(
        &self,
        company_name: &str,
        count: usize,
    ) -> Result<Vec<RegistrySuggestion>, RegistryError>;
}

pub struct DadataRegistry {
    client: Client,
    token: String,
    url: String,
}

impl DadataRegistry {
    pub fn new(client: Client, token: String) -> Self {
        Self {
            client,
            token,
            url: SUGGEST_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_url(client: Client, token: String, url: String) -> Self {
        Self { client, token, url }
    }
}

#[derive(Deserialize)]
struct SuggestResponse {
    #[serde(default)]
    suggestions: Vec<RawSuggestion>,
}

#[derive(Deserialize)]
struct RawSuggestion {
    value: String,
    #[serde(default)]
    data: RawData,
}

#[derive(Deserialize, Default)]
struct RawData {
    inn: Option<String>,
    kpp: Option<String>,
    #[serde(default)]
    address: Option<RawAddress>,
    #[serde(default)]
    state: Option<RawState>,
}

#[derive(Deserialize)]
struct RawAddress {
    value: Option<String>,
}

#[derive(Deserialize)]
struct RawState {
    status: Option<String>,
}

#[async_trait::async_trait]
impl RegistryLookup for DadataRegistry {
    async fn suggest(
        &self,
        company_name: &str,
        count: usize,
    ) -> Result<Vec<RegistrySuggestion>, RegistryError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Token {}", self.token))
            .json(&json!({ "query": company_name, "count": count }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status(status));
        }
        let body: SuggestResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;
        info!("[DADATA] '{}' → подсказок: {}", company_name, body.suggestions.len());

        Ok(body
            .suggestions
            .into_iter()
            .map(|s| RegistrySuggestion {
                value: s.value,
                inn: s.data.inn.filter(|v| !v.is_empty()),
                kpp: s.data.kpp.filter(|v| !v.is_empty()),
                address: s.data.address.and_then(|a| a.value),
                status: s.data.state.and_then(|st| st.status),
            })
            .collect())
    }
}

// Core structs: OfferCandidate, PageContext, CanonicalOffer, OfferOutcome
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Сентинель «искали, но не нашли».
pub const NOT_FOUND: &str = "не найдено";
/// Сентинель «поиска не было / поле не разрешено».
pub const NOT_SPECIFIED: &str = "не указан";

pub const NOTE_OK: &str = "OK";
pub const NOTE_PARTIAL: &str = "Данные частично или полностью отсутствуют";

/// Дефолтный способ доставки, если со страницы ничего не извлечено.
pub const DEFAULT_DELIVERY: &str = "Самовызов";

/// One discovered product listing, as produced by the primary or fallback
/// collector. Never mutated after creation; reconciliation derives a
/// [`CanonicalOffer`] from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferCandidate {
    pub company: String,
    pub url: String,
    #[serde(alias = "name")]
    pub product_name: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
}

/// Everything extracted from the product/seller pages for one candidate.
/// Produced by a [`crate::scraper::PageReader`], consumed as opaque strings
/// by the reconciler.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub page_text: String,
    pub extracted_address: String,
    pub phone_number: String,
    pub characteristics: BTreeMap<String, String>,
    pub description: String,
    pub delivery_method: String,
    pub seller_site: String,
}

/// Final output record, one per processed offer. Field names follow the
/// report columns of the downstream consumer, hence the Russian keys.
/// Every field carries either a resolved value or a sentinel — never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalOffer {
    #[serde(rename = "Электронная почта поставщика/производителя")]
    pub email: String,
    #[serde(rename = "ИНН поставщика/ производителя")]
    pub inn: String,
    #[serde(rename = "КПП")]
    pub kpp: String,
    #[serde(rename = "Формула")]
    pub formula: String,
    pub url: String,
    #[serde(rename = "Наименование поставщика/ производителя")]
    pub company_n: String,
    #[serde(rename = "Наименование ресурса по прейскуранту")]
    pub material: String,
    #[serde(rename = "Ценовое предложение, с НДС, руб.")]
    pub price_offer: String,
    #[serde(rename = "Телефон поставщика/производителя")]
    pub phone: String,
    pub delivery_method: String,
    #[serde(rename = "Адрес поставщика/производителя/склада (место отгрузки)")]
    pub address: String,
    #[serde(
        rename = "Адрес сайта в информационно-телекоммуникационной сети «Интернет» поставщика/производителя"
    )]
    pub site: String,
    #[serde(rename = "Цена зафиксирована на дату")]
    pub fixed_date: String,
    #[serde(rename = "Прейскурант")]
    pub price_list: String,
    #[serde(rename = "Индекс")]
    pub index: String,
    pub note: String,
}

/// One entry of the pipeline output list: either a complete offer or an
/// explicit error placeholder. `skipped` marks known-fatal connectivity
/// failures where no processing was attempted.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum OfferOutcome {
    Offer(CanonicalOffer),
    Skipped {
        url: String,
        error: String,
        skipped: bool,
    },
    Failed {
        url: String,
        error: String,
    },
}

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response status: {0}")]
    InvalidStatus(reqwest::StatusCode),
    #[error(transparent)]
    Parse(#[from] ParserError),
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("html parse error: {0}")]
    HtmlParseError(String),
    #[error("missing field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ai backend responded {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed ai response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry responded {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed registry response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("не удалось открыть страницу поиска: {0}")]
    SearchUnavailable(String),
    #[error("товары не найдены")]
    NoListings,
    #[error(transparent)]
    Scraper(#[from] ScraperError),
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_error_placeholder_with_skip_flag() {
        let outcome = OfferOutcome::Skipped {
            url: "https://a.ru/x".into(),
            error: "ERR_CONNECTION_REFUSED".into(),
            skipped: true,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["url"], "https://a.ru/x");
        assert_eq!(json["skipped"], true);
    }

    #[test]
    fn canonical_offer_uses_report_column_names() {
        let offer = CanonicalOffer {
            email: NOT_SPECIFIED.into(),
            inn: "7701234567".into(),
            kpp: NOT_FOUND.into(),
            formula: NOT_FOUND.into(),
            url: "https://a.ru/x".into(),
            company_n: "Велес".into(),
            material: "Мел".into(),
            price_offer: "260 руб.".into(),
            phone: "+79001234567".into(),
            delivery_method: DEFAULT_DELIVERY.into(),
            address: NOT_FOUND.into(),
            site: "https://a.ru".into(),
            fixed_date: "2025-01-01 12:00:00".into(),
            price_list: "101_1_2025_1.pdf".into(),
            index: "4".into(),
            note: NOTE_OK.into(),
        };
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["ИНН поставщика/ производителя"], "7701234567");
        assert_eq!(json["Индекс"], "4");
        assert_eq!(json["note"], "OK");
    }
}

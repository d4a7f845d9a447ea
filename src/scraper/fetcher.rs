use crate::model::{PageContext, ScraperError};
use crate::parser::PulscenParser;
use crate::scraper::traits::{ListingPage, ListingsBackend, PageFetcher, PageReader};
use crate::utils::{extract_address, extract_phone};
use reqwest::Client;
use ::scraper::Html;
use std::time::Duration;
use tracing::warn;

/// Телефон-заглушка, когда на страницах продавца номера нет вообще.
const NO_PHONE: &str = "Номер на сайте отсутствует";

pub struct PulscenScraper {
    client: Client,
    subdomain: Option<String>,
}

impl PulscenScraper {
    pub fn new(page_timeout_secs: u64, subdomain: Option<String>) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) PriceSniperBot/0.1")
            .timeout(Duration::from_secs(page_timeout_secs))
            .build()?;
        Ok(Self { client, subdomain })
    }

    fn build_search_url(&self, query: &str, page: u32) -> String {
        let host = match &self.subdomain {
            Some(sub) => format!("{}.pulscen.ru", sub),
            None => "www.pulscen.ru".to_string(),
        };
        let q = query.replace(' ', "+");
        if page <= 1 {
            format!("https://{}/search/price?q={}", host, q)
        } else {
            format!("https://{}/search/price?q={}&page={}", host, q, page)
        }
    }
}

#[async_trait::async_trait]
impl PageFetcher for PulscenScraper {
    async fn fetch(&self, url: &str) -> Result<String, ScraperError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ScraperError::InvalidStatus(response.status()));
        }
        Ok(response.text().await?)
    }
}

/// Склейка HTTP-слоя и парсера: то, что пайплайн видит как «листинг-сайт».
pub struct PulscenBackend {
    scraper: PulscenScraper,
    parser: PulscenParser,
}

impl PulscenBackend {
    pub fn new(scraper: PulscenScraper) -> Self {
        Self {
            scraper,
            parser: PulscenParser::new(),
        }
    }
}

#[async_trait::async_trait]
impl ListingsBackend for PulscenBackend {
    async fn search(&self, query: &str, page: u32) -> Result<ListingPage, ScraperError> {
        let url = self.scraper.build_search_url(query, page);
        let html = self.scraper.fetch(&url).await?;
        let entries = self.parser.parse_listing(&html)?;
        let has_next = self.parser.next_page_url(&html, page + 1).is_some();
        Ok(ListingPage { entries, has_next })
    }
}

#[async_trait::async_trait]
impl PageReader for PulscenBackend {
    async fn read(&self, url: &str) -> Result<PageContext, ScraperError> {
        let html = self.scraper.fetch(url).await?;
        let product = self
            .parser
            .parse_product_page(&html)
            .unwrap_or_default();

        let phone_number = extract_phone(&product.footer_address)
            .or_else(|| extract_phone(&product.page_text))
            .unwrap_or_else(|| NO_PHONE.to_string());
        let extracted_address = extract_address(&product.footer_address);

        // Сайт продавца: явная ссылка со страницы товара или сама карточка.
        let seller_site = if product.seller_site.starts_with("http") {
            product.seller_site.clone()
        } else {
            url.to_string()
        };

        // Текст берём со страницы продавца, если она открывается; иначе
        // остаёмся с текстом карточки товара.
        let page_text = if seller_site != url {
            match self.scraper.fetch(&seller_site).await {
                Ok(seller_html) => Html::parse_document(&seller_html)
                    .root_element()
                    .text()
                    .collect::<String>(),
                Err(e) => {
                    warn!("не удалось открыть сайт продавца {}: {}", seller_site, e);
                    product.page_text.clone()
                }
            }
        } else {
            product.page_text.clone()
        };

        Ok(PageContext {
            page_text,
            extracted_address,
            phone_number,
            characteristics: product.characteristics,
            description: product.description,
            delivery_method: product.delivery_method,
            seller_site,
        })
    }
}

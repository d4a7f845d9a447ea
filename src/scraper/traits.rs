use crate::model::{PageContext, ScraperError};
use crate::parser::ListingEntry;

/// Одна страница поисковой выдачи листинг-сайта.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
    pub has_next: bool,
}

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScraperError>;
}

#[async_trait::async_trait]
pub trait ListingsBackend: Send + Sync {
    /// Выдаёт карточки страницы `page` (нумерация с 1) и признак наличия
    /// следующей страницы.
    async fn search(&self, query: &str, page: u32) -> Result<ListingPage, ScraperError>;
}

#[async_trait::async_trait]
pub trait PageReader: Send + Sync {
    /// Собирает контекст страницы товара: текст, адрес, телефон,
    /// характеристики, описание, способ доставки, сайт продавца.
    async fn read(&self, url: &str) -> Result<PageContext, ScraperError>;
}

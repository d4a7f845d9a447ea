use crate::model::{AiError, OfferCandidate, PipelineError};
use crate::normalizer::normalize_company;
use crate::scraper::ListingsBackend;
use std::sync::Arc;
use tracing::{info, warn};

/// AI-предикат соответствия карточки запросу. Обязан ответить «нет», если
/// компания уже есть в списке принятых.
#[async_trait::async_trait]
pub trait MatchPredicate: Send + Sync {
    async fn matches(
        &self,
        query_name: &str,
        product_name: &str,
        company: &str,
        accepted_companies: &[String],
    ) -> Result<bool, AiError>;
}

pub struct PrimaryCollector {
    backend: Arc<dyn ListingsBackend>,
    predicate: Arc<dyn MatchPredicate>,
    max_pages: u32,
}

impl PrimaryCollector {
    pub fn new(
        backend: Arc<dyn ListingsBackend>,
        predicate: Arc<dyn MatchPredicate>,
        max_pages: u32,
    ) -> Self {
        Self {
            backend,
            predicate,
            max_pages,
        }
    }

    /// Collects up to `target_count` offers from distinct companies, walking
    /// search pages up to the page cap. A shortfall is returned as-is — the
    /// orchestrator decides whether to fall back. Failure to open the first
    /// page (or an empty first page) is pipeline-fatal.
    pub async fn collect(
        &self,
        query_name: &str,
        target_count: usize,
    ) -> Result<Vec<OfferCandidate>, PipelineError> {
        let mut accepted: Vec<OfferCandidate> = Vec::new();
        let mut companies: Vec<String> = Vec::new();

        let mut page_num = 1;
        while accepted.len() < target_count && page_num <= self.max_pages {
            let page = match self.backend.search(query_name, page_num).await {
                Ok(p) => p,
                Err(e) if page_num == 1 => {
                    return Err(PipelineError::SearchUnavailable(e.to_string()));
                }
                Err(e) => {
                    warn!("[PULSCEN] страница {} недоступна: {}", page_num, e);
                    break;
                }
            };
            if page_num == 1 && page.entries.is_empty() {
                return Err(PipelineError::NoListings);
            }
            info!(
                "[PULSCEN] Страница {}, найдено карточек: {}",
                page_num,
                page.entries.len()
            );

            for entry in &page.entries {
                if accepted.len() >= target_count {
                    break;
                }
                if entry.price.is_empty() {
                    info!("[FILTER] Пропуск: нет цены у '{}'", entry.product_name);
                    continue;
                }
                // Быстрая локальная проверка уникальности — без вызова AI.
                let normalized = normalize_company(&entry.company);
                if companies.iter().any(|c| normalize_company(c) == normalized) {
                    info!("[SKIP-DUPLICATE] Компания '{}' уже найдена", entry.company);
                    continue;
                }

                let is_match = match self
                    .predicate
                    .matches(query_name, &entry.product_name, &entry.company, &companies)
                    .await
                {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn!("[GPT-CHECK] ошибка предиката для '{}': {}", entry.product_name, e);
                        continue;
                    }
                };
                info!(
                    "[GPT-CHECK] '{}' (цена: '{}', компания: '{}') → {}",
                    entry.product_name,
                    entry.price,
                    entry.company,
                    if is_match { "да" } else { "нет" }
                );
                if !is_match {
                    continue;
                }

                info!(
                    "[ADD-COMPANY] Добавляем новую компанию: '{}' (найдено: {})",
                    entry.company,
                    companies.len()
                );
                companies.push(entry.company.clone());
                accepted.push(OfferCandidate {
                    company: entry.company.clone(),
                    url: entry.url.clone(),
                    product_name: entry.product_name.clone(),
                    price: entry.price.clone(),
                    currency: entry.currency.clone(),
                    address: entry.address.clone(),
                    phone: String::new(),
                });
            }

            if accepted.len() >= target_count || !page.has_next {
                break;
            }
            page_num += 1;
        }

        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScraperError;
    use crate::parser::ListingEntry;
    use crate::scraper::ListingPage;
    use std::sync::Mutex;

    fn entry(name: &str, company: &str, price: &str) -> ListingEntry {
        ListingEntry {
            product_name: name.to_string(),
            url: format!("https://www.pulscen.ru/products/{}", name.len()),
            company: company.to_string(),
            price: price.to_string(),
            currency: "руб.".to_string(),
            address: String::new(),
        }
    }

    struct StubBackend {
        pages: Vec<ListingPage>,
        fail_first: bool,
    }

    #[async_trait::async_trait]
    impl ListingsBackend for StubBackend {
        async fn search(&self, _query: &str, page: u32) -> Result<ListingPage, ScraperError> {
            if self.fail_first {
                return Err(ScraperError::InvalidStatus(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(self
                .pages
                .get((page - 1) as usize)
                .cloned()
                .unwrap_or(ListingPage {
                    entries: vec![],
                    has_next: false,
                }))
        }
    }

    /// Отвечает «да» всем, у кого компании ещё нет в списке принятых.
    struct YesPredicate {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MatchPredicate for YesPredicate {
        async fn matches(
            &self,
            _query: &str,
            product: &str,
            company: &str,
            accepted: &[String],
        ) -> Result<bool, AiError> {
            self.calls.lock().unwrap().push(product.to_string());
            Ok(!accepted.iter().any(|c| c == company))
        }
    }

    fn collector(pages: Vec<ListingPage>) -> (PrimaryCollector, Arc<YesPredicate>) {
        let predicate = Arc::new(YesPredicate {
            calls: Mutex::new(vec![]),
        });
        (
            PrimaryCollector::new(
                Arc::new(StubBackend {
                    pages,
                    fail_first: false,
                }),
                predicate.clone(),
                5,
            ),
            predicate,
        )
    }

    #[tokio::test]
    async fn skips_priceless_and_duplicate_companies_without_predicate() {
        let (collector, predicate) = collector(vec![ListingPage {
            entries: vec![
                entry("мел 30 кг", "База Стройка", "260"),
                entry("мел без цены", "Другая", ""),
                entry("мел дубль", "База Стройка", "270"),
                entry("мел молотый", "ООО Велес", "240"),
            ],
            has_next: false,
        }]);

        let offers = collector.collect("мел", 3).await.unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].company, "База Стройка");
        assert_eq!(offers[1].company, "ООО Велес");
        // Предикат не вызывался ни для карточки без цены, ни для дубля.
        let calls = predicate.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), ["мел 30 кг", "мел молотый"]);
    }

    #[tokio::test]
    async fn stops_at_target_count_across_pages() {
        let (collector, _) = collector(vec![
            ListingPage {
                entries: vec![entry("а", "К1", "100"), entry("б", "К2", "200")],
                has_next: true,
            },
            ListingPage {
                entries: vec![entry("в", "К3", "300"), entry("г", "К4", "400")],
                has_next: false,
            },
        ]);

        let offers = collector.collect("мел", 3).await.unwrap();
        assert_eq!(offers.len(), 3);
        assert_eq!(offers[2].company, "К3");
    }

    #[tokio::test]
    async fn page_cap_shortfall_is_returned_not_an_error() {
        let (collector, _) = collector(vec![ListingPage {
            entries: vec![entry("а", "К1", "100")],
            has_next: false,
        }]);
        let offers = collector.collect("мел", 3).await.unwrap();
        assert_eq!(offers.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_first_page_is_fatal() {
        let predicate = Arc::new(YesPredicate {
            calls: Mutex::new(vec![]),
        });
        let collector = PrimaryCollector::new(
            Arc::new(StubBackend {
                pages: vec![],
                fail_first: true,
            }),
            predicate,
            5,
        );
        let err = collector.collect("мел", 3).await.unwrap_err();
        assert!(matches!(err, PipelineError::SearchUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_first_page_means_no_listings() {
        let (collector, _) = collector(vec![ListingPage {
            entries: vec![],
            has_next: false,
        }]);
        let err = collector.collect("мел", 3).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoListings));
    }
}

// Внешний AI-поиск карточек товаров с вариацией запроса по номеру попытки.
use crate::ai::OpenAiClient;
use crate::collector::FallbackSearch;
use crate::model::{AiError, OfferCandidate};
use crate::utils::extract_domain;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SEARCH_URL: &str = "https://api.perplexity.ai/chat/completions";
const SEARCH_MODEL: &str = "sonar-pro";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Сколько доменов перечисляем в блоке исключений.
const MAX_LISTED_DOMAINS: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    choices: Vec<SearchChoice>,
}

#[derive(Debug, Deserialize)]
struct SearchChoice {
    message: SearchMessage,
}

#[derive(Debug, Deserialize)]
struct SearchMessage {
    content: String,
}

/// Где искать на данной попытке. Первая попытка идёт по крупным магазинам,
/// дальше источники расширяются, десятая — финальная, без ограничений.
fn attempt_focus(attempt: u32) -> &'static str {
    match attempt {
        2 => "поищи в других источниках, НЕ на тех же сайтах что раньше",
        3 => "проверь региональные поставщики и производителей",
        4 => "ищи в специализированных химических компаниях и дистрибьюторах",
        5 => "проверь промышленные поставщики в разных регионах России",
        6 => "ищи у заводов-производителей и их официальных представителей",
        7 => "проверь оптовых поставщиков и торговые компании",
        8 => "ищи в менее популярных, но качественных источниках",
        9 => "проверь новые и альтернативные торговые площадки",
        10 => "финальный поиск в любых доступных источниках, которые еще не проверяли",
        _ => "ищи в крупных российских строительных интернет-магазинах",
    }
}

fn build_prompt(material: &str, count: usize, attempt: u32, excluded_urls: &[String]) -> String {
    let mut prompt = format!(
        "ЭТАП {attempt}: НАЙДИ СТРОГО {count} КАРТОЧКИ ТОВАРА «{material}» — {focus}.\n\
         ИСКЛЮЧИ:\n\
         - Каталоги, подборки, списки, фильтры, разделы (любой URL с /catalog/, /category/, /section/, \
         /filter/, /list/, /produktsiya/, /product-category/, /products/, /goods/, если ссылка не содержит \
         уникального ID или slug товара).\n\
         - Сайты с не-российскими доменами.\n\
         - Маркетплейсы (Avito, Wildberries, Ozon, Яндекс-Маркет).\n\
         Для примера:\n\
         - ПРАВИЛЬНО: https://eldako.ru/produktsiya/mel-molotyy/mel-prirodnyy-tekhnicheskiy-dispersnyy-mtd-2-meshok-30-kg/ \
         (есть slug, ID или .html)\n\
         - НЕПРАВИЛЬНО: https://eldako.ru/produktsiya/mel-molotyy/ (это каталог, не карточка товара)\n\
         КРИТЕРИИ ВЫБОРА КАРТОЧКИ:\n\
         - В URL обязательно должен быть slug или ID товара, или заканчиваться на .html/.php/.aspx.\n\
         - На странице обязательно есть: точное название товара, точное название компании, конкретная цена \
         с единицей измерения (не 'цена по запросу'), активная кнопка 'Купить' или 'Заказать', \
         характеристики товара и явный телефон продавца в шапке, футере или контактах.\n\
         - Если хотя бы ОДНОГО признака нет — ОТБРАСЫВАЙ ссылку.\n\
         ФОРМАТ ВЫВОДА (строго без JSON):\n\
         Компания, продающая товар: [полное название]\n\
         Товар: [название с сайта]\n\
         Цена: [число] руб./[единица]\n\
         Адрес: [полный адрес]\n\
         Телефон: [номер]\n\
         Ссылка: [URL карточки]\n\
         КРИТИЧЕСКИ ВАЖНО: НАЙДИ СТРОГО {count} РАЗНЫХ ТОВАРА от РАЗНЫХ компаний. Если находишь меньше — \
         продолжи поиск!\n\
         РАЗНООБРАЗИЕ ИСТОЧНИКОВ: ищи товары на РАЗНЫХ доменах, НЕ используй один и тот же домен дважды.\n\
         ОБЯЗАТЕЛЬНАЯ ПРОВЕРКА САЙТОВ: каждую ссылку проверь на доступность! Если сайт не открывается, \
         SSL ошибки или домен не существует — НЕ ВКЛЮЧАЙ его в результат!",
        focus = attempt_focus(attempt),
    );

    if !excluded_urls.is_empty() {
        let mut seen = HashSet::new();
        let domains: Vec<String> = excluded_urls
            .iter()
            .map(|url| extract_domain(url))
            .filter(|domain| seen.insert(domain.clone()))
            .take(MAX_LISTED_DOMAINS)
            .collect();
        prompt.push_str(&format!(
            "\n\nВАЖНО: НЕ используй эти недоступные домены из предыдущих попыток:\n\
             Исключить домены: {}\n\
             Ищи товары на ДРУГИХ сайтах, которых нет в списке исключений!",
            domains.join(", ")
        ));
    }
    prompt
}

pub struct PerplexitySearch {
    client: reqwest::Client,
    api_key: String,
    url: String,
    structurer: Arc<OpenAiClient>,
}

impl PerplexitySearch {
    pub fn new(api_key: &str, structurer: Arc<OpenAiClient>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            url: SEARCH_URL.to_string(),
            structurer,
        })
    }

    #[cfg(test)]
    pub fn with_url(api_key: &str, url: &str, structurer: Arc<OpenAiClient>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            url: url.to_string(),
            structurer,
        }
    }

    /// Сырой текстовый ответ поисковой модели, без структуры.
    async fn raw_search(
        &self,
        query: &str,
        count: usize,
        attempt: u32,
        excluded_urls: &[String],
    ) -> Result<String, AiError> {
        let prompt = build_prompt(query, count, attempt, excluded_urls);
        let body = json!({
            "model": SEARCH_MODEL,
            "messages": [
                {"role": "system", "content": "Ты помощник по поиску товаров в интернете."},
                {"role": "user", "content": prompt}
            ],
            "max_tokens": 2000,
        });
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Status(status));
        }
        let parsed: SearchResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Malformed("пустой список choices".to_string()))?;
        Ok(choice.message.content)
    }
}

#[async_trait::async_trait]
impl FallbackSearch for PerplexitySearch {
    async fn search(
        &self,
        query: &str,
        count: usize,
        attempt: u32,
        excluded_urls: &[String],
    ) -> Result<Vec<OfferCandidate>, AiError> {
        info!(
            "[PERPLEXITY] Попытка {}: ищем {} карточки «{}»",
            attempt, count, query
        );
        let raw_text = self.raw_search(query, count, attempt, excluded_urls).await?;
        self.structurer.structure_cards(&raw_text, count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_reply(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn attempt_number_changes_prompt_focus() {
        let first = build_prompt("Мел МТД-2", 3, 1, &[]);
        let sixth = build_prompt("Мел МТД-2", 3, 6, &[]);
        assert!(first.starts_with("ЭТАП 1: НАЙДИ СТРОГО 3 КАРТОЧКИ ТОВАРА «Мел МТД-2»"));
        assert!(first.contains("крупных российских строительных интернет-магазинах"));
        assert!(sixth.contains("ЭТАП 6"));
        assert!(sixth.contains("заводов-производителей"));
        // Номер за пределами таблицы откатывается к первой формулировке.
        let overflow = build_prompt("Мел МТД-2", 3, 11, &[]);
        assert!(overflow.contains("крупных российских строительных интернет-магазинах"));
    }

    #[test]
    fn excluded_urls_collapse_to_unique_domains() {
        let excluded = vec![
            "https://dead.ru/p/1".to_string(),
            "https://dead.ru/p/2".to_string(),
            "https://gone.ru/x".to_string(),
        ];
        let prompt = build_prompt("Мел", 3, 2, &excluded);
        assert!(prompt.contains("Исключить домены: dead.ru, gone.ru"));
    }

    #[test]
    fn no_exclusion_block_without_excluded_urls() {
        let prompt = build_prompt("Мел", 3, 1, &[]);
        assert!(!prompt.contains("Исключить домены"));
    }

    #[tokio::test]
    async fn search_pipes_raw_text_through_structurer() {
        // Поисковый бэкенд отдаёт текст, структуризатор — JSON-массив.
        let search_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("sonar-pro"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
                "Компания, продающая товар: Эльдако\nТовар: Мел МТД-2\nЦена: 260 руб./мешок\n\
                 Ссылка: https://eldako.ru/p/1",
            )))
            .mount(&search_server)
            .await;

        let structure_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
                r#"[{"company":"Эльдако","url":"https://eldako.ru/p/1","name":"Мел МТД-2","price":"260 руб./мешок"}]"#,
            )))
            .mount(&structure_server)
            .await;

        let structurer = Arc::new(OpenAiClient::with_url("k", &structure_server.uri()));
        let search = PerplexitySearch::with_url("p", &search_server.uri(), structurer);
        let cards = search.search("Мел МТД-2", 3, 1, &[]).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].url, "https://eldako.ru/p/1");
    }

    #[tokio::test]
    async fn search_forwards_excluded_domains_in_request_body() {
        let search_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("dead.ru"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("пусто")))
            .expect(1)
            .mount(&search_server)
            .await;

        let structure_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("[]")))
            .mount(&structure_server)
            .await;

        let structurer = Arc::new(OpenAiClient::with_url("k", &structure_server.uri()));
        let search = PerplexitySearch::with_url("p", &search_server.uri(), structurer);
        let excluded = vec!["https://dead.ru/p/1".to_string()];
        let cards = search.search("Мел", 3, 2, &excluded).await.unwrap();
        assert!(cards.is_empty());
    }
}

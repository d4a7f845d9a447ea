// Чат-клиент OpenAI-совместимого API и все промпты, которые через него ходят.
use crate::collector::MatchPredicate;
use crate::model::{AiError, OfferCandidate};
use crate::reconciler::{
    CardExtractor, CardRequest, CompanyCard, CompanyNameAi, FormulaCalculator, FormulaRequest,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Быстрая модель для экстракции и структурирования.
const MODEL_FAST: &str = "gpt-4o-mini";
/// Модель посильнее для сравнения товаров и очистки названий.
const MODEL_SMART: &str = "gpt-4o";

/// Таблица правил пересчёта цены в целевую единицу измерения.
const FORMULA_RULES: &str = "\
• КГ → Т: *1000
• Т → КГ: /1000
• ШТ → М² (лист/рулон/картон/паронит): /<S, м²>
• ШТ → М³ (лист по толщине): /(S * h)
• ШТ → КГ (канистра N кг): *N
• ШТ → м (пог.м): /<L, м>
• УПАК → КГ: /<масса, кг>
• УПАК → Т: *<масса, кг> /1000
• Л → М³ (жидкости): /1000
• Л → КГ (жидкости): *<ρ, кг/л>
• КГ → Л (жидкости): /<ρ>
• Л → М³ (ГАЗЫ, БАЛЛОНЫ чистые): *k
  k: He 0.74  O₂ 0.84  CH₄ 0.71  C₃H₈ 0.51
• Баллон V м³ → М³: /V
• КГ → М² (мастики, битумная гидроизоляция): /(q, кг/м²)
• Т → М³ (битум / эмульсия): /(ρ, т/м³)
• Если название плитка 1000х1500х3000 мм 240 руб и нужно в м3 -> 240 / (1 * 1.5 * 3) = 53.33 руб./м³. Если указан объем например 0.38 м³, то цена будет 240 / 0.38 = 631.58 руб./м3

• Если цена указана за мешок (N кг), чтобы получить цену за тонну, умножь цену за мешок на (1000 / N).
  Пример: 260 руб./мешок 30 кг → 260 * (1000 / 30) = 8 666 руб./т";

fn json_array_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").unwrap())
}

fn json_object_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

struct ChatParams<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
    json_object: bool,
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            url: CHAT_URL.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_url(api_key: &str, url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            url: url.to_string(),
        }
    }

    async fn chat(&self, params: ChatParams<'_>) -> Result<String, AiError> {
        let mut body = json!({
            "model": params.model,
            "messages": [{"role": "user", "content": params.prompt}],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });
        if params.json_object {
            body["response_format"] = json!({"type": "json_object"});
        }

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
        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Malformed("пустой список choices".to_string()))?;
        Ok(choice.message.content.trim().to_string())
    }

    /// Структурирует сырой текст внешнего поиска в карточки товаров.
    /// Модель обязана вернуть JSON-массив; при мусоре вокруг массива
    /// вырезаем его регулярным выражением.
    pub async fn structure_cards(
        &self,
        raw_text: &str,
        count: usize,
    ) -> Result<Vec<OfferCandidate>, AiError> {
        let schema = r#"[
  {
    "company": "",
    "url": "",
    "name": "",
    "price": "",
    "address": "",
    "phone": ""
  }
]"#;
        let prompt = format!(
            "В этом тексте приведены блоки описания товаров из интернет-магазинов. \
             Также определи номер телефона через адрес сайта и перепроверь название компании, \
             он находится либо в footer, либо в header.\n\
             Тебе нужно извлечь не более {count} карточек товаров и оформить их строго по этой структуре (array of JSON):\n\
             {schema}\n\n\
             company — настоящее официальное название компании/магазина (брать только явно с сайта, а не из ссылки/email/домена);\n\
             url — ссылка на карточку товара;\n\
             name — точное название товара;\n\
             price — цена с единицей измерения. Цена ДОЛЖНА быть ЧИСЛОМ, единица измерения — чёткой \
             (например, 'руб./шт.', 'руб./м2', 'руб./кг'). Если числа нет — пустая строка;\n\
             address — адрес магазина;\n\
             phone — телефон магазина из header или footer.\n\
             Верни только JSON массив. Если какого-то поля нет — оставь его пустым.\n\
             Текст:\n{raw_text}"
        );

        let content = self
            .chat(ChatParams {
                model: MODEL_FAST,
                prompt: &prompt,
                temperature: 0.0,
                max_tokens: 2048,
                json_object: false,
            })
            .await?;

        let cards: Vec<OfferCandidate> = match serde_json::from_str(&content) {
            Ok(cards) => cards,
            Err(_) => {
                let found = json_array_pattern()
                    .find(&content)
                    .ok_or_else(|| AiError::Malformed(format!("нет JSON-массива: {content}")))?;
                serde_json::from_str(found.as_str())
                    .map_err(|e| AiError::Malformed(e.to_string()))?
            }
        };
        Ok(cards.into_iter().take(count).collect())
    }
}

#[async_trait::async_trait]
impl MatchPredicate for OpenAiClient {
    async fn matches(
        &self,
        query_name: &str,
        product_name: &str,
        company: &str,
        accepted_companies: &[String],
    ) -> Result<bool, AiError> {
        let accepted = accepted_companies.join(", ");
        let prompt = format!(
            "Ты — эксперт по сравнению строительных материалов. \
             Твоя задача — отсеять карточки, которые НЕ являются нужным товаром.\n\n\
             ⚠️ Пропускай всё, где есть слова: \"услуга\", \"аренда\", \"освидетельствование\", \
             \"проверка\", \"диагностика\", \"монтаж\", \"доставка\".\n\
             ⚠️ Пропускай товары без указания цены ИЛИ с диапазоном без числа.\n\n\
             Считай совпадением «да», если:\n\
             • материал, толщина, вид обработки совпадают,\n\
             • название отражает именно продукт, а не работу/услугу.\n\n\
             Правила сравнения:\n\
             Если название компании на сайте уже есть в списке найденных компаний, всегда отвечай 'нет'.\n\
             1. Считай товары одинаковыми, если основной материал, тип изделия, толщина и способ \
             изготовления совпадают (например, 'хризотилцементный' = 'асбестоцементный', 'лист' = 'шифер', '8 мм' = '8мм').\n\
             2. Игнорируй различия в размерах и ГОСТах (если не указаны в запросе), форматировании, \
             порядке слов и сокращениях (например, 'х/ц' = 'хризотилцементный').\n\n\
             Примеры 'да':\n\
             - 'Лист хризотилцементный плоский прессованный 8 мм' = 'Лист плоский прессованный х/ц 8 мм'\n\
             - 'Шифер плоский прессованный 8 мм' = 'Лист хризотилцементный плоский прессованный 8 мм'\n\n\
             Примеры 'нет':\n\
             - 'Газ сварочный (смесь аргона и углекислого газа)' ≠ 'Регулятор расхода газа аргон Ар 40-2'\n\
             - 'Лист хризотилцементный плоский прессованный 8 мм' ≠ 'Лист хризотилцементный волнистый 8 мм'\n\
             - 'Лист хризотилцементный плоский прессованный 8 мм' ≠ 'Лист хризотилцементный плоский прессованный 10 мм'\n\n\
             Название из запроса: \"{query_name}\"\n\
             Название на сайте: \"{product_name}\"\n\
             Название компании на сайте: \"{company}\"\n\
             Уже найденные компании: [{accepted}]\n\
             Ответь строго одним словом: да или нет."
        );
        let answer = self
            .chat(ChatParams {
                model: MODEL_SMART,
                prompt: &prompt,
                temperature: 0.0,
                max_tokens: 3,
                json_object: false,
            })
            .await?;
        Ok(answer.to_lowercase() == "да")
    }
}

#[async_trait::async_trait]
impl CompanyNameAi for OpenAiClient {
    async fn clean(&self, company_name: &str) -> Result<String, AiError> {
        let prompt = format!(
            "Очисти название компании от сокращений, географических суффиксов и лишних слов.\n\
             Оставь только основное название компании.\n\n\
             Примеры:\n\
             - \"ООО Строительная компания Велес г. Челябинск\" -> \"ООО Строительная компания Велес\"\n\
             - \"СК Велес\" -> \"Строительная компания Велес\"\n\
             - \"ИСМА г. Москва\" -> \"ИСМА\"\n\
             - \"АО ИСМА\" -> \"АО ИСМА\"\n\n\
             Название для очистки: {company_name}\n\n\
             Верни только очищенное название, без пояснений."
        );
        self.chat(ChatParams {
            model: MODEL_SMART,
            prompt: &prompt,
            temperature: 0.0,
            max_tokens: 100,
            json_object: false,
        })
        .await
    }

    async fn correct(&self, company_name: &str) -> Result<String, AiError> {
        let prompt = format!(
            "Ты - эксперт по поиску компаний в базе данных реестра юридических лиц.\n\
             Тебе дано название компании, для которого не удалось найти ИНН.\n\
             Предложи альтернативный вариант написания названия, который может помочь найти компанию.\n\n\
             Правила:\n\
             1. Сохраняй основное название компании\n\
             2. Добавляй или убирай организационно-правовую форму (ООО, АО, ЗАО)\n\
             3. Исправляй возможные опечатки\n\
             4. Добавляй или убирай кавычки\n\
             5. Исправляй сокращения на полные названия\n\n\
             Примеры:\n\
             - \"СК Велес\" -> \"Строительная компания Велес\"\n\
             - \"ООО ИСМА\" -> \"ИСМА\"\n\
             - \"СК Велес г. Челябинск\" -> \"Строительная компания Велес\"\n\n\
             Название для корректировки: {company_name}\n\n\
             Верни только скорректированное название, без пояснений."
        );
        self.chat(ChatParams {
            model: MODEL_FAST,
            prompt: &prompt,
            temperature: 0.0,
            max_tokens: 100,
            json_object: false,
        })
        .await
    }
}

#[async_trait::async_trait]
impl FormulaCalculator for OpenAiClient {
    async fn compute(&self, request: &FormulaRequest<'_>) -> Result<String, AiError> {
        let characteristics = request
            .characteristics
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        let prompt = format!(
            "Ты — калькулятор строительных цен.\n\
             Шаги:\n\n\
             1. Определи исходную и целевую единицу измерения. {material} {price} в {unit}. \
             Если указан диапазон цен, бери минимальное только.\n\
             О товаре: {characteristics}. {description}\n\
             2. Выбери правило из таблицы правил (см. ниже).\n\
             3. Найди коэффициент:\n\
             \u{2022} Если он присутствует в описании (длина, площадь, масса) — используй его.\n\
             \u{2022} Для газов используй фикс.: He 0.74 м³/л, O₂ 0.84, C₃H₈ 0.51, CH₄ 0.71.\n\
             4. Запиши формулу ровно в формате:\n\
             ƒ = <SRC> в <DST> = ( <PRICE><операция><FACTOR> ) = <ITOG>\n\
             — никаких пояснений.\n\
             5. Если данных нет → «не найдено», формулу не выводи.\n\n\
             Таблица правил:\n{rules}\n\n\
             Правила МЕТА\n\
             1) Нет коэффициента — «не найдено».\n\
             2) Услуга — «не найдено».\n\
             3) Итог строго «… руб./<цел-ед.>».",
            material = request.material_name,
            price = request.price,
            unit = request.target_unit,
            characteristics = characteristics,
            description = request.description,
            rules = FORMULA_RULES,
        );
        let answer = self
            .chat(ChatParams {
                model: MODEL_FAST,
                prompt: &prompt,
                temperature: 0.0,
                max_tokens: 512,
                json_object: false,
            })
            .await?;
        info!("[FORMULA] {}", answer);
        Ok(answer)
    }
}

#[async_trait::async_trait]
impl CardExtractor for OpenAiClient {
    async fn extract(&self, request: &CardRequest<'_>) -> Result<CompanyCard, AiError> {
        let prompt = format!(
            "Вот содержимое страницы товара:\n\n\
             Ссылка: {url}\n\n\
             {page_text}\n\n\
             Найденные в реестре юридических лиц компании:\n{dossier}\n\n\
             Задание:\n\
             \u{2022} Найди и укажи ТОЛЬКО ТО, что явно подтверждено на странице или в реестре!\n\
             \u{2022} Извлеки:\n\
             - Название компании: {company} (используй это название, оно уже проверено по реестру)\n\
             - Email компании (если явно указан)\n\
             - ИНН и КПП: {inn} / {kpp}; сравнивай записи реестра с адресом {address}. \
             Если такой же адрес не найден — бери первую запись и её ИНН/КПП.\n\
             - Адрес компании: {address} (или адрес записи реестра, если не нашёл)\n\
             - Телефон компании: {phone} (или телефон со страницы, если не нашёл)\n\
             - Цена: {price}\n\
             - Целевая единица измерения: {unit}\n\
             - Название материала: {material}\n\n\
             Верни только JSON:\n\
             {{\n\
                 \"company_n\": \"{company}\",\n\
                 \"email\": \"...\",\n\
                 \"inn\": \"{inn}\",\n\
                 \"kpp\": \"{kpp}\",\n\
                 \"address\": \"...\",\n\
                 \"phone\": \"...\"\n\
             }}",
            url = request.product_url,
            page_text = request.page_text,
            dossier = request.dossier,
            company = request.company_hint,
            inn = request.inn_hint,
            kpp = request.kpp_hint,
            address = request.extracted_address,
            phone = request.phone_number,
            price = request.price_info,
            unit = request.target_unit,
            material = request.material_name,
        );
        let content = self
            .chat(ChatParams {
                model: MODEL_FAST,
                prompt: &prompt,
                temperature: 0.2,
                max_tokens: 1024,
                json_object: true,
            })
            .await?;

        let card: CompanyCard = match serde_json::from_str(&content) {
            Ok(card) => card,
            Err(_) => {
                let found = json_object_pattern()
                    .find(&content)
                    .ok_or_else(|| AiError::Malformed(format!("нет JSON-объекта: {content}")))?;
                serde_json::from_str(found.as_str())
                    .map_err(|e| AiError::Malformed(e.to_string()))?
            }
        };
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_reply(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn structure_cards_recovers_array_from_noisy_reply() {
        let server = MockServer::start().await;
        let noisy = "Вот результат:\n[{\"company\": \"Эльдако\", \"url\": \"https://eldako.ru/p/1\", \
                     \"name\": \"Мел МТД-2\", \"price\": \"260 руб./мешок\"}]\nГотово.";
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("authorization", "Bearer k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(noisy)))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_url("k", &format!("{}/chat", server.uri()));
        let cards = client.structure_cards("сырой текст", 3).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].company, "Эльдако");
        assert_eq!(cards[0].product_name, "Мел МТД-2");
        // Отсутствующие поля берут значение по умолчанию.
        assert_eq!(cards[0].currency, "");
    }

    #[tokio::test]
    async fn structure_cards_truncates_to_requested_count() {
        let server = MockServer::start().await;
        let three = r#"[{"company":"А","url":"https://a.ru/1","name":"Мел","price":"100"},
                        {"company":"Б","url":"https://b.ru/1","name":"Мел","price":"110"},
                        {"company":"В","url":"https://c.ru/1","name":"Мел","price":"120"}]"#;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(three)))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_url("k", &server.uri());
        let cards = client.structure_cards("текст", 2).await.unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn match_predicate_parses_yes_and_no() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Да")))
            .mount(&server)
            .await;
        let client = OpenAiClient::with_url("k", &server.uri());
        let matched = client
            .matches("Мел МТД-2", "Мел природный МТД-2", "Эльдако", &[])
            .await
            .unwrap();
        assert!(matched);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("нет")))
            .mount(&server)
            .await;
        let client = OpenAiClient::with_url("k", &server.uri());
        let matched = client
            .matches("Мел МТД-2", "Аренда крана", "Эльдако", &[])
            .await
            .unwrap();
        assert!(!matched);
    }

    #[tokio::test]
    async fn backend_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let client = OpenAiClient::with_url("k", &server.uri());
        let err = client.clean("СК Велес").await.unwrap_err();
        assert!(matches!(err, AiError::Status(s) if s.as_u16() == 429));
    }

    #[tokio::test]
    async fn card_extractor_recovers_object_and_fills_missing_fields() {
        let server = MockServer::start().await;
        let reply = "{\"company_n\": \"Эльдако\", \"inn\": \"7453000001\"}";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(reply)))
            .mount(&server)
            .await;
        let client = OpenAiClient::with_url("k", &server.uri());
        let card = client
            .extract(&CardRequest {
                page_text: "текст",
                dossier: "",
                product_url: "https://eldako.ru/p/1",
                extracted_address: "",
                phone_number: "+70000000000",
                company_hint: "Эльдако",
                inn_hint: "не найдено",
                kpp_hint: "не найдено",
                material_name: "Мел",
                price_info: "260 руб.",
                target_unit: "т",
            })
            .await
            .unwrap();
        assert_eq!(card.company_n, "Эльдако");
        assert_eq!(card.inn, "7453000001");
        assert_eq!(card.kpp, "не указан");
    }

}

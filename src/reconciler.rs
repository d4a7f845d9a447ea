// Offer reconciliation: company legal identity, price formula, contact card.
use crate::config::QueryConfig;
use crate::model::{
    AiError, CanonicalOffer, OfferCandidate, PageContext, DEFAULT_DELIVERY, NOTE_OK, NOTE_PARTIAL,
    NOT_FOUND, NOT_SPECIFIED,
};
use crate::normalizer::starts_with_legal_form;
use crate::registry::{RegistryLookup, RegistrySuggestion};
use crate::utils::current_date_moscow;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// AI-очистка и AI-коррекция названия компании под поиск в реестре.
#[async_trait::async_trait]
pub trait CompanyNameAi: Send + Sync {
    async fn clean(&self, company_name: &str) -> Result<String, AiError>;
    async fn correct(&self, company_name: &str) -> Result<String, AiError>;
}

/// Inputs of the price-normalization formula computation.
#[derive(Debug)]
pub struct FormulaRequest<'a> {
    pub material_name: &'a str,
    pub price: &'a str,
    pub target_unit: &'a str,
    pub characteristics: &'a BTreeMap<String, String>,
    pub description: &'a str,
}

/// AI-калькулятор формулы пересчёта цены; «не найдено», если коэффициента
/// нет в данных или карточка описывает услугу.
#[async_trait::async_trait]
pub trait FormulaCalculator: Send + Sync {
    async fn compute(&self, request: &FormulaRequest<'_>) -> Result<String, AiError>;
}

fn not_specified() -> String {
    NOT_SPECIFIED.to_string()
}

/// Карточка компании, которую возвращает AI-экстракция по тексту страницы
/// и досье реестра. Отсутствующие поля заполняются сентинелем.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyCard {
    #[serde(default = "not_specified")]
    pub company_n: String,
    #[serde(default = "not_specified")]
    pub email: String,
    #[serde(default = "not_specified")]
    pub inn: String,
    #[serde(default = "not_specified")]
    pub kpp: String,
    #[serde(default = "not_specified")]
    pub phone: String,
    #[serde(default = "not_specified")]
    pub address: String,
}

impl Default for CompanyCard {
    fn default() -> Self {
        Self {
            company_n: not_specified(),
            email: not_specified(),
            inn: not_specified(),
            kpp: not_specified(),
            phone: not_specified(),
            address: not_specified(),
        }
    }
}

#[derive(Debug)]
pub struct CardRequest<'a> {
    pub page_text: &'a str,
    pub dossier: &'a str,
    pub product_url: &'a str,
    pub extracted_address: &'a str,
    pub phone_number: &'a str,
    pub company_hint: &'a str,
    pub inn_hint: &'a str,
    pub kpp_hint: &'a str,
    pub material_name: &'a str,
    pub price_info: &'a str,
    pub target_unit: &'a str,
}

#[async_trait::async_trait]
pub trait CardExtractor: Send + Sync {
    async fn extract(&self, request: &CardRequest<'_>) -> Result<CompanyCard, AiError>;
}

/// Every registry suggestion seen during one reconciliation, in arrival
/// order. Scoped to a single `reconcile` call and dropped on any exit path —
/// the inter-step buffer is an explicit value, not a shared file.
#[derive(Debug, Default)]
pub struct RegistryDossier {
    suggestions: Vec<RegistrySuggestion>,
}

impl RegistryDossier {
    fn extend(&mut self, suggestions: &[RegistrySuggestion]) {
        self.suggestions.extend_from_slice(suggestions);
    }

    fn first(&self) -> Option<&RegistrySuggestion> {
        self.suggestions.first()
    }

    fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    /// Текстовое досье для AI-экстракции, по записи на подсказку.
    fn as_text(&self) -> String {
        let mut out = String::new();
        for s in &self.suggestions {
            out.push_str(&format!("Название: {}\n", s.value));
            out.push_str(&format!("ИНН: {}\n", s.inn.as_deref().unwrap_or("")));
            out.push_str(&format!("КПП: {}\n", s.kpp.as_deref().unwrap_or("")));
            out.push_str(&format!("Адрес: {}\n", s.address.as_deref().unwrap_or("")));
            out.push_str(&format!(
                "Статус: {}\n",
                s.status.as_deref().unwrap_or("UNKNOWN")
            ));
            out.push_str(&"-".repeat(40));
            out.push('\n');
        }
        out
    }
}

pub struct ReconcileInput<'a> {
    pub candidate: &'a OfferCandidate,
    pub ctx: &'a PageContext,
    pub query: &'a QueryConfig,
    /// Absolute row number in the output table.
    pub index: u32,
    /// Report file name the record refers to.
    pub price_list: String,
}

pub struct Reconciler {
    registry: Arc<dyn RegistryLookup>,
    names: Arc<dyn CompanyNameAi>,
    formula: Arc<dyn FormulaCalculator>,
    cards: Arc<dyn CardExtractor>,
    request_delay: Duration,
}

/// Сколько подсказок запрашиваем у реестра за один вызов.
const SUGGEST_COUNT: usize = 100;

impl Reconciler {
    pub fn new(
        registry: Arc<dyn RegistryLookup>,
        names: Arc<dyn CompanyNameAi>,
        formula: Arc<dyn FormulaCalculator>,
        cards: Arc<dyn CardExtractor>,
        request_delay: Duration,
    ) -> Self {
        Self {
            registry,
            names,
            formula,
            cards,
            request_delay,
        }
    }

    /// Registry lookup that never fails: errors degrade to an empty list,
    /// successful results are also appended to the dossier.
    async fn lookup(&self, name: &str, dossier: &mut RegistryDossier) -> Vec<RegistrySuggestion> {
        match self.registry.suggest(name, SUGGEST_COUNT).await {
            Ok(suggestions) => {
                dossier.extend(&suggestions);
                suggestions
            }
            Err(e) => {
                warn!("[DADATA] ошибка поиска '{}': {}", name, e);
                Vec::new()
            }
        }
    }

    /// Resolves one candidate into a complete output record. Every step is
    /// independently fallible; a failed step leaves its fields at the
    /// sentinel value. This function never returns an error.
    pub async fn reconcile(&self, input: &ReconcileInput<'_>) -> CanonicalOffer {
        sleep(self.request_delay).await;

        let candidate = input.candidate;
        let ctx = input.ctx;
        let mut dossier = RegistryDossier::default();

        // Шаг 1: чистим название; при ошибке работаем с сырым.
        let raw_name = candidate.company.as_str();
        let cleaned_name = match self.names.clean(raw_name).await {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => raw_name.to_string(),
            Err(e) => {
                warn!("[COMPANY] ошибка очистки названия: {}", e);
                raw_name.to_string()
            }
        };
        info!("[COMPANY] Оригинальное название: {}", raw_name);
        info!("[COMPANY] Очищенное название: {}", cleaned_name);

        // Шаг 2: реестр по очищенному, потом по сырому.
        let mut suggestions = self.lookup(&cleaned_name, &mut dossier).await;
        if suggestions.is_empty() && cleaned_name != raw_name {
            info!("[COMPANY] Не найдено по очищенному названию, пробуем оригинальное");
            suggestions = self.lookup(raw_name, &mut dossier).await;
        }

        // Шаг 3: первое отображаемое имя без правовой формы, иначе первое.
        let mut company_n = NOT_FOUND.to_string();
        let mut inn = NOT_FOUND.to_string();
        let mut kpp = NOT_FOUND.to_string();
        if !suggestions.is_empty() {
            let pick = suggestions
                .iter()
                .find(|s| !s.value.is_empty() && !starts_with_legal_form(&s.value))
                .unwrap_or(&suggestions[0]);
            if !pick.value.is_empty() {
                company_n = pick.value.clone();
            }
            inn = pick.inn.clone().unwrap_or_else(|| NOT_FOUND.to_string());
            kpp = pick.kpp.clone().unwrap_or_else(|| NOT_FOUND.to_string());
        }

        // Шаг 4: без ИНН пробуем скорректированное название — один раз.
        if inn == NOT_FOUND {
            info!("[COMPANY] ИНН не найден, пробуем скорректировать название");
            match self.names.correct(raw_name).await {
                Ok(corrected) if !corrected.trim().is_empty() => {
                    info!("[COMPANY] Скорректированное название: {}", corrected);
                    let retried = self.lookup(&corrected, &mut dossier).await;
                    if let Some(hit) = retried.iter().find(|s| !s.value.is_empty() && s.inn.is_some())
                    {
                        company_n = hit.value.clone();
                        inn = hit.inn.clone().unwrap_or_else(|| NOT_FOUND.to_string());
                        kpp = hit.kpp.clone().unwrap_or_else(|| NOT_FOUND.to_string());
                        info!(
                            "[COMPANY] Найдено по скорректированному названию: {} (ИНН: {})",
                            company_n, inn
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("[COMPANY] ошибка коррекции названия: {}", e),
            }
        }

        // Шаг 5: формула пересчёта цены.
        let price_info = format!("{} {}", candidate.price, candidate.currency)
            .trim()
            .to_string();
        let formula = match self
            .formula
            .compute(&FormulaRequest {
                material_name: &candidate.product_name,
                price: &price_info,
                target_unit: &input.query.target_unit,
                characteristics: &ctx.characteristics,
                description: &ctx.description,
            })
            .await
        {
            Ok(f) if !f.trim().is_empty() => f.trim().to_string(),
            Ok(_) => NOT_FOUND.to_string(),
            Err(e) => {
                warn!("[FORMULA] ошибка расчёта: {}", e);
                NOT_FOUND.to_string()
            }
        };

        // Шаг 6: AI-карточка по тексту страницы и досье реестра.
        let card = match self
            .cards
            .extract(&CardRequest {
                page_text: &ctx.page_text,
                dossier: &dossier.as_text(),
                product_url: &ctx.seller_site,
                extracted_address: &ctx.extracted_address,
                phone_number: &ctx.phone_number,
                company_hint: &company_n,
                inn_hint: &inn,
                kpp_hint: &kpp,
                material_name: &input.query.name,
                price_info: &price_info,
                target_unit: &input.query.target_unit,
            })
            .await
        {
            Ok(card) => card,
            Err(e) => {
                warn!("[CARD] ошибка извлечения карточки: {}", e);
                CompanyCard::default()
            }
        };

        // Слияние: значение карточки, иначе накопленное, иначе сентинель.
        let mut company_final = resolve(&card.company_n, &company_n);
        let inn_final = resolve(&card.inn, &inn);
        let kpp_final = resolve(&card.kpp, &kpp);
        let email = resolve(&card.email, NOT_SPECIFIED);
        let address = if is_sentinel(&card.address) {
            if ctx.extracted_address.is_empty() {
                NOT_FOUND.to_string()
            } else {
                ctx.extracted_address.clone()
            }
        } else {
            card.address.clone()
        };

        // Если имя так и не разрешилось, но реестр хоть что-то предлагал —
        // берём первую подсказку как есть, даже без ИНН. Без единой
        // подсказки остаётся «не указан».
        if is_sentinel(&company_final) {
            company_final = match dossier.first() {
                Some(first) => first.value.clone(),
                None => NOT_SPECIFIED.to_string(),
            };
        }
        if company_final.is_empty() {
            company_final = NOT_SPECIFIED.to_string();
        }

        let delivery_method = if ctx.delivery_method.trim().is_empty() {
            DEFAULT_DELIVERY.to_string()
        } else {
            ctx.delivery_method.trim().to_string()
        };
        let site = if ctx.seller_site.is_empty() {
            candidate.url.clone()
        } else {
            ctx.seller_site.clone()
        };
        let note = if candidate.company.is_empty()
            || input.query.name.trim().is_empty()
            || candidate.price.is_empty()
        {
            NOTE_PARTIAL
        } else {
            NOTE_OK
        };

        CanonicalOffer {
            email,
            inn: inn_final,
            kpp: kpp_final,
            formula,
            url: candidate.url.clone(),
            company_n: company_final,
            material: input.query.name.trim().to_string(),
            price_offer: price_info,
            phone: ctx.phone_number.clone(),
            delivery_method,
            address,
            site,
            fixed_date: current_date_moscow(),
            price_list: input.price_list.clone(),
            index: input.index.to_string(),
            note: note.to_string(),
        }
    }
}

fn is_sentinel(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == NOT_FOUND || v == NOT_SPECIFIED
}

/// Значение из карточки, если оно настоящее, иначе запасное.
fn resolve(card_value: &str, fallback: &str) -> String {
    if is_sentinel(card_value) {
        fallback.to_string()
    } else {
        card_value.trim().to_string()
    }
}

// Persistence of run results and the per-offer price list artifact.
use crate::config::QueryConfig;
use crate::model::{CanonicalOffer, OfferOutcome, PipelineError};
use crate::utils::{file_timestamp, safe_dir_name};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Пишет все результаты запуска одним pretty-JSON файлом в подпапку json.
pub async fn persist_outcomes(
    output_dir: &Path,
    outcomes: &[OfferOutcome],
) -> Result<PathBuf, PipelineError> {
    let dir = output_dir.join("json");
    fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("results_{}.json", file_timestamp()));
    let body = serde_json::to_vec_pretty(outcomes)?;
    fs::write(&path, body).await?;
    info!("[SAVE] Результаты сохранены: {}", path.display());
    Ok(path)
}

/// Прейскурант — документ, на который ссылается колонка «Прейскурант»
/// каждой записи. Рендерится в HTML с теми же шапкой и подвалом, что и
/// печатная форма.
#[async_trait::async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn write_price_list(
        &self,
        offer: &CanonicalOffer,
        query: &QueryConfig,
    ) -> Result<PathBuf, PipelineError>;
}

pub struct HtmlReport {
    output_dir: PathBuf,
}

impl HtmlReport {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn render(offer: &CanonicalOffer, query: &QueryConfig) -> String {
        let esc = escape;
        format!(
            "<!DOCTYPE html>\n<html lang=\"ru\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{title}</title>\n\
             <style>body{{font-family:sans-serif;font-size:12px}}\
             header,footer{{display:flex;justify-content:space-between;\
             border-bottom:1px solid #c8c8c8;padding:8px 0}}\
             footer{{border-top:1px solid #c8c8c8;border-bottom:none}}\
             main{{padding:16px 0;white-space:pre-line}}</style>\n</head>\n<body>\n\
             <header>\n<div>{site}</div>\n\
             <div>Поставщик: {company}<br>{material}</div>\n\
             <div>ИНН: {inn}<br>КПП: {kpp}</div>\n</header>\n\
             <main>Ссылка на карточку товара: <a href=\"{url}\">{url}</a></main>\n\
             <footer>\n<div>Формула: {formula}<br>\
             КСР: {code} - {material}<br>\
             Цена: {price}<br>\
             Телефон: {phone}<br>\
             Дата формирования: {date}<br>\
             Способ получения: {delivery}<br>\
             Адрес склада: {address}</div>\n</footer>\n</body>\n</html>\n",
            title = esc(&offer.price_list),
            site = esc(&offer.site),
            company = esc(&offer.company_n),
            material = esc(&offer.material),
            inn = esc(&offer.inn),
            kpp = esc(&offer.kpp),
            url = esc(&offer.url),
            formula = esc(&offer.formula),
            code = esc(&query.code),
            price = esc(&offer.price_offer),
            phone = esc(&offer.phone),
            date = esc(&offer.fixed_date),
            delivery = esc(&offer.delivery_method),
            address = esc(&offer.address),
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait::async_trait]
impl ReportRenderer for HtmlReport {
    async fn write_price_list(
        &self,
        offer: &CanonicalOffer,
        query: &QueryConfig,
    ) -> Result<PathBuf, PipelineError> {
        let dir = self
            .output_dir
            .join(safe_dir_name(&query.code, &query.name));
        fs::create_dir_all(&dir).await?;
        let stem = offer.price_list.trim_end_matches(".pdf");
        let path = dir.join(format!("{stem}.html"));
        fs::write(&path, Self::render(offer, query)).await?;
        info!("[REPORT] Прейскурант записан: {}", path.display());
        Ok(path)
    }
}

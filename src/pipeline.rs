// Сквозной конвейер одного запроса: сбор, чтение карточек, сведение, отчёт.
use crate::collector::{FallbackCollector, PrimaryCollector};
use crate::config::QueryConfig;
use crate::liveness::{error_chain, is_fatal_probe_error};
use crate::model::{OfferOutcome, PipelineError};
use crate::reconciler::{ReconcileInput, Reconciler};
use crate::report::{persist_outcomes, ReportRenderer};
use crate::scraper::PageReader;
use crate::utils::year_quarter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Запись об упавшей карточке. Сетевые ошибки уровня «сайт недоступен»
/// помечаются skipped, остальные остаются обычными ошибками.
fn offer_error_record(url: &str, message: String) -> OfferOutcome {
    if is_fatal_probe_error(&message) {
        warn!("[OFFER] Сайт недоступен, пропускаем {}: {}", url, message);
        OfferOutcome::Skipped {
            url: url.to_string(),
            error: message,
            skipped: true,
        }
    } else {
        error!("[OFFER] Ошибка обработки {}: {}", url, message);
        OfferOutcome::Failed {
            url: url.to_string(),
            error: message,
        }
    }
}

pub struct Pipeline {
    primary: PrimaryCollector,
    fallback: FallbackCollector,
    reader: Arc<dyn PageReader>,
    reconciler: Reconciler,
    report: Arc<dyn ReportRenderer>,
    target_count: usize,
    request_delay: Duration,
    output_dir: PathBuf,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primary: PrimaryCollector,
        fallback: FallbackCollector,
        reader: Arc<dyn PageReader>,
        reconciler: Reconciler,
        report: Arc<dyn ReportRenderer>,
        target_count: usize,
        request_delay: Duration,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            primary,
            fallback,
            reader,
            reconciler,
            report,
            target_count,
            request_delay,
            output_dir,
        }
    }

    /// Обрабатывает один запрос целиком и сохраняет результаты на диск.
    pub async fn run(&self, query: &QueryConfig) -> Result<Vec<OfferOutcome>, PipelineError> {
        info!("🚀 [QUERY] «{}» (код {})", query.name, query.code);

        let mut candidates = self.primary.collect(&query.name, self.target_count).await?;
        if candidates.len() < self.target_count {
            warn!(
                "[QUERY] Основной сбор дал {} из {}, переключаемся на внешний поиск",
                candidates.len(),
                self.target_count
            );
            // Недобор замещается целиком, частичный результат не сохраняем:
            // внешний поиск сам обязан набрать компании без повторов.
            candidates = self.fallback.collect(&query.name, self.target_count).await;
        }

        let (year, quarter) = year_quarter();
        let mut outcomes = Vec::with_capacity(candidates.len());
        for (idx, candidate) in candidates.iter().enumerate() {
            if idx > 0 {
                sleep(self.request_delay).await;
            }
            info!(
                "[OFFER] {}/{}: {} — {}",
                idx + 1,
                candidates.len(),
                candidate.company,
                candidate.url
            );

            let ctx = match self.reader.read(&candidate.url).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    outcomes.push(offer_error_record(&candidate.url, error_chain(&e)));
                    continue;
                }
            };

            let input = ReconcileInput {
                candidate,
                ctx: &ctx,
                query,
                index: query.start_row + idx as u32,
                price_list: format!("{}_{}_{}_{}.pdf", query.code, idx + 1, year, quarter),
            };
            let offer = self.reconciler.reconcile(&input).await;

            if let Err(e) = self.report.write_price_list(&offer, query).await {
                warn!("[REPORT] Не удалось записать прейскурант: {}", e);
            }
            outcomes.push(OfferOutcome::Offer(offer));
        }

        persist_outcomes(&self.output_dir, &outcomes).await?;
        let done = outcomes
            .iter()
            .filter(|o| matches!(o, OfferOutcome::Offer(_)))
            .count();
        info!("✅ [QUERY] «{}»: {} записей готово", query.name, done);
        Ok(outcomes)
    }
}

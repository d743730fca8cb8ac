use crate::config::Config;
use crate::datasource::DataSource;
use crate::db::Repository;
use crate::domain::window::local_date;
use crate::domain::{Anomaly, DailySummary, Position, TimeMs, TimeWindow, WindowError};
use crate::engine::{
    positions_for_window, reconstruct_positions, DailyAggregator, IncomeIndex,
};
use crate::orchestration::ingest::{discover_symbols, Ingestor};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Everything one run computed and stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: NaiveDate,
    /// The report day.
    pub window: TimeWindow,
    /// The fill history positions were reconstructed from.
    pub history: TimeWindow,
    /// All reconstructed positions, ranked by `pnl_amount` descending.
    pub positions: Vec<Position>,
    /// Positions closed in, or opened in and still open at the end of, the report day.
    pub day_positions: Vec<Position>,
    pub daily_summary: DailySummary,
    pub anomalies: Vec<Anomaly>,
    pub generation_id: i64,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("strict mode: {} fatal anomalies, nothing persisted", anomalies.len())]
    Strict { anomalies: Vec<Anomaly> },
}

/// One-shot journal run: fetch, reconstruct, aggregate, persist.
#[derive(Debug, Clone)]
pub struct JournalPipeline {
    ingestor: Ingestor,
    repo: Arc<Repository>,
    config: Config,
}

impl JournalPipeline {
    pub fn new(datasource: Arc<dyn DataSource>, repo: Arc<Repository>, config: Config) -> Self {
        Self {
            ingestor: Ingestor::new(datasource, config.page_limit),
            repo,
            config,
        }
    }

    /// Run the journal for the trading day `date`.
    ///
    /// All logging of the run happens inside a `journal_run` span carrying a
    /// fresh run id.
    pub async fn run(&self, date: NaiveDate) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("journal_run", run_id = %run_id, date = %date);
        self.run_inner(run_id, date).instrument(span).await
    }

    /// The most recently completed trading day at `now`.
    ///
    /// # Errors
    /// Returns an error if the configured offset is not representable.
    pub fn default_report_date(&self, now: TimeMs) -> Result<NaiveDate, WindowError> {
        let anchor_ms = i64::from(self.config.day_anchor_hour) * 60 * 60 * 1000;
        let in_progress = local_date(
            TimeMs::new(now.as_ms() - anchor_ms),
            self.config.utc_offset_minutes,
        )?;
        in_progress
            .pred_opt()
            .ok_or_else(|| WindowError::Unrepresentable(in_progress.to_string()))
    }

    async fn run_inner(&self, run_id: Uuid, date: NaiveDate) -> Result<RunReport, PipelineError> {
        let config = &self.config;
        let window = TimeWindow::trading_day(
            date,
            config.day_anchor_hour,
            config.utc_offset_minutes,
        )?;
        let history = window.lookback_days(config.lookback_days);
        info!(
            "Journal run for window [{}, {}) with history from {}",
            window.start.to_iso8601(),
            window.end.to_iso8601(),
            history.start.to_iso8601()
        );

        let income = self.ingestor.fetch_income(history).await;

        let symbols = if config.symbols.is_empty() {
            discover_symbols(&income.records)
        } else {
            config.symbols.clone()
        };
        info!("Fetching fills for {} symbols", symbols.len());

        let fills = self
            .ingestor
            .fetch_fills(&symbols, &history.split_days())
            .await;

        let index = IncomeIndex::build(&income.records, &config.pnl_mode.categories());
        let reconstruction =
            reconstruct_positions(&fills.records, &index, config.reversal_policy);
        let day_positions = positions_for_window(&reconstruction.positions, &window);

        let daily_summary = DailyAggregator::new(config.quote_asset.clone()).summarize(
            date,
            &window,
            &income.records,
            &fills.records,
        );

        let mut anomalies = income.anomalies;
        anomalies.extend(fills.anomalies);
        anomalies.extend(reconstruction.anomalies);
        log_anomalies(&anomalies);

        if config.strict_mode {
            let fatal: Vec<Anomaly> = anomalies
                .iter()
                .filter(|a| a.is_fatal_in_strict_mode())
                .cloned()
                .collect();
            if !fatal.is_empty() {
                warn!("Strict mode: aborting before persistence");
                return Err(PipelineError::Strict { anomalies: fatal });
            }
        }

        let archived = self.repo.insert_fills_batch(&fills.records).await?;
        let generation = self
            .repo
            .replace_positions(&reconstruction.positions, &run_id.to_string())
            .await?;
        self.repo.upsert_daily_summary(&daily_summary).await?;

        info!(
            "Run complete: {} positions ({} for the day), {} new fills archived, daily pnl {}",
            reconstruction.positions.len(),
            day_positions.len(),
            archived,
            daily_summary.daily_pnl
        );

        Ok(RunReport {
            run_id,
            date,
            window,
            history,
            positions: reconstruction.positions,
            day_positions,
            daily_summary,
            anomalies,
            generation_id: generation.id,
        })
    }
}

fn log_anomalies(anomalies: &[Anomaly]) {
    if anomalies.is_empty() {
        return;
    }
    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    for anomaly in anomalies {
        *by_kind.entry(anomaly.kind()).or_default() += 1;
    }
    for (kind, count) in by_kind {
        warn!(kind, count, "Anomalies recorded");
    }
}

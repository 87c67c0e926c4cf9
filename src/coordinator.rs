//! Coordinator/Scheduler: drives the six named tasks at independent
//! cadences against a shared `last_run_at` register, with an advisory
//! per-task lock so two instances of the same task are never in flight
//! together.

use crate::config::Config;
use crate::error::PipelineError;
use crate::ingest::events::EventIngestor;
use crate::ingest::indicators::IndicatorIngestor;
use crate::ingest::RateLimiter;
use crate::models::{AlertDirection, RiskAlert};
use crate::register::Register;
use crate::storage::Storage;
use crate::{features, nlp, scoring};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The six tasks the coordinator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    EventIngest,
    IndicatorIngest,
    EventProcessing,
    FeatureEngineering,
    RiskScoring,
    ModelRetraining,
}

impl TaskName {
    pub const ALL: [TaskName; 6] = [
        TaskName::EventIngest,
        TaskName::IndicatorIngest,
        TaskName::EventProcessing,
        TaskName::FeatureEngineering,
        TaskName::RiskScoring,
        TaskName::ModelRetraining,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::EventIngest => "event-ingest",
            TaskName::IndicatorIngest => "indicator-ingest",
            TaskName::EventProcessing => "event-processing",
            TaskName::FeatureEngineering => "feature-engineering",
            TaskName::RiskScoring => "risk-scoring",
            TaskName::ModelRetraining => "model-retraining",
        }
    }

    fn interval(&self, config: &Config) -> std::time::Duration {
        match self {
            TaskName::EventIngest => config.event_ingest_interval,
            TaskName::IndicatorIngest => config.indicator_ingest_interval,
            TaskName::EventProcessing => config.event_processing_interval,
            TaskName::FeatureEngineering => config.feature_engineering_interval,
            TaskName::RiskScoring => config.risk_scoring_interval,
            TaskName::ModelRetraining => config.model_retraining_interval,
        }
    }

    fn register_key(&self) -> String {
        format!("last_run_at:{}", self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown task name: {s}"))
    }
}

pub struct Coordinator {
    config: Arc<Config>,
    storage: Arc<Storage>,
    register: Register,
}

/// Per-task status line for `scheduler-status`.
pub struct TaskStatus {
    pub name: &'static str,
    pub last_run_at: Option<DateTime<Utc>>,
    pub interval_secs: u64,
    pub due: bool,
}

impl Coordinator {
    pub fn new(config: Arc<Config>, storage: Arc<Storage>, register: Register) -> Self {
        Self {
            config,
            storage,
            register,
        }
    }

    /// One coordinator tick: for every task, run it iff
    /// `now >= last_run_at + interval`.
    pub async fn tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        for task in TaskName::ALL {
            let last_run_at = self.register.get(&task.register_key()).await?;
            let due = match last_run_at {
                Some(t) => now.signed_duration_since(t).to_std().unwrap_or_default() >= task.interval(&self.config),
                None => true,
            };
            if due {
                if let Err(e) = self.run_task(task, now).await {
                    error!(task = task.as_str(), error = %e, "task failed during scheduled tick");
                }
            }
        }
        Ok(())
    }

    /// Run one task out-of-band, updating `last_run_at` on success.
    pub async fn run_manual(&self, task: TaskName) -> anyhow::Result<()> {
        self.run_task(task, Utc::now()).await
    }

    pub async fn status(&self) -> anyhow::Result<Vec<TaskStatus>> {
        let now = Utc::now();
        let mut statuses = Vec::with_capacity(TaskName::ALL.len());
        for task in TaskName::ALL {
            let last_run_at = self.register.get(&task.register_key()).await?;
            let interval = task.interval(&self.config);
            let due = match last_run_at {
                Some(t) => now.signed_duration_since(t).to_std().unwrap_or_default() >= interval,
                None => true,
            };
            statuses.push(TaskStatus {
                name: task.as_str(),
                last_run_at,
                interval_secs: interval.as_secs(),
                due,
            });
        }
        Ok(statuses)
    }

    /// Acquire the advisory lock, run the task body, release the lock on
    /// every exit path, and advance `last_run_at` only if the task's own
    /// success rule is satisfied.
    async fn run_task(&self, task: TaskName, tick_start: DateTime<Utc>) -> anyhow::Result<()> {
        let lock_key = task.as_str();
        if !self.register.try_lock(lock_key).await? {
            info!(task = lock_key, "skipping tick, task already in flight");
            return Ok(());
        }

        let outcome = self.run_task_body(task).await;

        self.register.unlock(lock_key).await?;

        match outcome {
            Ok(should_advance) => {
                if should_advance {
                    self.register.set(&task.register_key(), tick_start).await?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns whether `last_run_at` should advance: upstream failures
    /// advance unless every country failed; storage-transient failures
    /// never advance.
    async fn run_task_body(&self, task: TaskName) -> anyhow::Result<bool> {
        match task {
            TaskName::EventIngest => self.run_event_ingest().await,
            TaskName::IndicatorIngest => self.run_indicator_ingest().await,
            TaskName::EventProcessing => self.run_event_processing().await,
            TaskName::FeatureEngineering => self.run_feature_engineering().await,
            TaskName::RiskScoring => self.run_risk_scoring().await,
            TaskName::ModelRetraining => self.run_model_retraining().await,
        }
    }

    async fn run_event_ingest(&self) -> anyhow::Result<bool> {
        let countries = self.storage.list_countries()?;
        if countries.is_empty() {
            return Ok(true);
        }

        let rate_limiter = RateLimiter::new(
            self.register.clone(),
            "rate:events",
            self.config.event_rate_limit,
        );
        let ingestor = EventIngestor::new(rate_limiter, self.config.upstream_timeout, None)?;

        let mut any_succeeded = false;
        let mut storage_blocked = false;
        for country in &countries {
            match ingestor
                .ingest_country(
                    &self.storage,
                    country.id,
                    &country.alpha_code,
                    self.config.event_lookback_days,
                    self.config.event_max_records,
                )
                .await
            {
                Ok(_) => any_succeeded = true,
                Err(PipelineError::StorageTransient(e)) => {
                    error!(country = %country.alpha_code, error = %e, "event ingest storage write failed");
                    storage_blocked = true;
                }
                Err(e) => {
                    warn!(country = %country.alpha_code, error = %e, "event ingest failed for country");
                }
            }
        }
        Ok(any_succeeded && !storage_blocked)
    }

    async fn run_indicator_ingest(&self) -> anyhow::Result<bool> {
        let countries = self.storage.list_countries()?;
        if countries.is_empty() {
            return Ok(true);
        }

        let rate_limiter = RateLimiter::new(
            self.register.clone(),
            "rate:indicators",
            self.config.indicator_rate_limit,
        );
        let ingestor = IndicatorIngestor::new(rate_limiter, self.config.upstream_timeout, None)?;

        let mut any_succeeded = false;
        let mut storage_blocked = false;
        for country in &countries {
            let summary = ingestor
                .ingest_country(
                    &self.storage,
                    country.id,
                    &country.alpha_code,
                    self.config.indicator_lookback_years,
                )
                .await;
            if summary.indicators_written > 0 {
                any_succeeded = true;
            }
            if summary.storage_blocked {
                storage_blocked = true;
            }
        }
        Ok(any_succeeded && !storage_blocked)
    }

    async fn run_event_processing(&self) -> anyhow::Result<bool> {
        loop {
            let chunk = self.storage.unprocessed_raw_events(self.config.nlp_chunk_size)?;
            if chunk.is_empty() {
                return Ok(true);
            }

            for batch in chunk.chunks(self.config.nlp_batch_size) {
                let storage = Arc::clone(&self.storage);
                let batch = batch.to_vec();
                tokio::task::spawn_blocking(move || {
                    batch.par_iter().try_for_each(|raw| {
                        let processed = nlp::process_event(raw);
                        storage.upsert_processed_event(&processed, nlp::NLP_VERSION)
                    })
                })
                .await??;
            }
        }
    }

    async fn run_feature_engineering(&self) -> anyhow::Result<bool> {
        let countries = self.storage.list_countries()?;
        let today = Utc::now().date_naive();
        for country in &countries {
            let storage = Arc::clone(&self.storage);
            let country = country.clone();
            let fv = tokio::task::spawn_blocking(move || {
                features::build_feature_vector(&storage, &country, today)
            })
            .await??;
            self.storage.upsert_feature_vector(&fv)?;
        }
        Ok(true)
    }

    async fn run_risk_scoring(&self) -> anyhow::Result<bool> {
        let artifact = self.storage.load_model_artifact(&self.config.model_version)?;
        let Some(bytes) = artifact else {
            // Model absent: log and exit successfully without writing;
            // next run retries after training.
            warn!("no trained model artifact, skipping risk-scoring");
            return Ok(false);
        };
        let model: scoring::EnsembleModel = serde_json::from_slice(&bytes)?;

        let countries = self.storage.list_countries()?;
        let today = Utc::now().date_naive();

        for country in &countries {
            let Some(fv) = self.storage.get_feature_vector(country.id, today)? else {
                continue;
            };
            let mut risk_score = scoring::score(&model, &fv.features);
            risk_score.country_id = country.id;
            risk_score.score_date = today;
            self.storage.upsert_risk_score(&risk_score)?;

            if let Some(previous) = self.storage.previous_score(country.id, today)? {
                if let Some(alert) = derive_alert(&previous, &risk_score) {
                    self.storage.upsert_risk_alert(&alert)?;
                }
            }
        }
        Ok(true)
    }

    async fn run_model_retraining(&self) -> anyhow::Result<bool> {
        let examples = self.storage.feature_vectors_with_labels()?;
        if examples.is_empty() {
            warn!("no labeled examples available, skipping model-retraining");
            return Ok(false);
        }

        let model_version = self.config.model_version.clone();
        let (model, metrics) =
            tokio::task::spawn_blocking(move || scoring::train(&model_version, &examples)).await?;

        for m in &metrics {
            info!(
                component = m.component,
                tree_mae = m.tree_mae,
                boost_mae = m.boost_mae,
                folds = m.folds,
                "cross-validation complete"
            );
        }

        let payload = serde_json::to_vec(&model)?;
        self.storage
            .save_model_artifact(&model.model_version, Utc::now(), &payload)?;
        Ok(true)
    }
}

/// Significant-change detection for RiskAlert. A change is "significant"
/// at a 10-point absolute move, the same threshold used elsewhere in this
/// codebase for drawdown-style alerting.
const ALERT_THRESHOLD: f64 = 10.0;

fn derive_alert(
    previous: &crate::models::RiskScore,
    current: &crate::models::RiskScore,
) -> Option<RiskAlert> {
    let change = current.overall_score - previous.overall_score;
    if change.abs() < ALERT_THRESHOLD {
        return None;
    }
    Some(RiskAlert {
        country_id: current.country_id,
        previous_score: previous.overall_score,
        previous_date: previous.score_date,
        current_score: current.overall_score,
        current_date: current.score_date,
        change,
        magnitude: change.abs(),
        direction: if change > 0.0 {
            AlertDirection::Increase
        } else {
            AlertDirection::Decrease
        },
        alert_kind: "overall_score_shift".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_name_round_trips_through_str() {
        for task in TaskName::ALL {
            assert_eq!(TaskName::from_str(task.as_str()).unwrap(), task);
        }
    }

    #[test]
    fn unknown_task_name_is_rejected() {
        assert!(TaskName::from_str("not-a-task").is_err());
    }

    #[test]
    fn alert_threshold_suppresses_small_changes() {
        use crate::models::ConfidenceInterval;
        use chrono::NaiveDate;

        let base = crate::models::RiskScore {
            country_id: 1,
            score_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            overall_score: 50.0,
            political_stability: 50.0,
            conflict_risk: 50.0,
            economic_risk: 50.0,
            institutional_quality: 50.0,
            confidence: ConfidenceInterval::new(40.0, 60.0),
            model_version: "v1".to_string(),
            created_at: Utc::now(),
        };
        let mut next = crate::models::RiskScore {
            score_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            overall_score: 55.0,
            ..base.clone()
        };
        assert!(derive_alert(&base, &next).is_none());

        next.overall_score = 65.0;
        let alert = derive_alert(&base, &next).unwrap();
        assert_eq!(alert.direction, AlertDirection::Increase);
        assert!((alert.magnitude - 15.0).abs() < 1e-9);
    }
}

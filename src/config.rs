//! Process configuration loaded from the environment.
//!
//! `dotenv` first, then `std::env::var` with parsed defaults. Every tunable
//! named by the pipeline stages (lookback window, batch sizes, cadences,
//! rate-limit gaps) lives here so stage code never reaches into `std::env`
//! directly.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub redis_url: Option<String>,

    pub news_events_api_key: Option<String>,
    pub indicators_api_key: Option<String>,

    /// Event Ingestor tunables.
    pub event_lookback_days: u32,
    pub event_max_records: u32,
    pub event_rate_limit: Duration,

    /// Indicator Ingestor tunables.
    pub indicator_lookback_years: u32,
    pub indicator_rate_limit: Duration,

    /// Event Processor tunables.
    pub nlp_chunk_size: usize,
    pub nlp_batch_size: usize,

    /// Wall-clock timeout applied to every external call.
    pub upstream_timeout: Duration,

    /// Coordinator cadences, keyed by task name in `coordinator`.
    pub tick_interval: Duration,
    pub event_ingest_interval: Duration,
    pub indicator_ingest_interval: Duration,
    pub event_processing_interval: Duration,
    pub feature_engineering_interval: Duration,
    pub risk_scoring_interval: Duration,
    pub model_retraining_interval: Duration,

    pub model_version: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;

        let redis_url = env::var("REDIS_URL").ok();

        let news_events_api_key = env::var("NEWS_EVENTS_API_KEY").ok();
        let indicators_api_key = env::var("INDICATORS_API_KEY").ok();

        Ok(Self {
            database_path,
            redis_url,
            news_events_api_key,
            indicators_api_key,

            event_lookback_days: env_u32("EVENT_LOOKBACK_DAYS", 7).min(30),
            event_max_records: env_u32("EVENT_MAX_RECORDS", 250),
            event_rate_limit: Duration::from_secs_f64(env_f64("EVENT_RATE_LIMIT_SECS", 86.4)),

            indicator_lookback_years: env_u32("INDICATOR_LOOKBACK_YEARS", 5),
            indicator_rate_limit: Duration::from_secs_f64(env_f64(
                "INDICATOR_RATE_LIMIT_SECS",
                8.64,
            )),

            nlp_chunk_size: env_u32("NLP_CHUNK_SIZE", 100) as usize,
            nlp_batch_size: env_u32("NLP_BATCH_SIZE", 10) as usize,

            upstream_timeout: Duration::from_secs(env_u32("UPSTREAM_TIMEOUT_SECS", 30) as u64),

            tick_interval: Duration::from_secs(env_u32("TICK_INTERVAL_SECS", 3600) as u64),
            event_ingest_interval: Duration::from_secs(3600 * 6),
            indicator_ingest_interval: Duration::from_secs(3600 * 168),
            event_processing_interval: Duration::from_secs(3600),
            feature_engineering_interval: Duration::from_secs(3600 * 24),
            risk_scoring_interval: Duration::from_secs(3600 * 24),
            model_retraining_interval: Duration::from_secs(3600 * 168),

            model_version: env::var("MODEL_VERSION").unwrap_or_else(|_| "1.0".to_string()),
        })
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

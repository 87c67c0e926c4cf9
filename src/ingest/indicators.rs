//! Indicator Ingestor: pulls yearly governance/macro indicator history for
//! a country from the configured indicators feed.

use super::{execute_with_retry, RateLimiter, RetryableError};
use crate::error::PipelineError;
use crate::models::{EconomicIndicator, IndicatorCode};
use crate::storage::Storage;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://api.worldbank.org/v2";

pub struct IndicatorIngestor {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub indicators_written: u32,
    pub indicators_missing: u32,
    pub any_succeeded: bool,
    /// Set when any indicator for this country hit a storage failure.
    /// The coordinator never advances a task's `last_run_at` while this
    /// is set, regardless of how many indicators otherwise succeeded.
    pub storage_blocked: bool,
}

impl IndicatorIngestor {
    pub fn new(rate_limiter: RateLimiter, timeout: Duration, base_url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            rate_limiter,
        })
    }

    /// Pull up to `lookback_years` of history for all nine indicator codes
    /// for one country. A missing indicator is not an error; it's counted
    /// and left for the feature stage to impute as zero.
    pub async fn ingest_country(
        &self,
        storage: &Storage,
        country_id: i64,
        alpha_code: &str,
        lookback_years: u32,
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for code in IndicatorCode::ALL {
            match self
                .fetch_and_store(storage, country_id, alpha_code, code, lookback_years)
                .await
            {
                Ok(true) => {
                    summary.indicators_written += 1;
                    summary.any_succeeded = true;
                }
                Ok(false) => summary.indicators_missing += 1,
                Err(PipelineError::StorageTransient(e)) => {
                    warn!(country = alpha_code, indicator = code.wire_code(), error = %e, "indicator storage write failed");
                    summary.storage_blocked = true;
                }
                Err(e) => {
                    warn!(country = alpha_code, indicator = code.wire_code(), error = %e, "indicator ingest failed");
                    summary.indicators_missing += 1;
                }
            }
        }
        info!(
            country = alpha_code,
            written = summary.indicators_written,
            missing = summary.indicators_missing,
            "indicator ingest complete"
        );
        summary
    }

    async fn fetch_and_store(
        &self,
        storage: &Storage,
        country_id: i64,
        alpha_code: &str,
        code: IndicatorCode,
        lookback_years: u32,
    ) -> Result<bool, PipelineError> {
        self.rate_limiter
            .acquire()
            .await
            .map_err(PipelineError::StorageTransient)?;

        let end_year = chrono::Utc::now().date_naive().format("%Y").to_string();
        let start_year = chrono::Utc::now().date_naive().year_minus(lookback_years);
        let url = format!(
            "{}/country/{}/indicator/{}",
            self.base_url,
            alpha_code,
            code.wire_code()
        );

        let client = &self.client;
        let date_range = format!("{start_year}:{end_year}");
        let body: Value = execute_with_retry(|| {
            let client = client.clone();
            let url = url.clone();
            let date_range = date_range.clone();
            async move {
                let resp = client
                    .get(&url)
                    .query(&[
                        ("format", "json"),
                        ("date", date_range.as_str()),
                        ("per_page", "500"),
                    ])
                    .send()
                    .await
                    .map_err(|e| RetryableError::Transient(e.into()))?;

                if resp.status().as_u16() == 429 {
                    return Err(RetryableError::RateLimited);
                }
                if resp.status().is_server_error() {
                    return Err(RetryableError::Transient(anyhow::anyhow!(
                        "upstream returned {}",
                        resp.status()
                    )));
                }
                resp.json::<Value>().await.map_err(|e| RetryableError::Transient(e.into()))
            }
        })
        .await?;

        // Response is a 2-element array: [metadata, series].
        let series = match body.as_array().and_then(|arr| arr.get(1)).and_then(|v| v.as_array()) {
            Some(series) => series,
            None => {
                return Err(PipelineError::UpstreamMalformed(format!(
                    "malformed indicator response for {}",
                    code.wire_code()
                )))
            }
        };

        let mut any_written = false;
        for entry in series {
            let Some(year_str) = entry.get("date").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(value) = entry.get("value").and_then(|v| v.as_f64()) else {
                continue;
            };
            let Ok(year) = year_str.parse::<i32>() else {
                continue;
            };

            storage
                .upsert_economic_indicator(&EconomicIndicator {
                    country_id,
                    indicator_code: code,
                    year,
                    value,
                })
                .map_err(PipelineError::StorageTransient)?;
            any_written = true;
        }

        Ok(any_written)
    }
}

trait YearMinus {
    fn year_minus(&self, years: u32) -> String;
}

impl YearMinus for chrono::NaiveDate {
    fn year_minus(&self, years: u32) -> String {
        use chrono::Datelike;
        (self.year() - years as i32).to_string()
    }
}

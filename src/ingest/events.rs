//! Event Ingestor: pulls recent news events for a country from the
//! configured events feed and writes deduplicated RawEvent rows.

use super::{execute_with_retry, RateLimiter, RetryableError};
use crate::error::PipelineError;
use crate::storage::{InsertOutcome, Storage};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const DEFAULT_BASE_URL: &str = "https://api.gdeltproject.org/api/v2/doc/doc";
const TITLE_MAX_CHARS: usize = 1000;
const URL_MAX_CHARS: usize = 500;

pub struct EventIngestor {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
    url: Option<String>,
    domain: Option<String>,
    language: Option<String>,
    seendate: Option<String>,
}

/// Outcome of one country's ingest run: count of rows inserted and
/// de-duplicated.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub inserted: u32,
    pub duplicates: u32,
}

impl EventIngestor {
    pub fn new(rate_limiter: RateLimiter, timeout: Duration, base_url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            rate_limiter,
        })
    }

    /// Pull events for one country and upsert them. Classifies the
    /// failure kind on error so the coordinator can decide whether a
    /// country failing here should block the task's `last_run_at` from
    /// advancing.
    pub async fn ingest_country(
        &self,
        storage: &Storage,
        country_id: i64,
        alpha_code: &str,
        lookback_days: u32,
        max_records: u32,
    ) -> Result<IngestSummary, PipelineError> {
        self.fetch_and_store(storage, country_id, alpha_code, lookback_days, max_records)
            .await
    }

    async fn fetch_and_store(
        &self,
        storage: &Storage,
        country_id: i64,
        alpha_code: &str,
        lookback_days: u32,
        max_records: u32,
    ) -> Result<IngestSummary, PipelineError> {
        self.rate_limiter
            .acquire()
            .await
            .map_err(PipelineError::StorageTransient)?;

        let query = format!("country:{alpha_code} sourcelang:eng");
        let client = &self.client;
        let base_url = &self.base_url;
        let response: EventsResponse = execute_with_retry(|| {
            let client = client.clone();
            let base_url = base_url.clone();
            let query = query.clone();
            async move {
                let resp = client
                    .get(&base_url)
                    .query(&[
                        ("query", query.as_str()),
                        ("mode", "artlist"),
                        ("timespan", &format!("{lookback_days}d")),
                        ("maxrecords", &max_records.to_string()),
                        ("format", "json"),
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
                resp.json::<EventsResponse>()
                    .await
                    .map_err(|e| RetryableError::Transient(e.into()))
            }
        })
        .await?;

        let mut summary = IngestSummary::default();
        for article in response.articles {
            let (Some(title), Some(url)) = (article.title, article.url) else {
                continue;
            };
            let event_date = article
                .seendate
                .as_deref()
                .and_then(parse_seendate)
                .unwrap_or_else(|| chrono::Utc::now().date_naive());

            let truncated_title = truncate_chars(&title, TITLE_MAX_CHARS);
            let truncated_url = truncate_chars(&url, URL_MAX_CHARS);
            let domain = article.domain.unwrap_or_default();
            let language = article.language.unwrap_or_else(|| "en".to_string());

            match storage
                .insert_raw_event(
                    country_id,
                    event_date,
                    &truncated_title,
                    &truncated_url,
                    &domain,
                    &language,
                )
                .map_err(PipelineError::StorageTransient)?
            {
                InsertOutcome::Inserted => summary.inserted += 1,
                InsertOutcome::AlreadyExisted => summary.duplicates += 1,
            }
        }

        info!(
            country = alpha_code,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            "event ingest complete"
        );
        Ok(summary)
    }
}

/// Parse a `YYYYMMDDThhmmssZ` timestamp's date portion.
fn parse_seendate(raw: &str) -> Option<NaiveDate> {
    let day = raw.get(0..8)?;
    NaiveDate::parse_from_str(day, "%Y%m%d").ok()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gdelt_style_seendate() {
        let date = parse_seendate("20260115T093000Z").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn malformed_seendate_returns_none() {
        assert!(parse_seendate("not-a-date").is_none());
    }

    #[test]
    fn truncates_long_titles_and_urls() {
        let long = "x".repeat(2000);
        assert_eq!(truncate_chars(&long, TITLE_MAX_CHARS).len(), TITLE_MAX_CHARS);
        assert_eq!(truncate_chars(&long, URL_MAX_CHARS).len(), URL_MAX_CHARS);
    }
}

//! Persistence contracts: idempotent upserts by natural key, time-range
//! selects, and the joins the pipeline stages need.
//!
//! Schema as a single SQL string, WAL mode, a `parking_lot::Mutex<Connection>`
//! for thread-safety across the tokio worker pool. No full-text search
//! requirement here, so there's no FTS5 schema to maintain.

use crate::error::is_constraint_violation;
use crate::models::{
    AlertDirection, ConfidenceInterval, Country, EconomicIndicator, FeatureVector, IndicatorCode,
    ProcessedEvent, RawEvent, RiskAlert, RiskCategory, RiskScore,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::str::FromStr;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS countries (
    id INTEGER PRIMARY KEY,
    alpha_code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    region TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS raw_events (
    id INTEGER PRIMARY KEY,
    country_id INTEGER NOT NULL REFERENCES countries(id),
    event_date TEXT NOT NULL,
    title TEXT NOT NULL,
    source_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    language TEXT NOT NULL,
    UNIQUE(country_id, source_url)
);
CREATE INDEX IF NOT EXISTS idx_raw_events_country_date ON raw_events(country_id, event_date);

CREATE TABLE IF NOT EXISTS processed_events (
    raw_event_id INTEGER PRIMARY KEY REFERENCES raw_events(id),
    risk_category TEXT NOT NULL,
    sentiment_score REAL NOT NULL,
    severity_score REAL NOT NULL,
    confidence REAL NOT NULL,
    nlp_version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS economic_indicators (
    country_id INTEGER NOT NULL REFERENCES countries(id),
    indicator_code TEXT NOT NULL,
    year INTEGER NOT NULL,
    value REAL NOT NULL,
    PRIMARY KEY (country_id, indicator_code, year)
);

CREATE TABLE IF NOT EXISTS feature_vectors (
    country_id INTEGER NOT NULL REFERENCES countries(id),
    feature_date TEXT NOT NULL,
    features TEXT NOT NULL,
    generated_at TEXT NOT NULL,
    PRIMARY KEY (country_id, feature_date)
);

CREATE TABLE IF NOT EXISTS risk_scores (
    country_id INTEGER NOT NULL REFERENCES countries(id),
    score_date TEXT NOT NULL,
    overall_score REAL NOT NULL,
    political_stability REAL NOT NULL,
    conflict_risk REAL NOT NULL,
    economic_risk REAL NOT NULL,
    institutional_quality REAL NOT NULL,
    confidence_lower REAL NOT NULL,
    confidence_upper REAL NOT NULL,
    model_version TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (country_id, score_date)
);

CREATE TABLE IF NOT EXISTS risk_alerts (
    country_id INTEGER NOT NULL REFERENCES countries(id),
    previous_score REAL NOT NULL,
    previous_date TEXT NOT NULL,
    current_score REAL NOT NULL,
    current_date TEXT NOT NULL,
    change REAL NOT NULL,
    magnitude REAL NOT NULL,
    direction TEXT NOT NULL,
    alert_kind TEXT NOT NULL,
    PRIMARY KEY (country_id, current_date)
);

CREATE TABLE IF NOT EXISTS model_artifacts (
    model_version TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    payload BLOB NOT NULL
);
"#;

pub struct Storage {
    conn: Mutex<Connection>,
}

/// Outcome of an idempotent insert (storage-constraint handling).
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExisted,
}

impl Storage {
    pub fn open(database_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(database_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ---- countries ----------------------------------------------------

    pub fn upsert_country(&self, alpha_code: &str, name: &str, region: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO countries (alpha_code, name, region) VALUES (?1, ?2, ?3)
             ON CONFLICT(alpha_code) DO UPDATE SET name = excluded.name, region = excluded.region",
            params![alpha_code, name, region],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM countries WHERE alpha_code = ?1",
            params![alpha_code],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_country(&self, alpha_code: &str) -> anyhow::Result<Option<Country>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, alpha_code, name, region FROM countries WHERE alpha_code = ?1",
            params![alpha_code],
            |row| {
                Ok(Country {
                    id: row.get(0)?,
                    alpha_code: row.get(1)?,
                    name: row.get(2)?,
                    region: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_countries(&self) -> anyhow::Result<Vec<Country>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, alpha_code, name, region FROM countries")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Country {
                    id: row.get(0)?,
                    alpha_code: row.get(1)?,
                    name: row.get(2)?,
                    region: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- raw events -----------------------------------------------------

    /// Insert a raw event, idempotent on `(country_id, source_url)`.
    /// Titles/URLs are truncated by the caller (ingest layer) before
    /// reaching here.
    pub fn insert_raw_event(
        &self,
        country_id: i64,
        event_date: NaiveDate,
        title: &str,
        source_url: &str,
        domain: &str,
        language: &str,
    ) -> anyhow::Result<InsertOutcome> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO raw_events (country_id, event_date, title, source_url, domain, language)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                country_id,
                event_date.to_string(),
                title,
                source_url,
                domain,
                language
            ],
        );
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_constraint_violation(&e) => Ok(InsertOutcome::AlreadyExisted),
            Err(e) => Err(e.into()),
        }
    }

    /// Raw events with no matching row in `processed_events`, oldest
    /// first, bounded by `limit` (the chunk size).
    pub fn unprocessed_raw_events(&self, limit: usize) -> anyhow::Result<Vec<RawEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.country_id, r.event_date, r.title, r.source_url, r.domain, r.language
             FROM raw_events r
             LEFT JOIN processed_events p ON p.raw_event_id = r.id
             WHERE p.raw_event_id IS NULL
             ORDER BY r.id ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let date_str: String = row.get(2)?;
                Ok(RawEvent {
                    id: row.get(0)?,
                    country_id: row.get(1)?,
                    event_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                        .unwrap_or_default(),
                    title: row.get(3)?,
                    source_url: row.get(4)?,
                    domain: row.get(5)?,
                    language: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- processed events ------------------------------------------------

    /// Upsert a processed event. Rewritten only on an NLP-version bump;
    /// same-version re-runs are no-ops in practice because the row already
    /// exists and stage code only calls this for rows returned by
    /// `unprocessed_raw_events`.
    pub fn upsert_processed_event(
        &self,
        event: &ProcessedEvent,
        nlp_version: i64,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO processed_events
             (raw_event_id, risk_category, sentiment_score, severity_score, confidence, nlp_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(raw_event_id) DO UPDATE SET
                 risk_category = excluded.risk_category,
                 sentiment_score = excluded.sentiment_score,
                 severity_score = excluded.severity_score,
                 confidence = excluded.confidence,
                 nlp_version = excluded.nlp_version
             WHERE excluded.nlp_version > processed_events.nlp_version",
            params![
                event.raw_event_id,
                event.risk_category.as_str(),
                event.sentiment_score,
                event.severity_score,
                event.confidence,
                nlp_version,
            ],
        )?;
        Ok(())
    }

    /// Processed events (joined with their RawEvent's date) for a country
    /// within `[start, end]` inclusive (window features).
    pub fn processed_events_in_window(
        &self,
        country_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<(NaiveDate, ProcessedEvent)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.event_date, p.raw_event_id, p.risk_category, p.sentiment_score,
                    p.severity_score, p.confidence
             FROM processed_events p
             JOIN raw_events r ON r.id = p.raw_event_id
             WHERE r.country_id = ?1 AND r.event_date BETWEEN ?2 AND ?3",
        )?;
        let rows = stmt
            .query_map(
                params![country_id, start.to_string(), end.to_string()],
                |row| {
                    let date_str: String = row.get(0)?;
                    let category_str: String = row.get(2)?;
                    Ok((
                        NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_default(),
                        ProcessedEvent {
                            raw_event_id: row.get(1)?,
                            risk_category: RiskCategory::from_str(&category_str)
                                .unwrap_or(RiskCategory::Other),
                            sentiment_score: row.get(3)?,
                            severity_score: row.get(4)?,
                            confidence: row.get(5)?,
                        },
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- economic indicators ---------------------------------------------

    pub fn upsert_economic_indicator(&self, indicator: &EconomicIndicator) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO economic_indicators (country_id, indicator_code, year, value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(country_id, indicator_code, year) DO UPDATE SET value = excluded.value",
            params![
                indicator.country_id,
                indicator.indicator_code.wire_code(),
                indicator.year,
                indicator.value,
            ],
        )?;
        Ok(())
    }

    /// Up to `years` most recent (year, value) pairs for one indicator,
    /// most recent first.
    pub fn indicator_history(
        &self,
        country_id: i64,
        code: IndicatorCode,
        years: usize,
    ) -> anyhow::Result<Vec<(i32, f64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT year, value FROM economic_indicators
             WHERE country_id = ?1 AND indicator_code = ?2
             ORDER BY year DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(
                params![country_id, code.wire_code(), years as i64],
                |row| Ok((row.get::<_, i32>(0)?, row.get::<_, f64>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- feature vectors --------------------------------------------------

    pub fn upsert_feature_vector(&self, fv: &FeatureVector) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        let json = serde_json::to_string(&fv.features)?;
        conn.execute(
            "INSERT INTO feature_vectors (country_id, feature_date, features, generated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(country_id, feature_date) DO UPDATE SET
                 features = excluded.features, generated_at = excluded.generated_at",
            params![
                fv.country_id,
                fv.feature_date.to_string(),
                json,
                fv.generated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_feature_vector(
        &self,
        country_id: i64,
        date: NaiveDate,
    ) -> anyhow::Result<Option<FeatureVector>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT features, generated_at FROM feature_vectors
             WHERE country_id = ?1 AND feature_date = ?2",
            params![country_id, date.to_string()],
            |row| {
                let json: String = row.get(0)?;
                let generated_at: String = row.get(1)?;
                Ok((json, generated_at))
            },
        )
        .optional()?
        .map(|(json, generated_at)| {
            Ok(FeatureVector {
                country_id,
                feature_date: date,
                features: serde_json::from_str::<HashMap<String, f64>>(&json)?,
                generated_at: DateTime::parse_from_rfc3339(&generated_at)?.with_timezone(&Utc),
            })
        })
        .transpose()
    }

    /// All feature vectors with a matching `risk_scores` row at the same
    /// key, used as the training set.
    pub fn feature_vectors_with_labels(
        &self,
    ) -> anyhow::Result<Vec<(FeatureVector, RiskScore)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT f.country_id, f.feature_date, f.features, f.generated_at,
                    s.overall_score, s.political_stability, s.conflict_risk,
                    s.economic_risk, s.institutional_quality,
                    s.confidence_lower, s.confidence_upper, s.model_version, s.created_at
             FROM feature_vectors f
             JOIN risk_scores s ON s.country_id = f.country_id AND s.score_date = f.feature_date",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let date_str: String = row.get(1)?;
                let json: String = row.get(2)?;
                let generated_at: String = row.get(3)?;
                let created_at: String = row.get(12)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    date_str,
                    json,
                    generated_at,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, f64>(7)?,
                    row.get::<_, f64>(8)?,
                    row.get::<_, f64>(9)?,
                    row.get::<_, f64>(10)?,
                    row.get::<_, String>(11)?,
                    created_at,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (
            country_id,
            date_str,
            json,
            generated_at,
            overall,
            political,
            conflict,
            economic,
            institutional,
            lower,
            upper,
            model_version,
            created_at,
        ) in rows
        {
            let feature_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")?;
            let fv = FeatureVector {
                country_id,
                feature_date,
                features: serde_json::from_str(&json)?,
                generated_at: DateTime::parse_from_rfc3339(&generated_at)?.with_timezone(&Utc),
            };
            let score = RiskScore {
                country_id,
                score_date: feature_date,
                overall_score: overall,
                political_stability: political,
                conflict_risk: conflict,
                economic_risk: economic,
                institutional_quality: institutional,
                confidence: ConfidenceInterval::new(lower, upper),
                model_version,
                created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
            };
            out.push((fv, score));
        }
        Ok(out)
    }

    // ---- risk scores --------------------------------------------------------

    pub fn upsert_risk_score(&self, score: &RiskScore) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO risk_scores
             (country_id, score_date, overall_score, political_stability, conflict_risk,
              economic_risk, institutional_quality, confidence_lower, confidence_upper,
              model_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(country_id, score_date) DO UPDATE SET
                 overall_score = excluded.overall_score,
                 political_stability = excluded.political_stability,
                 conflict_risk = excluded.conflict_risk,
                 economic_risk = excluded.economic_risk,
                 institutional_quality = excluded.institutional_quality,
                 confidence_lower = excluded.confidence_lower,
                 confidence_upper = excluded.confidence_upper,
                 model_version = excluded.model_version,
                 created_at = excluded.created_at",
            params![
                score.country_id,
                score.score_date.to_string(),
                score.overall_score,
                score.political_stability,
                score.conflict_risk,
                score.economic_risk,
                score.institutional_quality,
                score.confidence.lower,
                score.confidence.upper,
                score.model_version,
                score.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The most recent score row for `country_id` strictly before `date`,
    /// used to compute alerts.
    pub fn previous_score(
        &self,
        country_id: i64,
        before: NaiveDate,
    ) -> anyhow::Result<Option<RiskScore>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT score_date, overall_score, political_stability, conflict_risk,
                    economic_risk, institutional_quality, confidence_lower, confidence_upper,
                    model_version, created_at
             FROM risk_scores
             WHERE country_id = ?1 AND score_date < ?2
             ORDER BY score_date DESC LIMIT 1",
            params![country_id, before.to_string()],
            |row| row_to_risk_score(country_id, row),
        )
        .optional()
        .map_err(Into::into)
    }

    /// Scores for other countries in `region` whose `score_date` is within
    /// `days` of `target_date` (`regional_instability`).
    pub fn regional_scores_within(
        &self,
        region: &str,
        exclude_country_id: i64,
        target_date: NaiveDate,
        days: i64,
    ) -> anyhow::Result<Vec<f64>> {
        let conn = self.conn.lock();
        let earliest = target_date - chrono::Duration::days(days);
        let mut stmt = conn.prepare(
            "SELECT s.overall_score
             FROM risk_scores s
             JOIN countries c ON c.id = s.country_id
             WHERE c.region = ?1 AND s.country_id != ?2
               AND s.score_date BETWEEN ?3 AND ?4
               AND s.score_date = (
                   SELECT MAX(s2.score_date) FROM risk_scores s2
                   WHERE s2.country_id = s.country_id
               )",
        )?;
        let rows = stmt
            .query_map(
                params![
                    region,
                    exclude_country_id,
                    earliest.to_string(),
                    target_date.to_string()
                ],
                |row| row.get::<_, f64>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- alerts --------------------------------------------------------

    pub fn upsert_risk_alert(&self, alert: &RiskAlert) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        let direction = match alert.direction {
            AlertDirection::Increase => "increase",
            AlertDirection::Decrease => "decrease",
        };
        conn.execute(
            "INSERT INTO risk_alerts
             (country_id, previous_score, previous_date, current_score, current_date,
              change, magnitude, direction, alert_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(country_id, current_date) DO UPDATE SET
                 previous_score = excluded.previous_score,
                 previous_date = excluded.previous_date,
                 current_score = excluded.current_score,
                 change = excluded.change,
                 magnitude = excluded.magnitude,
                 direction = excluded.direction,
                 alert_kind = excluded.alert_kind",
            params![
                alert.country_id,
                alert.previous_score,
                alert.previous_date.to_string(),
                alert.current_score,
                alert.current_date.to_string(),
                alert.change,
                alert.magnitude,
                direction,
                alert.alert_kind,
            ],
        )?;
        Ok(())
    }

    // ---- model artifacts --------------------------------------------------

    pub fn save_model_artifact(
        &self,
        model_version: &str,
        created_at: DateTime<Utc>,
        payload: &[u8],
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO model_artifacts (model_version, created_at, payload)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(model_version) DO UPDATE SET
                 created_at = excluded.created_at, payload = excluded.payload",
            params![model_version, created_at.to_rfc3339(), payload],
        )?;
        Ok(())
    }

    pub fn load_model_artifact(&self, model_version: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT payload FROM model_artifacts WHERE model_version = ?1",
            params![model_version],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }
}

fn row_to_risk_score(country_id: i64, row: &rusqlite::Row) -> rusqlite::Result<RiskScore> {
    let date_str: String = row.get(0)?;
    let created_at: String = row.get(9)?;
    Ok(RiskScore {
        country_id,
        score_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").unwrap_or_default(),
        overall_score: row.get(1)?,
        political_stability: row.get(2)?,
        conflict_risk: row.get(3)?,
        economic_risk: row.get(4)?,
        institutional_quality: row.get(5)?,
        confidence: ConfidenceInterval::new(row.get(6)?, row.get(7)?),
        model_version: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .unwrap_or_else(|_| Utc::now().into())
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_upsert_is_idempotent_and_updates_fields() {
        let storage = Storage::open_in_memory().unwrap();
        let id1 = storage.upsert_country("KE", "Kenya", "Africa").unwrap();
        let id2 = storage
            .upsert_country("KE", "Republic of Kenya", "Africa")
            .unwrap();
        assert_eq!(id1, id2);
        let country = storage.get_country("KE").unwrap().unwrap();
        assert_eq!(country.name, "Republic of Kenya");
    }

    #[test]
    fn raw_event_insert_is_idempotent_on_source_url() {
        let storage = Storage::open_in_memory().unwrap();
        let cid = storage.upsert_country("KE", "Kenya", "Africa").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let first = storage
            .insert_raw_event(cid, date, "Title", "https://x/1", "x.com", "en")
            .unwrap();
        let second = storage
            .insert_raw_event(cid, date, "Title", "https://x/1", "x.com", "en")
            .unwrap();
        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyExisted);
        assert_eq!(storage.unprocessed_raw_events(10).unwrap().len(), 1);
    }

    #[test]
    fn feature_vector_round_trips() {
        let storage = Storage::open_in_memory().unwrap();
        let cid = storage.upsert_country("KE", "Kenya", "Africa").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut features = HashMap::new();
        features.insert("conflict_events_7d".to_string(), 3.0);
        let fv = FeatureVector {
            country_id: cid,
            feature_date: date,
            features,
            generated_at: Utc::now(),
        };
        storage.upsert_feature_vector(&fv).unwrap();
        let got = storage.get_feature_vector(cid, date).unwrap().unwrap();
        assert_eq!(got.features.get("conflict_events_7d"), Some(&3.0));
    }
}

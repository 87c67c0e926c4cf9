//! Exercises ingestion through scoring against a scratch SQLite database,
//! without touching any network upstream.

use chrono::{NaiveDate, Utc};
use georisk_pipeline::models::{
    ConfidenceInterval, EconomicIndicator, FeatureVector, IndicatorCode, RiskScore,
};
use georisk_pipeline::nlp;
use georisk_pipeline::scoring;
use georisk_pipeline::storage::{InsertOutcome, Storage};

fn scratch_storage() -> (tempfile::TempDir, Storage) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("georisk.sqlite3");
    let storage = Storage::open(path.to_str().unwrap()).unwrap();
    (dir, storage)
}

#[test]
fn ingest_process_feature_score_round_trip() {
    let (_dir, storage) = scratch_storage();

    let country_id = storage.upsert_country("KE", "Kenya", "Africa").unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();

    // Re-ingesting the same URL is a no-op.
    let first = storage
        .insert_raw_event(
            country_id,
            date,
            "Bombing and terrorism attack kills 10",
            "https://news.example/1",
            "news.example",
            "en",
        )
        .unwrap();
    let second = storage
        .insert_raw_event(
            country_id,
            date,
            "Bombing and terrorism attack kills 10",
            "https://news.example/1",
            "news.example",
            "en",
        )
        .unwrap();
    assert_eq!(first, InsertOutcome::Inserted);
    assert_eq!(second, InsertOutcome::AlreadyExisted);

    let unprocessed = storage.unprocessed_raw_events(10).unwrap();
    assert_eq!(unprocessed.len(), 1);

    let processed = nlp::process_event(&unprocessed[0]);
    // Severity clamps to 1.0 for this title.
    assert!((processed.severity_score - 1.0).abs() < 1e-9);
    storage
        .upsert_processed_event(&processed, nlp::NLP_VERSION)
        .unwrap();

    // Re-running event-processing must not create a second ProcessedEvent.
    assert!(storage.unprocessed_raw_events(10).unwrap().is_empty());

    for (code, year, value) in [
        (IndicatorCode::PoliticalStability, 2025, -1.5),
        (IndicatorCode::GovernmentEffectiveness, 2025, 0.2),
        (IndicatorCode::GdpGrowth, 2025, 3.0),
    ] {
        storage
            .upsert_economic_indicator(&EconomicIndicator {
                country_id,
                indicator_code: code,
                year,
                value,
            })
            .unwrap();
    }

    // Governance indicator rescale.
    let rescaled = georisk_pipeline::models::rescale_governance(-1.5);
    assert!((rescaled - 20.0).abs() < 1e-9);

    let country = storage.get_country("KE").unwrap().unwrap();
    let fv = georisk_pipeline::features::build_feature_vector(&storage, &country, date).unwrap();
    storage.upsert_feature_vector(&fv).unwrap();

    // Every vector shares the same key set regardless of data
    // availability; a second country with no data should match.
    storage.upsert_country("UG", "Uganda", "Africa").unwrap();
    let other = storage.get_country("UG").unwrap().unwrap();
    let fv_other = georisk_pipeline::features::build_feature_vector(&storage, &other, date).unwrap();
    let mut keys_a: Vec<&String> = fv.features.keys().collect();
    let mut keys_b: Vec<&String> = fv_other.features.keys().collect();
    keys_a.sort();
    keys_b.sort();
    assert_eq!(keys_a, keys_b);

    // Train against a synthetic label history so scoring has a model to use.
    let mut examples = Vec::new();
    for i in 0..30 {
        let day = date - chrono::Duration::days(30 - i);
        let mut features = fv.features.clone();
        features.insert("conflict_events_7d".to_string(), (i % 5) as f64);
        let synthetic_fv = FeatureVector {
            country_id,
            feature_date: day,
            features,
            generated_at: Utc::now(),
        };
        let label = RiskScore {
            country_id,
            score_date: day,
            overall_score: 50.0,
            political_stability: 40.0,
            conflict_risk: 30.0 + (i % 5) as f64 * 5.0,
            economic_risk: 35.0,
            institutional_quality: 45.0,
            confidence: ConfidenceInterval::new(40.0, 60.0),
            model_version: "seed".to_string(),
            created_at: Utc::now(),
        };
        examples.push((synthetic_fv, label));
    }

    let (model, metrics) = scoring::train("test-model", &examples);
    assert_eq!(metrics.len(), 4);

    let mut score = scoring::score(&model, &fv.features);
    score.country_id = country_id;
    score.score_date = date;
    storage.upsert_risk_score(&score).unwrap();

    assert!(score.overall_score >= 0.0 && score.overall_score <= 100.0);
    // Overall CI is monotonic around the point estimate.
    assert!(score.confidence.lower <= score.overall_score);
    assert!(score.overall_score <= score.confidence.upper);

    let fetched = storage.previous_score(country_id, date + chrono::Duration::days(1));
    assert!(fetched.unwrap().is_some());
}

#[test]
fn model_absent_scoring_is_a_no_op() {
    let (_dir, storage) = scratch_storage();
    assert!(storage.load_model_artifact("nonexistent").unwrap().is_none());
}

#[test]
fn feature_vector_re_run_is_idempotent_modulo_generated_at() {
    let (_dir, storage) = scratch_storage();
    storage.upsert_country("KE", "Kenya", "Africa").unwrap();
    let country = storage.get_country("KE").unwrap().unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();

    let fv1 = georisk_pipeline::features::build_feature_vector(&storage, &country, date).unwrap();
    storage.upsert_feature_vector(&fv1).unwrap();
    let fv2 = georisk_pipeline::features::build_feature_vector(&storage, &country, date).unwrap();
    storage.upsert_feature_vector(&fv2).unwrap();

    let mut a: Vec<(&String, &f64)> = fv1.features.iter().collect();
    let mut b: Vec<(&String, &f64)> = fv2.features.iter().collect();
    a.sort_by_key(|(k, _)| k.clone());
    b.sort_by_key(|(k, _)| k.clone());
    assert_eq!(a, b);
}

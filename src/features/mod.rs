//! Feature Builder: assembles one FeatureVector per (country, target_date)
//! from processed events and economic indicators.

mod trend;

use crate::models::{Country, FeatureVector, IndicatorCode, RiskCategory};
use crate::storage::Storage;
use chrono::{Duration, NaiveDate, Utc};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use trend::linear_trend_slope;

/// Event-feature windows, in days.
pub const WINDOWS: [i64; 4] = [7, 30, 90, 365];

/// Build the full feature vector for one country at `target_date`. Reads
/// from `storage`; never mutates it. Missing inputs default to 0.0,
/// imputed rather than omitted, so every vector shares the same key set.
pub fn build_feature_vector(
    storage: &Storage,
    country: &Country,
    target_date: NaiveDate,
) -> anyhow::Result<FeatureVector> {
    let mut features = HashMap::new();

    for window in WINDOWS {
        event_window_features(storage, country.id, target_date, window, &mut features)?;
    }

    for code in IndicatorCode::ALL {
        economic_features(storage, country.id, code, &mut features)?;
    }

    network_features(storage, country, target_date, &mut features)?;

    Ok(FeatureVector {
        country_id: country.id,
        feature_date: target_date,
        features,
        generated_at: Utc::now(),
    })
}

fn event_window_features(
    storage: &Storage,
    country_id: i64,
    target_date: NaiveDate,
    window: i64,
    out: &mut HashMap<String, f64>,
) -> anyhow::Result<()> {
    let start = target_date - Duration::days(window - 1);
    let events = storage.processed_events_in_window(country_id, start, target_date)?;

    let mut conflict = 0u32;
    let mut protest = 0u32;
    let mut diplomatic = 0u32;
    let mut economic = 0u32;
    let mut sentiments = Vec::with_capacity(events.len());
    let mut severity_max = 0.0_f64;
    let mut daily_counts: HashMap<NaiveDate, f64> = HashMap::new();

    for (date, event) in &events {
        match event.risk_category {
            RiskCategory::Conflict => conflict += 1,
            RiskCategory::Protest => protest += 1,
            RiskCategory::Diplomatic => diplomatic += 1,
            RiskCategory::Economic => economic += 1,
            RiskCategory::Other => {}
        }
        sentiments.push(event.sentiment_score);
        severity_max = severity_max.max(event.severity_score);
        *daily_counts.entry(*date).or_insert(0.0) += 1.0;
    }

    let avg_sentiment = mean(&sentiments);
    let sentiment_volatility = population_stdev(&sentiments, avg_sentiment);

    // Zero-fill every day in the window before fitting the trend slope,
    // so a silent day counts as zero events rather than being skipped.
    let mut series = Vec::with_capacity(window as usize);
    for i in 0..window {
        let day = start + Duration::days(i);
        series.push(*daily_counts.get(&day).unwrap_or(&0.0));
    }
    let event_trend = linear_trend_slope(&series).unwrap_or(0.0);

    out.insert(format!("conflict_events_{window}d"), conflict as f64);
    out.insert(format!("protest_events_{window}d"), protest as f64);
    out.insert(format!("diplomatic_events_{window}d"), diplomatic as f64);
    out.insert(format!("economic_events_{window}d"), economic as f64);
    out.insert(format!("avg_sentiment_{window}d"), avg_sentiment);
    out.insert(format!("sentiment_volatility_{window}d"), sentiment_volatility);
    out.insert(format!("severity_max_{window}d"), severity_max);
    out.insert(format!("event_trend_{window}d"), event_trend);

    Ok(())
}

fn economic_features(
    storage: &Storage,
    country_id: i64,
    code: IndicatorCode,
    out: &mut HashMap<String, f64>,
) -> anyhow::Result<()> {
    let stem = code.feature_stem();
    // Most recent 3 years cover yoy_change, volatility, and trend.
    let history = storage.indicator_history(country_id, code, 3)?;

    let latest = history.first().map(|(_, v)| *v).unwrap_or(0.0);
    let yoy_change = match history.get(1) {
        Some((_, prev)) if *prev != 0.0 => 100.0 * (latest - prev) / prev.abs(),
        _ => 0.0,
    };

    let values: Vec<f64> = history.iter().map(|(_, v)| *v).collect();
    let volatility = population_stdev(&values, mean(&values));

    let trend = if history.len() >= 3 {
        // oldest-first for the slope fit.
        let mut chronological = values.clone();
        chronological.reverse();
        linear_trend_slope(&chronological).unwrap_or(0.0)
    } else {
        0.0
    };

    out.insert(format!("{stem}_latest"), latest);
    out.insert(format!("{stem}_yoy_change"), yoy_change);
    out.insert(format!("{stem}_volatility"), volatility);
    out.insert(format!("{stem}_trend"), trend);

    Ok(())
}

fn network_features(
    storage: &Storage,
    country: &Country,
    target_date: NaiveDate,
    out: &mut HashMap<String, f64>,
) -> anyhow::Result<()> {
    // Reserved placeholders: fixed, not invented data.
    out.insert("trade_dependence".to_string(), 0.5);
    out.insert("alliance_strength".to_string(), 0.5);

    let regional_scores =
        storage.regional_scores_within(&country.region, country.id, target_date, 30)?;
    let regional_instability = if regional_scores.is_empty() {
        50.0
    } else {
        mean(&regional_scores)
    };
    out.insert("regional_instability".to_string(), regional_instability);

    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.mean()
}

/// Population (not sample) standard deviation.
fn population_stdev(values: &[f64], _mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.population_std_dev()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessedEvent;

    #[test]
    fn event_trend_zero_fills_silent_days() {
        // counts [3,0,0,0,0,0,5] over a 7 day window.
        let series = vec![3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0];
        let slope = linear_trend_slope(&series).unwrap();
        assert!((slope - 0.2143).abs() < 0.01, "got {slope}");
    }

    #[test]
    fn feature_vector_has_stable_key_set() {
        let storage = Storage::open_in_memory().unwrap();
        let cid_a = storage.upsert_country("KE", "Kenya", "Africa").unwrap();
        let cid_b = storage.upsert_country("UG", "Uganda", "Africa").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let country_a = Country {
            id: cid_a,
            alpha_code: "KE".into(),
            name: "Kenya".into(),
            region: "Africa".into(),
        };
        let country_b = Country {
            id: cid_b,
            alpha_code: "UG".into(),
            name: "Uganda".into(),
            region: "Africa".into(),
        };

        let raw = storage
            .insert_raw_event(cid_a, date, "Protest over tariff", "https://x/1", "x", "en")
            .is_ok();
        assert!(raw);
        storage
            .upsert_processed_event(
                &ProcessedEvent {
                    raw_event_id: 1,
                    risk_category: RiskCategory::Protest,
                    sentiment_score: -0.2,
                    severity_score: 0.4,
                    confidence: 0.8,
                },
                1,
            )
            .unwrap();

        let fv_a = build_feature_vector(&storage, &country_a, date).unwrap();
        let fv_b = build_feature_vector(&storage, &country_b, date).unwrap();

        let mut keys_a: Vec<&String> = fv_a.features.keys().collect();
        let mut keys_b: Vec<&String> = fv_b.features.keys().collect();
        keys_a.sort();
        keys_b.sort();
        assert_eq!(keys_a, keys_b);
    }
}

//! Ensemble Scorer: predicts the four score components with
//! Random-Forest-derived confidence intervals and composes them into an
//! overall score.

mod ensemble;
mod tree;

use crate::models::{ConfidenceInterval, FeatureVector, RiskScore, ScoreComponent};
use ensemble::{BaggingEnsemble, BoostingEnsemble};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use tracing::warn;

/// Fixed per-component feature subsets, reused by both training and
/// inference.
fn feature_mapping(component: ScoreComponent) -> &'static [&'static str] {
    match component {
        ScoreComponent::PoliticalStability => &[
            "political_stability_latest",
            "government_effectiveness_latest",
            "protest_events_7d",
            "protest_events_30d",
            "protest_events_90d",
            "avg_sentiment_7d",
            "avg_sentiment_30d",
            "sentiment_volatility_7d",
        ],
        ScoreComponent::ConflictRisk => &[
            "conflict_events_7d",
            "conflict_events_30d",
            "conflict_events_90d",
            "severity_max_7d",
            "severity_max_30d",
            "regional_instability",
            "event_trend_7d",
            "event_trend_30d",
        ],
        ScoreComponent::EconomicRisk => &[
            "gdp_growth_latest",
            "inflation_latest",
            "debt_to_gdp_latest",
            "trade_gdp_ratio_latest",
            "gdp_growth_yoy_change",
            "inflation_yoy_change",
            "gdp_growth_volatility",
            "inflation_volatility",
            "economic_events_30d",
        ],
        ScoreComponent::InstitutionalQuality => &[
            "regulatory_quality_latest",
            "rule_of_law_latest",
            "control_of_corruption_latest",
            "government_effectiveness_latest",
            "political_stability_latest",
            "diplomatic_events_30d",
            "diplomatic_events_90d",
        ],
    }
}

fn row_for(features: &HashMap<String, f64>, mapping: &[&str]) -> Vec<f64> {
    mapping
        .iter()
        .map(|name| *features.get(*name).unwrap_or(&0.0))
        .collect()
}

/// Degraded fallback used when a component's regressor cannot produce a
/// score.
const FAILURE_SCORE: f64 = 50.0;
const FAILURE_CI: (f64, f64) = (40.0, 60.0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentModel {
    feature_mapping: Vec<String>,
    bagging: BaggingEnsemble,
    boosting: BoostingEnsemble,
}

impl ComponentModel {
    /// Predicts from a raw feature map using this model's own stored
    /// mapping rather than the caller's, so a persisted artifact stays
    /// self-describing even if the in-code mapping changes later.
    fn predict_from_features(&self, features: &HashMap<String, f64>) -> (f64, ConfidenceInterval) {
        let row = row_for(
            features,
            &self
                .feature_mapping
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
        );
        self.predict(&row)
    }

    fn predict(&self, row: &[f64]) -> (f64, ConfidenceInterval) {
        let tree_preds = self.bagging.predict_each(row);
        let tree_pred = tree_preds.iter().sum::<f64>() / tree_preds.len() as f64;
        let boost_pred = self.boosting.predict(row);
        let ensemble_pred = ((tree_pred + boost_pred) / 2.0).clamp(0.0, 100.0);

        let s = sample_stdev(&tree_preds, tree_pred);
        let lower = (ensemble_pred - 1.96 * s).clamp(0.0, 100.0);
        let upper = (ensemble_pred + 1.96 * s).clamp(0.0, 100.0);

        (ensemble_pred, ConfidenceInterval::new(lower, upper))
    }
}

/// Sample standard deviation of the additive ensemble's per-tree
/// predictions, the basis of the confidence interval.
fn sample_stdev(values: &[f64], _mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.std_dev()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleModel {
    pub model_version: String,
    components: HashMap<String, ComponentModel>,
}

/// Cross-validation metrics for one component's pair of regressors.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentMetrics {
    pub component: String,
    pub tree_mae: f64,
    pub tree_mse: f64,
    pub boost_mae: f64,
    pub boost_mse: f64,
    pub folds: usize,
}

const CV_FOLDS: usize = 5;
const TRAIN_SEED: u64 = 20260101;

/// Train all four components against `examples` (feature vector + label
/// pairs, self-regressive regime), time-ordered by the caller. Returns
/// the refit-on-full-data model plus per-component CV metrics.
pub fn train(
    model_version: &str,
    examples: &[(FeatureVector, RiskScore)],
) -> (EnsembleModel, Vec<ComponentMetrics>) {
    let mut sorted = examples.to_vec();
    sorted.sort_by_key(|(fv, _)| fv.feature_date);

    let results: Vec<(ScoreComponent, ComponentModel, ComponentMetrics)> = ScoreComponent::ALL
        .into_par_iter()
        .map(|component| train_component(component, &sorted))
        .collect();

    let mut components = HashMap::new();
    let mut metrics = Vec::with_capacity(results.len());
    for (component, model, component_metrics) in results {
        components.insert(component.as_str().to_string(), model);
        metrics.push(component_metrics);
    }

    (
        EnsembleModel {
            model_version: model_version.to_string(),
            components,
        },
        metrics,
    )
}

fn train_component(
    component: ScoreComponent,
    sorted: &[(FeatureVector, RiskScore)],
) -> (ScoreComponent, ComponentModel, ComponentMetrics) {
    let mapping = feature_mapping(component);
    let x: Vec<Vec<f64>> = sorted
        .iter()
        .map(|(fv, _)| row_for(&fv.features, mapping))
        .collect();
    let y: Vec<f64> = sorted.iter().map(|(_, score)| score.component(component)).collect();

    let metrics = cross_validate(component, &x, &y);

    let bagging = BaggingEnsemble::fit(&x, &y, TRAIN_SEED);
    let boosting = BoostingEnsemble::fit(&x, &y, TRAIN_SEED);

    (
        component,
        ComponentModel {
            feature_mapping: mapping.iter().map(|s| s.to_string()).collect(),
            bagging,
            boosting,
        },
        metrics,
    )
}

/// Time-based k-fold (k=5): fold `i` is validated against a model trained
/// on every other fold's rows, preserving chronological grouping. Too few
/// rows to form folds reports zero folds rather than fabricating a score.
fn cross_validate(component: ScoreComponent, x: &[Vec<f64>], y: &[f64]) -> ComponentMetrics {
    let n = y.len();
    if n < CV_FOLDS * 2 {
        return ComponentMetrics {
            component: component.as_str().to_string(),
            tree_mae: 0.0,
            tree_mse: 0.0,
            boost_mae: 0.0,
            boost_mse: 0.0,
            folds: 0,
        };
    }

    let fold_size = n / CV_FOLDS;
    let mut tree_errors = Vec::new();
    let mut boost_errors = Vec::new();

    for fold in 0..CV_FOLDS {
        let start = fold * fold_size;
        let end = if fold == CV_FOLDS - 1 { n } else { start + fold_size };

        let train_x: Vec<Vec<f64>> = x
            .iter()
            .enumerate()
            .filter(|(i, _)| *i < start || *i >= end)
            .map(|(_, row)| row.clone())
            .collect();
        let train_y: Vec<f64> = y
            .iter()
            .enumerate()
            .filter(|(i, _)| *i < start || *i >= end)
            .map(|(_, v)| *v)
            .collect();

        if train_y.is_empty() {
            continue;
        }

        let bagging = BaggingEnsemble::fit(&train_x, &train_y, TRAIN_SEED);
        let boosting = BoostingEnsemble::fit(&train_x, &train_y, TRAIN_SEED);

        for i in start..end {
            let tree_pred = bagging.predict(&x[i]);
            let boost_pred = boosting.predict(&x[i]);
            tree_errors.push(tree_pred - y[i]);
            boost_errors.push(boost_pred - y[i]);
        }
    }

    ComponentMetrics {
        component: component.as_str().to_string(),
        tree_mae: mean_abs(&tree_errors),
        tree_mse: mean_sq(&tree_errors),
        boost_mae: mean_abs(&boost_errors),
        boost_mse: mean_sq(&boost_errors),
        folds: CV_FOLDS,
    }
}

fn mean_abs(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64
}

fn mean_sq(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    errors.iter().map(|e| e.powi(2)).sum::<f64>() / errors.len() as f64
}

/// Predict all four components for one feature vector and compose the
/// overall score.
pub fn score(model: &EnsembleModel, features: &HashMap<String, f64>) -> RiskScore {
    let mut component_preds: HashMap<ScoreComponent, (f64, ConfidenceInterval)> = HashMap::new();

    for component in ScoreComponent::ALL {
        let prediction = match model.components.get(component.as_str()) {
            Some(component_model) => component_model.predict_from_features(features),
            None => {
                warn!(component = component.as_str(), "scoring failure, using fallback");
                (FAILURE_SCORE, ConfidenceInterval::new(FAILURE_CI.0, FAILURE_CI.1))
            }
        };
        component_preds.insert(component, prediction);
    }

    let mut overall = 0.0;
    let mut overall_lower = 0.0;
    let mut overall_upper = 0.0;
    for component in ScoreComponent::ALL {
        let (pred, ci) = component_preds[&component];
        let weight = component.weight();
        overall += weight * pred;
        overall_lower += weight * ci.lower;
        overall_upper += weight * ci.upper;
    }

    RiskScore {
        country_id: 0,
        score_date: chrono::Utc::now().date_naive(),
        overall_score: round2(overall),
        political_stability: round2(component_preds[&ScoreComponent::PoliticalStability].0),
        conflict_risk: round2(component_preds[&ScoreComponent::ConflictRisk].0),
        economic_risk: round2(component_preds[&ScoreComponent::EconomicRisk].0),
        institutional_quality: round2(component_preds[&ScoreComponent::InstitutionalQuality].0),
        confidence: ConfidenceInterval::new(round2(overall_lower), round2(overall_upper)),
        model_version: model.model_version.clone(),
        created_at: chrono::Utc::now(),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn synthetic_examples(n: usize) -> Vec<(FeatureVector, RiskScore)> {
        (0..n)
            .map(|i| {
                let mut features = HashMap::new();
                for component in ScoreComponent::ALL {
                    for name in feature_mapping(component) {
                        features.insert(name.to_string(), (i % 10) as f64);
                    }
                }
                let fv = FeatureVector {
                    country_id: 1,
                    feature_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
                        + chrono::Duration::days(i as i64),
                    features,
                    generated_at: Utc::now(),
                };
                let score = RiskScore {
                    country_id: 1,
                    score_date: fv.feature_date,
                    overall_score: 50.0,
                    political_stability: 40.0 + (i % 10) as f64,
                    conflict_risk: 30.0 + (i % 10) as f64,
                    economic_risk: 35.0,
                    institutional_quality: 45.0,
                    confidence: ConfidenceInterval::new(40.0, 60.0),
                    model_version: "seed".to_string(),
                    created_at: Utc::now(),
                };
                (fv, score)
            })
            .collect()
    }

    #[test]
    fn overall_composition_matches_fixed_weights() {
        let mut preds = HashMap::new();
        preds.insert(ScoreComponent::PoliticalStability, 40.0);
        preds.insert(ScoreComponent::ConflictRisk, 80.0);
        preds.insert(ScoreComponent::EconomicRisk, 50.0);
        preds.insert(ScoreComponent::InstitutionalQuality, 30.0);

        let overall: f64 = ScoreComponent::ALL
            .iter()
            .map(|c| c.weight() * preds[c])
            .sum();
        assert!((overall - 52.5).abs() < 1e-9);
    }

    #[test]
    fn governance_rescale_matches_expected_point() {
        let rescaled = crate::models::rescale_governance(-1.5);
        assert!((rescaled - 20.0).abs() < 1e-9);
    }

    #[test]
    fn trained_model_scores_within_bounds() {
        let examples = synthetic_examples(40);
        let (model, metrics) = train("test-v1", &examples);
        assert_eq!(metrics.len(), 4);

        let (fv, _) = &examples[0];
        let result = score(&model, &fv.features);

        assert!(result.overall_score >= 0.0 && result.overall_score <= 100.0);
        assert!(result.confidence.lower <= result.overall_score);
        assert!(result.confidence.upper >= result.overall_score);
        assert!(result.confidence.lower <= result.confidence.upper);
    }

    #[test]
    fn missing_component_model_falls_back_to_failure_score() {
        let model = EnsembleModel {
            model_version: "empty".to_string(),
            components: HashMap::new(),
        };
        let result = score(&model, &HashMap::new());
        assert_eq!(result.political_stability, FAILURE_SCORE);
    }
}

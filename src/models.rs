//! Domain types for the scoring pipeline.
//!
//! These are plain data carriers; the persistence contracts in `storage`
//! decide how they're keyed and upserted. Numeric invariants (score ranges,
//! sentiment/severity/confidence bounds) are enforced at construction time
//! where cheap to do so, and re-asserted by the invariant tests in
//! `scoring` and `nlp`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable country identity. Immutable after bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    pub alpha_code: String,
    pub name: String,
    pub region: String,
}

/// One ingested news item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: i64,
    pub country_id: i64,
    pub event_date: NaiveDate,
    pub title: String,
    pub source_url: String,
    pub domain: String,
    pub language: String,
}

/// The four event categories the NLP classifier assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Conflict,
    Protest,
    Diplomatic,
    Economic,
    Other,
}

impl RiskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Conflict => "conflict",
            RiskCategory::Protest => "protest",
            RiskCategory::Diplomatic => "diplomatic",
            RiskCategory::Economic => "economic",
            RiskCategory::Other => "other",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "conflict" => RiskCategory::Conflict,
            "protest" => RiskCategory::Protest,
            "diplomatic" => RiskCategory::Diplomatic,
            "economic" => RiskCategory::Economic,
            "other" => RiskCategory::Other,
            other => anyhow::bail!("unknown risk category: {other}"),
        })
    }
}

/// NLP output for one RawEvent. Exists iff the owning RawEvent has been
/// processed by the current NLP version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub raw_event_id: i64,
    pub risk_category: RiskCategory,
    pub sentiment_score: f64,
    pub severity_score: f64,
    pub confidence: f64,
}

/// The fixed enumeration of nine governance + macro indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorCode {
    PoliticalStability, // PV.EST
    GovernmentEffectiveness, // GE.EST
    RegulatoryQuality,  // RQ.EST
    RuleOfLaw,          // RL.EST
    ControlOfCorruption, // CC.EST
    GdpGrowth,          // NY.GDP.MKTP.KD.ZG
    Inflation,          // FP.CPI.TOTL.ZG
    DebtToGdp,          // GC.DOD.TOTL.GD.ZS
    TradeGdpRatio,      // NE.TRD.GNFS.ZS
}

impl IndicatorCode {
    pub const ALL: [IndicatorCode; 9] = [
        IndicatorCode::PoliticalStability,
        IndicatorCode::GovernmentEffectiveness,
        IndicatorCode::RegulatoryQuality,
        IndicatorCode::RuleOfLaw,
        IndicatorCode::ControlOfCorruption,
        IndicatorCode::GdpGrowth,
        IndicatorCode::Inflation,
        IndicatorCode::DebtToGdp,
        IndicatorCode::TradeGdpRatio,
    ];

    /// World Bank wire code.
    pub fn wire_code(&self) -> &'static str {
        match self {
            IndicatorCode::PoliticalStability => "PV.EST",
            IndicatorCode::GovernmentEffectiveness => "GE.EST",
            IndicatorCode::RegulatoryQuality => "RQ.EST",
            IndicatorCode::RuleOfLaw => "RL.EST",
            IndicatorCode::ControlOfCorruption => "CC.EST",
            IndicatorCode::GdpGrowth => "NY.GDP.MKTP.KD.ZG",
            IndicatorCode::Inflation => "FP.CPI.TOTL.ZG",
            IndicatorCode::DebtToGdp => "GC.DOD.TOTL.GD.ZS",
            IndicatorCode::TradeGdpRatio => "NE.TRD.GNFS.ZS",
        }
    }

    /// Feature-name stem used by the feature builder.
    pub fn feature_stem(&self) -> &'static str {
        match self {
            IndicatorCode::PoliticalStability => "political_stability",
            IndicatorCode::GovernmentEffectiveness => "government_effectiveness",
            IndicatorCode::RegulatoryQuality => "regulatory_quality",
            IndicatorCode::RuleOfLaw => "rule_of_law",
            IndicatorCode::ControlOfCorruption => "control_of_corruption",
            IndicatorCode::GdpGrowth => "gdp_growth",
            IndicatorCode::Inflation => "inflation",
            IndicatorCode::DebtToGdp => "debt_to_gdp",
            IndicatorCode::TradeGdpRatio => "trade_gdp_ratio",
        }
    }

    /// True for the five native-scale [-2.5, 2.5] governance indicators
    /// that get rescaled to [0, 100] for downstream exposure.
    pub fn is_governance(&self) -> bool {
        matches!(
            self,
            IndicatorCode::PoliticalStability
                | IndicatorCode::GovernmentEffectiveness
                | IndicatorCode::RegulatoryQuality
                | IndicatorCode::RuleOfLaw
                | IndicatorCode::ControlOfCorruption
        )
    }

    pub fn from_wire_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.wire_code() == code)
    }
}

/// Rescale a governance indicator's native [-2.5, 2.5] scale to [0, 100].
pub fn rescale_governance(raw: f64) -> f64 {
    (100.0 * (raw + 2.5) / 5.0).clamp(0.0, 100.0)
}

/// One (country, indicator_code, year) observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicIndicator {
    pub country_id: i64,
    pub indicator_code: IndicatorCode,
    pub year: i32,
    pub value: f64,
}

/// One (country, feature_date) feature row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub country_id: i64,
    pub feature_date: NaiveDate,
    pub features: HashMap<String, f64>,
    pub generated_at: DateTime<Utc>,
}

/// The four scored risk components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreComponent {
    PoliticalStability,
    ConflictRisk,
    EconomicRisk,
    InstitutionalQuality,
}

impl ScoreComponent {
    pub const ALL: [ScoreComponent; 4] = [
        ScoreComponent::PoliticalStability,
        ScoreComponent::ConflictRisk,
        ScoreComponent::EconomicRisk,
        ScoreComponent::InstitutionalQuality,
    ];

    /// Composition weight.
    pub fn weight(&self) -> f64 {
        match self {
            ScoreComponent::PoliticalStability => 0.25,
            ScoreComponent::ConflictRisk => 0.30,
            ScoreComponent::EconomicRisk => 0.25,
            ScoreComponent::InstitutionalQuality => 0.20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreComponent::PoliticalStability => "political_stability",
            ScoreComponent::ConflictRisk => "conflict_risk",
            ScoreComponent::EconomicRisk => "economic_risk",
            ScoreComponent::InstitutionalQuality => "institutional_quality",
        }
    }
}

/// A [lower, upper] confidence interval. Always satisfies `lower <= upper`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower: lower.min(upper),
            upper: lower.max(upper),
        }
    }

    /// Read-side "confidence level": one upstream branch returns a
    /// diversity-derived confidence number, another returns an ensemble
    /// interval; this crate keeps only the interval and exposes the
    /// scalar as its midpoint.
    pub fn confidence_level(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

/// One (country, score_date) score row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub country_id: i64,
    pub score_date: NaiveDate,
    pub overall_score: f64,
    pub political_stability: f64,
    pub conflict_risk: f64,
    pub economic_risk: f64,
    pub institutional_quality: f64,
    pub confidence: ConfidenceInterval,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

impl RiskScore {
    pub fn component(&self, component: ScoreComponent) -> f64 {
        match component {
            ScoreComponent::PoliticalStability => self.political_stability,
            ScoreComponent::ConflictRisk => self.conflict_risk,
            ScoreComponent::EconomicRisk => self.economic_risk,
            ScoreComponent::InstitutionalQuality => self.institutional_quality,
        }
    }
}

/// Direction of a significant overall-score change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDirection {
    Increase,
    Decrease,
}

/// A derived row capturing a significant overall-score change between two
/// consecutive score rows for the same country.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    pub country_id: i64,
    pub previous_score: f64,
    pub previous_date: NaiveDate,
    pub current_score: f64,
    pub current_date: NaiveDate,
    pub change: f64,
    pub magnitude: f64,
    pub direction: AlertDirection,
    pub alert_kind: String,
}

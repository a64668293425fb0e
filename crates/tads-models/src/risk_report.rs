use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::DecisionRecord;
use crate::position::{Currency, PositionDirection};

/// Barrier proximity reported for positions that cannot be knocked out.
pub const NO_BARRIER_RISK: f64 = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProximityBand {
    Critical,
    Warning,
    Caution,
    Safe,
}

impl ProximityBand {
    pub fn from_pct(pct: f64) -> Self {
        if pct < 5.0 {
            ProximityBand::Critical
        } else if pct < 10.0 {
            ProximityBand::Warning
        } else if pct < 15.0 {
            ProximityBand::Caution
        } else {
            ProximityBand::Safe
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Sale,
    TakeProfit,
    Hold,
    BuyMore,
    Restructure,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=30 => RiskLevel::Low,
            31..=50 => RiskLevel::Moderate,
            51..=70 => RiskLevel::Elevated,
            _ => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
    Yolo,
}

impl RiskProfile {
    pub fn max_sector_concentration(self) -> f64 {
        match self {
            RiskProfile::Conservative => 0.40,
            RiskProfile::Moderate => 0.60,
            RiskProfile::Aggressive => 0.80,
            RiskProfile::Yolo => 1.0,
        }
    }
}

/// One trading day's close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: f64,
}

/// Market data the risk aggregator needs for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    #[serde(default = "unknown_sector")]
    pub sector: String,
    #[serde(default)]
    pub beta: Option<f64>,
    /// Oldest first.
    #[serde(default)]
    pub closes: Vec<DailyClose>,
    #[serde(default)]
    pub earnings_date: Option<NaiveDate>,
}

pub const UNKNOWN_SECTOR: &str = "Unknown";

fn unknown_sector() -> String {
    UNKNOWN_SECTOR.to_string()
}

impl MarketSnapshot {
    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().map(|c| c.close)
    }

    /// Simple daily returns keyed by the later day's date.
    pub fn daily_returns(&self) -> Vec<(NaiveDate, f64)> {
        self.closes
            .windows(2)
            .filter(|w| w[0].close != 0.0)
            .map(|w| (w[1].date, w[1].close / w[0].close - 1.0))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRisk {
    pub symbol: String,
    pub label: String,
    pub direction: PositionDirection,
    pub currency: Currency,
    /// Fraction of total absolute portfolio value.
    pub weight: f64,
    pub reference_price: Option<f64>,
    pub barrier_proximity_pct: f64,
    pub band: ProximityBand,
    pub decision: Option<DecisionRecord>,
    pub action: RecommendedAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarningsEvent {
    pub symbol: String,
    pub date: NaiveDate,
    pub days_until: i64,
}

/// Estimated portfolio move for broad market drops.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DrawdownScenario {
    pub market_down_10_pct: f64,
    pub market_down_20_pct: f64,
}

impl DrawdownScenario {
    pub fn from_beta(beta: f64) -> Self {
        Self {
            market_down_10_pct: -10.0 * beta,
            market_down_20_pct: -20.0 * beta,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskReport {
    pub generated_at: DateTime<Utc>,
    pub risk_profile: RiskProfile,
    pub total_value: f64,
    pub positions: Vec<PositionRisk>,
    pub sector_weights: BTreeMap<String, f64>,
    pub max_sector_weight: f64,
    pub top_two_weight: f64,
    /// Keyed `"A-B"` with symbols in portfolio order.
    pub correlations: BTreeMap<String, f64>,
    pub average_correlation: f64,
    pub high_correlations: Vec<String>,
    pub portfolio_beta: f64,
    pub upcoming_earnings: Vec<EarningsEvent>,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub drawdown: DrawdownScenario,
    pub recommendations: Vec<String>,
}

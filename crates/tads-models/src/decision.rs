use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::signal::{lenient_direction, Direction, Signal};

/// Allowed gap between a stored `distance_pct` and the one recomputed from
/// `(level, price)`.
pub const DISTANCE_TOLERANCE: f64 = 0.01;

/// Confidence at or above which a decision counts as strong conviction.
pub const STRONG_CONFIDENCE: f64 = 0.75;

const BAND_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RiskLabel {
    Low,
    #[default]
    Medium,
    High,
}

impl TryFrom<String> for RiskLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLabel::Low),
            "medium" => Ok(RiskLabel::Medium),
            "high" => Ok(RiskLabel::High),
            other => Err(format!("unknown risk label: {other}")),
        }
    }
}

/// The three barrier-distance profiles offered for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    Conservative,
    Moderate,
    Aggressive,
}

impl TierKind {
    pub const ALL: [TierKind; 3] = [
        TierKind::Conservative,
        TierKind::Moderate,
        TierKind::Aggressive,
    ];

    /// Allowed barrier distance in percent of price, `(min, max)`.
    /// Conservative is closed on both ends; the other two exclude their max
    /// so the bands never overlap.
    pub fn band(self) -> (f64, f64) {
        match self {
            TierKind::Conservative => (15.0, 25.0),
            TierKind::Moderate => (10.0, 15.0),
            TierKind::Aggressive => (5.0, 10.0),
        }
    }

    pub fn contains(self, distance_pct: f64) -> bool {
        let (min, max) = self.band();
        if distance_pct < min - BAND_EPSILON {
            return false;
        }
        match self {
            TierKind::Conservative => distance_pct <= max + BAND_EPSILON,
            _ => distance_pct < max - BAND_EPSILON,
        }
    }

    pub fn risk_label(self) -> RiskLabel {
        match self {
            TierKind::Conservative => RiskLabel::Low,
            TierKind::Moderate => RiskLabel::Medium,
            TierKind::Aggressive => RiskLabel::High,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TierKind::Conservative => "conservative",
            TierKind::Moderate => "moderate",
            TierKind::Aggressive => "aggressive",
        }
    }
}

/// `|level - price| / price * 100`. Zero when the price is not positive.
pub fn distance_pct(level: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    (level - price).abs() / price * 100.0
}

/// One knockout barrier proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyTier {
    #[serde(alias = "ko_level_usd", deserialize_with = "lenient::f64_value")]
    pub ko_level: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub distance_pct: f64,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub risk: RiskLabel,
}

impl StrategyTier {
    pub fn new(kind: TierKind, ko_level: f64, price: f64) -> Self {
        Self {
            ko_level,
            distance_pct: distance_pct(ko_level, price),
            risk: kind.risk_label(),
        }
    }

    /// True when the barrier sits on the losing side of `price` for `direction`.
    pub fn on_losing_side(&self, direction: Direction, price: f64) -> bool {
        match direction {
            Direction::Long => self.ko_level < price,
            Direction::Short => self.ko_level > price,
            Direction::Hold => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategySet {
    pub conservative: StrategyTier,
    pub moderate: StrategyTier,
    pub aggressive: StrategyTier,
}

impl StrategySet {
    pub fn get(&self, kind: TierKind) -> &StrategyTier {
        match kind {
            TierKind::Conservative => &self.conservative,
            TierKind::Moderate => &self.moderate,
            TierKind::Aggressive => &self.aggressive,
        }
    }

    pub fn get_mut(&mut self, kind: TierKind) -> &mut StrategyTier {
        match kind {
            TierKind::Conservative => &mut self.conservative,
            TierKind::Moderate => &mut self.moderate,
            TierKind::Aggressive => &mut self.aggressive,
        }
    }
}

/// Tier set for the opposite-leaning trade offered alongside a HOLD.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldAlternative {
    #[serde(deserialize_with = "lenient_direction")]
    pub direction: Direction,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub rationale: String,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub strategies: Option<StrategySet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceZone {
    #[serde(alias = "level_usd", deserialize_with = "lenient::f64_value")]
    pub level: f64,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Timeframes {
    #[serde(default, deserialize_with = "lenient_direction")]
    pub short_term: Direction,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub medium_term: Direction,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub long_term: Direction,
}

/// The terminal structured output of a deliberation run.
///
/// This JSON shape is the durable contract with downstream formatters. Every
/// key is always serialized, including for degraded records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub signal: Signal,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub unable_to_assess: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional"
    )]
    pub unable_to_assess_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_f64")]
    pub price_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_f64")]
    pub price_eur: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub strategies: Option<StrategySet>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub hold_alternative: Option<HoldAlternative>,
    #[serde(default, deserialize_with = "lenient::zones")]
    pub support_zones: Vec<PriceZone>,
    #[serde(default, deserialize_with = "lenient::zones")]
    pub resistance_zones: Vec<PriceZone>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub timeframes: Timeframes,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub detailed_analysis: String,
}

/// A documented record invariant that does not hold.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("unable_to_assess does not match signal IGNORE with zero confidence")]
    UnableMismatch,
    #[error("{direction} decision with a known price has no strategy tiers")]
    MissingTiers { direction: Direction },
    #[error("{tier} barrier {level} is on the wrong side of {price} for {direction}")]
    WrongSide {
        tier: &'static str,
        direction: Direction,
        level: f64,
        price: f64,
    },
    #[error("{tier} distance_pct {stored} differs from recomputed {expected}")]
    DistanceMismatch {
        tier: &'static str,
        stored: f64,
        expected: f64,
    },
    #[error("tier distances are not ordered conservative > moderate > aggressive")]
    TierOrdering,
    #[error("hold_alternative present on a {0} decision")]
    StrayHoldAlternative(Signal),
}

impl DecisionRecord {
    /// The terminal record emitted when structured extraction cannot succeed.
    pub fn degraded(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            signal: Signal::Ignore,
            confidence: 0.0,
            unable_to_assess: true,
            unable_to_assess_reason: Some(reason.clone()),
            price_usd: None,
            price_eur: None,
            strategies: None,
            hold_alternative: None,
            support_zones: Vec::new(),
            resistance_zones: Vec::new(),
            timeframes: Timeframes::default(),
            detailed_analysis: reason,
        }
    }

    /// Coerce model output into a record satisfying the signal, confidence
    /// and hold-alternative invariants. Barrier tiers are left to the
    /// strategy calculator.
    pub fn normalize(&mut self) {
        if !self.confidence.is_finite() {
            self.confidence = 0.0;
        }
        if self.confidence > 1.0 && self.confidence <= 100.0 {
            self.confidence /= 100.0;
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);

        if self.unable_to_assess || self.signal == Signal::Ignore {
            self.signal = Signal::Ignore;
            self.confidence = 0.0;
            self.unable_to_assess = true;
            self.strategies = None;
            self.hold_alternative = None;
            return;
        }

        self.unable_to_assess_reason = None;
        if self.signal != Signal::Hold {
            self.hold_alternative = None;
        } else {
            self.strategies = None;
        }

        self.price_usd = self.price_usd.filter(|p| p.is_finite() && *p > 0.0);
        self.price_eur = self.price_eur.filter(|p| p.is_finite() && *p > 0.0);
    }

    /// Overwrite the USD reference price with the authoritative one and
    /// derive the EUR price from `eur_usd_rate` when the model gave none.
    /// A model EUR price is dropped once its USD price has been replaced.
    pub fn apply_prices(&mut self, authoritative_usd: Option<f64>, eur_usd_rate: f64) {
        if let Some(price) = authoritative_usd.filter(|p| *p > 0.0) {
            if self.price_usd != Some(price) {
                self.price_eur = None;
            }
            self.price_usd = Some(price);
        }
        if self.price_eur.is_none() && eur_usd_rate > 0.0 {
            self.price_eur = self.price_usd.map(|usd| usd / eur_usd_rate);
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.unable_to_assess
    }

    pub fn is_strong(&self) -> bool {
        self.confidence >= STRONG_CONFIDENCE
    }

    /// Every invariant this record violates; empty when it is well-formed.
    pub fn violations(&self) -> Vec<Violation> {
        let mut found = Vec::new();

        if !(0.0..=1.0).contains(&self.confidence) {
            found.push(Violation::ConfidenceOutOfRange(self.confidence));
        }

        let ignore_shape = self.signal == Signal::Ignore && self.confidence == 0.0;
        if self.unable_to_assess != ignore_shape {
            found.push(Violation::UnableMismatch);
        }

        if self.hold_alternative.is_some() && self.signal != Signal::Hold {
            found.push(Violation::StrayHoldAlternative(self.signal));
        }

        let Some(price) = self.price_usd.filter(|p| *p > 0.0) else {
            return found;
        };

        match (self.signal.direction(), &self.strategies) {
            (Some(direction @ (Direction::Long | Direction::Short)), Some(set)) => {
                check_tiers(set, direction, price, &mut found);
            }
            (Some(direction @ (Direction::Long | Direction::Short)), None) => {
                found.push(Violation::MissingTiers { direction });
            }
            _ => {}
        }

        if let Some(alt) = &self.hold_alternative {
            if let Some(set) = &alt.strategies {
                if alt.direction != Direction::Hold {
                    check_tiers(set, alt.direction, price, &mut found);
                }
            }
        }

        found
    }
}

fn check_tiers(set: &StrategySet, direction: Direction, price: f64, found: &mut Vec<Violation>) {
    for kind in TierKind::ALL {
        let tier = set.get(kind);
        if !tier.on_losing_side(direction, price) {
            found.push(Violation::WrongSide {
                tier: kind.name(),
                direction,
                level: tier.ko_level,
                price,
            });
        }
        let expected = distance_pct(tier.ko_level, price);
        if (expected - tier.distance_pct).abs() > DISTANCE_TOLERANCE {
            found.push(Violation::DistanceMismatch {
                tier: kind.name(),
                stored: tier.distance_pct,
                expected,
            });
        }
    }

    let c = distance_pct(set.conservative.ko_level, price);
    let m = distance_pct(set.moderate.ko_level, price);
    let a = distance_pct(set.aggressive.ko_level, price);
    if !(c > m && m > a) {
        found.push(Violation::TierOrdering);
    }
}

/// Tolerant field deserializers for model-produced JSON.
mod lenient {
    use super::*;
    use serde_json::Value;

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').replace(',', "").parse().ok(),
            _ => None,
        }
    }

    pub fn f64_value<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(d)?;
        as_f64(&value).ok_or_else(|| serde::de::Error::custom(format!("not a number: {value}")))
    }

    pub fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(as_f64(&value).unwrap_or(0.0))
    }

    pub fn optional_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(as_f64(&value))
    }

    pub fn optional<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(d)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(serde_json::from_value(value).ok())
    }

    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(optional(d)?.unwrap_or_default())
    }

    pub fn zones<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<PriceZone>, D::Error> {
        let value = Value::deserialize(d)?;
        let Value::Array(items) = value else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_record(price: f64) -> DecisionRecord {
        DecisionRecord {
            signal: Signal::Long,
            confidence: 0.7,
            unable_to_assess: false,
            unable_to_assess_reason: None,
            price_usd: Some(price),
            price_eur: None,
            strategies: Some(StrategySet {
                conservative: StrategyTier::new(TierKind::Conservative, 80.0, price),
                moderate: StrategyTier::new(TierKind::Moderate, 87.5, price),
                aggressive: StrategyTier::new(TierKind::Aggressive, 92.5, price),
            }),
            hold_alternative: None,
            support_zones: vec![],
            resistance_zones: vec![],
            timeframes: Timeframes::default(),
            detailed_analysis: String::new(),
        }
    }

    #[test]
    fn minimal_json_parses_with_defaults() {
        let record: DecisionRecord =
            serde_json::from_str(r#"{"signal":"SHORT","confidence":0.6}"#).unwrap();
        assert_eq!(record.signal, Signal::Short);
        assert_eq!(record.confidence, 0.6);
        assert!(!record.unable_to_assess);
        assert!(record.strategies.is_none());
        assert_eq!(record.timeframes.long_term, Direction::Hold);
    }

    #[test]
    fn missing_signal_is_rejected() {
        assert!(serde_json::from_str::<DecisionRecord>(r#"{"rate": 1.08}"#).is_err());
    }

    #[test]
    fn accepts_usd_suffixed_aliases_and_string_numbers() {
        let json = r#"{
            "signal": "long",
            "confidence": "0.8",
            "price_usd": "100.0",
            "strategies": {
                "conservative": {"ko_level_usd": 80, "distance_pct": 20, "risk": "Low"},
                "moderate": {"ko_level_usd": 88, "distance_pct": 12, "risk": "medium"},
                "aggressive": {"ko_level_usd": 93, "distance_pct": 7, "risk": "high"}
            },
            "support_zones": [{"level_usd": 95.5, "description": "prior low"}, {"bogus": true}],
            "timeframes": {"short_term": "SHORT", "medium_term": "sideways"}
        }"#;
        let record: DecisionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.signal, Signal::Long);
        assert_eq!(record.confidence, 0.8);
        let set = record.strategies.unwrap();
        assert_eq!(set.conservative.ko_level, 80.0);
        assert_eq!(set.conservative.risk, RiskLabel::Low);
        assert_eq!(record.support_zones.len(), 1);
        assert_eq!(record.support_zones[0].level, 95.5);
        assert_eq!(record.timeframes.short_term, Direction::Short);
        assert_eq!(record.timeframes.medium_term, Direction::Hold);
    }

    #[test]
    fn empty_strategies_object_becomes_none() {
        let record: DecisionRecord =
            serde_json::from_str(r#"{"signal":"IGNORE","strategies":{}}"#).unwrap();
        assert!(record.strategies.is_none());
    }

    #[test]
    fn degraded_record_shape() {
        let record = DecisionRecord::degraded("extraction failed");
        assert_eq!(record.signal, Signal::Ignore);
        assert_eq!(record.confidence, 0.0);
        assert!(record.unable_to_assess);
        assert!(record.violations().is_empty());

        let json = serde_json::to_value(&record).unwrap();
        for key in [
            "signal",
            "confidence",
            "unable_to_assess",
            "price_usd",
            "price_eur",
            "strategies",
            "hold_alternative",
            "support_zones",
            "resistance_zones",
            "timeframes",
            "detailed_analysis",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn normalize_percent_confidence() {
        let mut record = long_record(100.0);
        record.confidence = 72.0;
        record.normalize();
        assert!((record.confidence - 0.72).abs() < 1e-12);

        record.confidence = 250.0;
        record.normalize();
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn normalize_unable_forces_ignore() {
        let mut record = long_record(100.0);
        record.unable_to_assess = true;
        record.normalize();
        assert_eq!(record.signal, Signal::Ignore);
        assert_eq!(record.confidence, 0.0);
        assert!(record.strategies.is_none());
        assert!(record.violations().is_empty());
    }

    #[test]
    fn normalize_ignore_forces_unable() {
        let mut record = long_record(100.0);
        record.signal = Signal::Ignore;
        record.normalize();
        assert!(record.unable_to_assess);
        assert_eq!(record.confidence, 0.0);
    }

    #[test]
    fn normalize_drops_hold_alternative_unless_hold() {
        let mut record = long_record(100.0);
        record.hold_alternative = Some(HoldAlternative {
            direction: Direction::Short,
            rationale: "fade".into(),
            strategies: None,
        });
        record.normalize();
        assert!(record.hold_alternative.is_none());
    }

    #[test]
    fn apply_prices_overrides_and_derives_eur() {
        let mut record = long_record(100.0);
        record.price_usd = Some(99.0);
        record.apply_prices(Some(110.0), 1.1);
        assert_eq!(record.price_usd, Some(110.0));
        assert!((record.price_eur.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn overridden_usd_price_rederives_model_eur_price() {
        let mut record = long_record(100.0);
        record.price_usd = Some(50.0);
        record.price_eur = Some(46.0);
        record.apply_prices(Some(110.0), 1.1);
        assert_eq!(record.price_usd, Some(110.0));
        assert!((record.price_eur.unwrap() - 100.0).abs() < 1e-9);

        let mut agreeing = long_record(100.0);
        agreeing.price_usd = Some(110.0);
        agreeing.price_eur = Some(101.5);
        agreeing.apply_prices(Some(110.0), 1.1);
        assert_eq!(agreeing.price_eur, Some(101.5));
    }

    #[test]
    fn well_formed_long_has_no_violations() {
        assert!(long_record(100.0).violations().is_empty());
    }

    #[test]
    fn wrong_side_barrier_is_reported() {
        let mut record = long_record(100.0);
        if let Some(set) = record.strategies.as_mut() {
            set.aggressive = StrategyTier::new(TierKind::Aggressive, 105.0, 100.0);
        }
        let violations = record.violations();
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::WrongSide { tier: "aggressive", .. })));
    }

    #[test]
    fn stale_distance_is_reported() {
        let mut record = long_record(100.0);
        if let Some(set) = record.strategies.as_mut() {
            set.moderate.distance_pct = 3.0;
        }
        assert!(record
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::DistanceMismatch { tier: "moderate", .. })));
    }

    #[test]
    fn tier_bands_do_not_overlap() {
        assert!(TierKind::Conservative.contains(15.0));
        assert!(!TierKind::Moderate.contains(15.0));
        assert!(TierKind::Moderate.contains(10.0));
        assert!(!TierKind::Aggressive.contains(10.0));
        assert!(TierKind::Aggressive.contains(5.0));
        assert!(!TierKind::Aggressive.contains(4.9));
        assert!(TierKind::Conservative.contains(25.0));
        assert!(!TierKind::Conservative.contains(25.1));
    }

    #[test]
    fn distance_pct_formula() {
        assert!((distance_pct(80.0, 100.0) - 20.0).abs() < 1e-12);
        assert!((distance_pct(110.0, 100.0) - 10.0).abs() < 1e-12);
        assert_eq!(distance_pct(80.0, 0.0), 0.0);
    }
}

//! Per-position barrier proximity and the recommended-action decision table.

use tads_models::risk_report::NO_BARRIER_RISK;
use tads_models::{DecisionRecord, Direction, PositionDirection, ProximityBand, RecommendedAction, Signal};

/// Distance to the knockout barrier in percent of the current price.
/// Unlevered positions and missing barriers report [`NO_BARRIER_RISK`].
/// A breached barrier yields a negative distance.
pub fn barrier_proximity(direction: PositionDirection, price: f64, barrier: f64) -> f64 {
    if barrier <= 0.0 || !(price.is_finite() && price > 0.0) {
        return NO_BARRIER_RISK;
    }
    match direction {
        PositionDirection::Long => (price - barrier) / price * 100.0,
        PositionDirection::Short => (barrier - price) / price * 100.0,
        PositionDirection::Normal => NO_BARRIER_RISK,
    }
}

/// How a decision's signal relates to the position's exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Aligned,
    Opposed,
    Neutral,
}

impl Alignment {
    /// None for IGNORE.
    pub fn of(signal: Signal, exposure: Direction) -> Option<Self> {
        let call = signal.direction()?;
        Some(match call {
            Direction::Hold => Alignment::Neutral,
            d if d == exposure => Alignment::Aligned,
            _ => Alignment::Opposed,
        })
    }
}

/// Decision table over proximity band, signal alignment and profit sign.
/// The first matching rule wins.
pub fn recommend_action(
    band: ProximityBand,
    decision: Option<&DecisionRecord>,
    direction: PositionDirection,
    in_profit: Option<bool>,
) -> RecommendedAction {
    let usable = decision.filter(|d| d.signal != Signal::Ignore && !d.unable_to_assess);
    let alignment = usable.and_then(|d| Alignment::of(d.signal, direction.exposure()));
    let strong = usable.is_some_and(|d| d.is_strong());
    let profit = in_profit == Some(true);
    let loss = in_profit == Some(false);

    if band == ProximityBand::Critical {
        return RecommendedAction::Sale;
    }

    match alignment {
        Some(Alignment::Opposed) if band == ProximityBand::Warning => RecommendedAction::Sale,
        Some(Alignment::Opposed) if strong => RecommendedAction::Sale,
        Some(Alignment::Opposed) if profit => RecommendedAction::TakeProfit,
        Some(Alignment::Opposed) => RecommendedAction::Restructure,
        Some(Alignment::Neutral) if profit => RecommendedAction::TakeProfit,
        None => RecommendedAction::Hold,
        Some(Alignment::Aligned) if strong && band == ProximityBand::Safe => RecommendedAction::BuyMore,
        Some(Alignment::Neutral) if loss && band < ProximityBand::Safe => RecommendedAction::Restructure,
        _ => RecommendedAction::Hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tads_models::Timeframes;

    fn decision(signal: Signal, confidence: f64) -> DecisionRecord {
        DecisionRecord {
            signal,
            confidence,
            unable_to_assess: signal == Signal::Ignore,
            unable_to_assess_reason: None,
            price_usd: Some(100.0),
            price_eur: None,
            strategies: None,
            hold_alternative: None,
            support_zones: vec![],
            resistance_zones: vec![],
            timeframes: Timeframes::default(),
            detailed_analysis: String::new(),
        }
    }

    use PositionDirection::{Long, Normal, Short};
    use ProximityBand::{Caution, Critical, Safe, Warning};
    use RecommendedAction::*;

    #[test]
    fn proximity_long_scenario() {
        let pct = barrier_proximity(Long, 82.0, 80.0);
        assert!((pct - 2.439).abs() < 1e-3);
        assert_eq!(ProximityBand::from_pct(pct), Critical);
    }

    #[test]
    fn proximity_short_normal_and_missing() {
        assert!((barrier_proximity(Short, 100.0, 112.0) - 12.0).abs() < 1e-9);
        assert_eq!(barrier_proximity(Normal, 100.0, 80.0), NO_BARRIER_RISK);
        assert_eq!(barrier_proximity(Long, 100.0, 0.0), NO_BARRIER_RISK);
        assert!(barrier_proximity(Long, 75.0, 80.0) < 0.0);
    }

    #[test]
    fn alignment_counts_normal_as_long() {
        assert_eq!(Alignment::of(Signal::Long, Normal.exposure()), Some(Alignment::Aligned));
        assert_eq!(Alignment::of(Signal::Short, Long.exposure()), Some(Alignment::Opposed));
        assert_eq!(Alignment::of(Signal::Hold, Short.exposure()), Some(Alignment::Neutral));
        assert_eq!(Alignment::of(Signal::Ignore, Long.exposure()), None);
    }

    #[test]
    fn critical_always_sells() {
        let d = decision(Signal::Long, 0.9);
        assert_eq!(recommend_action(Critical, Some(&d), Long, Some(true)), Sale);
        assert_eq!(recommend_action(Critical, None, Long, None), Sale);
    }

    #[test]
    fn opposed_rules_in_order() {
        let weak = decision(Signal::Short, 0.6);
        let strong = decision(Signal::Short, 0.8);
        assert_eq!(recommend_action(Warning, Some(&weak), Long, Some(true)), Sale);
        assert_eq!(recommend_action(Safe, Some(&strong), Long, Some(true)), Sale);
        assert_eq!(recommend_action(Safe, Some(&weak), Long, Some(true)), TakeProfit);
        assert_eq!(recommend_action(Caution, Some(&weak), Long, Some(false)), Restructure);
        assert_eq!(recommend_action(Safe, Some(&weak), Long, None), Restructure);
    }

    #[test]
    fn hold_signal_rules() {
        let hold = decision(Signal::Hold, 0.6);
        assert_eq!(recommend_action(Safe, Some(&hold), Long, Some(true)), TakeProfit);
        assert_eq!(recommend_action(Caution, Some(&hold), Long, Some(false)), Restructure);
        assert_eq!(recommend_action(Safe, Some(&hold), Long, Some(false)), Hold);
        assert_eq!(recommend_action(Warning, Some(&hold), Short, None), Hold);
    }

    #[test]
    fn missing_or_ignored_decision_holds() {
        let ignore = decision(Signal::Ignore, 0.0);
        assert_eq!(recommend_action(Safe, None, Long, Some(false)), Hold);
        assert_eq!(recommend_action(Warning, Some(&ignore), Long, Some(true)), Hold);
    }

    #[test]
    fn aligned_rules() {
        let strong = decision(Signal::Long, 0.75);
        let weak = decision(Signal::Long, 0.7);
        assert_eq!(recommend_action(Safe, Some(&strong), Long, None), BuyMore);
        assert_eq!(recommend_action(Safe, Some(&strong), Normal, Some(false)), BuyMore);
        assert_eq!(recommend_action(Caution, Some(&strong), Long, None), Hold);
        assert_eq!(recommend_action(Safe, Some(&weak), Long, None), Hold);
        let short = decision(Signal::Short, 0.9);
        assert_eq!(recommend_action(Safe, Some(&short), Short, Some(true)), BuyMore);
    }
}

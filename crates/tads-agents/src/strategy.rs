//! Direction-aware knockout barrier tiers.

use tads_models::decision::distance_pct;
use tads_models::{DecisionRecord, Direction, Signal, StrategySet, StrategyTier, TierKind};
use tracing::warn;

/// Distance (fraction of price) chosen inside each tier's band.
fn pick(kind: TierKind) -> f64 {
    match kind {
        TierKind::Conservative => 0.20,
        TierKind::Moderate => 0.125,
        TierKind::Aggressive => 0.075,
    }
}

/// Barrier level for one tier. LONG barriers sit below price, SHORT above.
pub fn tier_level(price: f64, direction: Direction, kind: TierKind) -> Option<f64> {
    let d = pick(kind);
    match direction {
        Direction::Long => Some(price * (1.0 - d)),
        Direction::Short => Some(price * (1.0 + d)),
        Direction::Hold => None,
    }
}

/// All three tiers for a directional trade. None for HOLD or a non-positive price.
pub fn compute_tiers(price: f64, direction: Direction) -> Option<StrategySet> {
    if !(price.is_finite() && price > 0.0) {
        return None;
    }
    let tier = |kind| tier_level(price, direction, kind).map(|level| StrategyTier::new(kind, level, price));
    Some(StrategySet {
        conservative: tier(TierKind::Conservative)?,
        moderate: tier(TierKind::Moderate)?,
        aggressive: tier(TierKind::Aggressive)?,
    })
}

/// Check model-produced tiers against the band rules, replacing any tier
/// on the wrong side of price or outside its band. Every tier's
/// `distance_pct` and risk label are rewritten. Returns the replaced tiers.
pub fn reconcile(set: &mut StrategySet, price: f64, direction: Direction) -> Vec<TierKind> {
    let mut replaced = Vec::new();
    for kind in TierKind::ALL {
        let tier = set.get_mut(kind);
        let distance = distance_pct(tier.ko_level, price);
        let valid = tier.ko_level.is_finite()
            && tier.on_losing_side(direction, price)
            && kind.contains(distance);
        if valid {
            tier.distance_pct = distance;
            tier.risk = kind.risk_label();
            continue;
        }
        if let Some(level) = tier_level(price, direction, kind) {
            *tier = StrategyTier::new(kind, level, price);
            replaced.push(kind);
        }
    }
    replaced
}

fn fill(
    slot: &mut Option<StrategySet>,
    price: f64,
    direction: Direction,
    symbol: &str,
    what: &str,
) {
    match slot {
        Some(set) => {
            let replaced = reconcile(set, price, direction);
            if !replaced.is_empty() {
                let names: Vec<&str> = replaced.iter().map(|k| k.name()).collect();
                warn!(symbol, what, tiers = ?names, "Corrected barrier tiers violating band rules");
            }
        }
        None => *slot = compute_tiers(price, direction),
    }
}

/// Enrich a normalized record with barrier tiers: compute missing ones,
/// correct invalid ones. Needs a reference price; without one the record
/// is left as is.
pub fn enrich_record(record: &mut DecisionRecord, symbol: &str) {
    let Some(price) = record.price_usd.filter(|p| *p > 0.0) else {
        return;
    };

    match record.signal {
        Signal::Long | Signal::Short => {
            if let Some(direction) = record.signal.direction() {
                fill(&mut record.strategies, price, direction, symbol, "strategies");
            }
        }
        Signal::Hold => {
            if let Some(alt) = record.hold_alternative.as_mut() {
                if alt.direction == Direction::Hold {
                    alt.strategies = None;
                } else {
                    fill(&mut alt.strategies, price, alt.direction, symbol, "hold_alternative");
                }
            }
        }
        Signal::Ignore => {}
    }
}

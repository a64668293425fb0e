//! Portfolio risk math. Everything here is pure.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tads_models::risk_report::UNKNOWN_SECTOR;
use tads_models::{EarningsEvent, MarketSnapshot, RiskProfile};

/// Pairs need at least this many common return observations.
pub const MIN_COMMON_OBSERVATIONS: usize = 20;
/// Correlation above which a pair is reported.
pub const HIGH_CORRELATION: f64 = 0.7;
pub const DEFAULT_BETA: f64 = 1.0;
pub const BASELINE_SCORE: i32 = 50;

/// Sum of weights per sector. Symbols without a snapshot count as `Unknown`.
pub fn sector_weights(
    weights: &[(String, f64)],
    snapshots: &HashMap<String, MarketSnapshot>,
) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (symbol, weight) in weights {
        let sector = snapshots
            .get(symbol)
            .map(|s| s.sector.as_str())
            .unwrap_or(UNKNOWN_SECTOR);
        *out.entry(sector.to_string()).or_insert(0.0) += weight;
    }
    out
}

pub fn max_weight(weights: &BTreeMap<String, f64>) -> f64 {
    weights.values().copied().fold(0.0, f64::max)
}

/// Combined weight of the two largest positions; 1.0 with fewer than two.
pub fn top_two_weight(weights: &[(String, f64)]) -> f64 {
    if weights.len() < 2 {
        return 1.0;
    }
    let mut sorted: Vec<f64> = weights.iter().map(|(_, w)| *w).collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted[0] + sorted[1]
}

/// Value-weighted beta; a snapshot without beta counts as 1.0.
pub fn portfolio_beta(weights: &[(String, f64)], snapshots: &HashMap<String, MarketSnapshot>) -> f64 {
    weights
        .iter()
        .map(|(symbol, weight)| {
            let beta = snapshots
                .get(symbol)
                .and_then(|s| s.beta)
                .unwrap_or(DEFAULT_BETA);
            weight * beta
        })
        .sum()
}

/// Pearson correlation coefficient. None for fewer than two points or a
/// series without variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Correlation of daily returns for every pair of `symbols` (in the given
/// order) that shares enough dates. Keys are `"A-B"`.
pub fn pairwise_correlations(
    symbols: &[String],
    snapshots: &HashMap<String, MarketSnapshot>,
) -> BTreeMap<String, f64> {
    let returns: Vec<(&String, BTreeMap<NaiveDate, f64>)> = symbols
        .iter()
        .filter_map(|s| snapshots.get(s).map(|snap| (s, snap.daily_returns().into_iter().collect())))
        .filter(|(_, r): &(&String, BTreeMap<NaiveDate, f64>)| !r.is_empty())
        .collect();

    let mut out = BTreeMap::new();
    for (i, (s1, r1)) in returns.iter().enumerate() {
        for (s2, r2) in &returns[i + 1..] {
            let (xs, ys): (Vec<f64>, Vec<f64>) = r1
                .iter()
                .filter_map(|(date, x)| r2.get(date).map(|y| (*x, *y)))
                .unzip();
            if xs.len() < MIN_COMMON_OBSERVATIONS {
                continue;
            }
            if let Some(c) = pearson(&xs, &ys) {
                out.insert(format!("{s1}-{s2}"), c);
            }
        }
    }
    out
}

pub fn average(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Earnings dates between today and `window_days` ahead, soonest first.
pub fn upcoming_earnings(
    symbols: &[String],
    snapshots: &HashMap<String, MarketSnapshot>,
    today: NaiveDate,
    window_days: i64,
) -> Vec<EarningsEvent> {
    let mut events: Vec<EarningsEvent> = symbols
        .iter()
        .filter_map(|symbol| {
            let date = snapshots.get(symbol)?.earnings_date?;
            let days_until = (date - today).num_days();
            (0..=window_days).contains(&days_until).then(|| EarningsEvent {
                symbol: symbol.clone(),
                date,
                days_until,
            })
        })
        .collect();
    events.sort_by_key(|e| e.days_until);
    events
}

/// Inputs to the composite score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInputs {
    pub max_sector_weight: f64,
    pub portfolio_beta: f64,
    pub average_correlation: f64,
    pub earnings_events: usize,
    pub top_two_weight: f64,
}

/// Additive threshold score, clamped to 0..=100.
pub fn composite_score(inputs: &ScoreInputs) -> u8 {
    let mut score = BASELINE_SCORE;

    score += if inputs.max_sector_weight > 0.8 {
        25
    } else if inputs.max_sector_weight > 0.6 {
        15
    } else if inputs.max_sector_weight > 0.4 {
        5
    } else {
        0
    };

    score += if inputs.portfolio_beta > 1.5 {
        15
    } else if inputs.portfolio_beta > 1.2 {
        10
    } else {
        0
    };

    score += if inputs.average_correlation > 0.7 {
        10
    } else if inputs.average_correlation > 0.5 {
        5
    } else {
        0
    };

    score += 3 * inputs.earnings_events.min(100) as i32;

    if inputs.top_two_weight > 0.7 {
        score += 10;
    }

    score.clamp(0, 100) as u8
}

/// Plain-language suggestions for reducing risk.
pub fn recommendations(
    profile: RiskProfile,
    sector_weights: &BTreeMap<String, f64>,
    high_correlations: &[String],
    portfolio_beta: f64,
    earnings: &[EarningsEvent],
    top_two_weight: f64,
) -> Vec<String> {
    let mut out = Vec::new();
    let max_allowed = profile.max_sector_concentration();

    for (sector, weight) in sector_weights {
        if *weight > max_allowed {
            out.push(format!(
                "Reduce {sector} sector exposure ({:.0}% > {:.0}% allowed)",
                weight * 100.0,
                max_allowed * 100.0
            ));
        }
    }

    if !high_correlations.is_empty() {
        let pairs: Vec<&str> = high_correlations.iter().take(2).map(String::as_str).collect();
        out.push(format!("High correlation: {} - consider diversifying", pairs.join(", ")));
    }

    if portfolio_beta > 1.5 {
        out.push(format!(
            "Portfolio is very volatile (beta {portfolio_beta:.1}) - consider defensive holdings"
        ));
    }

    if !earnings.is_empty() {
        let symbols: Vec<&str> = earnings.iter().map(|e| e.symbol.as_str()).collect();
        out.push(format!("Earnings soon: {} - consider reducing positions", symbols.join(", ")));
    }

    if top_two_weight > 0.6 {
        out.push("Top 2 positions exceed 60% - diversify further".to_string());
    }

    if out.is_empty() {
        out.push("Portfolio looks well diversified".to_string());
    }
    out
}

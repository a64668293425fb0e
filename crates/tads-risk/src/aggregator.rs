use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use tads_models::{
    Currency, DecisionRecord, DrawdownScenario, MarketSnapshot, PortfolioConfig, Position, PositionRisk,
    ProximityBand, RiskLevel, RiskProfile, RiskReport,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::actions::{barrier_proximity, recommend_action};
use crate::error::RiskError;
use crate::metrics::{self, ScoreInputs, HIGH_CORRELATION};
use crate::source::MarketDataSource;

/// Symbols in portfolio order, each once.
pub fn distinct_symbols(positions: &[Position]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for position in positions {
        if !out.contains(&position.symbol) {
            out.push(position.symbol.clone());
        }
    }
    out
}

/// Price used for barrier proximity: the decision's price in the
/// position's currency, else the last close. Snapshot closes are USD
/// quotes, so EUR positions never fall back to them.
fn reference_price(
    position: &Position,
    decision: Option<&DecisionRecord>,
    snapshot: Option<&MarketSnapshot>,
) -> Option<f64> {
    let price = match position.currency {
        Currency::Eur => decision.and_then(|d| d.price_eur),
        Currency::Usd => decision
            .and_then(|d| d.price_usd)
            .or_else(|| snapshot.and_then(MarketSnapshot::last_close)),
    };
    price.filter(|p| p.is_finite() && *p > 0.0)
}

/// Build a risk report from positions, their decisions (keyed by symbol)
/// and market snapshots (keyed by symbol). Positions are never modified.
pub fn assess(
    positions: &[Position],
    decisions: &HashMap<String, DecisionRecord>,
    snapshots: &HashMap<String, MarketSnapshot>,
    profile: RiskProfile,
    today: NaiveDate,
    earnings_window_days: i64,
) -> Result<RiskReport, RiskError> {
    let values: Vec<f64> = positions
        .iter()
        .map(|p| p.value.abs().to_f64().unwrap_or(0.0))
        .collect();
    let total_value: f64 = values.iter().sum();
    if positions.is_empty() || total_value <= 0.0 {
        return Err(RiskError::EmptyPortfolio);
    }

    let weights: Vec<(String, f64)> = positions
        .iter()
        .zip(&values)
        .map(|(p, v)| (p.symbol.clone(), v / total_value))
        .collect();
    let symbols = distinct_symbols(positions);

    let position_risks: Vec<PositionRisk> = positions
        .iter()
        .zip(&weights)
        .map(|(position, (_, weight))| {
            let decision = decisions.get(&position.symbol);
            let price = reference_price(position, decision, snapshots.get(&position.symbol));
            let barrier = position.barrier.to_f64().unwrap_or(0.0);
            let proximity = match price {
                Some(price) => barrier_proximity(position.direction, price, barrier),
                None => {
                    if position.has_barrier() {
                        warn!(symbol = %position.symbol, "No reference price; barrier proximity unknown");
                    }
                    tads_models::risk_report::NO_BARRIER_RISK
                }
            };
            let band = ProximityBand::from_pct(proximity);
            let action = recommend_action(band, decision, position.direction, position.in_profit());
            PositionRisk {
                symbol: position.symbol.clone(),
                label: position.label.clone(),
                direction: position.direction,
                currency: position.currency,
                weight: *weight,
                reference_price: price,
                barrier_proximity_pct: proximity,
                band,
                decision: decision.cloned(),
                action,
            }
        })
        .collect();

    let sector_weights = metrics::sector_weights(&weights, snapshots);
    let max_sector_weight = metrics::max_weight(&sector_weights);
    let top_two_weight = metrics::top_two_weight(&weights);
    let portfolio_beta = metrics::portfolio_beta(&weights, snapshots);
    let correlations = metrics::pairwise_correlations(&symbols, snapshots);
    let average_correlation = metrics::average(correlations.values().copied());
    let high_correlations: Vec<String> = correlations
        .iter()
        .filter(|(_, c)| **c > HIGH_CORRELATION)
        .map(|(pair, _)| pair.clone())
        .collect();
    let upcoming_earnings = metrics::upcoming_earnings(&symbols, snapshots, today, earnings_window_days);

    let risk_score = metrics::composite_score(&ScoreInputs {
        max_sector_weight,
        portfolio_beta,
        average_correlation,
        earnings_events: upcoming_earnings.len(),
        top_two_weight,
    });
    let recommendations = metrics::recommendations(
        profile,
        &sector_weights,
        &high_correlations,
        portfolio_beta,
        &upcoming_earnings,
        top_two_weight,
    );

    Ok(RiskReport {
        generated_at: Utc::now(),
        risk_profile: profile,
        total_value,
        positions: position_risks,
        sector_weights,
        max_sector_weight,
        top_two_weight,
        correlations,
        average_correlation,
        high_correlations,
        portfolio_beta,
        upcoming_earnings,
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
        drawdown: DrawdownScenario::from_beta(portfolio_beta),
        recommendations,
    })
}

/// Fetches market data with bounded concurrency and assembles reports.
pub struct RiskAggregator {
    source: Arc<dyn MarketDataSource>,
    profile: RiskProfile,
    fetch_concurrency: usize,
    earnings_window_days: i64,
}

impl RiskAggregator {
    pub fn new(source: Arc<dyn MarketDataSource>, config: &PortfolioConfig) -> Self {
        Self {
            source,
            profile: config.risk_profile,
            fetch_concurrency: config.fetch_concurrency.max(1),
            earnings_window_days: config.earnings_window_days,
        }
    }

    /// Snapshots for every symbol the source knows. Fetch failures are
    /// logged and leave the symbol out.
    pub async fn fetch_snapshots(&self, symbols: &[String]) -> HashMap<String, MarketSnapshot> {
        let start = Instant::now();
        let permits = Arc::new(Semaphore::new(self.fetch_concurrency));
        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            let symbol = symbol.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = source.fetch_snapshot(&symbol).await;
                (symbol, result)
            });
        }

        let mut out = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Ok(Some(snapshot)))) => {
                    out.insert(symbol, snapshot);
                }
                Ok((symbol, Ok(None))) => {
                    debug!(symbol = %symbol, source = self.source.name(), "No market data");
                }
                Ok((symbol, Err(e))) => {
                    warn!(symbol = %symbol, error = %e, "Market data fetch failed");
                }
                Err(e) => error!(error = %e, "Market data task panicked"),
            }
        }
        info!(
            requested = symbols.len(),
            found = out.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Market data fetched"
        );
        out
    }

    pub async fn assess(
        &self,
        positions: &[Position],
        decisions: &HashMap<String, DecisionRecord>,
        today: NaiveDate,
    ) -> Result<RiskReport, RiskError> {
        let symbols = distinct_symbols(positions);
        let snapshots = self.fetch_snapshots(&symbols).await;
        let report = assess(
            positions,
            decisions,
            &snapshots,
            self.profile,
            today,
            self.earnings_window_days,
        )?;
        info!(
            positions = report.positions.len(),
            risk_score = report.risk_score,
            risk_level = ?report.risk_level,
            "Portfolio assessed"
        );
        Ok(report)
    }
}

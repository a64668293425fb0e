use std::collections::HashMap;

use chrono::NaiveDate;
use tads_models::{DecisionRecord, Language, Position, RiskReport};
use tads_risk::{distinct_symbols, RiskAggregator, RiskError};
use tracing::{info, warn};

use crate::batch::{BatchJob, BatchRunner};
use crate::error::TadsError;

/// Deliberate once per distinct position symbol, then assess the
/// portfolio against the resulting decisions.
///
/// A symbol whose run fails is assessed without a decision. An upstream
/// failure aborts the whole assessment.
pub async fn assess_portfolio(
    runner: &BatchRunner,
    aggregator: &RiskAggregator,
    positions: &[Position],
    as_of: NaiveDate,
    language: Language,
) -> Result<RiskReport, TadsError> {
    if positions.is_empty() {
        return Err(RiskError::EmptyPortfolio.into());
    }

    let jobs = distinct_symbols(positions)
        .into_iter()
        .map(|symbol| BatchJob::new(symbol, as_of, language))
        .collect();

    let mut decisions: HashMap<String, DecisionRecord> = HashMap::new();
    for outcome in runner.run(jobs).await {
        match outcome.result {
            Ok(state) => {
                if let Some(decision) = state.decision {
                    decisions.insert(outcome.symbol, decision);
                }
            }
            Err(e) if e.is_upstream() => return Err(e),
            Err(e) => {
                warn!(symbol = %outcome.symbol, error = %e, "No decision; assessing position without one");
            }
        }
    }
    info!(
        positions = positions.len(),
        decisions = decisions.len(),
        "Deliberations finished"
    );

    Ok(aggregator.assess(positions, &decisions, as_of).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tads_agents::test_support::{decision_json, scripted_orchestrator, Reply, ScriptRole, ScriptedBackend};
    use tads_agents::AgentError;
    use tads_models::{
        DailyClose, MarketSnapshot, PipelineConfig, PortfolioConfig, ProximityBand, RecommendedAction, Signal,
    };
    use tads_risk::StaticSource;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn config() -> PortfolioConfig {
        PortfolioConfig {
            launch_stagger_ms: 0,
            ..PortfolioConfig::default()
        }
    }

    fn snapshot(symbol: &str, sector: &str, close: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: symbol.to_string(),
            sector: sector.to_string(),
            beta: Some(1.0),
            closes: vec![DailyClose { date: as_of(), close }],
            earnings_date: None,
        }
    }

    fn setup(backend: ScriptedBackend) -> (Arc<ScriptedBackend>, BatchRunner, RiskAggregator) {
        let backend = Arc::new(backend);
        let runner = BatchRunner::new(
            scripted_orchestrator(Arc::clone(&backend), PipelineConfig::default()),
            &config(),
        );
        let source = Arc::new(StaticSource::new([
            snapshot("AAPL", "Technology", 99.0),
            snapshot("XOM", "Energy", 99.0),
        ]));
        let aggregator = RiskAggregator::new(source, &config());
        (backend, runner, aggregator)
    }

    #[tokio::test]
    async fn one_run_per_distinct_symbol() {
        let (backend, runner, aggregator) = setup(ScriptedBackend::new());
        let positions = vec![
            Position::parse("AAPL-LONG-1000-5-80").unwrap(),
            Position::parse("AAPL-NORMAL-500-1-0").unwrap(),
            Position::parse("XOM-NORMAL-1500-1-0").unwrap(),
        ];

        let report = assess_portfolio(&runner, &aggregator, &positions, as_of(), Language::En)
            .await
            .unwrap();

        assert_eq!(backend.calls(ScriptRole::RiskJudge), 2);
        assert_eq!(report.positions.len(), 3);
        let aapl = &report.positions[0];
        // The decision's price (100) beats the snapshot close.
        assert_eq!(aapl.reference_price, Some(100.0));
        assert_eq!(aapl.band, ProximityBand::Safe);
        assert_eq!(aapl.decision.as_ref().unwrap().signal, Signal::Long);
        assert_eq!(aapl.action, RecommendedAction::BuyMore);
    }

    #[tokio::test]
    async fn degraded_decisions_hold() {
        let backend = ScriptedBackend::new()
            .with(ScriptRole::RiskJudge, Reply::text("no json here"))
            .with(ScriptRole::MinimalJudge, Reply::text("still nothing"));
        let (_, runner, aggregator) = setup(backend);
        let positions = vec![Position::parse("XOM-LONG-1000-5-60").unwrap()];

        let report = assess_portfolio(&runner, &aggregator, &positions, as_of(), Language::En)
            .await
            .unwrap();

        let xom = &report.positions[0];
        assert!(xom.decision.as_ref().unwrap().unable_to_assess);
        assert_eq!(xom.action, RecommendedAction::Hold);
    }

    #[tokio::test]
    async fn opposed_strong_decision_sells() {
        let backend = ScriptedBackend::new()
            .with(ScriptRole::DirectionJudge, Reply::text("RECOMMENDATION: **SHORT**"))
            .with(ScriptRole::RiskJudge, Reply::text(decision_json("SHORT", 0.9)));
        let (_, runner, aggregator) = setup(backend);
        let positions = vec![Position::parse("AAPL-LONG-1000-5-50-20").unwrap()];

        let report = assess_portfolio(&runner, &aggregator, &positions, as_of(), Language::En)
            .await
            .unwrap();
        assert_eq!(report.positions[0].action, RecommendedAction::Sale);
    }

    #[tokio::test]
    async fn upstream_failure_aborts() {
        let backend = ScriptedBackend::new().with(
            ScriptRole::Bull,
            Reply::Fail(|| AgentError::Upstream("403 forbidden".into())),
        );
        let (_, runner, aggregator) = setup(backend);
        let positions = vec![Position::parse("AAPL-NORMAL-1000-1-0").unwrap()];

        let result = assess_portfolio(&runner, &aggregator, &positions, as_of(), Language::En).await;
        assert!(matches!(result, Err(ref e) if e.is_upstream()));
    }

    #[tokio::test]
    async fn empty_portfolio_is_rejected_before_any_call() {
        let (backend, runner, aggregator) = setup(ScriptedBackend::new());
        let result = assess_portfolio(&runner, &aggregator, &[], as_of(), Language::En).await;
        assert!(matches!(result, Err(TadsError::Risk(RiskError::EmptyPortfolio))));
        assert!(backend.requests().is_empty());
    }
}

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tads_models::deliberation::NO_DATA;
use tads_models::{
    DecisionRecord, DeliberationState, Direction, DirectionVerdict, Language, Phase, PipelineConfig,
    Role,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backend::GenerationRequest;
use crate::client::InferenceClient;
use crate::error::AgentError;
use crate::extract::{extract, extract_decision, extract_price_from_text, parse_direction_verdict};
use crate::prompts;
use crate::strategy::enrich_record;

/// Caller overrides for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunOptions {
    /// Replaces the directional judge.
    pub forced_direction: Option<Direction>,
    /// Authoritative USD price; skips the price lookup.
    pub price_hint: Option<f64>,
}

/// Drives one symbol through the phased deliberation.
///
/// Gathering, debate and risk-debate failures are absorbed into
/// placeholder text. Only upstream failures abort a run; an unusable
/// final judgment ends in a degraded record instead.
#[derive(Clone)]
pub struct Orchestrator {
    client: InferenceClient,
    config: PipelineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatherKind {
    Price,
    EurRate,
    Technical,
    News,
    Fundamentals,
}

#[derive(Debug, Deserialize)]
struct PriceReply {
    #[serde(default)]
    price_usd: Option<Value>,
    #[serde(default)]
    asset_name: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateReply {
    rate: Value,
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').replace(',', "").parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v > 0.0)
}

/// Price, asset name and source from the price lookup's answer.
pub fn parse_price_reply(text: &str) -> (Option<f64>, Option<String>, Option<String>) {
    match extract::<PriceReply>(text, false) {
        Ok(reply) => {
            let price = reply
                .price_usd
                .as_ref()
                .and_then(number)
                .or_else(|| extract_price_from_text(text));
            (price, reply.asset_name, reply.source)
        }
        Err(_) => (extract_price_from_text(text), None, Some("extracted".to_string())),
    }
}

/// USD per EUR from the rate lookup's answer. Implausible values are rejected.
pub fn parse_rate_reply(text: &str) -> Option<f64> {
    extract::<RateReply>(text, false)
        .ok()
        .and_then(|reply| number(&reply.rate))
        .or_else(|| extract_price_from_text(text))
        .filter(|rate| (0.5..=2.0).contains(rate))
}

/// The committed direction wins over a final judgment that flips it
/// from LONG to SHORT or back. HOLD and IGNORE pass through.
fn reconcile_direction(record: &mut DecisionRecord, state: &DeliberationState) {
    let (Some(committed), Some(judged)) = (state.direction(), record.signal.direction()) else {
        return;
    };
    if committed == Direction::Hold || judged != committed.opposite() {
        return;
    }
    warn!(
        symbol = %state.symbol,
        committed = committed.as_str(),
        judged = judged.as_str(),
        "Final judgment contradicts the committed direction; keeping the committed direction"
    );
    record.signal = committed.into();
    record.strategies = None;
}

/// Normalize a model-produced record against the run's state: invariants,
/// authoritative prices and barrier tiers.
pub fn finalize_decision(mut record: DecisionRecord, state: &DeliberationState) -> DecisionRecord {
    record.normalize();
    reconcile_direction(&mut record, state);
    record.apply_prices(state.current_price, state.eur_usd_rate);
    enrich_record(&mut record, &state.symbol);

    let violations = record.violations();
    if !violations.is_empty() {
        let found: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
        warn!(symbol = %state.symbol, violations = ?found, "Decision record still violates invariants");
    }
    record
}

impl Orchestrator {
    pub fn new(client: InferenceClient, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full deliberation for `symbol`. The returned state is in
    /// `Done` or `Degraded` and always carries a decision record.
    pub async fn run(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        language: Language,
        options: RunOptions,
    ) -> Result<DeliberationState, AgentError> {
        let start = Instant::now();
        let mut state = DeliberationState::new(symbol, as_of, language);
        info!(symbol = %state.symbol, run_id = %state.run_id, asset_class = state.asset_class.as_str(), "Starting deliberation");

        state.advance(Phase::Gather)?;
        self.gather(&mut state, options.price_hint).await?;

        for round in 1..=self.config.effective_rounds() {
            state.advance(Phase::Debate { round })?;
            self.debate_round(&mut state, round).await?;
        }

        state.advance(Phase::JudgeDirection)?;
        let direction = self.judge_direction(&mut state, options.forced_direction).await?;

        state.advance(Phase::RiskDebate)?;
        self.risk_debate(&mut state, direction).await?;

        state.advance(Phase::JudgeRisk)?;
        self.judge_risk(&mut state, direction).await?;

        let decision = state.decision.as_ref();
        info!(
            symbol = %state.symbol,
            phase = ?state.phase(),
            signal = decision.map(|d| d.signal.as_str()).unwrap_or("NONE"),
            confidence = decision.map(|d| d.confidence).unwrap_or(0.0),
            elapsed_ms = start.elapsed().as_millis(),
            "Deliberation complete"
        );
        Ok(state)
    }

    async fn gather(&self, state: &mut DeliberationState, price_hint: Option<f64>) -> Result<(), AgentError> {
        let as_of = state.as_of.to_string();
        let mut jobs: Vec<(GatherKind, String)> = vec![
            (GatherKind::EurRate, prompts::eur_rate_prompt(&as_of)),
            (GatherKind::Technical, prompts::technical_prompt(state)),
            (GatherKind::News, prompts::news_prompt(state)),
            (GatherKind::Fundamentals, prompts::fundamentals_prompt(state)),
        ];
        match price_hint.filter(|p| p.is_finite() && *p > 0.0) {
            Some(price) => {
                state.current_price = Some(price);
                state.context.price_source = Some("caller".to_string());
                debug!(symbol = %state.symbol, price, "Using caller price hint");
            }
            None => jobs.insert(0, (GatherKind::Price, prompts::price_prompt(&state.symbol, &as_of))),
        }

        let permits = Arc::new(Semaphore::new(self.config.max_parallel_calls.max(1)));
        let mut tasks = JoinSet::new();
        for (kind, prompt) in jobs {
            let client = self.client.clone();
            let permits = Arc::clone(&permits);
            let request = client.flash(prompt).grounded();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let started = Instant::now();
                let result = client.generate(&request).await;
                (kind, result, started.elapsed())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (kind, result, elapsed) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(symbol = %state.symbol, error = %e, "Gather task panicked");
                    continue;
                }
            };
            let text = match result {
                Ok(generated) => {
                    debug!(symbol = %state.symbol, kind = ?kind, elapsed_ms = elapsed.as_millis(), "Gathered");
                    generated.text
                }
                Err(e) if e.is_absorbable() => {
                    warn!(symbol = %state.symbol, kind = ?kind, error = %e, "Gathering failed; using placeholder");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match kind {
                GatherKind::Price => {
                    let (price, asset_name, source) = parse_price_reply(&text);
                    state.current_price = price;
                    state.context.asset_name = asset_name;
                    state.context.price_source = source;
                    if price.is_none() {
                        warn!(symbol = %state.symbol, "No price found in lookup answer");
                    }
                }
                GatherKind::EurRate => match parse_rate_reply(&text) {
                    Some(rate) => state.eur_usd_rate = rate,
                    None => warn!(symbol = %state.symbol, "No usable EUR/USD rate; using 1.0"),
                },
                GatherKind::Technical => state.context.technical = text,
                GatherKind::News => state.context.news = text,
                GatherKind::Fundamentals => state.context.fundamentals = text,
            }
        }

        info!(
            symbol = %state.symbol,
            price = ?state.current_price,
            eur_usd_rate = state.eur_usd_rate,
            "Gathering complete"
        );
        Ok(())
    }

    /// Generate text for one role, absorbing anything but upstream failures.
    async fn speak(&self, symbol: &str, role: Role, request: GenerationRequest) -> Result<String, AgentError> {
        let started = Instant::now();
        match self.client.generate(&request).await {
            Ok(result) => {
                info!(symbol, agent = role.label(), elapsed_ms = started.elapsed().as_millis(), "Agent succeeded");
                Ok(result.text)
            }
            Err(e) if e.is_absorbable() => {
                warn!(symbol, agent = role.label(), error = %e, elapsed_ms = started.elapsed().as_millis(), "Agent failed");
                Ok(NO_DATA.to_string())
            }
            Err(e) => Err(e),
        }
    }

    async fn debate_round(&self, state: &mut DeliberationState, round: u32) -> Result<(), AgentError> {
        let bull_prompt = prompts::bull_prompt(state, state.latest(Role::Bear));
        let bull = self
            .speak(&state.symbol, Role::Bull, self.client.flash(bull_prompt).grounded())
            .await?;
        state.record(Role::Bull, round, bull);

        let bear_prompt = prompts::bear_prompt(state, state.latest(Role::Bull));
        let bear = self
            .speak(&state.symbol, Role::Bear, self.client.flash(bear_prompt).grounded())
            .await?;
        state.record(Role::Bear, round, bear);
        Ok(())
    }

    async fn judge_direction(
        &self,
        state: &mut DeliberationState,
        forced: Option<Direction>,
    ) -> Result<Direction, AgentError> {
        if let Some(direction) = forced {
            let direction = state.set_direction(DirectionVerdict::Decided(direction))?;
            state.record(
                Role::DirectionJudge,
                0,
                format!("Direction set by caller override: RECOMMENDATION: **{}**", direction.as_str()),
            );
            info!(symbol = %state.symbol, direction = direction.as_str(), "Direction forced by caller");
            return Ok(direction);
        }

        let request = self.client.pro(prompts::direction_judge_prompt(state)).grounded();
        let verdict = match self.client.generate(&request).await {
            Ok(result) => {
                let verdict = parse_direction_verdict(&result.text);
                state.record(Role::DirectionJudge, 0, result.text);
                verdict
            }
            Err(e) if e.is_absorbable() => {
                warn!(symbol = %state.symbol, error = %e, "Direction judge failed");
                state.record(Role::DirectionJudge, 0, NO_DATA);
                DirectionVerdict::Ambiguous
            }
            Err(e) => return Err(e),
        };

        let direction = state.set_direction(verdict)?;
        if state.direction_ambiguous() {
            warn!(symbol = %state.symbol, "No decision marker in judge answer; treating as HOLD");
        }
        info!(symbol = %state.symbol, direction = direction.as_str(), ambiguous = state.direction_ambiguous(), "Direction decided");
        Ok(direction)
    }

    async fn risk_debate(&self, state: &mut DeliberationState, direction: Direction) -> Result<(), AgentError> {
        let risky_request = self.client.flash(prompts::risky_prompt(state, direction)).grounded();
        let risky = self.speak(&state.symbol, Role::Risky, risky_request).await?;

        let permits = Semaphore::new(self.config.max_parallel_calls.max(1));
        let safe_request = self.client.flash(prompts::safe_prompt(state, direction, &risky)).grounded();
        let neutral_request = self
            .client
            .flash(prompts::neutral_prompt(state, direction, &risky))
            .grounded();
        let (safe, neutral) = tokio::join!(
            async {
                let _permit = permits.acquire().await;
                self.speak(&state.symbol, Role::Safe, safe_request).await
            },
            async {
                let _permit = permits.acquire().await;
                self.speak(&state.symbol, Role::Neutral, neutral_request).await
            },
        );

        state.risk_arguments.risky = Some(risky);
        state.risk_arguments.safe = Some(safe?);
        state.risk_arguments.neutral = Some(neutral?);
        Ok(())
    }

    /// One schema-constrained judgment attempt. `Ok(None)` means the
    /// attempt produced nothing usable but the run may continue.
    async fn attempt_judgment(
        &self,
        symbol: &str,
        request: &GenerationRequest,
        attempt: &str,
    ) -> Result<Result<DecisionRecord, String>, AgentError> {
        match self.client.generate(request).await {
            Ok(result) => match extract_decision(&result.text, result.schema_enforced) {
                Ok(record) => Ok(Ok(record)),
                Err(failure) => {
                    warn!(symbol, attempt, error = %failure, "Risk judge answer not extractable");
                    Ok(Err(failure.to_string()))
                }
            },
            Err(e) if e.is_absorbable() => {
                warn!(symbol, attempt, error = %e, "Risk judge call failed");
                Ok(Err(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn judge_risk(&self, state: &mut DeliberationState, direction: Direction) -> Result<(), AgentError> {
        let symbol = state.symbol.clone();
        let full = self
            .client
            .pro(prompts::risk_judge_prompt(state, direction))
            .grounded()
            .with_schema(prompts::decision_schema());

        let mut outcome = self.attempt_judgment(&symbol, &full, "full").await?;
        if outcome.is_err() {
            let minimal = self
                .client
                .pro(prompts::minimal_judge_prompt(&symbol))
                .with_schema(prompts::decision_schema());
            outcome = self.attempt_judgment(&symbol, &minimal, "minimal").await?;
        }

        match outcome {
            Ok(record) => {
                state.decision = Some(finalize_decision(record, state));
                state.advance(Phase::Done)?;
            }
            Err(reason) => {
                warn!(symbol = %symbol, reason = %reason, "Final judgment failed twice; emitting degraded record");
                let mut record =
                    DecisionRecord::degraded(format!("Error: no valid decision record after retry ({reason})"));
                record.apply_prices(state.current_price, state.eur_usd_rate);
                state.decision = Some(record);
                state.advance(Phase::Degraded)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tads_models::{Signal, Timeframes};

    fn state() -> DeliberationState {
        let mut s = DeliberationState::new("AAPL", NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), Language::En);
        s.current_price = Some(100.0);
        s.eur_usd_rate = 1.25;
        s
    }

    fn raw(signal: Signal, confidence: f64) -> DecisionRecord {
        DecisionRecord {
            signal,
            confidence,
            unable_to_assess: false,
            unable_to_assess_reason: None,
            price_usd: Some(97.0),
            price_eur: None,
            strategies: None,
            hold_alternative: None,
            support_zones: vec![],
            resistance_zones: vec![],
            timeframes: Timeframes::default(),
            detailed_analysis: "analysis".into(),
        }
    }

    #[test]
    fn price_reply_json() {
        let (price, name, source) =
            parse_price_reply(r#"{"price_usd": 187.25, "asset_name": "Apple Inc.", "source": "yahoo.com"}"#);
        assert_eq!(price, Some(187.25));
        assert_eq!(name.as_deref(), Some("Apple Inc."));
        assert_eq!(source.as_deref(), Some("yahoo.com"));
    }

    #[test]
    fn price_reply_string_number_and_text_fallback() {
        assert_eq!(parse_price_reply(r#"{"price_usd": "$1,234.50"}"#).0, Some(1234.5));
        let (price, _, source) = parse_price_reply("Apple closed at $187.25 on Friday.");
        assert_eq!(price, Some(187.25));
        assert_eq!(source.as_deref(), Some("extracted"));
        assert_eq!(parse_price_reply("no idea").0, None);
    }

    #[test]
    fn rate_reply() {
        assert_eq!(parse_rate_reply(r#"{"rate": 1.08}"#), Some(1.08));
        assert_eq!(parse_rate_reply("EUR/USD is 1.09 today"), Some(1.09));
        assert_eq!(parse_rate_reply(r#"{"rate": 108}"#), None);
    }

    #[test]
    fn finalize_uses_authoritative_price_and_fills_tiers() {
        let record = finalize_decision(raw(Signal::Long, 80.0), &state());
        assert_eq!(record.price_usd, Some(100.0));
        assert_eq!(record.price_eur, Some(80.0));
        assert!((record.confidence - 0.8).abs() < 1e-9);
        let tiers = record.strategies.as_ref().unwrap();
        assert!(tiers.aggressive.ko_level < 100.0);
        assert!(record.violations().is_empty());
    }

    #[test]
    fn finalize_keeps_committed_direction_over_flipped_judgment() {
        let mut state = state();
        state.advance(Phase::JudgeDirection).unwrap();
        state.set_direction(DirectionVerdict::Decided(Direction::Short)).unwrap();

        let record = finalize_decision(raw(Signal::Long, 0.7), &state);
        assert_eq!(record.signal, Signal::Short);
        let tiers = record.strategies.as_ref().unwrap();
        assert!(tiers.aggressive.ko_level > 100.0);
        assert!(tiers.conservative.ko_level > tiers.aggressive.ko_level);
        assert!(record.violations().is_empty());
    }

    #[test]
    fn finalize_allows_hold_after_directional_verdict() {
        let mut state = state();
        state.advance(Phase::JudgeDirection).unwrap();
        state.set_direction(DirectionVerdict::Decided(Direction::Long)).unwrap();

        let record = finalize_decision(raw(Signal::Hold, 0.5), &state);
        assert_eq!(record.signal, Signal::Hold);
    }

    #[test]
    fn finalize_unable_forces_ignore() {
        let mut r = raw(Signal::Long, 0.9);
        r.unable_to_assess = true;
        let record = finalize_decision(r, &state());
        assert_eq!(record.signal, Signal::Ignore);
        assert_eq!(record.confidence, 0.0);
        assert!(record.strategies.is_none());
        assert!(record.violations().is_empty());
    }
}

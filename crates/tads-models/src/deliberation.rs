use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::decision::DecisionRecord;
use crate::signal::{AssetClass, Direction, Language};

/// Placeholder substituted for any context block that could not be gathered.
pub const NO_DATA: &str = "No data available.";

/// Pipeline phases. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Init,
    Gather,
    Debate { round: u32 },
    JudgeDirection,
    RiskDebate,
    JudgeRisk,
    Done,
    Degraded,
}

impl Phase {
    fn rank(self) -> (u8, u32) {
        match self {
            Phase::Init => (0, 0),
            Phase::Gather => (1, 0),
            Phase::Debate { round } => (2, round),
            Phase::JudgeDirection => (3, 0),
            Phase::RiskDebate => (4, 0),
            Phase::JudgeRisk => (5, 0),
            Phase::Done | Phase::Degraded => (6, 0),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Degraded)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Bull,
    Bear,
    DirectionJudge,
    Risky,
    Safe,
    Neutral,
    RiskJudge,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Bull => "Bull Analyst",
            Role::Bear => "Bear Analyst",
            Role::DirectionJudge => "Investment Judge",
            Role::Risky => "Aggressive Risk Analyst",
            Role::Safe => "Conservative Risk Analyst",
            Role::Neutral => "Neutral Risk Analyst",
            Role::RiskJudge => "Risk Judge",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub round: u32,
    pub text: String,
}

/// Text blocks collected during GATHER. Each is either model output or
/// a placeholder; none is ever empty.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GatheredContext {
    pub asset_name: Option<String>,
    pub price_source: Option<String>,
    pub technical: String,
    pub news: String,
    pub fundamentals: String,
}

impl Default for GatheredContext {
    fn default() -> Self {
        Self {
            asset_name: None,
            price_source: None,
            technical: NO_DATA.to_string(),
            news: NO_DATA.to_string(),
            fundamentals: NO_DATA.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RiskArguments {
    pub risky: Option<String>,
    pub safe: Option<String>,
    pub neutral: Option<String>,
}

/// Outcome of scanning the directional judge's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionVerdict {
    Decided(Direction),
    /// No marker found. Resolves to HOLD but stays observable.
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("illegal phase transition {from:?} -> {to:?}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("direction already decided as {0}")]
    DirectionAlreadySet(Direction),

    #[error("direction can only be set in JudgeDirection, not {0:?}")]
    DirectionOutsideJudgment(Phase),
}

/// Mutable aggregate owned by exactly one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct DeliberationState {
    pub run_id: Uuid,
    pub symbol: String,
    pub asset_class: AssetClass,
    pub as_of: NaiveDate,
    pub language: Language,
    pub current_price: Option<f64>,
    /// USD per EUR. 1.0 when unknown.
    pub eur_usd_rate: f64,
    pub context: GatheredContext,
    pub transcript: Vec<TranscriptEntry>,
    direction: Option<Direction>,
    direction_ambiguous: bool,
    pub risk_arguments: RiskArguments,
    pub decision: Option<DecisionRecord>,
    phase: Phase,
}

impl DeliberationState {
    pub fn new(symbol: &str, as_of: NaiveDate, language: Language) -> Self {
        let symbol = symbol.trim().to_uppercase();
        Self {
            run_id: Uuid::new_v4(),
            asset_class: AssetClass::classify(&symbol),
            symbol,
            as_of,
            language,
            current_price: None,
            eur_usd_rate: 1.0,
            context: GatheredContext::default(),
            transcript: Vec::new(),
            direction: None,
            direction_ambiguous: false,
            risk_arguments: RiskArguments::default(),
            decision: None,
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `next`. Backward moves, repeats, and leaving a terminal
    /// phase are rejected; the terminal phases are only reachable from
    /// JudgeRisk.
    pub fn advance(&mut self, next: Phase) -> Result<(), StateError> {
        let illegal = StateError::IllegalTransition {
            from: self.phase,
            to: next,
        };
        if self.phase.is_terminal() || next.rank() <= self.phase.rank() {
            return Err(illegal);
        }
        if next.is_terminal() && self.phase != Phase::JudgeRisk {
            return Err(illegal);
        }
        self.phase = next;
        Ok(())
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn direction_ambiguous(&self) -> bool {
        self.direction_ambiguous
    }

    /// Record the directional decision. Succeeds once per run.
    pub fn set_direction(&mut self, verdict: DirectionVerdict) -> Result<Direction, StateError> {
        if let Some(existing) = self.direction {
            return Err(StateError::DirectionAlreadySet(existing));
        }
        if self.phase != Phase::JudgeDirection {
            return Err(StateError::DirectionOutsideJudgment(self.phase));
        }
        let direction = match verdict {
            DirectionVerdict::Decided(direction) => direction,
            DirectionVerdict::Ambiguous => {
                self.direction_ambiguous = true;
                Direction::Hold
            }
        };
        self.direction = Some(direction);
        Ok(direction)
    }

    pub fn record(&mut self, role: Role, round: u32, text: impl Into<String>) {
        self.transcript.push(TranscriptEntry {
            role,
            round,
            text: text.into(),
        });
    }

    /// Most recent transcript text produced by `role`.
    pub fn latest(&self, role: Role) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|entry| entry.role == role)
            .map(|entry| entry.text.as_str())
    }

    /// Full transcript rendered for inclusion in a prompt.
    pub fn render_transcript(&self) -> String {
        let mut out = String::new();
        for entry in &self.transcript {
            if entry.round > 0 {
                out.push_str(&format!(
                    "### {} (round {})\n{}\n\n",
                    entry.role.label(),
                    entry.round,
                    entry.text.trim()
                ));
            } else {
                out.push_str(&format!("### {}\n{}\n\n", entry.role.label(), entry.text.trim()));
            }
        }
        out
    }

    pub fn price_eur(&self) -> Option<f64> {
        if self.eur_usd_rate <= 0.0 {
            return None;
        }
        self.current_price.map(|usd| usd / self.eur_usd_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DeliberationState {
        DeliberationState::new("aapl", NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), Language::En)
    }

    #[test]
    fn new_state_classifies_and_normalizes_symbol() {
        let s = state();
        assert_eq!(s.symbol, "AAPL");
        assert_eq!(s.asset_class, AssetClass::Stock);
        assert_eq!(s.phase(), Phase::Init);
        assert_eq!(s.context.technical, NO_DATA);
        assert!(s.direction().is_none());
    }

    #[test]
    fn phases_move_forward_only() {
        let mut s = state();
        s.advance(Phase::Gather).unwrap();
        s.advance(Phase::Debate { round: 1 }).unwrap();
        s.advance(Phase::Debate { round: 2 }).unwrap();
        assert!(s.advance(Phase::Debate { round: 1 }).is_err());
        assert!(s.advance(Phase::Gather).is_err());
        s.advance(Phase::JudgeDirection).unwrap();
        s.advance(Phase::RiskDebate).unwrap();
        s.advance(Phase::JudgeRisk).unwrap();
        s.advance(Phase::Degraded).unwrap();
        assert!(s.advance(Phase::Done).is_err());
    }

    #[test]
    fn terminal_only_from_judge_risk() {
        let mut s = state();
        s.advance(Phase::Gather).unwrap();
        assert!(matches!(
            s.advance(Phase::Done),
            Err(StateError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn direction_is_set_once() {
        let mut s = state();
        s.advance(Phase::Gather).unwrap();
        assert!(s
            .set_direction(DirectionVerdict::Decided(Direction::Long))
            .is_err());

        s.advance(Phase::JudgeDirection).unwrap();
        assert_eq!(
            s.set_direction(DirectionVerdict::Decided(Direction::Long))
                .unwrap(),
            Direction::Long
        );
        assert_eq!(
            s.set_direction(DirectionVerdict::Decided(Direction::Short)),
            Err(StateError::DirectionAlreadySet(Direction::Long))
        );
        assert_eq!(s.direction(), Some(Direction::Long));
    }

    #[test]
    fn ambiguous_verdict_resolves_to_flagged_hold() {
        let mut s = state();
        s.advance(Phase::JudgeDirection).unwrap();
        assert_eq!(
            s.set_direction(DirectionVerdict::Ambiguous).unwrap(),
            Direction::Hold
        );
        assert!(s.direction_ambiguous());
    }

    #[test]
    fn transcript_latest_and_render() {
        let mut s = state();
        s.record(Role::Bull, 1, "buy");
        s.record(Role::Bear, 1, "sell");
        s.record(Role::Bull, 2, "still buy");
        assert_eq!(s.latest(Role::Bull), Some("still buy"));
        assert_eq!(s.latest(Role::Risky), None);

        let rendered = s.render_transcript();
        assert!(rendered.contains("### Bull Analyst (round 2)\nstill buy"));
        assert!(rendered.find("buy").unwrap() < rendered.find("sell").unwrap());
    }

    #[test]
    fn eur_price_uses_rate() {
        let mut s = state();
        assert!(s.price_eur().is_none());
        s.current_price = Some(108.0);
        s.eur_usd_rate = 1.08;
        assert!((s.price_eur().unwrap() - 100.0).abs() < 1e-9);
    }
}

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signal::Direction;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionParseError {
    #[error("expected at least 5 '-' separated fields, got {0}")]
    TooFewFields(usize),

    #[error("unknown direction token: {0}")]
    UnknownDirection(String),

    #[error("field {field} is not a number: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("empty position name")]
    EmptyName,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionDirection {
    Long,
    Short,
    /// Unlevered holding.
    Normal,
}

impl PositionDirection {
    /// Market exposure of the position. NORMAL holdings are long exposure.
    pub fn exposure(self) -> Direction {
        match self {
            PositionDirection::Long | PositionDirection::Normal => Direction::Long,
            PositionDirection::Short => Direction::Short,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PositionDirection::Long => "LONG",
            PositionDirection::Short => "SHORT",
            PositionDirection::Normal => "NORMAL",
        }
    }
}

impl FromStr for PositionDirection {
    type Err = PositionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(PositionDirection::Long),
            "SHORT" => Ok(PositionDirection::Short),
            "NORMAL" => Ok(PositionDirection::Normal),
            other => Err(PositionParseError::UnknownDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            _ => None,
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::from_token(s).ok_or_else(|| format!("unknown currency: {s}"))
    }
}

/// A user-held position.
///
/// Encoded form: `NAME-DIRECTION-VALUE-FACTOR-BARRIER[-PERFORMANCE][-CURRENCY]`.
/// A doubled delimiter before the performance marks it negative
/// (`SILVER-LONG-956-4.16-78--15.5`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub label: String,
    pub direction: PositionDirection,
    pub value: Decimal,
    pub factor: Decimal,
    /// Knockout barrier; zero for unlevered positions.
    pub barrier: Decimal,
    pub performance: Option<Decimal>,
    pub currency: Currency,
}

const NEGATIVE_MARKER: char = '~';

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, PositionParseError> {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.strip_prefix(NEGATIVE_MARKER) {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let value = Decimal::from_str(digits).map_err(|_| PositionParseError::InvalidNumber {
        field,
        value: raw.replace(NEGATIVE_MARKER, "-"),
    })?;
    Ok(if negative { -value } else { value })
}

impl Position {
    pub fn parse(encoded: &str) -> Result<Self, PositionParseError> {
        let normalized = encoded.trim().replace("--", &format!("-{NEGATIVE_MARKER}"));
        let parts: Vec<&str> = normalized.split('-').collect();
        if parts.len() < 5 {
            return Err(PositionParseError::TooFewFields(parts.len()));
        }

        let label = parts[0].trim();
        if label.is_empty() {
            return Err(PositionParseError::EmptyName);
        }
        let direction: PositionDirection = parts[1].parse()?;
        let value = parse_decimal("value", parts[2])?;
        let factor = parse_decimal("factor", parts[3])?;
        let barrier = parse_decimal("barrier", parts[4])?;

        let mut performance = None;
        let mut currency = Currency::default();
        if let Some(sixth) = parts.get(5) {
            match Currency::from_token(sixth) {
                Some(c) => currency = c,
                None => {
                    performance = Some(parse_decimal("performance", sixth)?);
                    if let Some(c) = parts.get(6).and_then(|t| Currency::from_token(t)) {
                        currency = c;
                    }
                }
            }
        }

        Ok(Self {
            symbol: resolve_symbol(label),
            label: label.to_string(),
            direction,
            value,
            factor,
            barrier,
            performance,
            currency,
        })
    }

    /// Amount originally invested, recovered from the current value and
    /// the performance percentage.
    pub fn original_investment(&self) -> Option<Decimal> {
        let perf = self.performance?;
        let divisor = Decimal::ONE + perf / Decimal::ONE_HUNDRED;
        if divisor.is_zero() {
            return None;
        }
        Some(self.value / divisor)
    }

    pub fn has_barrier(&self) -> bool {
        self.direction != PositionDirection::Normal && self.barrier > Decimal::ZERO
    }

    /// `Some(true)` in profit, `Some(false)` at a loss, `None` when flat or unknown.
    pub fn in_profit(&self) -> Option<bool> {
        match self.performance {
            Some(p) if p > Decimal::ZERO => Some(true),
            Some(p) if p < Decimal::ZERO => Some(false),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        let mut out = format!(
            "{}-{}-{}-{}-{}",
            self.label,
            self.direction.as_str(),
            self.value.normalize(),
            self.factor.normalize(),
            self.barrier.normalize()
        );
        if let Some(perf) = self.performance {
            out.push_str(&format!("-{}", perf.normalize()));
        }
        out.push('-');
        out.push_str(self.currency.as_str());
        out
    }
}

impl FromStr for Position {
    type Err = PositionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Position::parse(s)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Map common display names to their market symbol; anything else is
/// used upper-cased as given.
pub fn resolve_symbol(name: &str) -> String {
    let upper = name.trim().to_uppercase();
    let mapped = match upper.as_str() {
        "SILVER" => "SI=F",
        "GOLD" => "GC=F",
        "OIL" => "CL=F",
        "COPPER" => "HG=F",
        "PLATINUM" => "PL=F",
        "PALLADIUM" => "PA=F",
        "BITCOIN" | "BTC" => "BTC-USD",
        "ETHEREUM" | "ETH" => "ETH-USD",
        _ => return upper,
    };
    mapped.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_minimal() {
        let p = Position::parse("AAPL-NORMAL-1000-1-0").unwrap();
        assert_eq!(p.symbol, "AAPL");
        assert_eq!(p.label, "AAPL");
        assert_eq!(p.direction, PositionDirection::Normal);
        assert_eq!(p.value, dec!(1000));
        assert_eq!(p.barrier, dec!(0));
        assert_eq!(p.performance, None);
        assert_eq!(p.currency, Currency::Usd);
        assert!(!p.has_barrier());
    }

    #[test]
    fn parse_with_performance_and_currency() {
        let p = Position::parse("SiemensEnergy-long-365-5.17-115-49.40-EUR").unwrap();
        assert_eq!(p.direction, PositionDirection::Long);
        assert_eq!(p.factor, dec!(5.17));
        assert_eq!(p.barrier, dec!(115));
        assert_eq!(p.performance, Some(dec!(49.40)));
        assert_eq!(p.currency, Currency::Eur);
        assert_eq!(p.symbol, "SIEMENSENERGY");
    }

    #[test]
    fn parse_negative_performance() {
        let p = Position::parse("SILVER-LONG-956-4.16-78--15.5").unwrap();
        assert_eq!(p.performance, Some(dec!(-15.5)));
        assert_eq!(p.symbol, "SI=F");
        assert_eq!(p.in_profit(), Some(false));
    }

    #[test]
    fn sixth_field_currency() {
        let p = Position::parse("GOLD-SHORT-500-10-2500-eur").unwrap();
        assert_eq!(p.currency, Currency::Eur);
        assert_eq!(p.performance, None);
    }

    #[test]
    fn rejects_unknown_direction() {
        assert_eq!(
            Position::parse("AAPL-BUY-1000-1-0"),
            Err(PositionParseError::UnknownDirection("BUY".into()))
        );
    }

    #[test]
    fn rejects_too_few_fields() {
        assert_eq!(
            Position::parse("AAPL-LONG-1000"),
            Err(PositionParseError::TooFewFields(3))
        );
    }

    #[test]
    fn rejects_non_numeric_value() {
        assert!(matches!(
            Position::parse("AAPL-LONG-lots-2-150"),
            Err(PositionParseError::InvalidNumber { field: "value", .. })
        ));
    }

    #[test]
    fn original_investment_recovery() {
        let p = Position::parse("SILVER-LONG-956-4.16-78-49.40").unwrap();
        let original = p.original_investment().unwrap();
        assert_eq!(original.round_dp(2), dec!(639.89));

        let wiped = Position::parse("X-LONG-0-2-10--100").unwrap();
        assert_eq!(wiped.original_investment(), None);

        let unknown = Position::parse("X-LONG-100-2-10").unwrap();
        assert_eq!(unknown.original_investment(), None);
    }

    #[test]
    fn encode_reparses_to_same_position() {
        let p = Position::parse("SILVER-LONG-956-4.16-78--15.5-EUR").unwrap();
        assert_eq!(p.encode(), "SILVER-LONG-956-4.16-78--15.5-EUR");
        assert_eq!(Position::parse(&p.encode()).unwrap(), p);
    }

    #[test]
    fn normal_counts_as_long_exposure() {
        assert_eq!(PositionDirection::Normal.exposure(), Direction::Long);
        assert_eq!(PositionDirection::Short.exposure(), Direction::Short);
    }
}

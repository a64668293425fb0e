use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Top-level recommendation carried by a decision record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Signal {
    Long,
    Short,
    Hold,
    Ignore,
}

impl Signal {
    /// The directional part of the signal. `Ignore` has none.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::Hold => Some(Direction::Hold),
            Signal::Ignore => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
            Signal::Hold => "HOLD",
            Signal::Ignore => "IGNORE",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Signal::Long),
            "SHORT" => Ok(Signal::Short),
            "HOLD" => Ok(Signal::Hold),
            "IGNORE" => Ok(Signal::Ignore),
            other => Err(format!("unknown signal: {other}")),
        }
    }
}

impl TryFrom<String> for Signal {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Direction> for Signal {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => Signal::Long,
            Direction::Short => Signal::Short,
            Direction::Hold => Signal::Hold,
        }
    }
}

/// Three-way directional outcome used by the directional judge and the
/// multi-horizon sub-signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Direction {
    Long,
    Short,
    #[default]
    Hold,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
            Direction::Hold => "HOLD",
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Hold => Direction::Hold,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            "HOLD" => Ok(Direction::Hold),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Deserialize a direction, mapping anything unrecognised to `Hold`.
pub(crate) fn lenient_direction<'de, D>(deserializer: D) -> Result<Direction, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or_default())
}

/// Coarse asset classification derived from the subject identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Stock,
    Commodity,
    Etf,
    Crypto,
}

const COMMODITIES: &[&str] = &["silver", "gold", "oil", "copper", "platinum", "palladium"];
const CRYPTO: &[&str] = &["btc", "eth", "bitcoin", "ethereum"];
const ETFS: &[&str] = &["spy", "qqq", "iwm", "dia", "voo", "vti", "arkk", "xlf", "xle"];

impl AssetClass {
    pub fn classify(symbol: &str) -> Self {
        let lower = symbol.trim().to_ascii_lowercase();
        if COMMODITIES.contains(&lower.as_str()) || lower.ends_with("=f") {
            AssetClass::Commodity
        } else if CRYPTO.contains(&lower.as_str()) || lower.ends_with("-usd") {
            AssetClass::Crypto
        } else if ETFS.contains(&lower.as_str()) {
            AssetClass::Etf
        } else {
            AssetClass::Stock
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetClass::Stock => "stock",
            AssetClass::Commodity => "commodity",
            AssetClass::Etf => "etf",
            AssetClass::Crypto => "crypto",
        }
    }
}

/// Output language for every generated text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
}

impl Language {
    /// Trailing prompt instruction, e.g. "Respond entirely in German."
    pub fn instruction(self, verb: &str) -> String {
        match self {
            Language::En => format!("{verb} entirely in English."),
            Language::De => format!("{verb} entirely in German."),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::De => "de",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "de" => Ok(Language::De),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

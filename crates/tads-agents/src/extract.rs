//! Recover structured JSON from free model text.
//!
//! Recovery is an ordered list of small strategies, each producing
//! candidate substrings. The first candidate that deserializes wins.

use serde::de::DeserializeOwned;
use tads_models::{DecisionRecord, Direction, DirectionVerdict};

use crate::error::ExtractionFailure;

/// A named recovery strategy.
pub struct Strategy {
    pub name: &'static str,
    pub candidates: fn(&str) -> Vec<String>,
}

/// Used only when the backend enforced the schema.
pub static DIRECT: Strategy = Strategy {
    name: "direct",
    candidates: direct,
};

/// Fallback strategies, in order of preference.
pub static FALLBACKS: [Strategy; 3] = [
    Strategy {
        name: "strip_fence",
        candidates: strip_fence,
    },
    Strategy {
        name: "brace_span",
        candidates: brace_span,
    },
    Strategy {
        name: "fenced_blocks",
        candidates: fenced_blocks,
    },
];

fn direct(text: &str) -> Vec<String> {
    vec![text.trim().to_string()]
}

/// The whole text, minus one enclosing code fence and its language tag.
pub fn strip_fence(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return vec![trimmed.to_string()];
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    vec![body.trim().to_string()]
}

/// The first balanced `{...}` span, then the widest first-`{`-to-last-`}` span.
pub fn brace_span(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(balanced) = first_balanced_object(text) {
        out.push(balanced);
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            let widest = text[start..=end].to_string();
            if !out.contains(&widest) {
                out.push(widest);
            }
        }
    }
    out
}

/// The body of every fenced block, in order of appearance.
pub fn fenced_blocks(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            break;
        };
        let inner = &after_open[..close];
        let body = match inner.find('\n') {
            Some(newline) if !inner[..newline].trim_start().starts_with('{') => &inner[newline + 1..],
            _ => inner,
        };
        out.push(body.trim().to_string());
        rest = &after_open[close + 3..];
    }
    out
}

/// Find the first balanced `{ ... }`, ignoring braces inside JSON strings.
fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' if start.is_some() => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Run the strategies in order and return the first candidate that
/// deserializes as `T`.
pub fn extract<T: DeserializeOwned>(text: &str, schema_enforced: bool) -> Result<T, ExtractionFailure> {
    let mut attempted = Vec::new();
    let mut last_error = None;

    let strategies = schema_enforced
        .then_some(&DIRECT)
        .into_iter()
        .chain(FALLBACKS.iter());

    for strategy in strategies {
        attempted.push(strategy.name);
        for candidate in (strategy.candidates)(text) {
            if candidate.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&candidate) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(format!("{}: {e}", strategy.name)),
            }
        }
    }

    Err(ExtractionFailure {
        attempted,
        input_len: text.len(),
        last_error,
    })
}

pub fn extract_decision(text: &str, schema_enforced: bool) -> Result<DecisionRecord, ExtractionFailure> {
    extract(text, schema_enforced)
}

const MARKERS: [(&str, Direction); 3] = [
    ("**LONG**", Direction::Long),
    ("**SHORT**", Direction::Short),
    ("**HOLD**", Direction::Hold),
];

/// Classify the directional judge's answer by the earliest bold marker.
pub fn parse_direction_verdict(text: &str) -> DirectionVerdict {
    let upper = text.to_uppercase();
    MARKERS
        .iter()
        .filter_map(|&(marker, direction)| upper.find(marker).map(|pos| (pos, direction)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, direction)| DirectionVerdict::Decided(direction))
        .unwrap_or(DirectionVerdict::Ambiguous)
}

/// First price-like number in free text. A `$`-prefixed number is
/// preferred over a bare one. Thousands separators are accepted.
pub fn extract_price_from_text(text: &str) -> Option<f64> {
    let numbers = number_tokens(text);
    numbers
        .iter()
        .find(|(dollar, _)| *dollar)
        .or_else(|| numbers.first())
        .map(|(_, value)| *value)
}

fn number_tokens(text: &str) -> Vec<(bool, f64)> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let dollar = i > 0 && bytes[i - 1] == b'$';
        let start = i;
        let mut seen_dot = false;
        while i < bytes.len() {
            let b = bytes[i];
            let next_is_digit = bytes.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if b.is_ascii_digit() || (b == b',' && next_is_digit) {
                i += 1;
            } else if b == b'.' && !seen_dot && next_is_digit {
                seen_dot = true;
                i += 1;
            } else {
                break;
            }
        }
        let token: String = text[start..i].chars().filter(|c| *c != ',').collect();
        if let Ok(value) = token.parse::<f64>() {
            if value > 0.0 {
                out.push((dollar, value));
            }
        }
    }
    out
}

//! Unit normalisation and limits parsing for catalog columns.
//!
//! The plant description spells units and limit ranges the way the building
//! automation vendor exported them. Both columns are free text; this module
//! owns the grammar that turns them into canonical units and numeric limits.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const PA_PER_BAR: f64 = 100_000.0;
const PA_PER_PSI: f64 = 6_894.757;

/// Convert a pressure in bar to Pa.
pub fn bar_to_pa(value: f64) -> f64 {
    value * PA_PER_BAR
}

/// Convert a pressure in PSI to Pa.
pub fn psi_to_pa(value: f64) -> f64 {
    value * PA_PER_PSI
}

/// Normalise a unit string from the catalog to a canonical unit name.
///
/// Returns `None` for unit spellings the catalog contract does not know.
pub fn normalize_unit(raw: &str) -> Option<&'static str> {
    match raw.trim() {
        "-" | "" => Some("unitless"),
        "°C" => Some("deg_C"),
        "bar" => Some("Pa"),
        "%" => Some("%"),
        "Hz" => Some("Hz"),
        "hr" => Some("h"),
        "%RH" => Some("%"),
        "m3/h" => Some("m3/h"),
        "LPM" | "l/m" => Some("l/min"),
        "PSI" => Some("Pa"),
        "KW" => Some("kW"),
        _ => None,
    }
}

/// Inclusive numeric limits of an item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub lower: f64,
    pub upper: f64,
}

impl Limits {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Whether `other` fits entirely inside these limits.
    pub fn encloses(&self, other: &Limits) -> bool {
        other.lower >= self.lower && other.upper <= self.upper
    }
}

impl std::fmt::Display for Limits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

fn range_pattern() -> &'static Regex {
    static RANGE_RE: OnceLock<Regex> = OnceLock::new();
    RANGE_RE.get_or_init(|| {
        Regex::new(
            r"^(-?\d+(?:\.\d+)?)(/| a | ?% a |°C a | bar a |%RH a | LPM a | PSI a | KW a | ppm a )(-?\d+(?:\.\d+)?)( ?%| ?°C| bar| hr|%RH| LPM| PSI| KW| ppm| Hz)?$",
        )
        .expect("static range pattern must compile")
    })
}

/// Parse the limits column.
///
/// Recognised spellings, matching what the vendor exports:
/// - `<n> a <m>` and `<n>/<m>`, with optional unit suffixes
/// - a single digit, meaning a percentage scale of 0 to 100
/// - enumerated integer lists such as `1,2,3,4,5,6`
/// - `true o false`, `-`, `-1` and the empty string, meaning no limits
///
/// Values spelled in bar or PSI are converted to Pa, so limits always match
/// the normalised unit of the same row.
pub fn parse_limits(raw: &str) -> Result<Option<Limits>, LimitsParseError> {
    let trimmed = raw.trim();

    if matches!(trimmed, "true o false" | "-" | "-1" | "") {
        return Ok(None);
    }

    if let Some(caps) = range_pattern().captures(trimmed) {
        let lower: f64 = caps[1].parse().map_err(|_| LimitsParseError::new(raw))?;
        let upper: f64 = caps[3].parse().map_err(|_| LimitsParseError::new(raw))?;
        return Ok(Some(convert_pressure(trimmed, lower, upper)));
    }

    if trimmed.len() == 1 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(Some(Limits::new(0.0, 100.0)));
    }

    if let Some(limits) = parse_enumeration(trimmed) {
        return Ok(Some(limits));
    }

    Err(LimitsParseError::new(raw))
}

/// Enumerated state lists (`1,2,3,4,5,6`) bound the value to the listed span.
fn parse_enumeration(raw: &str) -> Option<Limits> {
    let mut lower = i64::MAX;
    let mut upper = i64::MIN;
    for token in raw.split(',') {
        let value: i64 = token.trim().parse().ok()?;
        lower = lower.min(value);
        upper = upper.max(value);
    }
    if lower > upper {
        return None;
    }
    Some(Limits::new(lower as f64, upper as f64))
}

fn convert_pressure(raw: &str, lower: f64, upper: f64) -> Limits {
    if raw.contains("bar") {
        Limits::new(round1(bar_to_pa(lower)), round1(bar_to_pa(upper)))
    } else if raw.contains("PSI") {
        Limits::new(round1(psi_to_pa(lower)), round1(psi_to_pa(upper)))
    } else {
        Limits::new(lower, upper)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// A limits column value outside the known grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised limits spelling {value:?}")]
pub struct LimitsParseError {
    pub value: String,
}

impl LimitsParseError {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

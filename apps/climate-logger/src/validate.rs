//! Strict parsing of the untrusted `temperature`/`humidity` query values.
//!
//! Values end up as cells in a spreadsheet-style log, so anything that is not a
//! plain decimal literal is refused before it can reach storage. That covers
//! formula triggers (`=`, `@`, a leading sign followed by an expression) as well
//! as `Infinity`/`NaN` spellings.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("Missing or empty parameters")]
    MissingOrEmpty,
    #[error("Invalid numeric data")]
    InvalidNumeric,
    #[error("Non-finite numeric data")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Temperature,
    Humidity,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationResult {
    Valid { temperature: f64, humidity: f64 },
    Invalid { reason: RejectReason, field: Field },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }
}

/// Validates both fields; the result is all-or-nothing.
///
/// Missing/empty checks run over both fields before any numeric parsing, so a
/// request with a blank humidity and a garbage temperature reports
/// `MissingOrEmpty` on humidity.
pub fn validate(temperature: Option<&str>, humidity: Option<&str>) -> ValidationResult {
    let temperature = match present(temperature) {
        Some(raw) => raw,
        None => return invalid(RejectReason::MissingOrEmpty, Field::Temperature),
    };
    let humidity = match present(humidity) {
        Some(raw) => raw,
        None => return invalid(RejectReason::MissingOrEmpty, Field::Humidity),
    };

    let temperature = match parse_strict(temperature) {
        Ok(value) => value,
        Err(reason) => return invalid(reason, Field::Temperature),
    };
    let humidity = match parse_strict(humidity) {
        Ok(value) => value,
        Err(reason) => return invalid(reason, Field::Humidity),
    };

    ValidationResult::Valid {
        temperature,
        humidity,
    }
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.filter(|value| !value.is_empty())
}

fn invalid(reason: RejectReason, field: Field) -> ValidationResult {
    ValidationResult::Invalid { reason, field }
}

/// Parses `[+-]? (digits ('.' digits?)? | '.' digits)` and nothing else.
pub fn parse_strict(raw: &str) -> Result<f64, RejectReason> {
    if !is_decimal_literal(raw) {
        return Err(RejectReason::InvalidNumeric);
    }
    let value = raw
        .parse::<f64>()
        .map_err(|_| RejectReason::InvalidNumeric)?;
    if !value.is_finite() {
        return Err(RejectReason::NonFinite);
    }
    Ok(value)
}

fn is_decimal_literal(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let unsigned = match bytes.first() {
        Some(b'+') | Some(b'-') => &bytes[1..],
        _ => bytes,
    };

    let mut int_digits = 0usize;
    let mut frac_digits = 0usize;
    let mut seen_point = false;
    for &b in unsigned {
        match b {
            b'0'..=b'9' if seen_point => frac_digits += 1,
            b'0'..=b'9' => int_digits += 1,
            b'.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }

    int_digits + frac_digits > 0
}

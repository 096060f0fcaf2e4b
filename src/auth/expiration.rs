//! Human-readable token lifetimes.
//!
//! Lifetimes are written the way operators write them in config files:
//! `"24h"`, `"15m"`, `"2 days"`, `"1.5h"`, `"1ms"`. A bare number without a
//! unit is read as milliseconds. Integers coming from structured config (TOML
//! or JSON numbers) are read as seconds instead.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const SECOND: f64 = 1000.0;
const MINUTE: f64 = SECOND * 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;
const WEEK: f64 = DAY * 7.0;
const YEAR: f64 = DAY * 365.25;

const MAX_INPUT_LEN: usize = 100;

/// Error returned when a lifetime string cannot be understood.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpirationError {
    #[error("token expiration is empty")]
    Empty,

    #[error("token expiration is longer than {MAX_INPUT_LEN} characters")]
    TooLong,

    #[error("invalid token expiration '{0}': expected a number followed by an optional unit")]
    InvalidNumber(String),

    #[error("unknown time unit '{unit}' in token expiration '{input}'")]
    UnknownUnit { input: String, unit: String },
}

/// A token lifetime, keeping the text it was configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExpiration {
    raw: String,
    millis: i64,
}

impl TokenExpiration {
    /// Parses a lifetime string such as `"24h"`.
    pub fn parse(input: &str) -> Result<Self, ExpirationError> {
        let millis = parse_millis(input)?;
        Ok(Self {
            raw: input.to_string(),
            millis,
        })
    }

    /// A lifetime given as whole seconds.
    pub fn from_secs(secs: i64) -> Self {
        Self {
            raw: secs.to_string(),
            millis: secs.saturating_mul(1000),
        }
    }

    /// Lifetime in milliseconds. May be negative.
    pub fn as_millis(&self) -> i64 {
        self.millis
    }

    /// The text this lifetime was configured with.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Absolute timestamp (seconds) reached when this lifetime is added to `base`.
    ///
    /// Sub-second remainders are floored, so `"1ms"` added to `t` yields `t`.
    pub fn offset_from(&self, base: i64) -> i64 {
        base.saturating_add(self.millis.div_euclid(1000))
    }
}

impl Default for TokenExpiration {
    fn default() -> Self {
        Self {
            raw: "24h".to_string(),
            millis: (24.0 * HOUR) as i64,
        }
    }
}

impl fmt::Display for TokenExpiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TokenExpiration {
    type Err = ExpirationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TokenExpiration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for TokenExpiration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Seconds(i64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Seconds(secs) => Ok(TokenExpiration::from_secs(secs)),
            Repr::Text(text) => TokenExpiration::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

fn parse_millis(input: &str) -> Result<i64, ExpirationError> {
    if input.is_empty() {
        return Err(ExpirationError::Empty);
    }
    if input.len() > MAX_INPUT_LEN {
        return Err(ExpirationError::TooLong);
    }

    // Split "<number><spaces><unit>"; the number may carry a sign and a fraction.
    let number_end = input
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    let (number, rest) = input.split_at(number_end);
    let unit = rest.trim_start_matches(' ');

    if !is_valid_number(number) {
        return Err(ExpirationError::InvalidNumber(input.to_string()));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| ExpirationError::InvalidNumber(input.to_string()))?;

    let factor = unit_factor(&unit.to_ascii_lowercase()).ok_or_else(|| {
        ExpirationError::UnknownUnit {
            input: input.to_string(),
            unit: unit.to_string(),
        }
    })?;

    Ok((value * factor).round() as i64)
}

// Accepts "5", "-5", "1.5", ".5"; rejects "", "-", "1.", "1.2.3".
fn is_valid_number(number: &str) -> bool {
    let digits = number.strip_prefix('-').unwrap_or(number);
    match digits.split_once('.') {
        Some((whole, frac)) => {
            !frac.is_empty()
                && frac.bytes().all(|b| b.is_ascii_digit())
                && whole.bytes().all(|b| b.is_ascii_digit())
        }
        None => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
    }
}

fn unit_factor(unit: &str) -> Option<f64> {
    let factor = match unit {
        "years" | "year" | "yrs" | "yr" | "y" => YEAR,
        "weeks" | "week" | "w" => WEEK,
        "days" | "day" | "d" => DAY,
        "hours" | "hour" | "hrs" | "hr" | "h" => HOUR,
        "minutes" | "minute" | "mins" | "min" | "m" => MINUTE,
        "seconds" | "second" | "secs" | "sec" | "s" => SECOND,
        "milliseconds" | "millisecond" | "msecs" | "msec" | "ms" | "" => 1.0,
        _ => return None,
    };
    Some(factor)
}

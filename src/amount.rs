//! Monetary amounts.
//!
//! Jobcoin amounts travel as decimal strings on the wire and must not pick up
//! binary floating-point error across many small subtractions, so they are
//! stored as scaled integers and only ever compared against true zero.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fixed-point decimal with 8 decimal places, stored as a scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(i64);

/// Error parsing a decimal string into an [`Amount`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAmountError {
    #[error("empty amount")]
    Empty,

    #[error("invalid decimal string {0:?}")]
    Invalid(String),

    #[error("more than {max} fractional digits in {0:?}", max = Amount::DECIMALS)]
    TooPrecise(String),

    #[error("amount {0:?} out of range")]
    OutOfRange(String),
}

impl Amount {
    const DECIMALS: u32 = 8;
    const SCALE: i64 = 10_i64.pow(Self::DECIMALS);

    pub const ZERO: Amount = Amount(0);

    /// Convert from a float, rounding to the nearest representable value.
    /// Only meant for randomly sampled amounts, never for wire values.
    pub fn from_float(value: f64) -> Self {
        Amount((value * Self::SCALE as f64).round() as i64)
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn min(self, other: Self) -> Self {
        Amount(self.0.min(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        let frac = abs % Self::SCALE as u64;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{frac:0width$}", width = Self::DECIMALS as usize);
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAmountError::Empty);
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(ParseAmountError::Invalid(s.to_string()));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseAmountError::Invalid(s.to_string()));
        }
        if frac.len() > Self::DECIMALS as usize {
            let (keep, rest) = frac.split_at(Self::DECIMALS as usize);
            if rest.bytes().any(|b| b != b'0') {
                return Err(ParseAmountError::TooPrecise(s.to_string()));
            }
            // digits beyond the scale carry no information
            return Self::parse_parts(s, negative, whole, keep);
        }

        Self::parse_parts(s, negative, whole, frac)
    }
}

impl Amount {
    fn parse_parts(
        src: &str,
        negative: bool,
        whole: &str,
        frac: &str,
    ) -> Result<Self, ParseAmountError> {
        let out_of_range = || ParseAmountError::OutOfRange(src.to_string());

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| out_of_range())?
        };

        let mut frac_scaled = 0i64;
        for b in frac.bytes() {
            frac_scaled = frac_scaled * 10 + i64::from(b - b'0');
        }
        frac_scaled *= 10_i64.pow(Self::DECIMALS - frac.len() as u32);

        let scaled = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac_scaled))
            .ok_or_else(out_of_range)?;

        Ok(Amount(if negative { -scaled } else { scaled }))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

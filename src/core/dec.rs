//! Fixed-point decimal used for delegator shares and rates (commission, slash fractions).
//!
//! **Model:** `Dec` wraps a `u128` scaled by `10^DEC_PRECISION`. All arithmetic is integer and
//! checked; there is no float anywhere in the state transition path. Same inputs yield the same
//! outputs on every platform.
//!
//! Token amounts stay plain `u128` integers. `Dec` only appears where a value can be
//! fractional: share balances (exchange rates move with slashing) and rates in `[0, 1]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::StakingError;

/// Number of fractional decimal digits.
pub const DEC_PRECISION: u32 = 10;

/// Raw value of `1.0`.
pub const DEC_ONE_RAW: u128 = 10_000_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecError {
    #[error("decimal overflow")]
    Overflow,

    #[error("decimal underflow: {0} - {1}")]
    Underflow(Dec, Dec),

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid decimal '{0}'")]
    Parse(String),
}

impl From<DecError> for StakingError {
    fn from(err: DecError) -> Self {
        match err {
            DecError::Parse(_) => StakingError::Validation(err.to_string()),
            _ => StakingError::Precondition(format!("arithmetic: {}", err)),
        }
    }
}

/// Non-negative fixed-point decimal with ten fractional digits.
///
/// # Examples
/// ```
/// use staking_core::core::dec::Dec;
///
/// let half = Dec::with_prec(5, 1);
/// assert_eq!(half.to_string(), "0.5000000000");
/// assert_eq!(half.mul_int_floor(101).unwrap(), 50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Dec(u128);

impl Dec {
    pub const ZERO: Dec = Dec(0);
    pub const ONE: Dec = Dec(DEC_ONE_RAW);

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// `value × 10^-prec`. `prec` must not exceed `DEC_PRECISION`.
    pub const fn with_prec(value: u64, prec: u32) -> Self {
        Self(value as u128 * 10u128.pow(DEC_PRECISION - prec))
    }

    /// Whole-number decimal. Errors if `value` does not fit after scaling.
    pub fn from_int(value: u128) -> Result<Self, DecError> {
        value
            .checked_mul(DEC_ONE_RAW)
            .map(Self)
            .ok_or(DecError::Overflow)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Dec) -> Result<Dec, DecError> {
        self.0
            .checked_add(other.0)
            .map(Dec)
            .ok_or(DecError::Overflow)
    }

    pub fn checked_sub(self, other: Dec) -> Result<Dec, DecError> {
        self.0
            .checked_sub(other.0)
            .map(Dec)
            .ok_or(DecError::Underflow(self, other))
    }

    pub fn abs_diff(self, other: Dec) -> Dec {
        Dec(self.0.abs_diff(other.0))
    }

    /// `floor(self × amount)` as an integer token amount.
    pub fn mul_int_floor(&self, amount: u128) -> Result<u128, DecError> {
        let scaled = self.0.checked_mul(amount).ok_or(DecError::Overflow)?;
        Ok(scaled / DEC_ONE_RAW)
    }

    /// `self × num / den`, rounded down. Used to issue shares at an exchange rate.
    pub fn mul_ratio(&self, num: u128, den: u128) -> Result<Dec, DecError> {
        if den == 0 {
            return Err(DecError::DivisionByZero);
        }
        let scaled = self.0.checked_mul(num).ok_or(DecError::Overflow)?;
        Ok(Dec(scaled / den))
    }

    /// `floor(self / total × amount)`: the integer part of `amount` that `self` out of `total`
    /// entitles to. Used to redeem shares for tokens.
    pub fn portion_of(&self, amount: u128, total: Dec) -> Result<u128, DecError> {
        if total.is_zero() {
            return Err(DecError::DivisionByZero);
        }
        let scaled = self.0.checked_mul(amount).ok_or(DecError::Overflow)?;
        Ok(scaled / total.0)
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / DEC_ONE_RAW,
            self.0 % DEC_ONE_RAW,
            width = DEC_PRECISION as usize
        )
    }
}

impl FromStr for Dec {
    type Err = DecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || DecError::Parse(s.to_string());
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty()
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
            || frac_part.len() > DEC_PRECISION as usize
        {
            return Err(parse_err());
        }
        let int: u128 = int_part.parse().map_err(|_| parse_err())?;
        let frac: u128 = if frac_part.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac_part, width = DEC_PRECISION as usize);
            padded.parse().map_err(|_| parse_err())?
        };
        let whole = Dec::from_int(int)?;
        whole.checked_add(Dec(frac))
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

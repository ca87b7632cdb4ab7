//! Denominated token amounts. Staking only moves the bond denomination; other denominations may
//! sit in the account ledger but are never bonded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default bond denomination.
pub const DEFAULT_BOND_DENOM: &str = "steak";

/// An amount of a single denomination, in minimal units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Denominations are lowercase alphanumeric, 3 to 16 characters, starting with a letter.
    pub fn is_valid_denom(denom: &str) -> bool {
        let len_ok = (3..=16).contains(&denom.len());
        let first_ok = denom
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false);
        len_ok && first_ok && denom.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

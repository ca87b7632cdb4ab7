//! Validator records, commission and description metadata, and the share/token exchange rate.
//!
//! # Exchange rate
//! A validator backs `delegator_shares` with `tokens`. Delegating `amount` issues
//! `amount × delegator_shares / tokens` shares (1:1 while no shares exist); redeeming `s` shares
//! yields `floor(s × tokens / delegator_shares)` tokens. Redeeming every outstanding share
//! yields every remaining token, so no dust is left behind.

use serde::{Deserialize, Serialize};

use crate::core::dec::Dec;
use crate::core::handler::StakeError;
use crate::core::store::Address;
use crate::error::Result;

/// Description fields carrying this value are left unchanged by `EditValidator`.
pub const DO_NOT_MODIFY: &str = "[do-not-modify]";

pub const MAX_MONIKER_LEN: usize = 70;
pub const MAX_IDENTITY_LEN: usize = 3000;
pub const MAX_WEBSITE_LEN: usize = 140;
pub const MAX_DETAILS_LEN: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondStatus {
    Unbonded,
    Unbonding,
    Bonded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub moniker: String,
    pub identity: String,
    pub website: String,
    pub details: String,
}

impl Description {
    pub fn new(moniker: impl Into<String>) -> Self {
        Self {
            moniker: moniker.into(),
            ..Self::default()
        }
    }

    /// Returns `Err(field)` for the first field over its length limit.
    pub fn check_lengths(&self) -> std::result::Result<(), &'static str> {
        if self.moniker.len() > MAX_MONIKER_LEN {
            return Err("moniker");
        }
        if self.identity.len() > MAX_IDENTITY_LEN {
            return Err("identity");
        }
        if self.website.len() > MAX_WEBSITE_LEN {
            return Err("website");
        }
        if self.details.len() > MAX_DETAILS_LEN {
            return Err("details");
        }
        Ok(())
    }

    /// Applies an edit; fields set to `DO_NOT_MODIFY` keep their current value. The moniker can
    /// never be cleared, so an empty one is kept too.
    pub fn apply_edit(&self, edit: &Description) -> Description {
        let pick = |new: &String, old: &String| {
            if new == DO_NOT_MODIFY {
                old.clone()
            } else {
                new.clone()
            }
        };
        Description {
            moniker: if edit.moniker.is_empty() {
                self.moniker.clone()
            } else {
                pick(&edit.moniker, &self.moniker)
            },
            identity: pick(&edit.identity, &self.identity),
            website: pick(&edit.website, &self.website),
            details: pick(&edit.details, &self.details),
        }
    }
}

/// Commission rates as submitted with `CreateValidator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRates {
    pub rate: Dec,
    pub max_rate: Dec,
    pub max_change_rate: Dec,
}

impl CommissionRates {
    /// Relational bounds checked when the validator is created.
    pub fn validate(&self) -> std::result::Result<(), StakeError> {
        if self.max_rate > Dec::ONE {
            return Err(StakeError::InvalidCommission(format!(
                "max rate {} exceeds 1",
                self.max_rate
            )));
        }
        if self.rate > self.max_rate {
            return Err(StakeError::InvalidCommission(format!(
                "rate {} exceeds max rate {}",
                self.rate, self.max_rate
            )));
        }
        if self.max_change_rate > self.max_rate {
            return Err(StakeError::InvalidCommission(format!(
                "max change rate {} exceeds max rate {}",
                self.max_change_rate, self.max_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub rates: CommissionRates,
    /// Block time of the last rate change (creation counts as a change).
    pub update_time: u64,
}

impl Commission {
    /// Checks a rate change requested at block time `now`.
    pub fn validate_change(
        &self,
        new_rate: Dec,
        now: u64,
        change_interval_secs: u64,
    ) -> std::result::Result<(), StakeError> {
        if now.saturating_sub(self.update_time) < change_interval_secs {
            return Err(StakeError::CommissionUpdateTooSoon {
                last_update: self.update_time,
                now,
            });
        }
        if new_rate > self.rates.max_rate {
            return Err(StakeError::InvalidCommission(format!(
                "new rate {} exceeds max rate {}",
                new_rate, self.rates.max_rate
            )));
        }
        if new_rate.abs_diff(self.rates.rate) > self.rates.max_change_rate {
            return Err(StakeError::InvalidCommission(format!(
                "change from {} to {} exceeds max change rate {}",
                self.rates.rate, new_rate, self.rates.max_change_rate
            )));
        }
        Ok(())
    }
}

/// A validator record. Never removed from the store, even with zero shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: Address,
    /// Hex-encoded compressed secp256k1 consensus key.
    pub pub_key: String,
    pub status: BondStatus,
    pub jailed: bool,
    /// Tokens backing this validator's shares.
    pub tokens: u128,
    pub delegator_shares: Dec,
    pub description: Description,
    pub commission: Commission,
    pub bond_height: u64,
    pub unbonding_height: u64,
}

impl Validator {
    pub fn new(
        operator: Address,
        pub_key: String,
        description: Description,
        commission: Commission,
        height: u64,
    ) -> Self {
        Self {
            operator,
            pub_key,
            status: BondStatus::Bonded,
            jailed: false,
            tokens: 0,
            delegator_shares: Dec::ZERO,
            description,
            commission,
            bond_height: height,
            unbonding_height: 0,
        }
    }

    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }

    /// Shares issued for `amount` tokens at the current exchange rate.
    pub fn shares_for_tokens(&self, amount: u128) -> Result<Dec> {
        if self.delegator_shares.is_zero() {
            return Ok(Dec::from_int(amount)?);
        }
        if self.tokens == 0 {
            return Err(StakeError::InvalidExchangeRate(self.operator.clone()).into());
        }
        Ok(self.delegator_shares.mul_ratio(amount, self.tokens)?)
    }

    /// Tokens redeemed for `shares` at the current exchange rate.
    pub fn tokens_for_shares(&self, shares: Dec) -> Result<u128> {
        if shares == self.delegator_shares {
            return Ok(self.tokens);
        }
        Ok(shares.portion_of(self.tokens, self.delegator_shares)?)
    }

    /// Adds delegated tokens and returns the shares issued for them.
    pub fn add_tokens_from_delegation(&mut self, amount: u128) -> Result<Dec> {
        let issued = self.shares_for_tokens(amount)?;
        if issued.is_zero() {
            return Err(StakeError::DelegationTooSmall(amount).into());
        }
        self.tokens = self
            .tokens
            .checked_add(amount)
            .ok_or(StakeError::Overflow("validator tokens"))?;
        self.delegator_shares = self.delegator_shares.checked_add(issued)?;
        Ok(issued)
    }

    /// Removes delegator shares and returns the tokens they redeemed.
    pub fn remove_delegator_shares(&mut self, shares: Dec) -> Result<u128> {
        let tokens = self.tokens_for_shares(shares)?;
        self.delegator_shares = self.delegator_shares.checked_sub(shares)?;
        self.tokens -= tokens;
        Ok(tokens)
    }

    /// Removes tokens without burning shares (slashing). Returns the amount actually removed.
    pub fn remove_tokens(&mut self, amount: u128) -> u128 {
        let removed = amount.min(self.tokens);
        self.tokens -= removed;
        removed
    }
}

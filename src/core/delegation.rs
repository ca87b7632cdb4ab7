//! Delegation, unbonding-delegation and redelegation records.

use serde::{Deserialize, Serialize};

use crate::core::dec::Dec;
use crate::core::store::Address;

/// Shares a delegator holds with one validator. Zero-share records are removed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: Address,
    pub shares: Dec,
    /// Height of the last change.
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    pub creation_height: u64,
    pub completion_time: u64,
    pub initial_balance: u128,
    /// Tokens still to be released; may drop below `initial_balance` only through slashing.
    pub balance: u128,
}

/// Pending releases of unbonded tokens for one (delegator, validator) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: Address,
    pub validator: Address,
    pub entries: Vec<UnbondingEntry>,
}

impl UnbondingDelegation {
    pub fn new(delegator: Address, validator: Address) -> Self {
        Self {
            delegator,
            validator,
            entries: Vec::new(),
        }
    }

    pub fn add_entry(&mut self, creation_height: u64, completion_time: u64, balance: u128) {
        self.entries.push(UnbondingEntry {
            creation_height,
            completion_time,
            initial_balance: balance,
            balance,
        });
    }

    pub fn balance(&self) -> u128 {
        self.entries.iter().map(|e| e.balance).sum()
    }

    /// Removes entries with `completion_time <= now` and returns the tokens they release.
    pub fn remove_matured(&mut self, now: u64) -> u128 {
        let released = self
            .entries
            .iter()
            .filter(|e| e.completion_time <= now)
            .map(|e| e.balance)
            .sum();
        self.entries.retain(|e| e.completion_time > now);
        released
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedelegationEntry {
    pub creation_height: u64,
    pub completion_time: u64,
    pub initial_balance: u128,
    pub shares_dst: Dec,
}

/// Hold records for stake moved from `validator_src` to `validator_dst`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redelegation {
    pub delegator: Address,
    pub validator_src: Address,
    pub validator_dst: Address,
    pub entries: Vec<RedelegationEntry>,
}

impl Redelegation {
    pub fn new(delegator: Address, validator_src: Address, validator_dst: Address) -> Self {
        Self {
            delegator,
            validator_src,
            validator_dst,
            entries: Vec::new(),
        }
    }

    pub fn add_entry(
        &mut self,
        creation_height: u64,
        completion_time: u64,
        balance: u128,
        shares_dst: Dec,
    ) {
        self.entries.push(RedelegationEntry {
            creation_height,
            completion_time,
            initial_balance: balance,
            shares_dst,
        });
    }

    pub fn has_immature(&self, now: u64) -> bool {
        self.entries.iter().any(|e| e.completion_time > now)
    }

    pub fn remove_matured(&mut self, now: u64) {
        self.entries.retain(|e| e.completion_time > now);
    }
}

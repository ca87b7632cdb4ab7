//! Global consistency checks over a store.
//!
//! Checked periodically by the simulation harness; any violation is fatal.

use crate::core::dec::Dec;
use crate::core::store::Store;
use crate::core::validator::BondStatus;
use crate::error::{Result, StakingError};

/// Named invariant, used in logs and reports.
pub type Invariant = (&'static str, fn(&Store) -> Result<()>);

pub const ALL: [Invariant; 5] = [
    ("supply", supply_invariant),
    ("pool", pool_invariant),
    ("shares", shares_invariant),
    ("jailed", jailed_invariant),
    ("nonnegative-entries", entries_invariant),
];

fn violation(name: &str, detail: String) -> StakingError {
    StakingError::ConservationViolation(format!("invariant '{}' broken: {}", name, detail))
}

/// Total bond-denom supply equals `expected` (the genesis supply).
pub fn check_supply(store: &Store, expected: u128) -> Result<()> {
    let actual = store.total_supply()?;
    if actual != expected {
        return Err(violation(
            "supply",
            format!("expected {}, found {}", expected, actual),
        ));
    }
    Ok(())
}

/// Module pool never holds more than the supply tracked by the ledger plus the pool.
fn supply_invariant(store: &Store) -> Result<()> {
    let pool = store.pool().total()?;
    if pool > store.total_supply()? {
        return Err(violation("supply", format!("pool {} exceeds supply", pool)));
    }
    Ok(())
}

/// Bonded bucket = tokens of Bonded validators. Loose bucket = tokens of all other validators
/// plus pending unbonding balances.
fn pool_invariant(store: &Store) -> Result<()> {
    let mut bonded: u128 = 0;
    let mut loose: u128 = 0;
    for v in store.validators() {
        match v.status {
            BondStatus::Bonded => bonded = bonded.saturating_add(v.tokens),
            BondStatus::Unbonding | BondStatus::Unbonded => loose = loose.saturating_add(v.tokens),
        }
    }
    for ubd in store.unbonding_delegations() {
        loose = loose.saturating_add(ubd.balance());
    }

    let pool = store.pool();
    if pool.bonded_tokens != bonded {
        return Err(violation(
            "pool",
            format!("bonded pool {} != bonded validator tokens {}", pool.bonded_tokens, bonded),
        ));
    }
    if pool.loose_tokens != loose {
        return Err(violation(
            "pool",
            format!("loose pool {} != expected loose tokens {}", pool.loose_tokens, loose),
        ));
    }
    Ok(())
}

/// Each validator's share total equals the sum of its delegations' shares.
fn shares_invariant(store: &Store) -> Result<()> {
    for v in store.validators() {
        let mut sum = Dec::ZERO;
        for d in store.delegations_to(&v.operator) {
            sum = sum.checked_add(d.shares)?;
        }
        if sum != v.delegator_shares {
            return Err(violation(
                "shares",
                format!(
                    "validator {} has {} shares but delegations sum to {}",
                    v.operator, v.delegator_shares, sum
                ),
            ));
        }
        if v.delegator_shares.is_zero() && v.tokens > 0 {
            return Err(violation(
                "shares",
                format!("validator {} holds {} tokens without shares", v.operator, v.tokens),
            ));
        }
    }
    Ok(())
}

/// A jailed validator is never in the bonded set.
fn jailed_invariant(store: &Store) -> Result<()> {
    if let Some(v) = store.validators().find(|v| v.jailed && v.is_bonded()) {
        return Err(violation("jailed", format!("validator {} is jailed but bonded", v.operator)));
    }
    Ok(())
}

fn entries_invariant(store: &Store) -> Result<()> {
    let max = store.params().max_entries as usize;
    for ubd in store.unbonding_delegations() {
        if ubd.entries.len() > max || ubd.entries.iter().any(|e| e.balance > e.initial_balance) {
            return Err(violation(
                "nonnegative-entries",
                format!("unbonding {} -> {} has malformed entries", ubd.delegator, ubd.validator),
            ));
        }
    }
    for red in store.redelegations() {
        if red.entries.len() > max {
            return Err(violation(
                "nonnegative-entries",
                format!(
                    "redelegation {} {} -> {} exceeds max entries",
                    red.delegator, red.validator_src, red.validator_dst
                ),
            ));
        }
    }
    Ok(())
}

/// Runs every invariant plus the supply check against `expected_supply`.
pub fn check_all(store: &Store, expected_supply: u128) -> Result<()> {
    check_supply(store, expected_supply)?;
    for (_, check) in ALL.iter() {
        check(store)?;
    }
    Ok(())
}

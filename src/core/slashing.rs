//! Slashing: jailing, unjailing, double-sign evidence and liveness tracking.
//!
//! A jailed validator is demoted out of the bonded set (its tokens move from the bonded to the
//! loose pool bucket) until it unjails. Slashed tokens leave the validator without burning any
//! shares, so every delegator's claim shrinks proportionally; they are credited to the
//! `COMMUNITY_POOL_ADDRESS` ledger account so total supply is conserved.
//!
//! # Determinism
//! Slash amounts are `floor(tokens × fraction)`; all arithmetic is integer fixed-point.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::dec::Dec;
use crate::core::handler::{checked_time, Outcome};
use crate::core::msg::{JailReason, MsgJail, MsgKind, MsgSubmitEvidence, MsgUnjail};
use crate::core::store::{Address, Store, COMMUNITY_POOL_ADDRESS};
use crate::core::validator::{BondStatus, Validator};
use crate::core::BlockContext;
use crate::error::{Result, StakingError};

pub const SIDE_CHAIN_ID_BSC: i64 = 56;
pub const SIDE_CHAIN_ID_TEST: i64 = 97;

/// Resolves a side-chain name (case-insensitive) to its numeric id.
pub fn side_chain_id_from_text(name: &str) -> std::result::Result<i64, SlashingError> {
    match name.to_ascii_lowercase().as_str() {
        "bsc" => Ok(SIDE_CHAIN_ID_BSC),
        "test" => Ok(SIDE_CHAIN_ID_TEST),
        _ => Err(SlashingError::InvalidSideChainId(name.to_string())),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlashingError {
    #[error("'{0}' is not a valid side chain id")]
    InvalidSideChainId(String),

    #[error("validator {0} not found")]
    ValidatorNotFound(Address),

    #[error("no signing info for validator {0}")]
    MissingSigningInfo(Address),

    #[error("validator {0} is not jailed")]
    NotJailed(Address),

    #[error("validator still jailed until {until} (now {now})")]
    JailPeriodActive { until: u64, now: u64 },

    #[error("self delegation {self_bond} below minimum {min}")]
    SelfBondTooLow { self_bond: u128, min: u128 },

    #[error("evidence height {height} is beyond current height {current}")]
    EvidenceFromFuture { height: u64, current: u64 },

    #[error("evidence height {height} precedes validator start height {start}")]
    EvidenceBeforeStart { height: u64, start: u64 },

    #[error("evidence is {age}s old, max age is {max}s")]
    EvidenceTooOld { age: u64, max: u64 },

    #[error("infraction at height {height} already covered by slash at height {last}")]
    AlreadySlashed { height: u64, last: u64 },
}

impl From<SlashingError> for StakingError {
    fn from(err: SlashingError) -> Self {
        match err {
            SlashingError::InvalidSideChainId(_) => StakingError::Validation(err.to_string()),
            _ => StakingError::Precondition(err.to_string()),
        }
    }
}

/// Per-validator liveness and jail bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningInfo {
    /// Height at which the validator was created.
    pub start_height: u64,
    /// Number of blocks recorded since the last reset; `index_offset % window` is the next slot.
    pub index_offset: u64,
    pub missed_blocks_counter: u64,
    /// Missed-block bit per window slot, grown lazily.
    pub missed_blocks: Vec<bool>,
    /// Block time before which unjail is rejected.
    pub jailed_until: u64,
    /// Height of the most recent slashed double-sign.
    pub last_infraction_height: Option<u64>,
}

impl SigningInfo {
    pub fn new(start_height: u64) -> Self {
        Self {
            start_height,
            ..Self::default()
        }
    }

    fn reset_liveness(&mut self) {
        self.index_offset = 0;
        self.missed_blocks_counter = 0;
        self.missed_blocks.clear();
    }
}

pub fn init_signing_info(store: &mut Store, validator: &str, height: u64) {
    store.set_signing_info(validator, SigningInfo::new(height));
}

fn load_validator(store: &Store, operator: &str) -> std::result::Result<Validator, SlashingError> {
    store
        .validator(operator)
        .cloned()
        .ok_or_else(|| SlashingError::ValidatorNotFound(operator.to_string()))
}

/// Demotes a validator out of the bonded set and marks it jailed.
fn jail_validator(store: &mut Store, ctx: &BlockContext, validator: &mut Validator) -> Result<()> {
    if validator.is_bonded() {
        store.pool_mut().transfer(true, false, validator.tokens)?;
        validator.status = BondStatus::Unbonding;
        validator.unbonding_height = ctx.height;
    }
    validator.jailed = true;
    Ok(())
}

/// Removes `floor(tokens × fraction)` from the validator and credits it to the community pool.
fn slash_validator(store: &mut Store, validator: &mut Validator, fraction: Dec) -> Result<u128> {
    let amount = fraction.mul_int_floor(validator.tokens)?;
    let removed = validator.remove_tokens(amount);
    store.pool_mut().remove(validator.is_bonded(), removed)?;
    let denom = store.bond_denom().to_string();
    store.add_balance(COMMUNITY_POOL_ADDRESS, &denom, removed)?;
    Ok(removed)
}

pub fn handle_jail(store: &mut Store, ctx: &BlockContext, msg: &MsgJail) -> Result<Outcome> {
    let mut validator = load_validator(store, &msg.validator)?;
    let outcome = Outcome::new(MsgKind::Jail, "jail")
        .tag("validator", &msg.validator)
        .tag("reason", msg.reason);
    if validator.jailed {
        return Ok(outcome.unchanged());
    }

    let params = &store.params().slashing;
    let duration = match msg.reason {
        JailReason::Downtime => params.downtime_jail_duration_secs,
        JailReason::Misbehaviour => params.double_sign_jail_duration_secs,
    };
    let until = checked_time(ctx.time, duration)?;

    jail_validator(store, ctx, &mut validator)?;
    let mut info = store
        .signing_info(&msg.validator)
        .cloned()
        .unwrap_or_else(|| SigningInfo::new(ctx.height));
    info.jailed_until = info.jailed_until.max(until);
    store.set_signing_info(&msg.validator, info);
    store.set_validator(validator);

    info!(validator = %msg.validator, reason = %msg.reason, until, "validator jailed");
    Ok(outcome.tag("jailed-until", until))
}

pub fn handle_unjail(store: &mut Store, ctx: &BlockContext, msg: &MsgUnjail) -> Result<Outcome> {
    let mut validator = load_validator(store, &msg.validator)?;
    if !validator.jailed {
        return Err(SlashingError::NotJailed(msg.validator.clone()).into());
    }

    let self_bond = match store.delegation(&msg.validator, &msg.validator) {
        Some(d) => validator.tokens_for_shares(d.shares)?,
        None => 0,
    };
    let min = store.params().min_self_delegation;
    if self_bond < min {
        return Err(SlashingError::SelfBondTooLow { self_bond, min }.into());
    }

    let info = store
        .signing_info(&msg.validator)
        .ok_or_else(|| SlashingError::MissingSigningInfo(msg.validator.clone()))?;
    if ctx.time < info.jailed_until {
        return Err(SlashingError::JailPeriodActive {
            until: info.jailed_until,
            now: ctx.time,
        }
        .into());
    }

    store.pool_mut().transfer(false, true, validator.tokens)?;
    validator.jailed = false;
    validator.status = BondStatus::Bonded;
    validator.bond_height = ctx.height;
    store.set_validator(validator);

    info!(validator = %msg.validator, "validator unjailed");
    Ok(Outcome::new(MsgKind::Unjail, "unjail").tag("validator", &msg.validator))
}

pub fn handle_submit_evidence(
    store: &mut Store,
    ctx: &BlockContext,
    msg: &MsgSubmitEvidence,
) -> Result<Outcome> {
    let evidence = &msg.evidence;
    let side_chain_id = evidence
        .side_chain
        .as_deref()
        .map(side_chain_id_from_text)
        .transpose()?;

    let mut validator = load_validator(store, &evidence.validator)?;
    let mut info = store
        .signing_info(&evidence.validator)
        .cloned()
        .ok_or_else(|| SlashingError::MissingSigningInfo(evidence.validator.clone()))?;

    if evidence.height > ctx.height || evidence.time > ctx.time {
        return Err(SlashingError::EvidenceFromFuture {
            height: evidence.height,
            current: ctx.height,
        }
        .into());
    }
    if evidence.height < info.start_height {
        return Err(SlashingError::EvidenceBeforeStart {
            height: evidence.height,
            start: info.start_height,
        }
        .into());
    }
    let params = store.params().slashing.clone();
    let age = ctx.time - evidence.time;
    if age > params.max_evidence_age_secs {
        return Err(SlashingError::EvidenceTooOld {
            age,
            max: params.max_evidence_age_secs,
        }
        .into());
    }
    if let Some(last) = info.last_infraction_height {
        if evidence.height <= last {
            return Err(SlashingError::AlreadySlashed {
                height: evidence.height,
                last,
            }
            .into());
        }
    }

    let until = checked_time(ctx.time, params.double_sign_jail_duration_secs)?;

    // Slash first: the pool bucket depends on the pre-jail status.
    let slashed = slash_validator(store, &mut validator, params.slash_fraction_double_sign)?;
    if !validator.jailed {
        jail_validator(store, ctx, &mut validator)?;
    }
    info.jailed_until = info.jailed_until.max(until);
    info.last_infraction_height = Some(evidence.height);
    store.set_signing_info(&evidence.validator, info);
    store.set_validator(validator);

    info!(
        validator = %evidence.validator,
        height = evidence.height,
        slashed,
        "double-sign evidence handled"
    );
    let mut outcome = Outcome::new(MsgKind::SubmitEvidence, "submit_evidence")
        .tag("validator", &evidence.validator)
        .tag("slashed", slashed)
        .tag("jailed-until", until);
    if let Some(id) = side_chain_id {
        outcome = outcome.tag("side-chain-id", id);
    }
    Ok(outcome)
}

/// Records whether a bonded validator signed the current block. Jails and slashes it for downtime
/// once it has missed more than the allowed number of blocks in the window. Returns true if the
/// validator was jailed.
pub fn handle_validator_signature(
    store: &mut Store,
    ctx: &BlockContext,
    operator: &str,
    signed: bool,
) -> Result<bool> {
    let params = store.params().slashing.clone();
    let window = params.signed_blocks_window;
    let max_missed = params.max_missed_blocks()?;

    let mut info = store
        .signing_info(operator)
        .cloned()
        .ok_or_else(|| SlashingError::MissingSigningInfo(operator.to_string()))?;

    let index = (info.index_offset % window) as usize;
    info.index_offset += 1;
    if info.missed_blocks.len() <= index {
        info.missed_blocks.resize(index + 1, false);
    }
    let previous = info.missed_blocks[index];
    if !signed && !previous {
        info.missed_blocks[index] = true;
        info.missed_blocks_counter += 1;
    } else if signed && previous {
        info.missed_blocks[index] = false;
        info.missed_blocks_counter -= 1;
    }
    if !signed {
        debug!(validator = operator, missed = info.missed_blocks_counter, "block missed");
    }

    // Block processing cannot fail a message, so oversized windows and durations saturate.
    let min_height = info.start_height.saturating_add(window);
    let mut jailed = false;
    if ctx.height > min_height && info.missed_blocks_counter > max_missed {
        let mut validator = load_validator(store, operator)?;
        if !validator.jailed {
            let slashed =
                slash_validator(store, &mut validator, params.slash_fraction_downtime)?;
            jail_validator(store, ctx, &mut validator)?;
            let until = ctx.time.saturating_add(params.downtime_jail_duration_secs);
            info.jailed_until = info.jailed_until.max(until);
            info.reset_liveness();
            store.set_validator(validator);
            info!(
                validator = operator,
                slashed,
                height = ctx.height,
                "validator jailed for downtime"
            );
            jailed = true;
        }
    }
    store.set_signing_info(operator, info);
    Ok(jailed)
}

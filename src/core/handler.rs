//! Transition engine: applies one validated message to a store.
//!
//! Every operation receives an explicit `&mut Store` and the current `BlockContext` and either
//! returns an `Outcome` or an error. Operations may write to the store before discovering a
//! failing precondition; callers run them against a speculative view (see `execution`) so a
//! failure never reaches the backing store.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::core::dec::Dec;
use crate::core::delegation::{Delegation, Redelegation, UnbondingDelegation};
use crate::core::msg::{
    Msg, MsgBeginRedelegate, MsgBeginUnbonding, MsgCreateValidator, MsgDelegate, MsgEditValidator,
    MsgKind,
};
use crate::core::slashing;
use crate::core::store::{Address, Store};
use crate::core::validator::{Commission, Description, Validator};
use crate::core::BlockContext;
use crate::error::{Result, StakingError};

/// Errors produced by stake transitions. All of them are precondition failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakeError {
    #[error("validator {0} already exists")]
    ValidatorExists(Address),

    #[error("consensus key {0} already in use")]
    PubKeyInUse(String),

    #[error("validator {0} not found")]
    ValidatorNotFound(Address),

    #[error("invalid coin denomination: expected {expected}, got {got}")]
    BadDenom { expected: String, got: String },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },

    #[error("no delegation from {delegator} to {validator}")]
    NoDelegation { delegator: Address, validator: Address },

    #[error("insufficient shares: required {required}, available {available}")]
    InsufficientShares { required: Dec, available: Dec },

    #[error("invalid commission: {0}")]
    InvalidCommission(String),

    #[error("commission already changed this interval (last {last_update}, now {now})")]
    CommissionUpdateTooSoon { last_update: u64, now: u64 },

    #[error("validator {0} has no tokens backing its shares")]
    InvalidExchangeRate(Address),

    #[error("delegation of {0} tokens issues no shares")]
    DelegationTooSmall(u128),

    #[error("redeeming {0} shares yields no tokens")]
    ZeroTokens(Dec),

    #[error("cannot redelegate to the same validator")]
    SelfRedelegation,

    #[error("redelegation to this validator is still maturing")]
    TransitiveRedelegation,

    #[error("too many pending entries (max {0})")]
    MaxEntries(u16),

    #[error("pool underflow: removing {amount} (bonded bucket: {bonded})")]
    PoolUnderflow { bonded: bool, amount: u128 },

    #[error("{0} overflow")]
    Overflow(&'static str),
}

impl From<StakeError> for StakingError {
    fn from(err: StakeError) -> Self {
        StakingError::Precondition(err.to_string())
    }
}

/// Successful result of a transition: a diagnostic tag list plus whether anything changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub kind: MsgKind,
    /// Ordered `(key, value)` tags, starting with `("action", ...)`.
    pub tags: Vec<(String, String)>,
    /// False for idempotent operations that left the store untouched.
    pub changed: bool,
}

impl Outcome {
    pub fn new(kind: MsgKind, action: &str) -> Self {
        Self {
            kind,
            tags: vec![("action".to_string(), action.to_string())],
            changed: true,
        }
    }

    pub fn tag(mut self, key: &str, value: impl ToString) -> Self {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }

    pub fn unchanged(mut self) -> Self {
        self.changed = false;
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Central dispatcher: one transition per message variant.
pub fn handle(store: &mut Store, ctx: &BlockContext, msg: &Msg) -> Result<Outcome> {
    match msg {
        Msg::CreateValidator(m) => handle_create_validator(store, ctx, m),
        Msg::EditValidator(m) => handle_edit_validator(store, ctx, m),
        Msg::Delegate(m) => handle_delegate(store, ctx, m),
        Msg::BeginUnbonding(m) => handle_begin_unbonding(store, ctx, m),
        Msg::BeginRedelegate(m) => handle_begin_redelegate(store, ctx, m),
        Msg::Jail(m) => slashing::handle_jail(store, ctx, m),
        Msg::Unjail(m) => slashing::handle_unjail(store, ctx, m),
        Msg::SubmitEvidence(m) => slashing::handle_submit_evidence(store, ctx, m),
    }
}

/// `time + secs` for completion and jail-release times. Fails instead of wrapping.
pub(crate) fn checked_time(time: u64, secs: u64) -> std::result::Result<u64, StakeError> {
    time.checked_add(secs).ok_or(StakeError::Overflow("block time"))
}

fn load_validator(store: &Store, operator: &str) -> Result<Validator> {
    store
        .validator(operator)
        .cloned()
        .ok_or_else(|| StakeError::ValidatorNotFound(operator.to_string()).into())
}

fn check_denom(store: &Store, denom: &str) -> Result<()> {
    if denom != store.bond_denom() {
        return Err(StakeError::BadDenom {
            expected: store.bond_denom().to_string(),
            got: denom.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Moves `amount` from the delegator's account into the validator and returns the issued shares.
fn delegate(
    store: &mut Store,
    ctx: &BlockContext,
    delegator: &str,
    validator_addr: &str,
    amount: u128,
) -> Result<Dec> {
    let mut validator = load_validator(store, validator_addr)?;
    let denom = store.bond_denom().to_string();
    store.sub_balance(delegator, &denom, amount)?;

    let issued = validator.add_tokens_from_delegation(amount)?;
    store.pool_mut().add(validator.is_bonded(), amount)?;

    let mut delegation = store
        .delegation(delegator, validator_addr)
        .cloned()
        .unwrap_or_else(|| Delegation {
            delegator: delegator.to_string(),
            validator: validator_addr.to_string(),
            shares: Dec::ZERO,
            height: ctx.height,
        });
    delegation.shares = delegation.shares.checked_add(issued)?;
    delegation.height = ctx.height;

    store.set_validator(validator);
    store.set_delegation(delegation);
    Ok(issued)
}

/// Burns `shares` of a delegation and returns the tokens they redeemed from the validator.
/// The redeemed tokens leave the validator's pool bucket; the caller decides where they go.
fn unbond(
    store: &mut Store,
    ctx: &BlockContext,
    delegator: &str,
    validator_addr: &str,
    shares: Dec,
) -> Result<u128> {
    let mut delegation = store
        .delegation(delegator, validator_addr)
        .cloned()
        .ok_or_else(|| StakeError::NoDelegation {
            delegator: delegator.to_string(),
            validator: validator_addr.to_string(),
        })?;
    if delegation.shares < shares {
        return Err(StakeError::InsufficientShares {
            required: shares,
            available: delegation.shares,
        }
        .into());
    }
    let mut validator = load_validator(store, validator_addr)?;
    let tokens = validator.remove_delegator_shares(shares)?;
    store.pool_mut().remove(validator.is_bonded(), tokens)?;

    delegation.shares = delegation.shares.checked_sub(shares)?;
    delegation.height = ctx.height;
    store.set_delegation(delegation);
    store.set_validator(validator);
    Ok(tokens)
}

pub fn handle_create_validator(
    store: &mut Store,
    ctx: &BlockContext,
    msg: &MsgCreateValidator,
) -> Result<Outcome> {
    if store.validator(&msg.validator).is_some() {
        return Err(StakeError::ValidatorExists(msg.validator.clone()).into());
    }
    if store.validator_by_pub_key(&msg.pub_key).is_some() {
        return Err(StakeError::PubKeyInUse(msg.pub_key.clone()).into());
    }
    check_denom(store, &msg.self_delegation.denom)?;
    msg.commission.validate()?;

    let validator = Validator::new(
        msg.validator.clone(),
        msg.pub_key.clone(),
        msg.description.clone(),
        Commission {
            rates: msg.commission,
            update_time: ctx.time,
        },
        ctx.height,
    );
    store.set_validator(validator);
    slashing::init_signing_info(store, &msg.validator, ctx.height);

    let shares = delegate(
        store,
        ctx,
        &msg.delegator,
        &msg.validator,
        msg.self_delegation.amount,
    )?;
    debug!(validator = %msg.validator, %shares, "validator created");

    Ok(Outcome::new(MsgKind::CreateValidator, "create_validator")
        .tag("validator", &msg.validator)
        .tag("moniker", &msg.description.moniker)
        .tag("shares", shares))
}

pub fn handle_edit_validator(
    store: &mut Store,
    ctx: &BlockContext,
    msg: &MsgEditValidator,
) -> Result<Outcome> {
    let mut validator = load_validator(store, &msg.validator)?;

    if msg.description != Description::default() {
        validator.description = validator.description.apply_edit(&msg.description);
    }
    if let Some(rate) = msg.commission_rate {
        validator.commission.validate_change(
            rate,
            ctx.time,
            store.params().commission_change_interval_secs,
        )?;
        validator.commission.rates.rate = rate;
        validator.commission.update_time = ctx.time;
    }

    let moniker = validator.description.moniker.clone();
    store.set_validator(validator);
    Ok(Outcome::new(MsgKind::EditValidator, "edit_validator")
        .tag("validator", &msg.validator)
        .tag("moniker", moniker))
}

pub fn handle_delegate(
    store: &mut Store,
    ctx: &BlockContext,
    msg: &MsgDelegate,
) -> Result<Outcome> {
    check_denom(store, &msg.amount.denom)?;
    let shares = delegate(store, ctx, &msg.delegator, &msg.validator, msg.amount.amount)?;
    Ok(Outcome::new(MsgKind::Delegate, "delegate")
        .tag("delegator", &msg.delegator)
        .tag("validator", &msg.validator)
        .tag("shares", shares))
}

pub fn handle_begin_unbonding(
    store: &mut Store,
    ctx: &BlockContext,
    msg: &MsgBeginUnbonding,
) -> Result<Outcome> {
    let max_entries = store.params().max_entries;
    let mut ubd = store
        .unbonding_delegation(&msg.delegator, &msg.validator)
        .cloned()
        .unwrap_or_else(|| UnbondingDelegation::new(msg.delegator.clone(), msg.validator.clone()));
    if ubd.entries.len() >= max_entries as usize {
        return Err(StakeError::MaxEntries(max_entries).into());
    }
    let completion_time = checked_time(ctx.time, store.params().unbonding_time_secs)?;

    let tokens = unbond(store, ctx, &msg.delegator, &msg.validator, msg.shares)?;
    if tokens == 0 {
        return Err(StakeError::ZeroTokens(msg.shares).into());
    }
    // Pending unbonding balances are loose tokens until released.
    store.pool_mut().add(false, tokens)?;
    ubd.add_entry(ctx.height, completion_time, tokens);
    store.set_unbonding_delegation(ubd);

    Ok(Outcome::new(MsgKind::BeginUnbonding, "begin_unbonding")
        .tag("delegator", &msg.delegator)
        .tag("validator", &msg.validator)
        .tag("shares", msg.shares)
        .tag("tokens", tokens)
        .tag("end-time", completion_time))
}

pub fn handle_begin_redelegate(
    store: &mut Store,
    ctx: &BlockContext,
    msg: &MsgBeginRedelegate,
) -> Result<Outcome> {
    if msg.validator_src == msg.validator_dst {
        return Err(StakeError::SelfRedelegation.into());
    }
    // Both ends must exist before any shares move.
    load_validator(store, &msg.validator_src)?;
    load_validator(store, &msg.validator_dst)?;

    let transitive = store.redelegations().any(|r| {
        r.delegator == msg.delegator
            && r.validator_dst == msg.validator_src
            && r.has_immature(ctx.time)
    });
    if transitive {
        return Err(StakeError::TransitiveRedelegation.into());
    }

    let max_entries = store.params().max_entries;
    let mut red = store
        .redelegation(&msg.delegator, &msg.validator_src, &msg.validator_dst)
        .cloned()
        .unwrap_or_else(|| {
            Redelegation::new(
                msg.delegator.clone(),
                msg.validator_src.clone(),
                msg.validator_dst.clone(),
            )
        });
    if red.entries.len() >= max_entries as usize {
        return Err(StakeError::MaxEntries(max_entries).into());
    }
    let completion_time = checked_time(ctx.time, store.params().unbonding_time_secs)?;

    let tokens = unbond(store, ctx, &msg.delegator, &msg.validator_src, msg.shares)?;
    if tokens == 0 {
        return Err(StakeError::ZeroTokens(msg.shares).into());
    }

    let mut dst = load_validator(store, &msg.validator_dst)?;
    // A destination without shares issues them 1:1, like a fresh validator.
    let shares_dst = dst.add_tokens_from_delegation(tokens)?;
    store.pool_mut().add(dst.is_bonded(), tokens)?;

    let mut delegation = store
        .delegation(&msg.delegator, &msg.validator_dst)
        .cloned()
        .unwrap_or_else(|| Delegation {
            delegator: msg.delegator.clone(),
            validator: msg.validator_dst.clone(),
            shares: Dec::ZERO,
            height: ctx.height,
        });
    delegation.shares = delegation.shares.checked_add(shares_dst)?;
    delegation.height = ctx.height;

    red.add_entry(ctx.height, completion_time, tokens, shares_dst);

    store.set_validator(dst);
    store.set_delegation(delegation);
    store.set_redelegation(red);

    Ok(Outcome::new(MsgKind::BeginRedelegate, "begin_redelegate")
        .tag("delegator", &msg.delegator)
        .tag("source-validator", &msg.validator_src)
        .tag("destination-validator", &msg.validator_dst)
        .tag("tokens", tokens)
        .tag("shares-dst", shares_dst)
        .tag("end-time", completion_time))
}

/// Summary of `complete_matured`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaturityReport {
    pub released_tokens: u128,
    pub completed_unbondings: usize,
    pub completed_redelegations: usize,
}

/// End-of-block processing: releases matured unbonding entries to their delegators' accounts and
/// drops matured redelegation entries.
pub fn complete_matured(store: &mut Store, ctx: &BlockContext) -> Result<MaturityReport> {
    let mut report = MaturityReport::default();
    let denom = store.bond_denom().to_string();

    let matured: Vec<UnbondingDelegation> = store
        .unbonding_delegations()
        .filter(|u| u.entries.iter().any(|e| e.completion_time <= ctx.time))
        .cloned()
        .collect();
    for mut ubd in matured {
        let released = ubd.remove_matured(ctx.time);
        store.pool_mut().remove(false, released)?;
        store.add_balance(&ubd.delegator, &denom, released)?;
        report.released_tokens += released;
        report.completed_unbondings += 1;
        store.set_unbonding_delegation(ubd);
    }

    let matured: Vec<Redelegation> = store
        .redelegations()
        .filter(|r| r.entries.iter().any(|e| e.completion_time <= ctx.time))
        .cloned()
        .collect();
    for mut red in matured {
        red.remove_matured(ctx.time);
        report.completed_redelegations += 1;
        store.set_redelegation(red);
    }

    if report != MaturityReport::default() {
        debug!(
            height = ctx.height,
            released = report.released_tokens,
            unbondings = report.completed_unbondings,
            redelegations = report.completed_redelegations,
            "matured entries completed"
        );
    }
    Ok(report)
}

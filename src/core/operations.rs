//! Random message generators, one per message kind.
//!
//! A generator reads the store and the account set, draws participants and amounts from the step
//! RNG and returns either a message or `Planned::NoOp` (nothing eligible to move). Generated
//! messages always pass `validate_basic`; anything else is a generator bug.

use rand::distributions::Alphanumeric;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::core::coin::Coin;
use crate::core::dec::Dec;
use crate::core::msg::{
    Evidence, JailReason, Msg, MsgBeginRedelegate, MsgBeginUnbonding, MsgCreateValidator,
    MsgDelegate, MsgEditValidator, MsgJail, MsgKind, MsgSubmitEvidence, MsgUnjail,
};
use crate::core::store::Store;
use crate::core::validator::{CommissionRates, Description};
use crate::core::BlockContext;
use crate::keys::SimAccount;

/// What a generator decided for this step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    Msg(Msg),
    NoOp,
}

/// Read-only inputs to a generator.
pub struct OpContext<'a> {
    pub store: &'a Store,
    pub accounts: &'a [SimAccount],
    pub block: BlockContext,
    pub block_interval_secs: u64,
}

pub type Operation = fn(&mut ChaCha8Rng, &OpContext<'_>) -> Planned;

pub fn operation_for(kind: MsgKind) -> Operation {
    match kind {
        MsgKind::CreateValidator => create_validator,
        MsgKind::EditValidator => edit_validator,
        MsgKind::Delegate => delegate,
        MsgKind::BeginUnbonding => begin_unbonding,
        MsgKind::BeginRedelegate => begin_redelegate,
        MsgKind::Jail => jail,
        MsgKind::Unjail => unjail,
        MsgKind::SubmitEvidence => submit_evidence,
    }
}

fn random_account<'a>(rng: &mut ChaCha8Rng, accounts: &'a [SimAccount]) -> &'a SimAccount {
    &accounts[rng.gen_range(0..accounts.len())]
}

/// Uniform in `[0, max)`; zero when `max` is zero.
fn random_amount(rng: &mut ChaCha8Rng, max: u128) -> u128 {
    if max == 0 {
        0
    } else {
        rng.gen_range(0..max)
    }
}

fn random_string(rng: &mut ChaCha8Rng, len: usize) -> String {
    (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
}

/// One of 0.0, 0.1, ..., 0.9.
fn random_tenth(rng: &mut ChaCha8Rng) -> Dec {
    Dec::with_prec(rng.gen_range(0..10), 1)
}

fn create_validator(rng: &mut ChaCha8Rng, ctx: &OpContext<'_>) -> Planned {
    let description = Description::new(random_string(rng, 10));
    let commission = CommissionRates {
        rate: random_tenth(rng),
        max_rate: random_tenth(rng),
        max_change_rate: random_tenth(rng),
    };
    let acc = random_account(rng, ctx.accounts);
    let amount = random_amount(rng, ctx.store.bond_balance(&acc.address));
    if amount == 0 {
        return Planned::NoOp;
    }
    Planned::Msg(Msg::CreateValidator(MsgCreateValidator {
        description,
        commission,
        delegator: acc.address.clone(),
        validator: acc.address.clone(),
        pub_key: acc.pub_key_hex(),
        self_delegation: Coin::new(ctx.store.bond_denom(), amount),
    }))
}

fn edit_validator(rng: &mut ChaCha8Rng, ctx: &OpContext<'_>) -> Planned {
    let description = Description {
        moniker: random_string(rng, 10),
        identity: random_string(rng, 10),
        website: random_string(rng, 10),
        details: random_string(rng, 10),
    };
    let rate = random_tenth(rng);
    let acc = random_account(rng, ctx.accounts);
    Planned::Msg(Msg::EditValidator(MsgEditValidator {
        description,
        validator: acc.address.clone(),
        commission_rate: Some(rate),
    }))
}

fn delegate(rng: &mut ChaCha8Rng, ctx: &OpContext<'_>) -> Planned {
    let validator = random_account(rng, ctx.accounts);
    let delegator = random_account(rng, ctx.accounts);
    let amount = random_amount(rng, ctx.store.bond_balance(&delegator.address));
    if amount == 0 {
        return Planned::NoOp;
    }
    Planned::Msg(Msg::Delegate(MsgDelegate {
        delegator: delegator.address.clone(),
        validator: validator.address.clone(),
        amount: Coin::new(ctx.store.bond_denom(), amount),
    }))
}

/// Picks one of the delegator's delegations and a share amount below its balance.
fn pick_delegation(
    rng: &mut ChaCha8Rng,
    ctx: &OpContext<'_>,
    delegator: &SimAccount,
) -> Option<(String, Dec)> {
    let delegations = ctx.store.delegations_of(&delegator.address);
    if delegations.is_empty() {
        return None;
    }
    let delegation = delegations[rng.gen_range(0..delegations.len())];
    let shares = Dec::from_raw(random_amount(rng, delegation.shares.raw()));
    if shares.is_zero() {
        return None;
    }
    Some((delegation.validator.clone(), shares))
}

fn begin_unbonding(rng: &mut ChaCha8Rng, ctx: &OpContext<'_>) -> Planned {
    let delegator = random_account(rng, ctx.accounts);
    match pick_delegation(rng, ctx, delegator) {
        Some((validator, shares)) => Planned::Msg(Msg::BeginUnbonding(MsgBeginUnbonding {
            delegator: delegator.address.clone(),
            validator,
            shares,
        })),
        None => Planned::NoOp,
    }
}

fn begin_redelegate(rng: &mut ChaCha8Rng, ctx: &OpContext<'_>) -> Planned {
    let delegator = random_account(rng, ctx.accounts);
    let destination = random_account(rng, ctx.accounts);
    match pick_delegation(rng, ctx, delegator) {
        Some((validator_src, shares)) => Planned::Msg(Msg::BeginRedelegate(MsgBeginRedelegate {
            delegator: delegator.address.clone(),
            validator_src,
            validator_dst: destination.address.clone(),
            shares,
        })),
        None => Planned::NoOp,
    }
}

fn jail(rng: &mut ChaCha8Rng, ctx: &OpContext<'_>) -> Planned {
    let acc = random_account(rng, ctx.accounts);
    let reason = if rng.gen_bool(0.5) {
        JailReason::Downtime
    } else {
        JailReason::Misbehaviour
    };
    Planned::Msg(Msg::Jail(MsgJail {
        validator: acc.address.clone(),
        reason,
    }))
}

fn unjail(rng: &mut ChaCha8Rng, ctx: &OpContext<'_>) -> Planned {
    let acc = random_account(rng, ctx.accounts);
    Planned::Msg(Msg::Unjail(MsgUnjail {
        validator: acc.address.clone(),
    }))
}

fn submit_evidence(rng: &mut ChaCha8Rng, ctx: &OpContext<'_>) -> Planned {
    let submitter = random_account(rng, ctx.accounts);
    let validator = random_account(rng, ctx.accounts);
    let height = rng.gen_range(1..=ctx.block.height.max(1));
    let blocks_ago = ctx.block.height.saturating_sub(height);
    let time = ctx
        .block
        .time
        .saturating_sub(blocks_ago.saturating_mul(ctx.block_interval_secs));
    let side_chain = match rng.gen_range(0..3) {
        0 => None,
        1 => Some("bsc".to_string()),
        _ => Some("test".to_string()),
    };
    Planned::Msg(Msg::SubmitEvidence(MsgSubmitEvidence {
        submitter: submitter.address.clone(),
        evidence: Evidence {
            validator: validator.address.clone(),
            height,
            time,
            side_chain,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::Params;
    use crate::keys::generate_accounts;
    use rand::SeedableRng;

    fn fixture() -> (Store, Vec<SimAccount>) {
        let accounts = generate_accounts(&mut ChaCha8Rng::seed_from_u64(7), 4);
        let mut store = Store::new(Params::default());
        for acc in &accounts {
            store.set_balance(&acc.address, "steak", 1_000);
        }
        (store, accounts)
    }

    #[test]
    fn test_generated_messages_pass_validate_basic() {
        let (store, accounts) = fixture();
        let ctx = OpContext {
            store: &store,
            accounts: &accounts,
            block: BlockContext { height: 5, time: 500 },
            block_interval_secs: 100,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..50 {
            for kind in MsgKind::ALL {
                if let Planned::Msg(msg) = operation_for(kind)(&mut rng, &ctx) {
                    assert_eq!(msg.kind(), kind);
                    assert!(msg.validate_basic().is_ok(), "{:?}", msg);
                }
            }
        }
    }

    #[test]
    fn test_unbonding_without_delegations_is_noop() {
        let (store, accounts) = fixture();
        let ctx = OpContext {
            store: &store,
            accounts: &accounts,
            block: BlockContext { height: 1, time: 0 },
            block_interval_secs: 100,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(begin_unbonding(&mut rng, &ctx), Planned::NoOp);
        assert_eq!(begin_redelegate(&mut rng, &ctx), Planned::NoOp);
    }

    #[test]
    fn test_zero_balance_accounts_plan_noop() {
        let accounts = generate_accounts(&mut ChaCha8Rng::seed_from_u64(7), 4);
        let store = Store::new(Params::default());
        let ctx = OpContext {
            store: &store,
            accounts: &accounts,
            block: BlockContext { height: 2, time: 20 },
            block_interval_secs: 10,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..20 {
            assert_eq!(delegate(&mut rng, &ctx), Planned::NoOp);
            assert_eq!(create_validator(&mut rng, &ctx), Planned::NoOp);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (store, accounts) = fixture();
        let ctx = OpContext {
            store: &store,
            accounts: &accounts,
            block: BlockContext { height: 3, time: 30 },
            block_interval_secs: 10,
        };
        let a = delegate(&mut ChaCha8Rng::seed_from_u64(9), &ctx);
        let b = delegate(&mut ChaCha8Rng::seed_from_u64(9), &ctx);
        assert_eq!(a, b);
    }
}

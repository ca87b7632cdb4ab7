// Core staking module: records, transition engine, executor and simulation harness.
//
// DETERMINISM GUARANTEES:
// =======================
// 1. Same messages in the same order at the same block contexts → same final store
// 2. All maps are ordered (BTreeMap); iteration never depends on hashing
// 3. No system time: block time is always supplied by the caller
// 4. The only randomness is the seeded simulation RNG
//
// INVARIANTS:
// - Bond-denom supply (pool + accounts) never changes
// - A failed message leaves the store byte-identical

pub mod coin;
pub mod dec;
pub mod delegation;
pub mod execution;
pub mod handler;
pub mod invariants;
pub mod msg;
pub mod operations;
pub mod params;
pub mod pool;
pub mod query;
pub mod simulation;
pub mod slashing;
pub mod store;
pub mod validator;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::execution::{ExecutionLogic, ExecutionMode, ExecutionResult};
use crate::core::handler::{MaturityReport, StakeError};
use crate::core::msg::Msg;
use crate::core::params::Params;
use crate::core::store::{Address, Store};
use crate::error::{Result, StakingError};

/// Largest bond-denom supply a chain may start with. Any whole token amount up to it still
/// converts to shares without overflowing `Dec`.
pub const MAX_GENESIS_SUPPLY: u128 = u128::MAX / dec::DEC_ONE_RAW;

/// Height and time of the block being processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: u64,
    /// Unix seconds.
    pub time: u64,
}

/// Staking application: a store plus the current block context.
///
/// Messages are delivered through the transactional executor; `begin_block` and `end_block`
/// run the per-block liveness and maturation hooks under the same all-or-nothing rule.
#[derive(Debug, Clone)]
pub struct StakingCore {
    store: Store,
    block: BlockContext,
}

impl StakingCore {
    pub fn new(params: Params) -> Result<Self> {
        Self::genesis(params, &[], 0)
    }

    /// Starts at height 0 with the given funded accounts.
    pub fn genesis(
        params: Params,
        balances: &[(Address, u128)],
        genesis_time: u64,
    ) -> Result<Self> {
        params.validate()?;
        let store = Store::genesis(params, balances);
        let supply = store
            .total_supply()
            .map_err(|_| StakingError::Config("genesis supply overflows".into()))?;
        if supply > MAX_GENESIS_SUPPLY {
            return Err(StakingError::Config(format!(
                "genesis supply {} exceeds maximum {}",
                supply, MAX_GENESIS_SUPPLY
            )));
        }
        Ok(Self {
            store,
            block: BlockContext {
                height: 0,
                time: genesis_time,
            },
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn block(&self) -> BlockContext {
        self.block
    }

    /// Executes and commits `msg` at the current block.
    pub fn deliver(&mut self, msg: &Msg) -> Result<ExecutionResult> {
        ExecutionLogic::execute(&mut self.store, &self.block, msg, ExecutionMode::Deliver)
    }

    /// Dry-runs `msg` at the current block; the store is never modified.
    pub fn simulate(&self, msg: &Msg) -> Result<ExecutionResult> {
        ExecutionLogic::simulate(&self.store.snapshot(), &self.block, msg)
    }

    /// Opens the next block at `time` and records a signature from every bonded validator not in
    /// `missed`. Returns the validators jailed for downtime.
    pub fn begin_block(&mut self, time: u64, missed: &BTreeSet<Address>) -> Result<Vec<Address>> {
        let height = self
            .block
            .height
            .checked_add(1)
            .ok_or(StakeError::Overflow("block height"))?;
        let block = BlockContext {
            height,
            time: time.max(self.block.time),
        };
        let mut view = self.store.cache_view();
        let signers: Vec<Address> = view
            .validators()
            .filter(|v| v.is_bonded())
            .map(|v| v.operator.clone())
            .collect();

        let mut jailed = Vec::new();
        for operator in signers {
            let signed = !missed.contains(&operator);
            if slashing::handle_validator_signature(&mut view, &block, &operator, signed)? {
                jailed.push(operator);
            }
        }
        ExecutionLogic::check_conservation(&self.store, &view)?;

        self.store = view;
        self.block = block;
        debug!(height = block.height, jailed = jailed.len(), "block opened");
        Ok(jailed)
    }

    /// Closes the current block: releases matured unbondings and prunes matured redelegations.
    pub fn end_block(&mut self) -> Result<MaturityReport> {
        let mut view = self.store.cache_view();
        let report = handler::complete_matured(&mut view, &self.block)?;
        ExecutionLogic::check_conservation(&self.store, &view)?;
        self.store = view;
        Ok(report)
    }

    pub fn query(&self, path: &str) -> Result<Value> {
        query::query_path(&self.store, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coin::Coin;
    use crate::core::dec::Dec;
    use crate::core::msg::{MsgBeginUnbonding, MsgCreateValidator};
    use crate::core::validator::{CommissionRates, Description};
    use crate::keys::SimAccount;
    use secp256k1::SecretKey;

    fn account() -> SimAccount {
        SimAccount::from_secret_key(SecretKey::from_slice(&[3u8; 32]).unwrap())
    }

    fn app(acc: &SimAccount, params: Params) -> StakingCore {
        let mut app = StakingCore::genesis(params, &[(acc.address.clone(), 1_000)], 100).unwrap();
        let msg = Msg::CreateValidator(MsgCreateValidator {
            description: Description::new("node"),
            commission: CommissionRates {
                rate: Dec::ZERO,
                max_rate: Dec::ONE,
                max_change_rate: Dec::ONE,
            },
            delegator: acc.address.clone(),
            validator: acc.address.clone(),
            pub_key: acc.pub_key_hex(),
            self_delegation: Coin::new("steak", 600),
        });
        app.begin_block(110, &BTreeSet::new()).unwrap();
        assert!(app.deliver(&msg).unwrap().is_success());
        app
    }

    #[test]
    fn test_genesis_rejects_bad_params() {
        let mut params = Params::default();
        params.max_entries = 0;
        assert!(StakingCore::new(params).is_err());
    }

    #[test]
    fn test_begin_block_advances_context() {
        let acc = account();
        let mut app = app(&acc, Params::default());
        assert_eq!(app.block(), BlockContext { height: 1, time: 110 });
        app.begin_block(50, &BTreeSet::new()).unwrap();
        // Time never goes backwards.
        assert_eq!(app.block(), BlockContext { height: 2, time: 110 });
    }

    #[test]
    fn test_downtime_jailing_through_blocks() {
        let acc = account();
        let mut params = Params::default();
        params.slashing.signed_blocks_window = 4;
        let mut app = app(&acc, params);
        let missed: BTreeSet<Address> = [acc.address.clone()].into_iter().collect();
        let mut jailed = Vec::new();
        for i in 0..10 {
            jailed = app.begin_block(200 + i, &missed).unwrap();
            if !jailed.is_empty() {
                break;
            }
        }
        assert_eq!(jailed, vec![acc.address.clone()]);
        assert!(app.store().validator(&acc.address).unwrap().jailed);
        assert_eq!(app.store().total_supply().unwrap(), 1_000);
    }

    #[test]
    fn test_end_block_releases_unbonding() {
        let acc = account();
        let mut app = app(&acc, Params::default());
        let msg = Msg::BeginUnbonding(MsgBeginUnbonding {
            delegator: acc.address.clone(),
            validator: acc.address.clone(),
            shares: Dec::from_int(100).unwrap(),
        });
        assert!(app.deliver(&msg).unwrap().is_success());
        assert_eq!(app.end_block().unwrap().released_tokens, 0);

        let done = app.block().time + Params::default().unbonding_time_secs;
        app.begin_block(done, &BTreeSet::new()).unwrap();
        assert_eq!(app.end_block().unwrap().released_tokens, 100);
        assert_eq!(app.store().bond_balance(&acc.address), 500);
    }

    #[test]
    fn test_simulate_leaves_store() {
        let acc = account();
        let app = app(&acc, Params::default());
        let before = app.store().snapshot();
        let msg = Msg::BeginUnbonding(MsgBeginUnbonding {
            delegator: acc.address.clone(),
            validator: acc.address.clone(),
            shares: Dec::from_int(1).unwrap(),
        });
        assert!(app.simulate(&msg).unwrap().is_success());
        assert_eq!(app.store().snapshot(), before);
        assert_eq!(app.query("/stake/pool").unwrap()["bonded_tokens"], "600");
    }
}

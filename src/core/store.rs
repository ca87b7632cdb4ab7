//! Staking store: account ledger, validator/delegation records, pool aggregate and parameters.
//!
//! # Copy-on-write
//! Every map is held behind an `Arc`. Cloning a `Store` is O(number of maps) and shares all
//! data; the first write to a map through `Arc::make_mut` clones that map only. The
//! transactional executor relies on this: a speculative view is a clone, and committing it is a
//! move back into the backing store.
//!
//! # Determinism
//! All maps are `BTreeMap`s, so iteration, serialization and the state root are ordered by key.
//!
//! # Invariants
//! - A delegation with zero shares is never stored.
//! - An unbonding delegation or redelegation with no entries is never stored.
//! - Validators are never removed.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::delegation::{Delegation, Redelegation, UnbondingDelegation};
use crate::core::handler::StakeError;
use crate::core::params::Params;
use crate::core::pool::Pool;
use crate::core::slashing::SigningInfo;
use crate::core::validator::Validator;
use crate::error::{Result, StakingError};

/// Account / validator operator address (hex of the first 20 bytes of SHA-256 of the public key).
pub type Address = String;

/// Ledger account receiving slashed tokens.
pub const COMMUNITY_POOL_ADDRESS: &str = "community_pool";

type DelegationKey = (Address, Address);
type RedelegationKey = (Address, Address, Address);

#[derive(Debug, Clone, Default)]
pub struct Store {
    /// (address, denom) -> balance in minimal units
    balances: Arc<BTreeMap<(Address, String), u128>>,
    validators: Arc<BTreeMap<Address, Validator>>,
    delegations: Arc<BTreeMap<DelegationKey, Delegation>>,
    unbonding_delegations: Arc<BTreeMap<DelegationKey, UnbondingDelegation>>,
    redelegations: Arc<BTreeMap<RedelegationKey, Redelegation>>,
    signing_infos: Arc<BTreeMap<Address, SigningInfo>>,
    pool: Pool,
    params: Arc<Params>,
}

impl Store {
    pub fn new(params: Params) -> Self {
        Self {
            params: Arc::new(params),
            ..Self::default()
        }
    }

    /// Store funded with `balances` in the bond denom.
    pub fn genesis(params: Params, balances: &[(Address, u128)]) -> Self {
        let mut store = Self::new(params);
        let denom = store.bond_denom().to_string();
        for (address, amount) in balances {
            store.set_balance(address, &denom, *amount);
        }
        store
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn bond_denom(&self) -> &str {
        &self.params.bond_denom
    }

    /// Isolated copy-on-write view of this store. Writes to the view never reach `self`.
    pub fn cache_view(&self) -> Store {
        self.clone()
    }

    // ---- account ledger ----

    pub fn balance(&self, address: &str, denom: &str) -> u128 {
        self.balances
            .get(&(address.to_string(), denom.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn bond_balance(&self, address: &str) -> u128 {
        self.balance(address, self.bond_denom())
    }

    /// Sets a balance directly (genesis and tests). Zero balances are removed.
    pub fn set_balance(&mut self, address: &str, denom: &str, amount: u128) {
        let key = (address.to_string(), denom.to_string());
        let balances = Arc::make_mut(&mut self.balances);
        if amount == 0 {
            balances.remove(&key);
        } else {
            balances.insert(key, amount);
        }
    }

    pub fn add_balance(&mut self, address: &str, denom: &str, amount: u128) -> Result<()> {
        let current = self.balance(address, denom);
        let updated = current
            .checked_add(amount)
            .ok_or(StakeError::Overflow("account balance"))?;
        self.set_balance(address, denom, updated);
        Ok(())
    }

    pub fn sub_balance(&mut self, address: &str, denom: &str, amount: u128) -> Result<()> {
        let available = self.balance(address, denom);
        if available < amount {
            return Err(StakeError::InsufficientBalance {
                required: amount,
                available,
            }
            .into());
        }
        self.set_balance(address, denom, available - amount);
        Ok(())
    }

    // ---- validators ----

    pub fn validator(&self, operator: &str) -> Option<&Validator> {
        self.validators.get(operator)
    }

    pub fn set_validator(&mut self, validator: Validator) {
        Arc::make_mut(&mut self.validators).insert(validator.operator.clone(), validator);
    }

    /// All validators, sorted by operator address.
    pub fn validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    pub fn validator_by_pub_key(&self, pub_key: &str) -> Option<&Validator> {
        self.validators.values().find(|v| v.pub_key == pub_key)
    }

    // ---- delegations ----

    pub fn delegation(&self, delegator: &str, validator: &str) -> Option<&Delegation> {
        self.delegations
            .get(&(delegator.to_string(), validator.to_string()))
    }

    /// Stores a delegation, or removes it when its shares are zero.
    pub fn set_delegation(&mut self, delegation: Delegation) {
        let key = (delegation.delegator.clone(), delegation.validator.clone());
        let delegations = Arc::make_mut(&mut self.delegations);
        if delegation.shares.is_zero() {
            delegations.remove(&key);
        } else {
            delegations.insert(key, delegation);
        }
    }

    pub fn delegations(&self) -> impl Iterator<Item = &Delegation> {
        self.delegations.values()
    }

    pub fn delegations_of(&self, delegator: &str) -> Vec<&Delegation> {
        self.delegations
            .values()
            .filter(|d| d.delegator == delegator)
            .collect()
    }

    pub fn delegations_to(&self, validator: &str) -> Vec<&Delegation> {
        self.delegations
            .values()
            .filter(|d| d.validator == validator)
            .collect()
    }

    // ---- unbonding delegations ----

    pub fn unbonding_delegation(
        &self,
        delegator: &str,
        validator: &str,
    ) -> Option<&UnbondingDelegation> {
        self.unbonding_delegations
            .get(&(delegator.to_string(), validator.to_string()))
    }

    /// Stores an unbonding delegation, or removes it when it has no entries left.
    pub fn set_unbonding_delegation(&mut self, ubd: UnbondingDelegation) {
        let key = (ubd.delegator.clone(), ubd.validator.clone());
        let map = Arc::make_mut(&mut self.unbonding_delegations);
        if ubd.entries.is_empty() {
            map.remove(&key);
        } else {
            map.insert(key, ubd);
        }
    }

    pub fn unbonding_delegations(&self) -> impl Iterator<Item = &UnbondingDelegation> {
        self.unbonding_delegations.values()
    }

    // ---- redelegations ----

    pub fn redelegation(&self, delegator: &str, src: &str, dst: &str) -> Option<&Redelegation> {
        self.redelegations
            .get(&(delegator.to_string(), src.to_string(), dst.to_string()))
    }

    /// Stores a redelegation, or removes it when it has no entries left.
    pub fn set_redelegation(&mut self, red: Redelegation) {
        let key = (
            red.delegator.clone(),
            red.validator_src.clone(),
            red.validator_dst.clone(),
        );
        let map = Arc::make_mut(&mut self.redelegations);
        if red.entries.is_empty() {
            map.remove(&key);
        } else {
            map.insert(key, red);
        }
    }

    pub fn redelegations(&self) -> impl Iterator<Item = &Redelegation> {
        self.redelegations.values()
    }

    // ---- slashing ----

    pub fn signing_info(&self, validator: &str) -> Option<&SigningInfo> {
        self.signing_infos.get(validator)
    }

    pub fn set_signing_info(&mut self, validator: &str, info: SigningInfo) {
        Arc::make_mut(&mut self.signing_infos).insert(validator.to_string(), info);
    }

    // ---- pool ----

    pub fn pool(&self) -> Pool {
        self.pool
    }

    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    /// Bond-denom tokens accounted for anywhere: pool buckets plus every ledger balance.
    pub fn total_supply(&self) -> Result<u128> {
        let denom = self.bond_denom();
        let mut total = self.pool.total()?;
        for ((_, d), bal) in self.balances.iter() {
            if d == denom {
                total = total
                    .checked_add(*bal)
                    .ok_or(StakeError::Overflow("total supply"))?;
            }
        }
        Ok(total)
    }

    // ---- snapshots ----

    /// Immutable snapshot. O(1): only `Arc`s are cloned.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            inner: self.clone(),
        }
    }

    /// Replaces the whole store with the snapshot's contents. The snapshot is not modified.
    pub fn restore(&mut self, snapshot: &StoreSnapshot) {
        *self = snapshot.inner.clone();
    }

    fn canonical(&self) -> CanonicalState<'_> {
        CanonicalState {
            params: &self.params,
            pool: &self.pool,
            balances: self
                .balances
                .iter()
                .map(|((addr, denom), bal)| (addr, denom, *bal))
                .collect(),
            validators: self.validators.values().collect(),
            delegations: self.delegations.values().collect(),
            unbonding_delegations: self.unbonding_delegations.values().collect(),
            redelegations: self.redelegations.values().collect(),
            signing_infos: self.signing_infos.iter().collect(),
        }
    }
}

/// Key-ordered serializable view of every record in the store.
#[derive(Serialize)]
struct CanonicalState<'a> {
    params: &'a Params,
    pool: &'a Pool,
    balances: Vec<(&'a Address, &'a String, u128)>,
    validators: Vec<&'a Validator>,
    delegations: Vec<&'a Delegation>,
    unbonding_delegations: Vec<&'a UnbondingDelegation>,
    redelegations: Vec<&'a Redelegation>,
    signing_infos: Vec<(&'a Address, &'a SigningInfo)>,
}

/// Immutable snapshot of the store.
///
/// # Invariants
/// - **Immutability:** no mutation methods; values never change after creation.
/// - **Restore identity:** `store.restore(&store.snapshot())` leaves the store byte-identical.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    inner: Store,
}

impl StoreSnapshot {
    /// Read-only access to the snapshotted records.
    pub fn store(&self) -> &Store {
        &self.inner
    }

    /// Canonical serialized form. Two snapshots are byte-identical iff every record matches.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.inner.canonical())
            .map_err(|e| StakingError::ConservationViolation(format!("snapshot encoding: {}", e)))
    }

    /// Hex SHA-256 of the canonical serialized form.
    pub fn state_root(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_bytes()?);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl PartialEq for StoreSnapshot {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_bytes(), other.to_bytes()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for StoreSnapshot {}

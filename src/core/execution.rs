//! Transactional execution of staking messages.
//!
//! Every message runs against a copy-on-write view of the store. On success the view replaces
//! the backing store (Deliver) or is discarded (Simulate); on failure it is always discarded, so
//! a failed message leaves the store byte-identical to before. Both modes share the same logic
//! and yield the same result for the same inputs.

use thiserror::Error;
use tracing::{debug, error};

use crate::core::handler::{self, Outcome};
use crate::core::msg::Msg;
use crate::core::store::{Store, StoreSnapshot};
use crate::core::BlockContext;
use crate::error::{Result, StakingError};

/// Whether a successful execution is committed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Changes are committed.
    Deliver,
    /// Dry-run: changes are computed and reported, never committed.
    Simulate,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("total supply changed from {before} to {after}")]
    SupplyChanged { before: u128, after: u128 },
}

impl From<ExecutionError> for StakingError {
    fn from(err: ExecutionError) -> Self {
        StakingError::ConservationViolation(err.to_string())
    }
}

/// Result of a single execution. Non-fatal failures are reported here rather than as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub outcome: Option<Outcome>,
    pub error: Option<StakingError>,
    /// Store contents after the message, when it succeeded.
    pub final_state: Option<StoreSnapshot>,
    pub committed: bool,
}

impl ExecutionResult {
    fn success(outcome: Outcome, final_state: StoreSnapshot, committed: bool) -> Self {
        Self {
            outcome: Some(outcome),
            error: None,
            final_state: Some(final_state),
            committed,
        }
    }

    fn failure(error: StakingError) -> Self {
        Self {
            outcome: None,
            error: Some(error),
            final_state: None,
            committed: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_some()
    }

    /// True when the message succeeded without changing anything (idempotent no-op).
    pub fn is_noop(&self) -> bool {
        self.outcome.as_ref().map(|o| !o.changed).unwrap_or(false)
    }
}

/// Shared execution logic used by both modes.
pub struct ExecutionLogic;

impl ExecutionLogic {
    /// Bond-denom supply must be identical before and after every message.
    pub fn check_conservation(before: &Store, after: &Store) -> Result<()> {
        let (before, after) = (before.total_supply()?, after.total_supply()?);
        if before != after {
            return Err(ExecutionError::SupplyChanged { before, after }.into());
        }
        Ok(())
    }

    /// Validates and applies `msg` to a view of `store`.
    ///
    /// Returns `Err` only for fatal errors (conservation violations). Validation and precondition
    /// failures come back as a failed `ExecutionResult` with `store` untouched.
    pub fn execute(
        store: &mut Store,
        ctx: &BlockContext,
        msg: &Msg,
        mode: ExecutionMode,
    ) -> Result<ExecutionResult> {
        if let Err(e) = msg.validate_basic() {
            let e = StakingError::from(e);
            debug!(
                kind = msg.kind().as_str(),
                error_kind = e.kind(),
                error = %e,
                "message rejected"
            );
            return Ok(ExecutionResult::failure(e));
        }

        let mut view = store.cache_view();
        match handler::handle(&mut view, ctx, msg) {
            Ok(outcome) => {
                if let Err(e) = Self::check_conservation(store, &view) {
                    error!(kind = msg.kind().as_str(), error = %e, "conservation violated");
                    return Err(e);
                }
                let final_state = view.snapshot();
                let committed = mode == ExecutionMode::Deliver && outcome.changed;
                if committed {
                    *store = view;
                }
                debug!(kind = msg.kind().as_str(), committed, "message applied");
                Ok(ExecutionResult::success(outcome, final_state, committed))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!(
                    kind = msg.kind().as_str(),
                    error_kind = e.kind(),
                    error = %e,
                    "message failed"
                );
                Ok(ExecutionResult::failure(e))
            }
        }
    }

    /// Executes `msg` against a temporary store restored from `snapshot`. The snapshot is never
    /// modified.
    pub fn simulate(
        snapshot: &StoreSnapshot,
        ctx: &BlockContext,
        msg: &Msg,
    ) -> Result<ExecutionResult> {
        let mut temp = Store::default();
        temp.restore(snapshot);
        Self::execute(&mut temp, ctx, msg, ExecutionMode::Simulate)
    }
}

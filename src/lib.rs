pub mod core;
pub mod error;
pub mod keys;
pub mod utils;

pub use error::{Result, StakingError};
pub use keys::{generate_accounts, SimAccount};
pub use utils::{address_from_pub_key, decode_pub_key, is_valid_address};

// Core API exports
pub use core::{BlockContext, StakingCore, MAX_GENESIS_SUPPLY};
pub use core::coin::{Coin, DEFAULT_BOND_DENOM};
pub use core::dec::{Dec, DecError, DEC_PRECISION};
pub use core::delegation::{
    Delegation, Redelegation, RedelegationEntry, UnbondingDelegation, UnbondingEntry,
};
pub use core::execution::{ExecutionError, ExecutionLogic, ExecutionMode, ExecutionResult};
pub use core::handler::{handle, MaturityReport, Outcome, StakeError};
pub use core::invariants::check_all as check_invariants;
pub use core::msg::{
    Evidence, JailReason, Msg, MsgBeginRedelegate, MsgBeginUnbonding, MsgCreateValidator,
    MsgDelegate, MsgEditValidator, MsgJail, MsgKind, MsgSubmitEvidence, MsgUnjail,
    MsgValidationError,
};
pub use core::params::{Params, SlashingParams};
pub use core::pool::Pool;
pub use core::query::{handle_query, query_path, Query, QueryError};
pub use core::simulation::{
    run_simulation, Event, EventOutcome, OperationWeights, Simulation, SimulationConfig,
    SimulationReport,
};
pub use core::slashing::{
    side_chain_id_from_text, SigningInfo, SlashingError, SIDE_CHAIN_ID_BSC, SIDE_CHAIN_ID_TEST,
};
pub use core::store::{Address, Store, StoreSnapshot, COMMUNITY_POOL_ADDRESS};
pub use core::validator::{
    BondStatus, Commission, CommissionRates, Description, Validator, DO_NOT_MODIFY,
};

//! Deterministic randomized simulation harness.
//!
//! A run is a pure function of its `SimulationConfig`: accounts and balances come from the setup
//! stream of a `ChaCha8Rng` seeded with `seed`, and step `i` draws everything it needs from
//! stream `i + 1`. Each step opens a block, records validator liveness, generates one operation
//! and executes it through the transactional executor, then closes the block. Invariants are
//! audited every `invariant_period` steps and once more at the end.
//!
//! Validation failures of generated messages and invariant violations abort the run; every
//! other failure is an expected outcome and is only tallied.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::invariants;
use crate::core::msg::MsgKind;
use crate::core::operations::{operation_for, OpContext, Planned};
use crate::core::params::Params;
use crate::core::store::Address;
use crate::core::{StakingCore, MAX_GENESIS_SUPPLY};
use crate::error::{Result, StakingError};
use crate::keys::{generate_accounts, SimAccount};

/// Relative frequency of each operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationWeights {
    pub create_validator: u32,
    pub edit_validator: u32,
    pub delegate: u32,
    pub begin_unbonding: u32,
    pub begin_redelegate: u32,
    pub jail: u32,
    pub unjail: u32,
    pub submit_evidence: u32,
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self {
            create_validator: 10,
            edit_validator: 5,
            delegate: 20,
            begin_unbonding: 10,
            begin_redelegate: 10,
            jail: 3,
            unjail: 5,
            submit_evidence: 2,
        }
    }
}

impl OperationWeights {
    pub fn weight(&self, kind: MsgKind) -> u32 {
        match kind {
            MsgKind::CreateValidator => self.create_validator,
            MsgKind::EditValidator => self.edit_validator,
            MsgKind::Delegate => self.delegate,
            MsgKind::BeginUnbonding => self.begin_unbonding,
            MsgKind::BeginRedelegate => self.begin_redelegate,
            MsgKind::Jail => self.jail,
            MsgKind::Unjail => self.unjail,
            MsgKind::SubmitEvidence => self.submit_evidence,
        }
    }

    fn total(&self) -> u64 {
        MsgKind::ALL.iter().map(|k| self.weight(*k) as u64).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub num_accounts: usize,
    /// Balance of every account at genesis (upper bound when `randomize_balances` is set).
    pub initial_balance: u128,
    pub randomize_balances: bool,
    pub steps: u64,
    pub genesis_time: u64,
    pub block_interval_secs: u64,
    /// Probability that a bonded validator misses its signature in a block.
    pub miss_rate: f64,
    pub invariant_period: u64,
    pub weights: OperationWeights,
    pub params: Params,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_accounts: 10,
            initial_balance: 1_000_000,
            randomize_balances: false,
            steps: 500,
            genesis_time: 0,
            block_interval_secs: 3600,
            miss_rate: 0.02,
            invariant_period: 10,
            weights: OperationWeights::default(),
            params: Params::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_accounts == 0 {
            return Err(StakingError::Config("at least one account is required".into()));
        }
        if self.block_interval_secs == 0 {
            return Err(StakingError::Config("block interval must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.miss_rate) {
            return Err(StakingError::Config(format!(
                "miss rate {} outside [0, 1]",
                self.miss_rate
            )));
        }
        if self.invariant_period == 0 {
            return Err(StakingError::Config("invariant period must be positive".into()));
        }
        if self.weights.total() == 0 {
            return Err(StakingError::Config("operation weights sum to zero".into()));
        }
        let supply = self.initial_balance.checked_mul(self.num_accounts as u128);
        if !supply.map_or(false, |s| s <= MAX_GENESIS_SUPPLY) {
            return Err(StakingError::Config(format!(
                "{} accounts x {} exceeds the genesis supply limit {}",
                self.num_accounts, self.initial_balance, MAX_GENESIS_SUPPLY
            )));
        }
        let end_time = self
            .block_interval_secs
            .checked_mul(self.steps)
            .and_then(|span| span.checked_add(self.genesis_time));
        if end_time.is_none() {
            return Err(StakingError::Config("block time overflows within the run".into()));
        }
        self.params.validate()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StakingError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: SimulationConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventOutcome {
    Success,
    Failure,
    NoOp,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Success => "success",
            EventOutcome::Failure => "failure",
            EventOutcome::NoOp => "no-operation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub step: u64,
    pub kind: MsgKind,
    pub outcome: EventOutcome,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.outcome.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub events: Vec<Event>,
    /// Event counts keyed by `"<kind>/<outcome>"`.
    pub tallies: BTreeMap<String, u64>,
    pub final_height: u64,
    pub state_root: String,
    pub total_supply: u128,
    pub downtime_jailings: u64,
    pub released_tokens: u128,
    pub invariant_checks: u64,
}

impl SimulationReport {
    pub fn tally(&self, kind: MsgKind, outcome: EventOutcome) -> u64 {
        self.tallies
            .get(&format!("{}/{}", kind.as_str(), outcome.as_str()))
            .copied()
            .unwrap_or(0)
    }
}

/// Accounts and genesis balances drawn from the setup stream.
pub fn setup_accounts(config: &SimulationConfig) -> (Vec<SimAccount>, Vec<(Address, u128)>) {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let accounts = generate_accounts(&mut rng, config.num_accounts);
    let balances = accounts
        .iter()
        .map(|acc| {
            let balance = if config.randomize_balances && config.initial_balance > 0 {
                rng.gen_range(0..config.initial_balance)
            } else {
                config.initial_balance
            };
            (acc.address.clone(), balance)
        })
        .collect();
    (accounts, balances)
}

/// Step RNG: stream 0 is reserved for setup.
fn step_rng(seed: u64, step: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(step + 1);
    rng
}

pub struct Simulation {
    config: SimulationConfig,
    app: StakingCore,
    accounts: Vec<SimAccount>,
    genesis_supply: u128,
    kinds: Vec<MsgKind>,
    chooser: WeightedIndex<u32>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let (accounts, balances) = setup_accounts(&config);
        let app = StakingCore::genesis(config.params.clone(), &balances, config.genesis_time)?;
        let genesis_supply = app.store().total_supply()?;

        let kinds: Vec<MsgKind> = MsgKind::ALL
            .iter()
            .copied()
            .filter(|k| config.weights.weight(*k) > 0)
            .collect();
        let chooser = WeightedIndex::new(kinds.iter().map(|k| config.weights.weight(*k)))
            .map_err(|e| StakingError::Config(format!("operation weights: {}", e)))?;

        Ok(Self {
            config,
            app,
            accounts,
            genesis_supply,
            kinds,
            chooser,
        })
    }

    pub fn app(&self) -> &StakingCore {
        &self.app
    }

    pub fn accounts(&self) -> &[SimAccount] {
        &self.accounts
    }

    fn check_invariants(&self) -> Result<()> {
        invariants::check_all(self.app.store(), self.genesis_supply).map_err(|e| {
            warn!(height = self.app.block().height, error = %e, "invariant violated");
            e
        })
    }

    /// Runs one step: block open, one operation, block close.
    fn step(&mut self, step: u64, report: &mut SimulationReport) -> Result<Event> {
        let mut rng = step_rng(self.config.seed, step);

        let time = self.app.block().time + self.config.block_interval_secs;
        let missed: BTreeSet<Address> = self
            .app
            .store()
            .validators()
            .filter(|v| v.is_bonded())
            .map(|v| v.operator.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .filter(|_| rng.gen_bool(self.config.miss_rate))
            .collect();
        let jailed = self.app.begin_block(time, &missed)?;
        report.downtime_jailings += jailed.len() as u64;

        let kind = self.kinds[self.chooser.sample(&mut rng)];
        let planned = {
            let ctx = OpContext {
                store: self.app.store(),
                accounts: &self.accounts,
                block: self.app.block(),
                block_interval_secs: self.config.block_interval_secs,
            };
            operation_for(kind)(&mut rng, &ctx)
        };

        let outcome = match planned {
            Planned::NoOp => EventOutcome::NoOp,
            Planned::Msg(msg) => {
                if let Err(e) = msg.validate_basic() {
                    return Err(StakingError::Simulation(format!(
                        "generated {} failed validation: {} ({})",
                        kind,
                        e,
                        String::from_utf8_lossy(&msg.sign_bytes())
                    )));
                }
                let result = self.app.deliver(&msg)?;
                if result.is_success() {
                    EventOutcome::Success
                } else {
                    EventOutcome::Failure
                }
            }
        };

        let matured = self.app.end_block()?;
        report.released_tokens += matured.released_tokens;

        let event = Event {
            step,
            kind,
            outcome,
        };
        debug!(step, height = self.app.block().height, event = %event, "step");
        Ok(event)
    }

    /// Runs every configured step and returns the report. Consumes the harness.
    pub fn run(mut self) -> Result<SimulationReport> {
        info!(
            seed = self.config.seed,
            steps = self.config.steps,
            accounts = self.config.num_accounts,
            supply = self.genesis_supply,
            "starting simulation"
        );
        let mut report = SimulationReport {
            events: Vec::with_capacity(self.config.steps as usize),
            tallies: BTreeMap::new(),
            final_height: 0,
            state_root: String::new(),
            total_supply: 0,
            downtime_jailings: 0,
            released_tokens: 0,
            invariant_checks: 0,
        };

        for step in 0..self.config.steps {
            let event = self.step(step, &mut report)?;
            *report.tallies.entry(event.to_string()).or_insert(0) += 1;
            report.events.push(event);

            if (step + 1) % self.config.invariant_period == 0 {
                self.check_invariants()?;
                report.invariant_checks += 1;
            }
        }
        self.check_invariants()?;
        report.invariant_checks += 1;

        report.final_height = self.app.block().height;
        report.total_supply = self.app.store().total_supply()?;
        report.state_root = self.app.store().snapshot().state_root()?;
        info!(
            height = report.final_height,
            state_root = %report.state_root,
            jailings = report.downtime_jailings,
            "simulation finished"
        );
        Ok(report)
    }
}

/// Builds and runs a simulation from `config`.
pub fn run_simulation(config: SimulationConfig) -> Result<SimulationReport> {
    Simulation::new(config)?.run()
}

use proptest::prelude::*;
use staking_core::core::simulation::setup_accounts;
use staking_core::{
    run_simulation, EventOutcome, MsgKind, OperationWeights, Params, SimulationConfig,
    StakingCore, StakingError, MAX_GENESIS_SUPPLY,
};

fn config(seed: u64, steps: u64) -> SimulationConfig {
    SimulationConfig {
        seed,
        num_accounts: 6,
        steps,
        ..SimulationConfig::default()
    }
}

#[test]
fn test_same_seed_same_run() {
    let a = run_simulation(config(42, 150)).unwrap();
    let b = run_simulation(config(42, 150)).unwrap();
    assert_eq!(a.events, b.events);
    assert_eq!(a.tallies, b.tallies);
    assert_eq!(a.state_root, b.state_root);

    println!("OK: seed 42 reproduced state root {}", a.state_root);
}

#[test]
fn test_different_seeds_diverge() {
    let a = run_simulation(config(1, 100)).unwrap();
    let b = run_simulation(config(2, 100)).unwrap();
    assert_ne!(a.state_root, b.state_root);
}

#[test]
fn test_run_exercises_every_kind() {
    let report = run_simulation(config(42, 400)).unwrap();
    for kind in MsgKind::ALL {
        let seen: u64 = [EventOutcome::Success, EventOutcome::Failure, EventOutcome::NoOp]
            .iter()
            .map(|o| report.tally(kind, *o))
            .sum();
        assert!(seen > 0, "{} never drawn", kind);
    }
    assert!(report.tally(MsgKind::CreateValidator, EventOutcome::Success) > 0);
    assert!(report.tally(MsgKind::Delegate, EventOutcome::Success) > 0);
    assert_eq!(report.total_supply, 6 * 1_000_000);
}

#[test]
fn test_high_miss_rate_jails_validators() {
    let mut cfg = config(9, 300);
    cfg.miss_rate = 0.9;
    cfg.params.slashing.signed_blocks_window = 10;
    cfg.weights = OperationWeights {
        create_validator: 10,
        edit_validator: 0,
        delegate: 5,
        begin_unbonding: 0,
        begin_redelegate: 0,
        jail: 0,
        unjail: 0,
        submit_evidence: 0,
    };
    let report = run_simulation(cfg).unwrap();
    assert!(report.downtime_jailings > 0);
    assert_eq!(report.total_supply, 6 * 1_000_000);
}

#[test]
fn test_unbondings_mature_during_run() {
    let mut cfg = config(5, 300);
    cfg.params.unbonding_time_secs = 3 * 3600;
    let report = run_simulation(cfg).unwrap();
    assert!(report.tally(MsgKind::BeginUnbonding, EventOutcome::Success) > 0);
    assert!(report.released_tokens > 0);
}

#[test]
fn test_invalid_config_rejected() {
    let mut cfg = config(1, 10);
    cfg.num_accounts = 0;
    let err = run_simulation(cfg).unwrap_err();
    assert!(matches!(err, StakingError::Config(_)));
}

#[test]
fn test_zero_balances_only_produce_noops() {
    let mut cfg = config(3, 50);
    cfg.initial_balance = 0;
    cfg.weights = OperationWeights {
        create_validator: 1,
        edit_validator: 0,
        delegate: 4,
        begin_unbonding: 0,
        begin_redelegate: 0,
        jail: 0,
        unjail: 0,
        submit_evidence: 0,
    };
    let (_, balances) = setup_accounts(&cfg);
    let genesis = StakingCore::genesis(cfg.params.clone(), &balances, cfg.genesis_time).unwrap();
    let genesis_root = genesis.store().snapshot().state_root().unwrap();

    let report = run_simulation(cfg).unwrap();
    assert!(report.events.iter().all(|e| e.outcome == EventOutcome::NoOp));
    assert!(report.tally(MsgKind::Delegate, EventOutcome::NoOp) > 0);
    assert_eq!(
        report.tally(MsgKind::Delegate, EventOutcome::NoOp)
            + report.tally(MsgKind::CreateValidator, EventOutcome::NoOp),
        50
    );
    assert!(report.tallies.contains_key("stake/MsgDelegate/no-operation"));
    assert_eq!(report.state_root, genesis_root);
}

#[test]
fn test_oversized_genesis_supply_rejected() {
    let mut cfg = config(1, 10);
    cfg.num_accounts = 3;
    cfg.initial_balance = u128::MAX / 2;
    assert!(matches!(cfg.validate(), Err(StakingError::Config(_))));
    assert!(matches!(run_simulation(cfg), Err(StakingError::Config(_))));

    let mut cfg = config(1, 10);
    cfg.num_accounts = 1;
    cfg.initial_balance = MAX_GENESIS_SUPPLY;
    assert!(cfg.validate().is_ok());

    let balances = vec![("a".to_string(), u128::MAX), ("b".to_string(), 1)];
    let err = StakingCore::genesis(Params::default(), &balances, 0).unwrap_err();
    assert!(matches!(err, StakingError::Config(_)));
}

#[test]
fn test_block_time_overflow_rejected() {
    let mut cfg = config(1, 10);
    cfg.genesis_time = u64::MAX - 5;
    assert!(matches!(run_simulation(cfg), Err(StakingError::Config(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_supply_conserved_for_any_seed(seed in any::<u64>(), randomize in any::<bool>()) {
        let mut cfg = config(seed, 80);
        cfg.randomize_balances = randomize;
        cfg.invariant_period = 1;
        let (_, balances) = staking_core::core::simulation::setup_accounts(&cfg);
        let genesis: u128 = balances.iter().map(|(_, b)| *b).sum();

        let report = run_simulation(cfg).unwrap();
        prop_assert_eq!(report.total_supply, genesis);
        prop_assert_eq!(report.events.len(), 80);
        prop_assert_eq!(report.invariant_checks, 81);
    }

    #[test]
    fn prop_run_is_deterministic(seed in any::<u64>()) {
        let a = run_simulation(config(seed, 40)).unwrap();
        let b = run_simulation(config(seed, 40)).unwrap();
        prop_assert_eq!(a.events, b.events);
        prop_assert_eq!(a.state_root, b.state_root);
    }
}

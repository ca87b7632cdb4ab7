use staking_core::core::simulation::setup_accounts;
use staking_core::*;
use std::collections::BTreeSet;

fn rates() -> CommissionRates {
    CommissionRates {
        rate: Dec::with_prec(1, 1),
        max_rate: Dec::with_prec(2, 1),
        max_change_rate: Dec::with_prec(1, 2),
    }
}

fn shares(n: u128) -> Dec {
    Dec::from_int(n).unwrap()
}

fn create_validator(acc: &SimAccount, amount: u128) -> Msg {
    Msg::CreateValidator(MsgCreateValidator {
        description: Description::new("validator-one"),
        commission: rates(),
        delegator: acc.address.clone(),
        validator: acc.address.clone(),
        pub_key: acc.pub_key_hex(),
        self_delegation: Coin::new(DEFAULT_BOND_DENOM, amount),
    })
}

fn delegate(from: &SimAccount, to: &SimAccount, amount: u128) -> Msg {
    Msg::Delegate(MsgDelegate {
        delegator: from.address.clone(),
        validator: to.address.clone(),
        amount: Coin::new(DEFAULT_BOND_DENOM, amount),
    })
}

fn unbond(from: &SimAccount, to: &SimAccount, amount: Dec) -> Msg {
    Msg::BeginUnbonding(MsgBeginUnbonding {
        delegator: from.address.clone(),
        validator: to.address.clone(),
        shares: amount,
    })
}

/// Seed-42 accounts, each funded with 1 000 000, at block 1.
fn seeded_app() -> (StakingCore, Vec<SimAccount>) {
    let config = SimulationConfig {
        seed: 42,
        num_accounts: 3,
        ..SimulationConfig::default()
    };
    let (accounts, balances) = setup_accounts(&config);
    let mut app = StakingCore::genesis(Params::default(), &balances, 1_000).unwrap();
    app.begin_block(1_000, &BTreeSet::new()).unwrap();
    (app, accounts)
}

#[test]
fn test_seed_42_scenario() {
    let (mut app, accounts) = seeded_app();
    let (v1, a2) = (&accounts[0], &accounts[1]);

    let result = app.deliver(&create_validator(v1, 100_000)).unwrap();
    assert!(result.is_success());
    let validator = app.store().validator(&v1.address).unwrap();
    assert_eq!(validator.delegator_shares, shares(100_000));
    assert_eq!(app.store().pool().bonded_tokens, 100_000);
    assert_eq!(app.store().bond_balance(&v1.address), 900_000);

    let result = app.deliver(&delegate(a2, v1, 50_000)).unwrap();
    assert!(result.is_success());
    assert_eq!(
        app.store().delegation(&a2.address, &v1.address).unwrap().shares,
        shares(50_000)
    );
    assert_eq!(
        app.store().validator(&v1.address).unwrap().delegator_shares,
        shares(150_000)
    );

    let before = app.store().snapshot().to_bytes().unwrap();
    let result = app.deliver(&unbond(a2, v1, shares(200_000))).unwrap();
    assert!(matches!(result.error, Some(StakingError::Precondition(_))));
    assert!(!result.committed);
    assert_eq!(app.store().snapshot().to_bytes().unwrap(), before);

    println!("OK: seed-42 scenario passed");
}

#[test]
fn test_failed_message_atomicity() {
    let (mut app, accounts) = seeded_app();
    app.deliver(&create_validator(&accounts[0], 10_000)).unwrap();
    let before = app.store().snapshot();

    let failing = vec![
        // Unknown validator
        delegate(&accounts[1], &accounts[2], 10),
        // Balance exceeded
        delegate(&accounts[1], &accounts[0], 2_000_000),
        // Duplicate validator
        create_validator(&accounts[0], 10),
        // Validator and signing info written before the self-delegation debit fails
        create_validator(&accounts[1], 2_000_000),
        // Self redelegation
        Msg::BeginRedelegate(MsgBeginRedelegate {
            delegator: accounts[0].address.clone(),
            validator_src: accounts[0].address.clone(),
            validator_dst: accounts[0].address.clone(),
            shares: shares(1),
        }),
        // Unjail of a validator that is not jailed
        Msg::Unjail(MsgUnjail {
            validator: accounts[0].address.clone(),
        }),
    ];
    for msg in failing {
        let result = app.deliver(&msg).unwrap();
        assert!(!result.is_success(), "{:?} should fail", msg.kind());
        assert_eq!(app.store().snapshot(), before);
    }

    println!("OK: failed messages leave the store byte-identical");
}

#[test]
fn test_oversized_unbonding_time_fails_without_panic() {
    let config = SimulationConfig {
        seed: 42,
        num_accounts: 2,
        ..SimulationConfig::default()
    };
    let (accounts, balances) = setup_accounts(&config);
    let mut params = Params::default();
    params.unbonding_time_secs = u64::MAX;
    let mut app = StakingCore::genesis(params, &balances, 1_000).unwrap();
    app.begin_block(1_000, &BTreeSet::new()).unwrap();
    app.deliver(&create_validator(&accounts[0], 10_000)).unwrap();
    let before = app.store().snapshot();

    let result = app.deliver(&unbond(&accounts[0], &accounts[0], shares(100))).unwrap();
    assert!(!result.is_success());
    assert!(matches!(result.error, Some(StakingError::Precondition(_))));
    assert_eq!(app.store().snapshot(), before);
}

#[test]
fn test_jail_unjail_state_machine() {
    let (mut app, accounts) = seeded_app();
    let v = &accounts[0];
    app.deliver(&create_validator(v, 10_000)).unwrap();

    let jail = Msg::Jail(MsgJail {
        validator: v.address.clone(),
        reason: JailReason::Downtime,
    });
    let unjail = Msg::Unjail(MsgUnjail {
        validator: v.address.clone(),
    });

    assert!(app.deliver(&jail).unwrap().committed);
    let record = app.store().validator(&v.address).unwrap();
    assert!(record.jailed);
    assert_eq!(record.status, BondStatus::Unbonding);
    assert_eq!(app.store().pool().bonded_tokens, 0);
    assert_eq!(app.store().pool().loose_tokens, 10_000);

    // Too early
    assert!(!app.deliver(&unjail).unwrap().is_success());

    let until = app.store().signing_info(&v.address).unwrap().jailed_until;
    app.begin_block(until, &BTreeSet::new()).unwrap();
    assert!(app.deliver(&unjail).unwrap().is_success());
    let record = app.store().validator(&v.address).unwrap();
    assert!(!record.jailed);
    assert!(record.is_bonded());
    assert_eq!(app.store().pool().bonded_tokens, 10_000);

    // Unjailing again fails: not jailed
    assert!(!app.deliver(&unjail).unwrap().is_success());
}

#[test]
fn test_jail_is_idempotent() {
    let (mut app, accounts) = seeded_app();
    let v = &accounts[0];
    app.deliver(&create_validator(v, 10_000)).unwrap();
    let jail = Msg::Jail(MsgJail {
        validator: v.address.clone(),
        reason: JailReason::Misbehaviour,
    });
    app.deliver(&jail).unwrap();
    let before = app.store().snapshot().to_bytes().unwrap();

    let again = app.deliver(&jail).unwrap();
    assert!(again.is_success());
    assert!(again.is_noop());
    assert!(!again.committed);
    assert_eq!(app.store().snapshot().to_bytes().unwrap(), before);
}

#[test]
fn test_share_monotonicity() {
    let (mut app, accounts) = seeded_app();
    let (v, d) = (&accounts[0], &accounts[1]);
    app.deliver(&create_validator(v, 10_000)).unwrap();

    let held = |app: &StakingCore| {
        app.store()
            .delegation(&d.address, &v.address)
            .map(|x| x.shares)
            .unwrap_or(Dec::ZERO)
    };

    let mut last = held(&app);
    for amount in [1, 500, 7_777] {
        app.deliver(&delegate(d, v, amount)).unwrap();
        let now = held(&app);
        assert!(now > last);
        last = now;
    }
    for amount in [100, 1_000] {
        app.deliver(&unbond(d, v, shares(amount))).unwrap();
        let now = held(&app);
        assert!(now < last);
        last = now;
    }
}

#[test]
fn test_double_sign_evidence_conserves_supply() {
    let (mut app, accounts) = seeded_app();
    let v = &accounts[0];
    app.deliver(&create_validator(v, 100_000)).unwrap();
    let supply = app.store().total_supply().unwrap();
    for _ in 0..5 {
        let t = app.block().time + 3_600;
        app.begin_block(t, &BTreeSet::new()).unwrap();
    }

    let evidence = Msg::SubmitEvidence(MsgSubmitEvidence {
        submitter: accounts[1].address.clone(),
        evidence: Evidence {
            validator: v.address.clone(),
            height: 3,
            time: app.block().time - 3 * 3_600,
            side_chain: Some("bsc".into()),
        },
    });
    let result = app.deliver(&evidence).unwrap();
    let outcome = result.outcome.unwrap();
    assert_eq!(outcome.get("slashed"), Some("5000"));
    assert_eq!(outcome.get("side-chain-id"), Some("56"));

    assert_eq!(app.store().total_supply().unwrap(), supply);
    assert_eq!(app.store().bond_balance(COMMUNITY_POOL_ADDRESS), 5_000);
    assert!(app.store().validator(&v.address).unwrap().jailed);
    assert!(check_invariants(app.store(), supply).is_ok());

    // The same infraction cannot be slashed twice.
    assert!(!app.deliver(&evidence).unwrap().is_success());
}

#[test]
fn test_redelegation_to_zero_share_validator() {
    let (mut app, accounts) = seeded_app();
    let (a, b) = (&accounts[0], &accounts[1]);
    app.deliver(&create_validator(a, 1_000)).unwrap();
    app.deliver(&create_validator(b, 10)).unwrap();
    app.deliver(&unbond(b, b, shares(10))).unwrap();
    assert!(app.store().validator(&b.address).unwrap().delegator_shares.is_zero());

    let msg = Msg::BeginRedelegate(MsgBeginRedelegate {
        delegator: a.address.clone(),
        validator_src: a.address.clone(),
        validator_dst: b.address.clone(),
        shares: shares(250),
    });
    assert!(app.deliver(&msg).unwrap().is_success());
    assert_eq!(
        app.store().delegation(&a.address, &b.address).unwrap().shares,
        shares(250)
    );
    assert_eq!(app.store().validator(&b.address).unwrap().tokens, 250);
}

#[test]
fn test_query_routes() {
    let (mut app, accounts) = seeded_app();
    let (v, d) = (&accounts[0], &accounts[1]);
    app.deliver(&create_validator(v, 100_000)).unwrap();
    app.deliver(&delegate(d, v, 50_000)).unwrap();
    app.deliver(&unbond(d, v, shares(1_000))).unwrap();

    let validators = app.query("/stake/validators").unwrap();
    assert_eq!(validators.as_array().unwrap().len(), 1);

    let delegation = app
        .query(&format!("/stake/delegators/{}/delegations/{}", d.address, v.address))
        .unwrap();
    assert_eq!(delegation["shares"], "49000.0000000000");

    let ubds = app
        .query(&format!("/stake/validators/{}/unbonding_delegations", v.address))
        .unwrap();
    assert_eq!(ubds.as_array().unwrap().len(), 1);

    let bonded_to = app
        .query(&format!("/stake/delegators/{}/validators", d.address))
        .unwrap();
    assert_eq!(bonded_to[0]["operator"], v.address.as_str());

    let info = app
        .query(&format!("/slashing/signing_info/{}", v.address))
        .unwrap();
    assert_eq!(info["start_height"], 1);

    assert!(app.query("/stake/unknown").is_err());
    assert!(app
        .query(&format!("/stake/delegators/{}/delegations/{}", v.address, d.address))
        .is_err());
}

#[test]
fn test_side_chain_ids() {
    assert_eq!(side_chain_id_from_text("bsc").unwrap(), 56);
    assert_eq!(side_chain_id_from_text("TEST").unwrap(), 97);
    let err: StakingError = side_chain_id_from_text("cosmos").unwrap_err().into();
    assert_eq!(
        err,
        StakingError::Validation("'cosmos' is not a valid side chain id".into())
    );
}

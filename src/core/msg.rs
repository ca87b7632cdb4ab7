//! Staking and slashing messages.
//!
//! The message set is closed: `Msg` is a sum type over every operation the transition engine
//! supports, and `handler::handle` matches on it. `validate_basic` performs the stateless
//! structural checks; anything that depends on the store is a precondition checked by the
//! engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::coin::Coin;
use crate::core::dec::Dec;
use crate::core::slashing::side_chain_id_from_text;
use crate::core::store::Address;
use crate::core::validator::{CommissionRates, Description};
use crate::error::StakingError;
use crate::utils::{decode_pub_key, is_valid_address};

/// Errors produced by stateless message validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MsgValidationError {
    #[error("invalid {0} address '{1}'")]
    InvalidAddress(&'static str, String),

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("invalid denomination '{0}'")]
    InvalidDenom(String),

    #[error("shares must be positive")]
    InvalidShares,

    #[error("moniker must not be empty")]
    EmptyMoniker,

    #[error("description field '{0}' too long")]
    DescriptionTooLong(&'static str),

    #[error("nothing to edit")]
    EmptyEdit,

    #[error("{0} must be within [0, 1], got {1}")]
    RateOutOfRange(&'static str, Dec),

    #[error("invalid public key: {0}")]
    InvalidPubKey(String),

    #[error("validator must self-delegate from its operator account")]
    SelfDelegationMismatch,

    #[error("evidence height must be positive")]
    InvalidEvidenceHeight,

    #[error("{0}")]
    InvalidSideChain(String),
}

impl From<MsgValidationError> for StakingError {
    fn from(err: MsgValidationError) -> Self {
        StakingError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateValidator {
    pub description: Description,
    pub commission: CommissionRates,
    pub delegator: Address,
    pub validator: Address,
    /// Hex-encoded secp256k1 consensus key.
    pub pub_key: String,
    pub self_delegation: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEditValidator {
    pub description: Description,
    pub validator: Address,
    pub commission_rate: Option<Dec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDelegate {
    pub delegator: Address,
    pub validator: Address,
    pub amount: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBeginUnbonding {
    pub delegator: Address,
    pub validator: Address,
    pub shares: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBeginRedelegate {
    pub delegator: Address,
    pub validator_src: Address,
    pub validator_dst: Address,
    pub shares: Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JailReason {
    /// Missed too many blocks.
    Downtime,
    /// Jailed by the consensus layer for a reason it proved out of band.
    Misbehaviour,
}

impl fmt::Display for JailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JailReason::Downtime => write!(f, "downtime"),
            JailReason::Misbehaviour => write!(f, "misbehaviour"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgJail {
    pub validator: Address,
    pub reason: JailReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUnjail {
    pub validator: Address,
}

/// Proof that a validator double-signed at `height`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub validator: Address,
    pub height: u64,
    /// Block time of the infraction.
    pub time: u64,
    /// Side chain the infraction happened on ("bsc", "test"); `None` for the home chain.
    pub side_chain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitEvidence {
    pub submitter: Address,
    pub evidence: Evidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Msg {
    CreateValidator(MsgCreateValidator),
    EditValidator(MsgEditValidator),
    Delegate(MsgDelegate),
    BeginUnbonding(MsgBeginUnbonding),
    BeginRedelegate(MsgBeginRedelegate),
    Jail(MsgJail),
    Unjail(MsgUnjail),
    SubmitEvidence(MsgSubmitEvidence),
}

/// Message kind, used to tag simulation events and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MsgKind {
    CreateValidator,
    EditValidator,
    Delegate,
    BeginUnbonding,
    BeginRedelegate,
    Jail,
    Unjail,
    SubmitEvidence,
}

impl MsgKind {
    pub const ALL: [MsgKind; 8] = [
        MsgKind::CreateValidator,
        MsgKind::EditValidator,
        MsgKind::Delegate,
        MsgKind::BeginUnbonding,
        MsgKind::BeginRedelegate,
        MsgKind::Jail,
        MsgKind::Unjail,
        MsgKind::SubmitEvidence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MsgKind::CreateValidator => "stake/MsgCreateValidator",
            MsgKind::EditValidator => "stake/MsgEditValidator",
            MsgKind::Delegate => "stake/MsgDelegate",
            MsgKind::BeginUnbonding => "stake/MsgBeginUnbonding",
            MsgKind::BeginRedelegate => "stake/MsgBeginRedelegate",
            MsgKind::Jail => "slashing/MsgJail",
            MsgKind::Unjail => "slashing/MsgUnjail",
            MsgKind::SubmitEvidence => "slashing/MsgSubmitEvidence",
        }
    }
}

impl fmt::Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_address(field: &'static str, address: &str) -> Result<(), MsgValidationError> {
    if is_valid_address(address) {
        Ok(())
    } else {
        Err(MsgValidationError::InvalidAddress(field, address.to_string()))
    }
}

fn check_rate(field: &'static str, rate: Dec) -> Result<(), MsgValidationError> {
    if rate > Dec::ONE {
        return Err(MsgValidationError::RateOutOfRange(field, rate));
    }
    Ok(())
}

fn check_coin(coin: &Coin) -> Result<(), MsgValidationError> {
    if !Coin::is_valid_denom(&coin.denom) {
        return Err(MsgValidationError::InvalidDenom(coin.denom.clone()));
    }
    if coin.is_zero() {
        return Err(MsgValidationError::InvalidAmount);
    }
    Ok(())
}

fn check_description(description: &Description) -> Result<(), MsgValidationError> {
    description
        .check_lengths()
        .map_err(MsgValidationError::DescriptionTooLong)
}

impl Msg {
    pub fn kind(&self) -> MsgKind {
        match self {
            Msg::CreateValidator(_) => MsgKind::CreateValidator,
            Msg::EditValidator(_) => MsgKind::EditValidator,
            Msg::Delegate(_) => MsgKind::Delegate,
            Msg::BeginUnbonding(_) => MsgKind::BeginUnbonding,
            Msg::BeginRedelegate(_) => MsgKind::BeginRedelegate,
            Msg::Jail(_) => MsgKind::Jail,
            Msg::Unjail(_) => MsgKind::Unjail,
            Msg::SubmitEvidence(_) => MsgKind::SubmitEvidence,
        }
    }

    /// Stateless structural checks. Passing messages may still fail preconditions.
    pub fn validate_basic(&self) -> Result<(), MsgValidationError> {
        match self {
            Msg::CreateValidator(m) => {
                check_address("delegator", &m.delegator)?;
                check_address("validator", &m.validator)?;
                if m.delegator != m.validator {
                    return Err(MsgValidationError::SelfDelegationMismatch);
                }
                decode_pub_key(&m.pub_key)
                    .map_err(|e| MsgValidationError::InvalidPubKey(e.to_string()))?;
                check_coin(&m.self_delegation)?;
                if m.description.moniker.is_empty() {
                    return Err(MsgValidationError::EmptyMoniker);
                }
                check_description(&m.description)?;
                check_rate("rate", m.commission.rate)?;
                check_rate("max rate", m.commission.max_rate)?;
                check_rate("max change rate", m.commission.max_change_rate)?;
            }
            Msg::EditValidator(m) => {
                check_address("validator", &m.validator)?;
                if m.description == Description::default() && m.commission_rate.is_none() {
                    return Err(MsgValidationError::EmptyEdit);
                }
                check_description(&m.description)?;
                if let Some(rate) = m.commission_rate {
                    check_rate("rate", rate)?;
                }
            }
            Msg::Delegate(m) => {
                check_address("delegator", &m.delegator)?;
                check_address("validator", &m.validator)?;
                check_coin(&m.amount)?;
            }
            Msg::BeginUnbonding(m) => {
                check_address("delegator", &m.delegator)?;
                check_address("validator", &m.validator)?;
                if m.shares.is_zero() {
                    return Err(MsgValidationError::InvalidShares);
                }
            }
            Msg::BeginRedelegate(m) => {
                check_address("delegator", &m.delegator)?;
                check_address("source validator", &m.validator_src)?;
                check_address("destination validator", &m.validator_dst)?;
                if m.shares.is_zero() {
                    return Err(MsgValidationError::InvalidShares);
                }
            }
            Msg::Jail(m) => check_address("validator", &m.validator)?,
            Msg::Unjail(m) => check_address("validator", &m.validator)?,
            Msg::SubmitEvidence(m) => {
                check_address("submitter", &m.submitter)?;
                check_address("validator", &m.evidence.validator)?;
                if m.evidence.height == 0 {
                    return Err(MsgValidationError::InvalidEvidenceHeight);
                }
                if let Some(name) = &m.evidence.side_chain {
                    side_chain_id_from_text(name)
                        .map_err(|e| MsgValidationError::InvalidSideChain(e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    /// Canonical JSON encoding, used in traces.
    pub fn sign_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{PublicKey, Secp256k1, SecretKey};

    fn addr(b: u8) -> Address {
        hex::encode([b; 20])
    }

    fn pub_key_hex() -> String {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[3u8; 32]).unwrap();
        hex::encode(PublicKey::from_secret_key(&secp, &sk).serialize())
    }

    fn create(amount: u128) -> Msg {
        Msg::CreateValidator(MsgCreateValidator {
            description: Description::new("val"),
            commission: CommissionRates {
                rate: Dec::with_prec(1, 1),
                max_rate: Dec::with_prec(2, 1),
                max_change_rate: Dec::with_prec(1, 2),
            },
            delegator: addr(1),
            validator: addr(1),
            pub_key: pub_key_hex(),
            self_delegation: Coin::new("steak", amount),
        })
    }

    #[test]
    fn test_create_validator_validate_basic() {
        assert!(create(10).validate_basic().is_ok());
        assert_eq!(create(0).validate_basic(), Err(MsgValidationError::InvalidAmount));
    }

    #[test]
    fn test_create_validator_requires_self_delegation() {
        let mut msg = create(10);
        if let Msg::CreateValidator(m) = &mut msg {
            m.validator = addr(2);
        }
        assert_eq!(msg.validate_basic(), Err(MsgValidationError::SelfDelegationMismatch));
    }

    #[test]
    fn test_create_validator_rejects_bad_pub_key() {
        let mut msg = create(10);
        if let Msg::CreateValidator(m) = &mut msg {
            m.pub_key = "00".into();
        }
        assert!(matches!(msg.validate_basic(), Err(MsgValidationError::InvalidPubKey(_))));
    }

    #[test]
    fn test_rate_out_of_range() {
        let msg = Msg::EditValidator(MsgEditValidator {
            description: Description::new("x"),
            validator: addr(1),
            commission_rate: Some(Dec::with_prec(11, 1)),
        });
        assert!(matches!(msg.validate_basic(), Err(MsgValidationError::RateOutOfRange(_, _))));
    }

    #[test]
    fn test_empty_edit() {
        let msg = Msg::EditValidator(MsgEditValidator {
            description: Description::default(),
            validator: addr(1),
            commission_rate: None,
        });
        assert_eq!(msg.validate_basic(), Err(MsgValidationError::EmptyEdit));
    }

    #[test]
    fn test_zero_shares_rejected() {
        let msg = Msg::BeginUnbonding(MsgBeginUnbonding {
            delegator: addr(1),
            validator: addr(2),
            shares: Dec::ZERO,
        });
        assert_eq!(msg.validate_basic(), Err(MsgValidationError::InvalidShares));
    }

    #[test]
    fn test_same_src_dst_passes_validate_basic() {
        // Self-redelegation is a precondition failure, not a structural one.
        let msg = Msg::BeginRedelegate(MsgBeginRedelegate {
            delegator: addr(1),
            validator_src: addr(2),
            validator_dst: addr(2),
            shares: Dec::ONE,
        });
        assert!(msg.validate_basic().is_ok());
    }

    #[test]
    fn test_evidence_side_chain() {
        let evidence = |side_chain: Option<&str>| {
            Msg::SubmitEvidence(MsgSubmitEvidence {
                submitter: addr(1),
                evidence: Evidence {
                    validator: addr(2),
                    height: 5,
                    time: 10,
                    side_chain: side_chain.map(str::to_string),
                },
            })
        };
        assert!(evidence(None).validate_basic().is_ok());
        assert!(evidence(Some("BSC")).validate_basic().is_ok());
        assert!(matches!(
            evidence(Some("eth")).validate_basic(),
            Err(MsgValidationError::InvalidSideChain(_))
        ));
    }

    #[test]
    fn test_msg_serde_tagged() {
        let msg = Msg::Unjail(MsgUnjail { validator: addr(4) });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"Unjail\""));
        let back: Msg = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), MsgKind::Unjail);
    }
}

//! Staking and slashing parameters.
//!
//! Parameters are part of the store (queryable through `/stake/parameters`) and are fixed for the
//! lifetime of a run. They can be loaded from a JSON file; missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::coin::{Coin, DEFAULT_BOND_DENOM};
use crate::core::dec::Dec;
use crate::error::{Result, StakingError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Only this denomination can be bonded.
    pub bond_denom: String,
    /// Delay between `BeginUnbonding`/`BeginRedelegate` and release of the entry.
    pub unbonding_time_secs: u64,
    /// Maximum pending entries per unbonding delegation or redelegation.
    pub max_entries: u16,
    /// Minimum self-bond (tokens) a validator needs to be unjailed.
    pub min_self_delegation: u128,
    /// Minimum delay between two commission rate changes.
    pub commission_change_interval_secs: u64,
    pub slashing: SlashingParams,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            bond_denom: DEFAULT_BOND_DENOM.to_string(),
            unbonding_time_secs: 3 * 24 * 3600,
            max_entries: 7,
            min_self_delegation: 1,
            commission_change_interval_secs: 24 * 3600,
            slashing: SlashingParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashingParams {
    /// Evidence older than this (relative to block time) is rejected as stale.
    pub max_evidence_age_secs: u64,
    /// Number of blocks over which liveness is measured.
    pub signed_blocks_window: u64,
    /// Fraction of the window a validator must sign to avoid being jailed for downtime.
    pub min_signed_per_window: Dec,
    pub downtime_jail_duration_secs: u64,
    pub double_sign_jail_duration_secs: u64,
    pub slash_fraction_double_sign: Dec,
    pub slash_fraction_downtime: Dec,
}

impl Default for SlashingParams {
    fn default() -> Self {
        Self {
            max_evidence_age_secs: 2 * 24 * 3600,
            signed_blocks_window: 100,
            min_signed_per_window: Dec::with_prec(5, 1),
            downtime_jail_duration_secs: 2 * 3600,
            double_sign_jail_duration_secs: 2 * 24 * 3600,
            slash_fraction_double_sign: Dec::with_prec(5, 2),
            slash_fraction_downtime: Dec::with_prec(1, 2),
        }
    }
}

impl SlashingParams {
    /// Blocks a validator may miss within the window before it is jailed.
    pub fn max_missed_blocks(&self) -> Result<u64> {
        let min_signed = self
            .min_signed_per_window
            .mul_int_floor(self.signed_blocks_window as u128)? as u64;
        Ok(self.signed_blocks_window.saturating_sub(min_signed))
    }
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        if !Coin::is_valid_denom(&self.bond_denom) {
            return Err(StakingError::Config(format!(
                "invalid bond denom '{}'",
                self.bond_denom
            )));
        }
        if self.unbonding_time_secs == 0 {
            return Err(StakingError::Config("unbonding time must be positive".into()));
        }
        if self.max_entries == 0 {
            return Err(StakingError::Config("max entries must be positive".into()));
        }
        let s = &self.slashing;
        if s.signed_blocks_window == 0 {
            return Err(StakingError::Config("signed blocks window must be positive".into()));
        }
        for (name, value) in [
            ("min_signed_per_window", s.min_signed_per_window),
            ("slash_fraction_double_sign", s.slash_fraction_double_sign),
            ("slash_fraction_downtime", s.slash_fraction_downtime),
        ] {
            if value > Dec::ONE {
                return Err(StakingError::Config(format!("{} must be <= 1, got {}", name, value)));
            }
        }
        Ok(())
    }

    /// Loads and validates parameters from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StakingError::Config(format!("{}: {}", path.display(), e)))?;
        let params: Params = serde_json::from_str(&raw)?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let raw = r#"{"unbonding_time_secs": 60, "slashing": {"signed_blocks_window": 10}}"#;
        let params: Params = serde_json::from_str(raw).unwrap();
        assert_eq!(params.unbonding_time_secs, 60);
        assert_eq!(params.bond_denom, DEFAULT_BOND_DENOM);
        assert_eq!(params.slashing.signed_blocks_window, 10);
        assert_eq!(params.slashing.slash_fraction_double_sign, Dec::with_prec(5, 2));
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let mut params = Params::default();
        params.slashing.slash_fraction_downtime = Dec::from_int(2).unwrap();
        assert!(matches!(params.validate(), Err(StakingError::Config(_))));
    }

    #[test]
    fn test_max_missed_blocks() {
        let s = SlashingParams::default();
        assert_eq!(s.max_missed_blocks().unwrap(), 50);
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = Params::from_json_file("/nonexistent/params.json").unwrap_err();
        assert!(matches!(err, StakingError::Config(_)));
    }
}

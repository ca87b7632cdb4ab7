//! Read-only query surface.
//!
//! Queries are addressed by REST-style paths and answered with JSON snapshots of store records.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::store::{Address, Store};
use crate::error::{Result, StakingError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown query path '{0}'")]
    UnknownPath(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl From<QueryError> for StakingError {
    fn from(err: QueryError) -> Self {
        StakingError::Query(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Validators,
    Validator(Address),
    ValidatorUnbondingDelegations(Address),
    ValidatorRedelegations(Address),
    DelegatorDelegations(Address),
    Delegation { delegator: Address, validator: Address },
    DelegatorUnbondingDelegations(Address),
    UnbondingDelegation { delegator: Address, validator: Address },
    DelegatorRedelegations(Address),
    DelegatorValidators(Address),
    DelegatorValidator { delegator: Address, validator: Address },
    Pool,
    Parameters,
    SigningInfo(Address),
}

impl Query {
    /// Parses a path such as `/stake/delegators/{del}/delegations/{val}`.
    pub fn parse(path: &str) -> std::result::Result<Query, QueryError> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        let owned = |s: &str| s.to_string();
        let query = match parts.as_slice() {
            ["stake", "validators"] => Query::Validators,
            ["stake", "validators", v] => Query::Validator(owned(v)),
            ["stake", "validators", v, "unbonding_delegations"] => {
                Query::ValidatorUnbondingDelegations(owned(v))
            }
            ["stake", "validators", v, "redelegations"] => Query::ValidatorRedelegations(owned(v)),
            ["stake", "delegators", d, "delegations"] => Query::DelegatorDelegations(owned(d)),
            ["stake", "delegators", d, "delegations", v] => Query::Delegation {
                delegator: owned(d),
                validator: owned(v),
            },
            ["stake", "delegators", d, "unbonding_delegations"] => {
                Query::DelegatorUnbondingDelegations(owned(d))
            }
            ["stake", "delegators", d, "unbonding_delegations", v] => Query::UnbondingDelegation {
                delegator: owned(d),
                validator: owned(v),
            },
            ["stake", "delegators", d, "redelegations"] => Query::DelegatorRedelegations(owned(d)),
            ["stake", "delegators", d, "validators"] => Query::DelegatorValidators(owned(d)),
            ["stake", "delegators", d, "validators", v] => Query::DelegatorValidator {
                delegator: owned(d),
                validator: owned(v),
            },
            ["stake", "pool"] => Query::Pool,
            ["stake", "parameters"] => Query::Parameters,
            ["slashing", "signing_info", v] => Query::SigningInfo(owned(v)),
            _ => return Err(QueryError::UnknownPath(path.to_string())),
        };
        Ok(query)
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| QueryError::Encoding(e.to_string()).into())
}

fn found<T>(record: Option<T>, what: impl FnOnce() -> String) -> Result<T> {
    record.ok_or_else(|| QueryError::NotFound(what()).into())
}

/// Answers a query against `store`. Never mutates the store.
pub fn handle_query(store: &Store, query: &Query) -> Result<Value> {
    match query {
        Query::Validators => to_value(&store.validators().collect::<Vec<_>>()),
        Query::Validator(v) => to_value(found(store.validator(v), || format!("validator {}", v))?),
        Query::ValidatorUnbondingDelegations(v) => to_value(
            &store
                .unbonding_delegations()
                .filter(|u| &u.validator == v)
                .collect::<Vec<_>>(),
        ),
        Query::ValidatorRedelegations(v) => to_value(
            &store
                .redelegations()
                .filter(|r| &r.validator_src == v)
                .collect::<Vec<_>>(),
        ),
        Query::DelegatorDelegations(d) => to_value(&store.delegations_of(d)),
        Query::Delegation {
            delegator,
            validator,
        } => to_value(found(store.delegation(delegator, validator), || {
            format!("delegation {} -> {}", delegator, validator)
        })?),
        Query::DelegatorUnbondingDelegations(d) => to_value(
            &store
                .unbonding_delegations()
                .filter(|u| &u.delegator == d)
                .collect::<Vec<_>>(),
        ),
        Query::UnbondingDelegation {
            delegator,
            validator,
        } => to_value(found(store.unbonding_delegation(delegator, validator), || {
            format!("unbonding delegation {} -> {}", delegator, validator)
        })?),
        Query::DelegatorRedelegations(d) => to_value(
            &store
                .redelegations()
                .filter(|r| &r.delegator == d)
                .collect::<Vec<_>>(),
        ),
        Query::DelegatorValidators(d) => {
            let validators: Vec<_> = store
                .delegations_of(d)
                .into_iter()
                .filter_map(|del| store.validator(&del.validator))
                .collect();
            to_value(&validators)
        }
        Query::DelegatorValidator {
            delegator,
            validator,
        } => {
            found(store.delegation(delegator, validator), || {
                format!("delegation {} -> {}", delegator, validator)
            })?;
            to_value(found(store.validator(validator), || {
                format!("validator {}", validator)
            })?)
        }
        Query::Pool => {
            let pool = store.pool();
            Ok(json!({
                "bonded_tokens": pool.bonded_tokens.to_string(),
                "loose_tokens": pool.loose_tokens.to_string(),
            }))
        }
        Query::Parameters => to_value(store.params()),
        Query::SigningInfo(v) => to_value(found(store.signing_info(v), || {
            format!("signing info for {}", v)
        })?),
    }
}

/// Parses `path` and answers it.
pub fn query_path(store: &Store, path: &str) -> Result<Value> {
    let query = Query::parse(path)?;
    handle_query(store, &query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::Params;

    #[test]
    fn test_parse_routes() {
        assert_eq!(Query::parse("/stake/validators").unwrap(), Query::Validators);
        assert_eq!(
            Query::parse("/stake/delegators/d/delegations/v").unwrap(),
            Query::Delegation {
                delegator: "d".into(),
                validator: "v".into()
            }
        );
        assert_eq!(
            Query::parse("/stake/validators/v/redelegations").unwrap(),
            Query::ValidatorRedelegations("v".into())
        );
        assert_eq!(
            Query::parse("slashing/signing_info/v").unwrap(),
            Query::SigningInfo("v".into())
        );
        assert!(matches!(
            Query::parse("/stake/nonsense"),
            Err(QueryError::UnknownPath(_))
        ));
    }

    #[test]
    fn test_pool_and_params() {
        let mut store = Store::new(Params::default());
        store.pool_mut().add(true, 42).unwrap();
        let pool = query_path(&store, "/stake/pool").unwrap();
        assert_eq!(pool["bonded_tokens"], "42");
        let params = query_path(&store, "/stake/parameters").unwrap();
        assert_eq!(params["bond_denom"], "steak");
    }

    #[test]
    fn test_missing_record() {
        let store = Store::new(Params::default());
        let err = query_path(&store, "/stake/validators/abc").unwrap_err();
        assert!(matches!(err, StakingError::Query(_)));
        assert_eq!(query_path(&store, "/stake/validators").unwrap(), json!([]));
    }
}

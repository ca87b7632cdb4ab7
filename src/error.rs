use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    /// Malformed message; rejected before it reaches the store.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Well-formed message that violates a state precondition. The store is left unchanged.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Internal defect: an operation would create or destroy tokens. Never recovered.
    #[error("Conservation violation: {0}")]
    ConservationViolation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Simulation error: {0}")]
    Simulation(String),
}

impl StakingError {
    /// Fatal errors abort a simulation run instead of being tallied as failed operations.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StakingError::ConservationViolation(_) | StakingError::Simulation(_)
        )
    }

    /// Short kind tag used in outcome diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            StakingError::Validation(_) => "validation",
            StakingError::Precondition(_) => "precondition",
            StakingError::ConservationViolation(_) => "conservation",
            StakingError::Config(_) => "config",
            StakingError::Crypto(_) => "crypto",
            StakingError::Query(_) => "query",
            StakingError::Simulation(_) => "simulation",
        }
    }
}

pub type Result<T> = std::result::Result<T, StakingError>;

impl From<secp256k1::Error> for StakingError {
    fn from(err: secp256k1::Error) -> Self {
        StakingError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for StakingError {
    fn from(err: serde_json::Error) -> Self {
        StakingError::Config(err.to_string())
    }
}

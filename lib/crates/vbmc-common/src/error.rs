//! Typed error taxonomy shared by the supervisor and the client.
//!
//! Every variant is user-facing and carries the return code the RPC layer
//! reports for it. `rc` is never zero for an error.

use thiserror::Error;

/// Errors produced by supervisor operations and the config store.
#[derive(Debug, Error)]
pub enum BmcError {
    #[error("BMC instance '{name}' not found")]
    NotFound { name: String },

    #[error("BMC instance '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("invalid config for BMC instance '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("failed to spawn worker for BMC instance '{name}': {reason}")]
    ProcessSpawn { name: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl BmcError {
    /// Shorthand for [`BmcError::NotFound`].
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Return code reported over RPC for this error.
    #[must_use]
    pub fn rc(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 2,
            Self::AlreadyExists { .. } => 3,
            Self::InvalidConfig { .. } | Self::Validation(_) => 4,
            Self::BackendUnreachable(_) => 5,
            Self::ProcessSpawn { .. } => 6,
            Self::Storage(_) => 1,
        }
    }

    /// Whether this failure is expected user input rather than an internal fault.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl From<std::io::Error> for BmcError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Convenience alias used across the workspace.
pub type BmcResult<T> = Result<T, BmcError>;

//! Error types for registration and resolution

use crate::store::StoreError;
use thiserror::Error;

/// Service discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("service key is invalid")]
    InvalidKey,

    #[error("service address is invalid")]
    InvalidAddress,

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("malformed service record: {0}")]
    MalformedRecord(#[from] serde_json::Error),

    #[error("failed to decode entry {key}: {source}")]
    DecodeFailure {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("service not found: {0}")]
    NotFound(String),

    #[error("client has already been closed")]
    AlreadyClosed,

    #[error("client has been closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,
}

impl DiscoveryError {
    /// True for failures that happened before the store was contacted.
    pub fn is_validation(&self) -> bool {
        matches!(self, DiscoveryError::InvalidKey | DiscoveryError::InvalidAddress)
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

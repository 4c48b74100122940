//! Key-value store backends
//!
//! The registry only needs a handful of operations from its store: leases
//! that expire unless renewed, writes bound to a lease, prefix reads and
//! deletes. [`KvStore`] captures exactly that, with an etcd implementation
//! for production and an in-memory one for tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod etcd;
pub mod memory;

pub use etcd::EtcdStore;
pub use memory::{InMemoryStore, StoreOp, StoreStats};

/// Identifier of a store-issued lease
pub type LeaseId = i64;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected store response: {0}")]
    Protocol(String),

    #[error("lease {0} not found")]
    LeaseNotFound(LeaseId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store connection closed")]
    Closed,
}

/// A stored key and its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// Renewal acknowledgement for a lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseKeepAlive {
    pub id: LeaseId,
    /// Remaining lifetime granted by this renewal
    pub ttl: Duration,
}

/// Stream of renewal acks. It closes once the lease is gone; dropping it
/// stops the renewals.
pub type KeepAliveStream = mpsc::Receiver<LeaseKeepAlive>;

/// Operations the registry needs from its store.
///
/// Implementations must be safe to share between tasks.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Grant a lease living `ttl_secs` seconds unless renewed.
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId, StoreError>;

    /// Write `value` under `key`, bound to `lease` when given.
    async fn put(&self, key: &str, value: &[u8], lease: Option<LeaseId>) -> Result<(), StoreError>;

    /// Renew `lease` every `interval` until the stream is dropped or the
    /// lease disappears.
    async fn keep_alive(
        &self,
        lease: LeaseId,
        interval: Duration,
    ) -> Result<KeepAliveStream, StoreError>;

    /// Every entry whose key starts with `prefix`, sorted by key.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError>;

    /// Delete `key` whatever lease it is bound to. Deleting a missing key
    /// succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Revoke `lease`, deleting every key bound to it.
    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError>;

    /// Release the connection. Later calls fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}

/// Exclusive upper bound of the key range sharing `prefix`.
///
/// Follows etcd's rule: increment the last byte that is not `0xff` and drop
/// what follows. A prefix made only of `0xff` bytes (or an empty one) has no
/// upper bound, which etcd spells as `"\0"`.
pub(crate) fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

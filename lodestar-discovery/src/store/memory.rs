//! In-memory store (for testing)

use super::{KeepAliveStream, KeyValue, KvStore, LeaseId, LeaseKeepAlive, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;

/// Store operations, for call counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GrantLease,
    Put,
    KeepAlive,
    GetPrefix,
    Delete,
    RevokeLease,
}

/// Number of calls made to each operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub grant_lease: usize,
    pub put: usize,
    pub keep_alive: usize,
    pub get_prefix: usize,
    pub delete: usize,
    pub revoke_lease: usize,
}

impl StoreStats {
    /// Total calls across all operations
    pub fn total(&self) -> usize {
        self.grant_lease + self.put + self.keep_alive + self.get_prefix + self.delete + self.revoke_lease
    }

    fn bump(&mut self, op: StoreOp) {
        match op {
            StoreOp::GrantLease => self.grant_lease += 1,
            StoreOp::Put => self.put += 1,
            StoreOp::KeepAlive => self.keep_alive += 1,
            StoreOp::GetPrefix => self.get_prefix += 1,
            StoreOp::Delete => self.delete += 1,
            StoreOp::RevokeLease => self.revoke_lease += 1,
        }
    }
}

#[derive(Debug)]
struct Lease {
    ttl: Duration,
    deadline: Instant,
    renewals: usize,
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    lease: Option<LeaseId>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, Lease>,
    next_lease: LeaseId,
    stats: StoreStats,
    failures: HashSet<StoreOp>,
}

impl State {
    /// Drop expired leases together with their keys.
    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            self.remove_lease(id);
        }
    }

    fn remove_lease(&mut self, id: LeaseId) -> bool {
        let existed = self.leases.remove(&id).is_some();
        self.entries.retain(|_, entry| entry.lease != Some(id));
        existed
    }

    /// Count the call and consume an injected failure, if any.
    fn begin(&mut self, op: StoreOp) -> Result<(), StoreError> {
        self.stats.bump(op);
        if self.failures.remove(&op) {
            return Err(StoreError::Unavailable(format!("injected failure for {:?}", op)));
        }
        self.purge_expired(Instant::now());
        Ok(())
    }
}

/// In-memory store with expiring leases.
///
/// Time comes from `tokio::time`, so tests running with paused time can
/// advance past a TTL and watch keys disappear.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Call counts so far
    pub async fn stats(&self) -> StoreStats {
        self.state.read().await.stats.clone()
    }

    /// Number of successful renewals of `lease`, `None` once it is gone
    pub async fn renewals(&self, lease: LeaseId) -> Option<usize> {
        let mut state = self.state.write().await;
        state.purge_expired(Instant::now());
        state.leases.get(&lease).map(|l| l.renewals)
    }

    /// Lease currently bound to `key`
    pub async fn lease_of(&self, key: &str) -> Option<LeaseId> {
        let mut state = self.state.write().await;
        state.purge_expired(Instant::now());
        state.entries.get(key).and_then(|entry| entry.lease)
    }

    /// Whether `key` is currently stored
    pub async fn contains(&self, key: &str) -> bool {
        let mut state = self.state.write().await;
        state.purge_expired(Instant::now());
        state.entries.contains_key(key)
    }

    /// Number of live leases
    pub async fn lease_count(&self) -> usize {
        let mut state = self.state.write().await;
        state.purge_expired(Instant::now());
        state.leases.len()
    }

    /// Make the next call to `op` fail with [`StoreError::Unavailable`]
    pub async fn fail_next(&self, op: StoreOp) {
        self.state.write().await.failures.insert(op);
    }

    /// Store raw bytes without a lease, bypassing any encoding
    pub async fn insert_raw(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.state.write().await.entries.insert(
            key.into(),
            Entry {
                value: value.into(),
                lease: None,
            },
        );
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Renew `lease`; `None` when it no longer exists.
    async fn renew(&self, lease: LeaseId) -> Option<Duration> {
        let mut state = self.state.write().await;
        let now = Instant::now();
        state.purge_expired(now);
        let lease = state.leases.get_mut(&lease)?;
        lease.deadline = now + lease.ttl;
        lease.renewals += 1;
        Some(lease.ttl)
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId, StoreError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.begin(StoreOp::GrantLease)?;

        let ttl = Duration::from_secs(ttl_secs.max(1) as u64);
        state.next_lease += 1;
        let id = state.next_lease;
        state.leases.insert(
            id,
            Lease {
                ttl,
                deadline: Instant::now() + ttl,
                renewals: 0,
            },
        );
        Ok(id)
    }

    async fn put(&self, key: &str, value: &[u8], lease: Option<LeaseId>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.begin(StoreOp::Put)?;

        if let Some(id) = lease {
            if !state.leases.contains_key(&id) {
                return Err(StoreError::LeaseNotFound(id));
            }
        }

        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                lease,
            },
        );
        Ok(())
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
        interval: Duration,
    ) -> Result<KeepAliveStream, StoreError> {
        self.ensure_open()?;
        {
            let mut state = self.state.write().await;
            state.begin(StoreOp::KeepAlive)?;
            if !state.leases.contains_key(&lease) {
                return Err(StoreError::LeaseNotFound(lease));
            }
        }

        let (tx, rx) = mpsc::channel(16);
        let store = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                if store.is_closed() {
                    break;
                }

                let Some(ttl) = store.renew(lease).await else {
                    break;
                };

                if tx.send(LeaseKeepAlive { id: lease, ttl }).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.begin(StoreOp::GetPrefix)?;

        Ok(state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyValue {
                key: key.clone(),
                value: entry.value.clone(),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.begin(StoreOp::Delete)?;
        state.entries.remove(key);
        Ok(())
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;
        state.begin(StoreOp::RevokeLease)?;
        if state.remove_lease(lease) {
            Ok(())
        } else {
            Err(StoreError::LeaseNotFound(lease))
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_prefix_read() {
        let store = InMemoryStore::new();

        store.put("chat(tcp@b)", b"2", None).await.unwrap();
        store.put("chat(tcp@a)", b"1", None).await.unwrap();
        store.put("chatter(tcp@c)", b"3", None).await.unwrap();
        store.put("gate(tcp@d)", b"4", None).await.unwrap();

        let entries = store.get_prefix("chat(").await.unwrap();
        let keys: Vec<&str> = entries.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["chat(tcp@a)", "chat(tcp@b)"]);

        assert_eq!(store.get_prefix("chat").await.unwrap().len(), 3);
        assert!(store.get_prefix("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = InMemoryStore::new();
        store.delete("nothing").await.unwrap();
        assert_eq!(store.stats().await.delete, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_removes_keys() {
        let store = InMemoryStore::new();
        let lease = store.grant_lease(10).await.unwrap();
        store.put("chat(tcp@a)", b"1", Some(lease)).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.contains("chat(tcp@a)").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.contains("chat(tcp@a)").await);
        assert_eq!(store.renewals(lease).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_renews_until_dropped() {
        let store = InMemoryStore::new();
        let lease = store.grant_lease(10).await.unwrap();
        store.put("chat(tcp@a)", b"1", Some(lease)).await.unwrap();

        let mut acks = store.keep_alive(lease, Duration::from_secs(3)).await.unwrap();
        for _ in 0..5 {
            let ack = acks.recv().await.unwrap();
            assert_eq!(ack.id, lease);
            assert_eq!(ack.ttl, Duration::from_secs(10));
        }
        assert!(store.contains("chat(tcp@a)").await);

        drop(acks);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!store.contains("chat(tcp@a)").await);
    }

    #[tokio::test]
    async fn test_keep_alive_stream_closes_on_revoke() {
        let store = InMemoryStore::new();
        let lease = store.grant_lease(10).await.unwrap();
        let mut acks = store.keep_alive(lease, Duration::from_millis(5)).await.unwrap();

        acks.recv().await.unwrap();
        store.revoke_lease(lease).await.unwrap();

        while acks.recv().await.is_some() {}
        assert_eq!(store.lease_count().await, 0);
    }

    #[tokio::test]
    async fn test_put_with_unknown_lease() {
        let store = InMemoryStore::new();
        let result = store.put("k", b"v", Some(99)).await;
        assert!(matches!(result, Err(StoreError::LeaseNotFound(99))));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryStore::new();
        store.fail_next(StoreOp::GrantLease).await;

        assert!(matches!(store.grant_lease(10).await, Err(StoreError::Unavailable(_))));
        assert!(store.grant_lease(10).await.is_ok());
        assert_eq!(store.stats().await.grant_lease, 2);
    }

    #[tokio::test]
    async fn test_close() {
        let store = InMemoryStore::new();
        store.close().await.unwrap();

        assert!(matches!(store.close().await, Err(StoreError::Closed)));
        assert!(matches!(store.get_prefix("a").await, Err(StoreError::Closed)));
        assert_eq!(store.stats().await.total(), 0);
    }
}

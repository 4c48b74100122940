//! Registry client: registration, heartbeats and resolution

use crate::balance::Balancer;
use crate::error::{DiscoveryError, Result};
use crate::options::ClientOptions;
use crate::service::ServiceRecord;
use crate::store::{EtcdStore, KeepAliveStream, KvStore, LeaseId};
use lodestar_log::{debug, info, warn, Logger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background renewal of one registration
struct Heartbeat {
    lease: LeaseId,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

type Heartbeats = Arc<Mutex<HashMap<String, Heartbeat>>>;

/// Service registry client
///
/// One client owns one store connection, shared by every operation issued
/// through it. Each successful [`register`](RegistryClient::register) leaves
/// a heartbeat task running until the registration's token is cancelled, the
/// record is unregistered, the lease is lost, or the client is closed.
pub struct RegistryClient {
    store: Arc<dyn KvStore>,
    balancer: Arc<dyn Balancer>,
    heartbeats: Heartbeats,
    closed: AtomicBool,
    logger: Logger,
}

impl RegistryClient {
    /// Create a client backed by etcd.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use lodestar_discovery::{ClientOptions, RegistryClient, ServiceRecord};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// let client = RegistryClient::connect(ClientOptions::new(["http://localhost:2379"]))?;
    /// let ctx = CancellationToken::new();
    ///
    /// client.register(&ctx, ServiceRecord::new("chat", "10.0.0.1:9000")).await?;
    /// let instance = client.get_service(&ctx, "chat").await?;
    /// ```
    pub fn connect(options: ClientOptions) -> Result<Self> {
        let store = EtcdStore::new(&options)?;
        Ok(Self::with_store(store, options))
    }

    /// Create a client over any store.
    pub fn with_store<S>(store: S, options: ClientOptions) -> Self
    where
        S: KvStore + 'static,
    {
        Self::with_balancer(store, options.balance.balancer(), options.logger)
    }

    /// Create a client with a custom balancer.
    pub fn with_balancer<S>(store: S, balancer: Arc<dyn Balancer>, logger: Logger) -> Self
    where
        S: KvStore + 'static,
    {
        Self {
            store: Arc::new(store),
            balancer,
            heartbeats: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
            logger: logger.with_target("lodestar::registry"),
        }
    }

    /// Register `record` and keep it alive until `ctx` is cancelled.
    ///
    /// Returns once the record is written; the heartbeat runs in the
    /// background. Registering the same identity again replaces the earlier
    /// heartbeat. A failure after the lease was granted revokes the lease
    /// again, so no half-registered record outlives the call.
    pub async fn register(&self, ctx: &CancellationToken, record: ServiceRecord) -> Result<()> {
        self.ensure_open()?;
        record.validate()?;

        let record = record.with_defaults();
        let policy = record.ttl_policy();
        let identity = record.identity();
        let value = record.encode()?;

        let lease = cancellable(ctx, self.store.grant_lease(policy.lease_ttl_secs())).await??;

        let acks = match self.bind(ctx, &identity, &value, lease, policy.heartbeat()).await {
            Ok(acks) => acks,
            Err(e) => {
                if let Err(revoke) = self.store.revoke_lease(lease).await {
                    warn!(self.logger, "failed to revoke lease {} of {}: {}", lease, identity, revoke);
                }
                return Err(e);
            }
        };

        let token = ctx.child_token();
        let handle = tokio::spawn(heartbeat(
            identity.clone(),
            lease,
            acks,
            token.clone(),
            self.heartbeats.clone(),
            self.logger.clone(),
        ));

        let previous = lock(&self.heartbeats).insert(
            identity.clone(),
            Heartbeat {
                lease,
                token,
                handle,
            },
        );
        if let Some(previous) = previous {
            debug!(self.logger, "replacing heartbeat of {} (lease {})", identity, previous.lease);
            previous.stop().await;
        }

        info!(self.logger, "registered {} with lease {}", identity, lease);
        Ok(())
    }

    /// Write the record under its lease and open the renewal stream.
    async fn bind(
        &self,
        ctx: &CancellationToken,
        identity: &str,
        value: &str,
        lease: LeaseId,
        interval: Duration,
    ) -> Result<KeepAliveStream> {
        cancellable(ctx, self.store.put(identity, value.as_bytes(), Some(lease))).await??;
        Ok(cancellable(ctx, self.store.keep_alive(lease, interval)).await??)
    }

    /// Remove `record` from the registry.
    ///
    /// Stops its heartbeat if this client registered it, then deletes the
    /// identity key whatever lease it is bound to. Removing a record that is
    /// not registered succeeds.
    pub async fn unregister(&self, ctx: &CancellationToken, record: &ServiceRecord) -> Result<()> {
        self.ensure_open()?;

        let record = record.clone().with_defaults();
        let identity = record.identity();

        let heartbeat = lock(&self.heartbeats).remove(&identity);
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }

        cancellable(ctx, self.store.delete(&identity)).await??;
        info!(self.logger, "unregistered {}", identity);
        Ok(())
    }

    /// Resolve `key` to one live instance.
    ///
    /// Every stored entry under the prefix must decode; a single malformed
    /// entry fails the whole call.
    pub async fn get_service(&self, ctx: &CancellationToken, key: &str) -> Result<ServiceRecord> {
        let records = self.get_services(ctx, key).await?;

        self.balancer
            .select(key, &records)
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound(key.to_string()))
    }

    /// Resolve `key` to every live instance, in key order.
    pub async fn get_services(
        &self,
        ctx: &CancellationToken,
        key: &str,
    ) -> Result<Vec<ServiceRecord>> {
        self.ensure_open()?;
        if key.is_empty() {
            return Err(DiscoveryError::InvalidKey);
        }

        let entries = cancellable(ctx, self.store.get_prefix(key)).await??;
        let records = entries
            .into_iter()
            .map(|entry| {
                ServiceRecord::decode(&entry.value).map_err(|e| match e {
                    DiscoveryError::MalformedRecord(source) => DiscoveryError::DecodeFailure {
                        key: entry.key,
                        source,
                    },
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if records.is_empty() {
            return Err(DiscoveryError::NotFound(key.to_string()));
        }

        debug!(self.logger, "resolved {} instances of {}", records.len(), key);
        Ok(records)
    }

    /// Stop every heartbeat and release the store connection.
    ///
    /// Closing twice fails with [`DiscoveryError::AlreadyClosed`]; every
    /// other operation fails with [`DiscoveryError::Closed`] afterwards.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DiscoveryError::AlreadyClosed);
        }

        let heartbeats: Vec<Heartbeat> = lock(&self.heartbeats).drain().map(|(_, hb)| hb).collect();
        for heartbeat in heartbeats {
            heartbeat.stop().await;
        }

        self.store.close().await?;
        info!(self.logger, "registry client closed");
        Ok(())
    }

    /// Whether [`close`](RegistryClient::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of registrations whose heartbeat is still running
    pub fn active_registrations(&self) -> usize {
        lock(&self.heartbeats)
            .values()
            .filter(|hb| !hb.handle.is_finished())
            .count()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(DiscoveryError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Drop for RegistryClient {
    fn drop(&mut self) {
        for (_, heartbeat) in lock(&self.heartbeats).drain() {
            heartbeat.token.cancel();
        }
    }
}

/// Renew one registration until its token fires or the lease is lost.
async fn heartbeat(
    identity: String,
    lease: LeaseId,
    mut acks: KeepAliveStream,
    token: CancellationToken,
    heartbeats: Heartbeats,
    logger: Logger,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(logger, "heartbeat of {} stopped", identity);
                break;
            }
            ack = acks.recv() => match ack {
                Some(ack) => {
                    debug!(logger, "lease {} of {} renewed for {:?}", ack.id, identity, ack.ttl);
                }
                None => {
                    warn!(logger, "lease {} of {} is gone, registration lost", lease, identity);
                    break;
                }
            }
        }
    }

    // forget the entry unless a newer registration already replaced it
    let mut table = lock(&heartbeats);
    if table.get(&identity).is_some_and(|hb| hb.lease == lease) {
        table.remove(&identity);
    }
}

/// Run `future` unless `ctx` is cancelled first.
async fn cancellable<F: Future>(ctx: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(DiscoveryError::Cancelled),
        output = future => Ok(output),
    }
}

fn lock(heartbeats: &Heartbeats) -> MutexGuard<'_, HashMap<String, Heartbeat>> {
    heartbeats.lock().unwrap_or_else(PoisonError::into_inner)
}

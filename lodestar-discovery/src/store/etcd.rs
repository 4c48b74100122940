//! etcd store, spoken to through the v3 JSON gateway

use super::{
    KeepAliveStream, KeyValue, KvStore, LeaseId, LeaseKeepAlive, StoreError, prefix_range_end,
};
use crate::options::ClientOptions;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use lodestar_log::{debug, info, warn, Logger};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

struct Inner {
    endpoints: Vec<String>,
    client: reqwest::Client,
    closed: AtomicBool,
    logger: Logger,
}

/// etcd v3 store client
///
/// Keys and values travel base64 encoded, as the gateway expects. Cloning is
/// cheap and clones share one connection pool.
#[derive(Clone)]
pub struct EtcdStore {
    inner: Arc<Inner>,
}

impl EtcdStore {
    /// Create new etcd store client
    ///
    /// No connection is made until the first request.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use lodestar_discovery::{ClientOptions, EtcdStore};
    ///
    /// let etcd = EtcdStore::new(&ClientOptions::new(["http://localhost:2379"]))?;
    /// ```
    pub fn new(options: &ClientOptions) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.dial_timeout)
            .timeout(options.keep_alive_timeout)
            .tcp_keepalive(options.keep_alive_time)
            .http2_keep_alive_interval(options.keep_alive_time)
            .http2_keep_alive_timeout(options.keep_alive_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                endpoints: options.resolved_endpoints(),
                client,
                closed: AtomicBool::new(false),
                logger: options.logger.with_target("lodestar::etcd"),
            }),
        })
    }

    /// Endpoints in the order they are tried
    pub fn endpoints(&self) -> &[String] {
        &self.inner.endpoints
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// POST `payload` to the first reachable endpoint.
    ///
    /// Only connection failures move on to the next endpoint; an error
    /// status from a reachable member is returned as-is.
    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<T, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        let mut last_error = None;
        for endpoint in &self.inner.endpoints {
            let url = format!("{}{}", endpoint, path);
            match self.inner.client.post(&url).json(&payload).send().await {
                Ok(response) => return read_response(response).await,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    debug!(self.inner.logger, "etcd endpoint {} unreachable: {}", endpoint, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error
            .map(StoreError::from)
            .unwrap_or_else(|| StoreError::Unavailable("no etcd endpoints".to_string())))
    }

    /// Send one keep-alive for `lease`; `None` when etcd no longer knows it.
    async fn renew(&self, lease: LeaseId) -> Result<Option<Duration>, StoreError> {
        let payload = serde_json::json!({ "ID": lease.to_string() });
        let response: KeepAliveResponse = self.post("/v3/lease/keepalive", payload).await?;

        if let Some(error) = response.error {
            if error.message.contains("lease not found") {
                return Ok(None);
            }
            return Err(StoreError::Protocol(error.message));
        }

        Ok(response
            .result
            .filter(|result| result.ttl > 0)
            .map(|result| Duration::from_secs(result.ttl as u64)))
    }

    /// Renew `lease` every `interval`, forwarding acks to `tx`.
    ///
    /// Stops when the receiver is dropped, when etcd no longer knows the
    /// lease, or when no renewal has succeeded for a full `ttl`.
    async fn renew_until_gone(
        self,
        lease: LeaseId,
        interval: Duration,
        mut ttl: Duration,
        tx: mpsc::Sender<LeaseKeepAlive>,
    ) {
        let logger = self.inner.logger.clone();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        let mut last_ack = Instant::now();

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = ticker.tick() => {}
            }

            if self.is_closed() {
                break;
            }

            match self.renew(lease).await {
                Ok(Some(granted)) => {
                    last_ack = Instant::now();
                    ttl = granted;
                    if tx.send(LeaseKeepAlive { id: lease, ttl }).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!(logger, "lease {} no longer exists", lease);
                    break;
                }
                Err(e) if last_ack.elapsed() >= ttl => {
                    warn!(logger, "lease {} presumed expired after keep-alive failures: {}", lease, e);
                    break;
                }
                Err(e) => {
                    warn!(logger, "keep-alive for lease {} failed: {}", lease, e);
                }
            }
        }
    }
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }

    // streaming endpoints answer with newline-delimited messages
    let message = body.lines().find(|line| !line.trim().is_empty()).unwrap_or("{}");
    serde_json::from_str(message).map_err(|e| StoreError::Protocol(e.to_string()))
}

fn encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, StoreError> {
    general_purpose::STANDARD
        .decode(value)
        .map_err(|e| StoreError::Protocol(format!("invalid base64 in {}: {}", field, e)))
}

/// int64 fields arrive as JSON strings from the gateway.
fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
struct LeaseGrantResponse {
    #[serde(rename = "ID", default, deserialize_with = "int64")]
    id: i64,

    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeaseResult {
    #[serde(rename = "TTL", default, deserialize_with = "int64")]
    ttl: i64,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct KeepAliveResponse {
    result: Option<LeaseResult>,
    error: Option<GatewayError>,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    kvs: Option<Vec<EtcdKv>>,
}

#[derive(Debug, Deserialize)]
struct EtcdKv {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Ignored {}

#[async_trait]
impl KvStore for EtcdStore {
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId, StoreError> {
        let payload = serde_json::json!({ "TTL": ttl_secs.to_string(), "ID": "0" });
        let response: LeaseGrantResponse = self.post("/v3/lease/grant", payload).await?;

        if let Some(error) = response.error.filter(|e| !e.is_empty()) {
            return Err(StoreError::Protocol(error));
        }
        if response.id == 0 {
            return Err(StoreError::Protocol("lease grant returned no ID".to_string()));
        }

        debug!(self.inner.logger, "granted lease {} (ttl {}s)", response.id, ttl_secs);
        Ok(response.id)
    }

    async fn put(&self, key: &str, value: &[u8], lease: Option<LeaseId>) -> Result<(), StoreError> {
        let mut payload = serde_json::json!({
            "key": encode(key.as_bytes()),
            "value": encode(value),
        });
        if let Some(lease) = lease {
            payload["lease"] = serde_json::Value::String(lease.to_string());
        }

        let _: Ignored = self.post("/v3/kv/put", payload).await?;
        Ok(())
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
        interval: Duration,
    ) -> Result<KeepAliveStream, StoreError> {
        let ttl = self.renew(lease).await?.ok_or(StoreError::LeaseNotFound(lease))?;

        let (tx, rx) = mpsc::channel(16);
        // capacity is non-zero, so the first ack always fits
        let _ = tx.try_send(LeaseKeepAlive { id: lease, ttl });

        tokio::spawn(self.clone().renew_until_gone(lease, interval, ttl, tx));

        Ok(rx)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        let payload = serde_json::json!({
            "key": encode(prefix.as_bytes()),
            "range_end": encode(&prefix_range_end(prefix.as_bytes())),
        });
        let response: RangeResponse = self.post("/v3/kv/range", payload).await?;

        let mut entries = response
            .kvs
            .unwrap_or_default()
            .into_iter()
            .map(|kv| {
                let key = String::from_utf8(decode("key", &kv.key)?)
                    .map_err(|e| StoreError::Protocol(e.to_string()))?;
                let value = decode("value", &kv.value)?;
                Ok(KeyValue { key, value })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let payload = serde_json::json!({ "key": encode(key.as_bytes()) });
        let _: Ignored = self.post("/v3/kv/deleterange", payload).await?;
        Ok(())
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        let payload = serde_json::json!({ "ID": lease.to_string() });
        let _: Ignored = self.post("/v3/lease/revoke", payload).await?;
        debug!(self.inner.logger, "revoked lease {}", lease);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Closed);
        }
        info!(self.inner.logger, "etcd store closed");
        Ok(())
    }
}

//! Service records

use crate::error::{DiscoveryError, Result};
use crate::ttl::TtlPolicy;
use serde::{Deserialize, Serialize};

/// Network label used when a record leaves it empty.
pub const DEFAULT_NETWORK: &str = "tcp";

/// One advertised instance of a logical service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Logical service name, shared by all replicas
    pub key: String,

    /// Transport family, e.g. `tcp`
    #[serde(default)]
    pub network: String,

    /// Reachable endpoint of this instance
    #[serde(rename = "addr")]
    pub address: String,

    /// Heartbeat policy; the default policy applies when unset
    #[serde(rename = "ttlopt", default)]
    pub ttl: Option<TtlPolicy>,
}

impl ServiceRecord {
    /// Create a record for `address` under the logical name `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lodestar_discovery::ServiceRecord;
    ///
    /// let record = ServiceRecord::new("chat", "10.0.0.1:9000").with_network("tcp");
    /// assert_eq!(record.identity(), "chat(tcp@10.0.0.1:9000)");
    /// ```
    pub fn new(key: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            network: String::new(),
            address: address.into(),
            ttl: None,
        }
    }

    /// Set the network label
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Set the heartbeat policy
    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Storage key of this instance: `key(network@address)`.
    ///
    /// Every instance of a service shares `key` as a prefix, which is what
    /// makes a prefix query on the logical name return all of them.
    pub fn identity(&self) -> String {
        format!("{}({}@{})", self.key, self.network, self.address)
    }

    /// Reject records that cannot be registered.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(DiscoveryError::InvalidKey);
        }
        if self.address.is_empty() {
            return Err(DiscoveryError::InvalidAddress);
        }
        Ok(())
    }

    /// Fill an empty network and a missing policy with their defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.network.is_empty() {
            self.network = DEFAULT_NETWORK.to_string();
        }
        self.ttl = Some(self.ttl.unwrap_or_default().clamped());
        self
    }

    /// Heartbeat policy in effect for this record.
    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl.unwrap_or_default()
    }

    /// Serialize to the stored JSON form, newline terminated.
    pub fn encode(&self) -> Result<String> {
        let mut encoded = serde_json::to_string(self)?;
        encoded.push('\n');
        Ok(encoded)
    }

    /// Parse a stored record.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

//! Service Discovery for Lodestar
//!
//! This crate lets a process advertise its address under a logical service
//! name, kept alive by a renewed lease, and lets other processes resolve a
//! name to one live instance.
//!
//! ## Features
//!
//! - **Service Registration** - Lease-backed records with background heartbeats
//! - **Multiple Instances** - `key(network@address)` identities share a prefix
//! - **Load Balancing** - Random or per-key round-robin selection
//! - **Multiple Backends** - etcd (v3 JSON gateway) or in-memory
//!
//! ## Quick Start
//!
//! ### In-Memory Store (Testing)
//!
//! ```rust,ignore
//! use lodestar_discovery::*;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RegistryClient::with_store(InMemoryStore::new(), ClientOptions::default());
//!     let ctx = CancellationToken::new();
//!
//!     client.register(&ctx, ServiceRecord::new("chat", "10.0.0.1:9000")).await?;
//!
//!     let instance = client.get_service(&ctx, "chat").await?;
//!     println!("Found: {}", instance.address);
//!
//!     // stops the heartbeat; the lease then runs out
//!     ctx.cancel();
//!     Ok(())
//! }
//! ```
//!
//! ### etcd
//!
//! ```rust,ignore
//! use lodestar_discovery::*;
//!
//! let options = ClientOptions::new(["http://localhost:2379"])
//!     .with_load_balance(LoadBalancingStrategy::RoundRobin);
//! let client = std::sync::Arc::new(RegistryClient::connect(options)?);
//!
//! let registrar = ServiceRegistrar::new(client.clone());
//! registrar.register(&ctx, ServiceRecord::new("chat", "10.0.0.1:9000")).await?;
//! ```

pub mod balance;
pub mod client;
pub mod error;
pub mod options;
pub mod registrar;
pub mod service;
pub mod store;
pub mod ttl;

pub use balance::{Balancer, LoadBalancingStrategy, RandomBalancer, RoundRobinBalancer};
pub use client::RegistryClient;
pub use error::{DiscoveryError, Result};
pub use options::{ClientOptions, DEFAULT_ENDPOINT};
pub use registrar::{Registrar, ServiceRegistrar};
pub use service::{DEFAULT_NETWORK, ServiceRecord};
pub use store::{
    EtcdStore, InMemoryStore, KeepAliveStream, KeyValue, KvStore, LeaseId, LeaseKeepAlive,
    StoreError, StoreOp, StoreStats,
};
pub use ttl::{MIN_HEARTBEAT, MIN_TTL, TtlPolicy};

pub use tokio_util::sync::CancellationToken;

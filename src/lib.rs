// Lodestar - lease-backed service discovery for Rust
//
// Processes advertise an address under a logical service name, kept alive by
// a heartbeat on an etcd lease, and resolve names to one live instance.

// Re-export discovery functionality
pub use lodestar_discovery::*;

// Re-export the injected logger
pub use lodestar_log::{Format, Level, LogBuffer, LogConfig, Logger};
pub use lodestar_log::{debug, error, info, trace, warn};

pub use lodestar_discovery;
pub use lodestar_log;

// Re-export optional crates
#[cfg(feature = "config")]
pub use lodestar_config;

#[cfg(feature = "config")]
pub use lodestar_config::{DiscoverySettings, load_client_options};

pub mod prelude {
    //! Common imports for registering and resolving services.

    pub use lodestar_discovery::{
        CancellationToken, ClientOptions, DiscoveryError, InMemoryStore, KvStore,
        LoadBalancingStrategy, Registrar, RegistryClient, ServiceRecord, ServiceRegistrar,
        TtlPolicy,
    };
    pub use lodestar_log::Logger;

    #[cfg(feature = "config")]
    pub use lodestar_config::DiscoverySettings;
}

//! Client construction options

use crate::balance::LoadBalancingStrategy;
use lodestar_log::Logger;
use std::time::Duration;

/// etcd endpoint used when none is given
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2379";

/// Options for [`RegistryClient`](crate::RegistryClient)
///
/// # Examples
///
/// ```
/// use lodestar_discovery::{ClientOptions, LoadBalancingStrategy};
/// use std::time::Duration;
///
/// let options = ClientOptions::new(["http://10.0.0.5:2379"])
///     .with_dial_timeout(Duration::from_secs(2))
///     .with_load_balance(LoadBalancingStrategy::RoundRobin);
///
/// assert_eq!(options.endpoints, vec!["http://10.0.0.5:2379".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Store endpoints, tried in order
    pub endpoints: Vec<String>,

    /// Connection establishment timeout
    pub dial_timeout: Duration,

    /// Interval of transport keep-alive probes
    pub keep_alive_time: Duration,

    /// How long to wait for a keep-alive answer; also caps each request
    pub keep_alive_timeout: Duration,

    /// Instance selection strategy for `get_service`
    pub balance: LoadBalancingStrategy,

    /// Logger handed to the client and its store
    pub logger: Logger,
}

impl ClientOptions {
    /// Options for the given endpoints, defaults elsewhere.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(Into::into).collect();
        Self {
            endpoints,
            ..Self::default()
        }
    }

    /// Set the dial timeout
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set keep-alive probe interval and timeout
    pub fn with_keep_alive(mut self, time: Duration, timeout: Duration) -> Self {
        self.keep_alive_time = time;
        self.keep_alive_timeout = timeout;
        self
    }

    /// Set the load balancing strategy
    pub fn with_load_balance(mut self, balance: LoadBalancingStrategy) -> Self {
        self.balance = balance;
        self
    }

    /// Set the logger
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Endpoints with trailing slashes removed, falling back to
    /// [`DEFAULT_ENDPOINT`] when the list is empty.
    pub fn resolved_endpoints(&self) -> Vec<String> {
        let endpoints: Vec<String> = self
            .endpoints
            .iter()
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if endpoints.is_empty() {
            vec![DEFAULT_ENDPOINT.to_string()]
        } else {
            endpoints
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            dial_timeout: Duration::from_secs(5),
            keep_alive_time: Duration::from_secs(30),
            keep_alive_timeout: Duration::from_secs(10),
            balance: LoadBalancingStrategy::Random,
            logger: Logger::default(),
        }
    }
}

// Discovery client settings

use crate::env::EnvLoader;
use crate::loader::{ConfigLoader, FileFormat};
use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
use lodestar_discovery::{ClientOptions, DEFAULT_ENDPOINT, LoadBalancingStrategy, TtlPolicy};
use lodestar_log::Logger;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment prefix used by [`DiscoverySettings::from_default_env`]
pub const DEFAULT_ENV_PREFIX: &str = "LODESTAR";

/// Everything needed to build a registry client and its records' TTL policy.
///
/// Missing fields take their defaults, so a partial file or environment is
/// fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// etcd endpoints, tried in order
    pub endpoints: Vec<String>,
    pub dial_timeout_ms: u64,
    pub keep_alive_time_ms: u64,
    pub keep_alive_timeout_ms: u64,
    /// `random` or `round_robin`
    pub balance: String,
    pub heartbeat_ms: u64,
    pub ttl_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            dial_timeout_ms: 5_000,
            keep_alive_time_ms: 30_000,
            keep_alive_timeout_ms: 10_000,
            balance: "random".to_string(),
            heartbeat_ms: 3_000,
            ttl_ms: 10_000,
        }
    }
}

impl DiscoverySettings {
    /// Load from `LODESTAR_*` variables
    pub fn from_default_env() -> Result<Self> {
        Self::from_env(DEFAULT_ENV_PREFIX)
    }

    /// Load from `<prefix>_ENDPOINTS`, `<prefix>_TTL_MS`, ...
    pub fn from_env(prefix: &str) -> Result<Self> {
        let vars = EnvLoader::new(Some(prefix.to_string())).load();
        Self::from_map(&vars)
    }

    /// Load a `.env` file into the process environment, then read it.
    ///
    /// Without a path, a `.env` in the working directory is used if present.
    pub fn from_dotenv(path: Option<&Path>, prefix: &str) -> Result<Self> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::from_env(prefix)
    }

    /// Load from a JSON, TOML or env file, detected by name
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loader = ConfigLoader::auto(path)?;
        let value = loader.load_file(path)?;

        if loader.format() == FileFormat::Env {
            let vars: HashMap<String, String> = value
                .as_object()
                .into_iter()
                .flatten()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect();
            return Self::from_map(&vars);
        }

        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Build from lowercased string keys, as produced by env sources
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let mut settings = Self::default();
        settings.apply(vars)?;
        Ok(settings)
    }

    /// Load `path` if given, then let `<prefix>_*` variables override it
    pub fn load(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply(&EnvLoader::new(Some(prefix.to_string())).load())?;
        Ok(settings)
    }

    /// Override fields present in `vars`
    pub fn apply(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        if let Some(endpoints) = vars.get("endpoints") {
            self.endpoints = endpoints
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(balance) = vars.get("balance") {
            self.balance = balance.trim().to_string();
        }

        parse_into(vars, "dial_timeout_ms", &mut self.dial_timeout_ms)?;
        parse_into(vars, "keep_alive_time_ms", &mut self.keep_alive_time_ms)?;
        parse_into(vars, "keep_alive_timeout_ms", &mut self.keep_alive_timeout_ms)?;
        parse_into(vars, "heartbeat_ms", &mut self.heartbeat_ms)?;
        parse_into(vars, "ttl_ms", &mut self.ttl_ms)?;

        Ok(())
    }

    /// Parsed load balancing strategy
    pub fn balance_strategy(&self) -> Result<LoadBalancingStrategy> {
        LoadBalancingStrategy::from_str(&self.balance).map_err(ConfigError::ValidationError)
    }

    /// TTL policy for registrations, clamped to the allowed floors
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::new(
            Duration::from_millis(self.heartbeat_ms),
            Duration::from_millis(self.ttl_ms),
        )
    }

    /// Validate and convert into client options
    pub fn into_client_options(self, logger: Logger) -> Result<ClientOptions> {
        self.validate()?;
        let balance = self.balance_strategy()?;

        Ok(ClientOptions::new(self.endpoints)
            .with_dial_timeout(Duration::from_millis(self.dial_timeout_ms))
            .with_keep_alive(
                Duration::from_millis(self.keep_alive_time_ms),
                Duration::from_millis(self.keep_alive_timeout_ms),
            )
            .with_load_balance(balance)
            .with_logger(logger))
    }
}

impl Validate for DiscoverySettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.endpoints, "endpoints")?;
        for endpoint in &self.endpoints {
            ConfigValidator::is_endpoint(endpoint, "endpoints")?;
        }
        ConfigValidator::positive(self.dial_timeout_ms, "dial_timeout_ms")?;
        ConfigValidator::positive(self.keep_alive_time_ms, "keep_alive_time_ms")?;
        ConfigValidator::positive(self.keep_alive_timeout_ms, "keep_alive_timeout_ms")?;
        self.balance_strategy()?;
        Ok(())
    }
}

fn parse_into(vars: &HashMap<String, String>, key: &str, target: &mut u64) -> Result<()> {
    if let Some(raw) = vars.get(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::ParseError(format!("{} = {:?}: {}", key, raw, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn temp_file(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("lodestar-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = DiscoverySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.ttl_policy(), TtlPolicy::default());
        assert_eq!(settings.balance_strategy().unwrap(), LoadBalancingStrategy::Random);
    }

    #[test]
    fn test_from_map() {
        let settings = DiscoverySettings::from_map(&vars(&[
            ("endpoints", "http://a:2379, http://b:2379,"),
            ("balance", "round_robin"),
            ("ttl_ms", "30000"),
            ("unrelated", "ignored"),
        ]))
        .unwrap();

        assert_eq!(settings.endpoints, vec!["http://a:2379", "http://b:2379"]);
        assert_eq!(settings.balance_strategy().unwrap(), LoadBalancingStrategy::RoundRobin);
        assert_eq!(settings.ttl_policy().ttl(), Duration::from_secs(30));
        assert_eq!(settings.dial_timeout_ms, 5_000);
    }

    #[test]
    fn test_from_map_rejects_bad_numbers() {
        let result = DiscoverySettings::from_map(&vars(&[("dial_timeout_ms", "soon")]));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_ttl_policy_is_clamped() {
        let settings = DiscoverySettings {
            heartbeat_ms: 100,
            ttl_ms: 200,
            ..DiscoverySettings::default()
        };
        assert_eq!(settings.ttl_policy(), TtlPolicy::default());
    }

    #[test]
    fn test_validation_failures() {
        let empty = DiscoverySettings {
            endpoints: Vec::new(),
            ..DiscoverySettings::default()
        };
        assert!(empty.validate().is_err());

        let not_url = DiscoverySettings {
            endpoints: vec!["localhost:2379".to_string()],
            ..DiscoverySettings::default()
        };
        assert!(not_url.validate().is_err());

        let weighted = DiscoverySettings {
            balance: "weighted".to_string(),
            ..DiscoverySettings::default()
        };
        assert!(matches!(weighted.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_into_client_options() {
        let settings = DiscoverySettings {
            endpoints: vec!["http://etcd-1:2379".to_string()],
            dial_timeout_ms: 1_500,
            balance: "round-robin".to_string(),
            ..DiscoverySettings::default()
        };

        let options = settings.into_client_options(Logger::disabled()).unwrap();
        assert_eq!(options.endpoints, vec!["http://etcd-1:2379".to_string()]);
        assert_eq!(options.dial_timeout, Duration::from_millis(1_500));
        assert_eq!(options.keep_alive_time, Duration::from_secs(30));
        assert_eq!(options.balance, LoadBalancingStrategy::RoundRobin);
    }

    #[test]
    fn test_from_toml_file() {
        let path = temp_file(
            "lodestar.toml",
            r#"
                endpoints = ["http://10.0.0.5:2379"]
                balance = "round_robin"
                heartbeat_ms = 5000
            "#,
        );

        let settings = DiscoverySettings::from_file(&path).unwrap();
        assert_eq!(settings.endpoints, vec!["http://10.0.0.5:2379"]);
        assert_eq!(settings.heartbeat_ms, 5_000);
        assert_eq!(settings.ttl_ms, 10_000);
    }

    #[test]
    fn test_from_json_file() {
        let path = temp_file("lodestar.json", r#"{"ttl_ms": 42000, "balance": "random"}"#);

        let settings = DiscoverySettings::from_file(&path).unwrap();
        assert_eq!(settings.ttl_ms, 42_000);
        assert_eq!(settings.endpoints, vec![DEFAULT_ENDPOINT.to_string()]);
    }

    #[test]
    fn test_from_env_file() {
        let path = temp_file(
            "discovery.env",
            "ENDPOINTS=http://a:2379,http://b:2379\nKEEP_ALIVE_TIMEOUT_MS=2500\n",
        );

        let settings = DiscoverySettings::from_file(&path).unwrap();
        assert_eq!(settings.endpoints.len(), 2);
        assert_eq!(settings.keep_alive_timeout_ms, 2_500);
    }

    #[test]
    fn test_from_file_type_mismatch() {
        let path = temp_file("broken.json", r#"{"ttl_ms": "long"}"#);
        let result = DiscoverySettings::from_file(&path);
        assert!(matches!(result, Err(ConfigError::DeserializationError(_))));
    }

    #[test]
    fn test_apply_overrides_only_present_keys() {
        let mut settings = DiscoverySettings {
            ttl_ms: 60_000,
            ..DiscoverySettings::default()
        };
        settings.apply(&vars(&[("heartbeat_ms", "4000")])).unwrap();

        assert_eq!(settings.ttl_ms, 60_000);
        assert_eq!(settings.heartbeat_ms, 4_000);
    }

    #[test]
    fn test_load_file_then_env() {
        let path = temp_file("layered.json", r#"{"heartbeat_ms": 7000}"#);
        let settings = DiscoverySettings::load(Some(&path), "LODESTAR_UNSET_PREFIX_4242").unwrap();
        assert_eq!(settings.heartbeat_ms, 7_000);

        let missing = DiscoverySettings::load(Some(Path::new("/nonexistent/lodestar.json")), "X");
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_from_env_without_variables() {
        let settings = DiscoverySettings::from_env("LODESTAR_UNSET_PREFIX_4242").unwrap();
        assert_eq!(settings, DiscoverySettings::default());
    }
}

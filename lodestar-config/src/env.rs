// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Environment variable loader
///
/// With a prefix of `LODESTAR`, `LODESTAR_DIAL_TIMEOUT_MS` is reported as
/// `dial_timeout_ms`.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load every variable under the prefix, keys lowercased and stripped
    pub fn load(&self) -> HashMap<String, String> {
        env::vars().filter_map(|(key, value)| self.strip(&key).map(|k| (k, value))).collect()
    }

    fn strip(&self, key: &str) -> Option<String> {
        match self.prefix.as_deref() {
            Some(prefix) => key
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|rest| !rest.is_empty())
                .map(str::to_lowercase),
            None => Some(key.to_lowercase()),
        }
    }

    fn full_key(&self, key: &str) -> String {
        match self.prefix.as_deref() {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.full_key(key)).map_err(ConfigError::EnvError)
    }

    /// Load a variable that may be absent
    pub fn load_var_opt(&self, key: &str) -> Result<Option<String>> {
        match env::var(self.full_key(key)) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

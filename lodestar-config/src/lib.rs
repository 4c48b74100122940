// Configuration loading for Lodestar discovery clients
//
// Settings come from JSON, TOML or env files and from prefixed environment
// variables; variables win over files when both are used.

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{DEFAULT_ENV_PREFIX, DiscoverySettings};
pub use validation::{ConfigValidator, Validate};

use lodestar_discovery::ClientOptions;
use lodestar_log::Logger;
use std::path::Path;

/// Load settings from `path` and `LODESTAR_*` variables and build client
/// options from them.
pub fn load_client_options(path: Option<&Path>, logger: Logger) -> Result<ClientOptions> {
    DiscoverySettings::load(path, DEFAULT_ENV_PREFIX)?.into_client_options(logger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_client_options_missing_file() {
        let result = load_client_options(
            Some(Path::new("/nonexistent/lodestar.toml")),
            Logger::disabled(),
        );
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_load_client_options_unsupported_format() {
        let result = load_client_options(Some(Path::new("lodestar.yaml")), Logger::disabled());
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}

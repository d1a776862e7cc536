//! Logging and config-file helpers for the fedvision tools.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ClientConfig;
use crate::{Error, Result};

/// Backend crates log per kernel at debug level
const BACKEND_LEVELS: &str = "burn=warn,cubecl=warn";

fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("{level},{BACKEND_LEVELS}")
}

/// Installs the global subscriber. `RUST_LOG` takes precedence when set.
pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbose))
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Logger already installed: {e}")))
}

/// Reads a TOML file into `T`; a missing file is [`Error::NotFound`]
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("Config file {}", path.display())),
        _ => Error::Config(format!("Cannot read {}: {e}", path.display())),
    })?;

    toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

/// Loads a client config, lets the caller apply command-line overrides, then validates
pub fn load_client_config<F>(path: &Path, overrides: F) -> Result<ClientConfig>
where
    F: FnOnce(&mut ClientConfig),
{
    let mut config: ClientConfig = load_toml_config(path)?;
    overrides(&mut config);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter_parses() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(default_filter(verbose)).is_ok());
        }
        assert!(default_filter(true).starts_with("debug,"));
    }

    #[test]
    fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "seed = 3\n[dataset]\nbatch_size = 8\n").unwrap();

        let config: ClientConfig = load_toml_config(&path).unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.dataset.batch_size, 8);
    }

    #[test]
    fn test_load_missing_config() {
        let result: Result<ClientConfig> = load_toml_config(Path::new("/nonexistent/client.toml"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_load_malformed_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[dataset\n").unwrap();

        let result: Result<ClientConfig> = load_toml_config(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides_are_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "seed = 3\n").unwrap();

        let config = load_client_config(&path, |c| c.training.epochs = 4).unwrap();
        assert_eq!(config.training.epochs, 4);

        let result = load_client_config(&path, |c| c.dataset.batch_size = 0);
        assert!(result.is_err());
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_model::{
    instruments::{SymbolNormalizer, DEFAULT_CANONICAL_UNIT, DEFAULT_QUOTE_CURRENCIES, DEFAULT_STABLE_UNITS},
    validation::DEFAULT_REJECTION_THRESHOLD,
};
use thiserror::Error;
use tracing::{debug, info};

pub const API_KEY_ENV: &str = "BINANCE_API_KEY";
pub const API_SECRET_ENV: &str = "BINANCE_API_SECRET";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TallyConfig {
    pub database_path: PathBuf,
    pub stable_units: Vec<String>,
    pub canonical_unit: String,
    pub quote_currencies: Vec<String>,
    pub rejection_threshold: f64,
    pub sync_days: u32,
    pub binance: BinanceSettings,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/trading_journal.db"),
            stable_units: DEFAULT_STABLE_UNITS.iter().map(|unit| unit.to_string()).collect(),
            canonical_unit: DEFAULT_CANONICAL_UNIT.to_owned(),
            quote_currencies: DEFAULT_QUOTE_CURRENCIES.iter().map(|quote| quote.to_string()).collect(),
            rejection_threshold: DEFAULT_REJECTION_THRESHOLD,
            sync_days: 7,
            binance: BinanceSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BinanceSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub symbols: Vec<String>,
    pub recv_window: u64,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_owned(),
            api_key: None,
            api_secret: None,
            symbols: Vec::new(),
            recv_window: 5000,
        }
    }
}

impl BinanceSettings {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.api_secret.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => Some((key, secret)),
            _ => None,
        }
    }
}

impl TallyConfig {
    /// Read `path` as JSON. A missing file yields the defaults; any other failure is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        info!(path = %path.display(), database = %config.database_path.display(), "loaded configuration");
        Ok(config)
    }

    /// Fill missing exchange credentials from the environment.
    pub fn with_env_credentials(self) -> Self {
        self.with_credentials(std::env::var(API_KEY_ENV).ok(), std::env::var(API_SECRET_ENV).ok())
    }

    pub fn with_credentials(mut self, api_key: Option<String>, api_secret: Option<String>) -> Self {
        if self.binance.api_key.is_none() {
            self.binance.api_key = api_key;
        }
        if self.binance.api_secret.is_none() {
            self.binance.api_secret = api_secret;
        }
        self
    }

    pub fn normalizer(&self) -> SymbolNormalizer {
        SymbolNormalizer::new(&self.stable_units, &self.canonical_unit, &self.quote_currencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = serde_json::from_str::<TallyConfig>(
            r#"{"database_path": "/tmp/journal.db", "binance": {"symbols": ["BTCUSDT"]}}"#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/journal.db"));
        assert_eq!(config.sync_days, 7);
        assert_eq!(config.rejection_threshold, 0.5);
        assert_eq!(config.binance.symbols, vec!["BTCUSDT"]);
        assert_eq!(config.binance.recv_window, 5000);
        assert_eq!(config.normalizer(), SymbolNormalizer::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = TallyConfig::load("/nonexistent/tally/config.json").unwrap();
        assert_eq!(config, TallyConfig::default());
    }

    #[test]
    fn test_credentials_prefer_file_values() {
        let mut config = TallyConfig::default();
        config.binance.api_key = Some("file-key".to_owned());

        let config = config.with_credentials(Some("env-key".to_owned()), Some("env-secret".to_owned()));
        assert_eq!(config.binance.credentials(), Some(("file-key", "env-secret")));
        assert_eq!(BinanceSettings::default().credentials(), None);
    }
}

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::disaggregation::DisaggregationSettings;
use crate::ml::ModelConfig;
use crate::pipeline::Tariff;
use crate::scoring::ScoringContext;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "BEA__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub scoring: ScoringContext,
    pub tariff: Tariff,
    pub disaggregation: DisaggregationSettings,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            body_limit_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory of JSON period records loaded at startup
    pub dir: Option<PathBuf>,
    /// Building id the preloaded records are stored under
    pub building_id: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: None,
            building_id: "default".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Defaults, then the TOML file at `path` if present, then `BEA__`
    /// environment variables (`BEA__MODEL__EPOCHS=10`)
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: Config = figment.extract()?;
        config.model.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load_from("missing.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            assert_eq!(config.model.sequence_length, 24);
            assert_eq!(config.scoring.anomaly_threshold, 2.0);
            assert_eq!(config.server.socket_addr().unwrap().port(), 8080);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layers() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "bea.toml",
                r#"
                [server]
                port = 9000

                [model]
                epochs = 5
                feature_columns = ["total_consumption", "temperature"]

                [tariff]
                currency = "EUR"
                "#,
            )?;
            jail.set_env("BEA__MODEL__EPOCHS", "7");
            jail.set_env("BEA__SCORING__ANOMALY_THRESHOLD", "3.5");

            let config = Config::load_from("bea.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.model.epochs, 7);
            assert_eq!(config.model.feature_columns.len(), 2);
            assert_eq!(config.model.lstm_units, 50);
            assert_eq!(config.scoring.anomaly_threshold, 3.5);
            assert_eq!(config.tariff.currency, "EUR");
            assert_eq!(config.tariff.flat_rate_per_kwh, 0.12);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_model_config_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BEA__MODEL__SEQUENCE_LENGTH", "0");
            assert!(Config::load_from("missing.toml").is_err());
            Ok(())
        });
    }
}

//! # nfproxy Configuration
//!
//! Layered engine configuration: built-in defaults, then
//! `config/nfproxy.yaml`, then `NFPROXY_*` environment variables
//! (`__` separates sections, e.g. `NFPROXY_ENGINE__PROTOCOL=http`).
//! Every layer is validated after merging.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod engine;
mod error;
mod telemetry;
mod validation;

pub use engine::EngineConfig;
pub use error::ConfigError;
pub use telemetry::TelemetryConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/nfproxy.yaml";
pub const ENV_PREFIX: &str = "NFPROXY_";

#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct NfproxyConfig {
    #[serde(default)]
    #[validate(nested)]
    pub engine: EngineConfig,

    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl NfproxyConfig {
    /// Defaults, then [`DEFAULT_CONFIG_PATH`] when present, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(NfproxyConfig::default()));
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
        }
        Self::extract(figment)
    }

    /// Like [`NfproxyConfig::load`] with an explicit file that must exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let figment = Figment::from(Serialized::defaults(NfproxyConfig::default()))
            .merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}

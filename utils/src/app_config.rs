use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::Path;
use std::sync::RwLock;

use super::error::Result;

lazy_static! {
    static ref BUILDER: RwLock<ConfigBuilder<DefaultState>> = RwLock::new(Config::builder());
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
}

/// Settings handed to the security backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Machine used for account lookups; empty means the local machine.
    #[serde(default)]
    pub system_name: String,
    pub take_ownership_privilege: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            system_name: String::new(),
            take_ownership_privilege: "SeTakeOwnershipPrivilege".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub log: LogConfig,
    pub security: SecurityConfig,
}

impl AppConfig {
    /// Reset the global configuration to the embedded defaults.
    ///
    /// `NTACL__*` environment variables are layered on every read, above the
    /// defaults and any merged file; values from [`AppConfig::set`] win over both.
    pub fn init(default_config: Option<&str>) -> Result<()> {
        let mut builder = Config::builder();

        if let Some(contents) = default_config {
            builder = builder.add_source(File::from_str(contents, FileFormat::Toml));
        }

        let mut w = BUILDER.write()?;
        *w = builder;

        Ok(())
    }

    /// Layer a user supplied TOML file on top of the current configuration.
    pub fn merge_config(config_file: Option<&Path>) -> Result<()> {
        if let Some(path) = config_file {
            let mut w = BUILDER.write()?;
            let current = w.clone();
            *w = current.add_source(File::from(path));
        }

        Ok(())
    }

    pub fn set(key: &str, value: &str) -> Result<()> {
        let mut w = BUILDER.write()?;
        let current = w.clone();
        *w = current.set_override(key, value)?;

        Ok(())
    }

    pub fn get<'de, T>(key: &str) -> Result<T>
    where
        T: Deserialize<'de>,
    {
        let config = Self::build()?;
        Ok(config.get::<T>(key)?)
    }

    pub fn fetch() -> Result<AppConfig> {
        let config = Self::build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    fn build() -> Result<Config> {
        // NTACL__LOG__LEVEL=debug 覆盖 log.level
        let env = Environment::with_prefix("NTACL")
            .prefix_separator("__")
            .separator("__");
        let config = BUILDER.read()?.deref().clone().add_source(env).build()?;

        Ok(config)
    }
}

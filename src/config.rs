use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 300;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_PRIVILEGE_COMMAND: &str = "sudo";

pub struct RigupConfig {
    pub root_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub network_timeout: Duration,
    /// Upper bound for one external command such as `make clean install`.
    pub command_timeout: Duration,
    /// Command that elevates apt-get, make install and system services.
    pub privilege_command: Option<String>,
}

impl RigupConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(RawConfig::load(None)?.into())
    }
}

impl From<RawConfig> for RigupConfig {
    fn from(raw_config: RawConfig) -> Self {
        let privilege_command = match raw_config.privilege.command {
            Some(command) if command.trim().is_empty() => None,
            Some(command) => Some(command),
            None => Some(DEFAULT_PRIVILEGE_COMMAND.to_owned()),
        };
        RigupConfig {
            root_dir: raw_config.root.dir,
            log_file: raw_config.log.file,
            network_timeout: Duration::from_secs(
                raw_config
                    .network
                    .timeout
                    .unwrap_or(DEFAULT_NETWORK_TIMEOUT_SECS),
            ),
            command_timeout: Duration::from_secs(
                raw_config
                    .command
                    .timeout
                    .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
            ),
            privilege_command,
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    root: RootConfig,
    #[serde(default)]
    log: LogConfig,
    #[serde(default)]
    network: NetworkConfig,
    #[serde(default)]
    command: CommandConfig,
    #[serde(default)]
    privilege: PrivilegeConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RootConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct LogConfig {
    file: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct NetworkConfig {
    timeout: Option<u64>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CommandConfig {
    timeout: Option<u64>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct PrivilegeConfig {
    command: Option<String>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("RIGUP")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use home::home_dir;

use crate::Rigup;

const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);
const DEFAULT_PRIVILEGE_COMMAND: &str = "sudo";

#[derive(Default)]
pub struct RigupBuilder {
    root: Option<PathBuf>,
    manifest_path: Option<PathBuf>,
    home: Option<PathBuf>,
    network_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
    privilege_command: Option<Option<String>>,
}

impl RigupBuilder {
    /// Directory holding the manifest, working copies, patch cache and log.
    ///
    /// Defaults to `$HOME/.config/rigup`.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Manifest to provision from.
    ///
    /// Defaults to `<root>/rigup.toml` if it exists, the built-in manifest otherwise.
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    /// Directory the startup file is written to.
    ///
    /// Defaults to `$HOME`.
    pub fn home(mut self, path: impl Into<PathBuf>) -> Self {
        self.home = Some(path.into());
        self
    }

    /// Upper bound for one git transfer or patch download.
    ///
    /// Defaults to 5 minutes.
    pub fn network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }

    /// Upper bound for one external command; the command is killed past it.
    ///
    /// Defaults to 1 hour.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Command prefixed to privileged steps, `None` to run them as is.
    ///
    /// Defaults to `sudo`.
    pub fn privilege_command(mut self, command: Option<String>) -> Self {
        self.privilege_command = Some(command);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Rigup> {
        let Self {
            root,
            manifest_path,
            home,
            network_timeout,
            command_timeout,
            privilege_command,
        } = self;

        let home = match home {
            Some(home) => home,
            None => user_home()?,
        };
        let root = match root {
            Some(root) => root,
            None => user_home()?.join(".config/rigup"),
        };

        Ok(Rigup {
            root,
            manifest_path,
            home,
            network_timeout: network_timeout.unwrap_or(DEFAULT_NETWORK_TIMEOUT),
            command_timeout: command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            privilege_command: privilege_command
                .unwrap_or_else(|| Some(DEFAULT_PRIVILEGE_COMMAND.to_owned())),
        })
    }
}

fn user_home() -> anyhow::Result<PathBuf> {
    home_dir().context("Could not find home dir. Please define $HOME env variable.")
}

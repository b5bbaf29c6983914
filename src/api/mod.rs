use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::cli::command_handlers::{do_clear_cache, do_init, do_provision};

mod builder;

pub use builder::RigupBuilder;

pub struct Rigup {
    root: PathBuf,
    manifest_path: Option<PathBuf>,
    home: PathBuf,
    network_timeout: Duration,
    command_timeout: Duration,
    privilege_command: Option<String>,
}

/// Which part of the pipeline to run.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Selection {
    /// Packages, services, sources, patches and the startup file, in order.
    All,
    Packages,
    Services,
    Sources,
    /// Download and apply patches, then rebuild the patched projects.
    Patches,
    Startup,
}

impl Rigup {
    pub fn builder() -> RigupBuilder {
        RigupBuilder::default()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs the whole provisioning pipeline
    pub fn run(&self) -> anyhow::Result<()> {
        self.provision(Selection::All)
    }

    pub fn packages(&self) -> anyhow::Result<()> {
        self.provision(Selection::Packages)
    }

    pub fn services(&self) -> anyhow::Result<()> {
        self.provision(Selection::Services)
    }

    /// Clones or pulls every project and installs it in build order
    pub fn sources(&self) -> anyhow::Result<()> {
        self.provision(Selection::Sources)
    }

    pub fn patches(&self) -> anyhow::Result<()> {
        self.provision(Selection::Patches)
    }

    /// Writes the startup file into the home directory
    pub fn startup(&self) -> anyhow::Result<()> {
        self.provision(Selection::Startup)
    }

    pub fn provision(&self, selection: Selection) -> anyhow::Result<()> {
        do_provision(
            selection,
            &self.root,
            self.manifest_path.as_deref(),
            &self.home,
            self.network_timeout,
            self.command_timeout,
            self.privilege_command.clone(),
        )
    }

    /// Writes the built-in manifest to `<root>/rigup.toml`
    pub fn init(&self) -> anyhow::Result<()> {
        do_init(&self.root)
    }

    /// Deletes every downloaded patch
    pub fn clear_cache(&self) -> anyhow::Result<()> {
        do_clear_cache(&self.root)
    }
}

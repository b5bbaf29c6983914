use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Provisions a Debian desktop around dwm and the other suckless tools.
#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Option<Command>,
    /// Directory holding the manifest, working copies, patch cache and log.
    /// Defaults to $RIGUP_ROOT_DIR, then $HOME/.config/rigup
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Manifest to provision from.
    /// Defaults to <root>/rigup.toml if present, the built-in manifest otherwise
    #[clap(short, long, global = true)]
    pub manifest: Option<PathBuf>,
    /// Directory the startup file is written to. Defaults to $HOME
    #[clap(long, global = true)]
    pub home: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Runs every stage in order (default)
    Run,
    /// Installs the APT package groups
    Packages,
    /// Enables and starts the services
    Services,
    /// Clones or pulls every project and installs it
    Sources,
    /// Downloads and applies patches, then reinstalls the patched projects
    Patches,
    /// Writes the X startup file
    Startup,
    /// Writes the built-in manifest to <root>/rigup.toml
    Init,
    /// Deletes the downloaded patches
    ClearCache,
}

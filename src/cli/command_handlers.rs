use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::bail;
use log::{debug, info};

use crate::{
    api::Selection,
    git::GitWorkingCopies,
    model::{manifest::DEFAULT_MANIFEST, Manifest},
    patch::{HttpDownloader, PatchCache},
    provision::Provisioner,
    step::{Executor, Stage, StepPolicies, SystemRunner},
    workspace::Workspace,
};

pub const MANIFEST_FILE_NAME: &str = "rigup.toml";

/// Handler to the provisioning commands
pub fn do_provision(
    selection: Selection,
    root: &Path,
    manifest_path: Option<&Path>,
    home: &Path,
    network_timeout: Duration,
    command_timeout: Duration,
    privilege_command: Option<String>,
) -> anyhow::Result<()> {
    let manifest = load_manifest(root, manifest_path)?;
    let workspace = Workspace::open(root.to_path_buf())?;

    let runner = SystemRunner::new()?;
    let policies =
        StepPolicies::default().with(Stage::PatchApply, manifest.patch_apply_failure);
    debug!("Patch apply failures: {}", manifest.patch_apply_failure);
    let executor = Executor::new(&runner, policies, privilege_command)
        .with_command_timeout(command_timeout);

    let sources = GitWorkingCopies::new(workspace.root().to_path_buf(), network_timeout);
    let downloader = HttpDownloader::new(network_timeout)?;
    let patches = PatchCache::new(
        &downloader,
        workspace.root(),
        workspace.staging(),
        &manifest.patch_base_url,
    );

    let provisioner = Provisioner::new(executor, &sources, patches, &manifest, home)?;
    match selection {
        Selection::All => provisioner.run(),
        Selection::Packages => provisioner.packages(),
        Selection::Services => provisioner.services(),
        Selection::Sources => provisioner.sources(),
        Selection::Patches => provisioner.patches(),
        Selection::Startup => provisioner.startup(),
    }?;

    Ok(())
}

/// Handler to init command
pub fn do_init(root: &Path) -> anyhow::Result<()> {
    let manifest_path = root.join(MANIFEST_FILE_NAME);
    if manifest_path.exists() {
        bail!("File already exists: {}", manifest_path.display());
    }
    std::fs::create_dir_all(root)?;
    std::fs::write(&manifest_path, DEFAULT_MANIFEST)?;
    info!("Wrote manifest to {}", manifest_path.display());
    Ok(())
}

/// Handler to clear-cache command
pub fn do_clear_cache(root: &Path) -> anyhow::Result<()> {
    let workspace = Workspace::open(root.to_path_buf())?;
    let patches = workspace.patches_dir();
    match std::fs::remove_dir_all(&patches) {
        Ok(()) => {
            info!("Cleared patch cache {}", patches.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("{} is already removed, nothing to do", patches.display());
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// The explicit manifest, else `<root>/rigup.toml`, else the built-in one.
fn load_manifest(root: &Path, manifest_path: Option<&Path>) -> anyhow::Result<Manifest> {
    let path: PathBuf = match manifest_path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = root.join(MANIFEST_FILE_NAME);
            if !path.exists() {
                info!(
                    "No manifest at {}, using the built-in manifest",
                    path.display()
                );
                return Ok(Manifest::builtin()?);
            }
            path
        }
    };
    info!("Using manifest {}", path.display());
    Ok(Manifest::from_file(&path)?)
}

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    model::{Manifest, Patch},
    sources::SourceCache,
    step::{CommandRunner, Executor, Invocation, Stage, StepError},
};

pub mod config_header;
pub mod download;

pub use download::{DownloadError, Downloader, HttpDownloader};

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("Could not move the patch into the cache: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Working copy {} does not exist", .0.display())]
    MissingWorkingCopy(PathBuf),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// A project that received at least one patch during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    pub project: String,
    /// `config.def.h` as it was before the first of those patches.
    pub defaults_before: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Applied,
    AlreadyApplied,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Cached(PathBuf),
    Downloaded(PathBuf),
}

/// Patch files below `<root>/patches`, downloaded on first use.
///
/// A cached file is trusted as is; nothing records where it came from.
pub struct PatchCache<'a, D> {
    downloader: &'a D,
    root: &'a Path,
    staging: &'a Path,
    base_url: &'a str,
}

impl<'a, D: Downloader> PatchCache<'a, D> {
    pub fn new(downloader: &'a D, root: &'a Path, staging: &'a Path, base_url: &'a str) -> Self {
        PatchCache {
            downloader,
            root,
            staging,
            base_url,
        }
    }

    pub fn ensure(&self, patch: &Patch) -> Result<Fetched, PatchError> {
        let path = patch.cache_path(self.root);
        if path.exists() {
            debug!("Skipping download of {}. Already in cache", patch.name);
            return Ok(Fetched::Cached(path));
        }

        let url = patch.url(self.base_url);
        info!("Downloading patch {} from {}", patch.name, url);
        // Only a complete download is renamed into the cache.
        let staged = tempfile::NamedTempFile::new_in(self.staging)?;
        self.downloader.download(&url, staged.path())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        staged.persist(&path)?;
        Ok(Fetched::Downloaded(path))
    }
}

/// Downloads every patch and applies those marked `apply` to their project.
///
/// Returns the projects that received at least one patch, in manifest order.
/// Patches that are already in the tree are no-ops and do not count.
pub fn process_patches<R, D, S>(
    executor: &Executor<'_, R>,
    cache: &PatchCache<'_, D>,
    sources: &S,
    manifest: &Manifest,
) -> Result<Vec<Patched>, StepError>
where
    R: CommandRunner,
    D: Downloader,
    S: SourceCache,
{
    let mut patched: Vec<String> = Vec::new();
    let mut snapshots: HashMap<String, Option<String>> = HashMap::new();

    for patch in &manifest.patches {
        let subject = format!("{}/{}", patch.project, patch.name);

        let mut file = None;
        let fetched = cache.ensure(patch).map(|fetched| {
            file = Some(match fetched {
                Fetched::Cached(path) | Fetched::Downloaded(path) => path,
            })
        });
        executor.settle(Stage::PatchDownload, &subject, fetched)?;
        let Some(file) = file else {
            continue;
        };

        if !patch.apply {
            debug!("Patch {} is download only", subject);
            continue;
        }
        let Some(project) = manifest.project(&patch.project) else {
            continue;
        };
        let working_copy = sources.working_copy(project);
        if !sources.is_present(project) {
            executor.settle(
                Stage::PatchApply,
                &subject,
                Err(PatchError::MissingWorkingCopy(working_copy)),
            )?;
            continue;
        }

        snapshots
            .entry(patch.project.clone())
            .or_insert_with(|| config_header::snapshot(&working_copy));
        match apply(executor, &subject, &file, &working_copy)? {
            Applied::Applied => {
                info!("Applied patch {}", subject);
                if !patched.contains(&patch.project) {
                    patched.push(patch.project.clone());
                }
            }
            Applied::AlreadyApplied => info!("Patch {} is already applied", subject),
            Applied::Rejected => {}
        }
    }

    Ok(patched
        .into_iter()
        .map(|project| Patched {
            defaults_before: snapshots.remove(&project).flatten(),
            project,
        })
        .collect())
}

/// Applies `file` with one leading path component stripped.
///
/// A dry run goes first so a patch that does not apply cleanly leaves the
/// working copy untouched. A patch that only applies in reverse is already
/// in the tree; only one that fails both ways goes through the policy table.
fn apply<R: CommandRunner>(
    executor: &Executor<'_, R>,
    subject: &str,
    file: &Path,
    working_copy: &Path,
) -> Result<Applied, StepError> {
    let patch = |flags: &[&str]| {
        Invocation::new("patch")
            .args(["-p1", "--batch"])
            .args(flags.iter().copied())
            .arg("--input")
            .arg(file.to_string_lossy())
            .current_dir(working_copy)
    };

    if let Err(forward) = executor.try_run(&patch(&["--forward", "--dry-run"])) {
        // With --forward, a patch that is not in the tree fails this check too.
        if executor
            .try_run(&patch(&["--reverse", "--forward", "--dry-run"]))
            .is_ok()
        {
            return Ok(Applied::AlreadyApplied);
        }
        executor.settle(Stage::PatchApply, subject, Err(forward))?;
        return Ok(Applied::Rejected);
    }

    if executor.run(Stage::PatchApply, subject, &patch(&["--forward"]))? {
        Ok(Applied::Applied)
    } else {
        Ok(Applied::Rejected)
    }
}

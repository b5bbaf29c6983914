use std::time::Duration;

use thiserror::Error;

pub mod cache;
pub mod repository;

pub use cache::GitWorkingCopies;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Transfer from {url} did not finish within {}s", .timeout.as_secs())]
    TimedOut { url: String, timeout: Duration },
    #[error("Branch {branch} has diverged from origin, keeping the local history")]
    Diverged { branch: String },
    #[error("HEAD is not on a branch, nothing to fast-forward")]
    DetachedHead,
    #[error("Local changes conflict with the upstream update: {0}")]
    LocalChanges(git2::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Result of a fast-forward-only pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    FastForwarded,
}

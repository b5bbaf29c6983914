use std::{
    cell::Cell,
    path::PathBuf,
    time::{Duration, Instant},
};

use git2::{AutotagOption, FetchOptions, RemoteCallbacks};
use log::{debug, trace};

use crate::{
    git::{repository::WorkingCopy, GitError, PullOutcome},
    model::Project,
    sources::SourceCache,
};

/// Working copies of the manifest's projects, one directory per project below
/// `location`.
pub struct GitWorkingCopies {
    location: PathBuf,
    timeout: Duration,
}

impl GitWorkingCopies {
    pub fn new(location: PathBuf, timeout: Duration) -> Self {
        GitWorkingCopies { location, timeout }
    }

    /// Runs a network transfer that is cancelled once `timeout` has elapsed.
    ///
    /// libgit2 has no transfer timeout of its own; the progress callbacks
    /// return `false` past the deadline, which aborts the transfer.
    pub(super) fn with_deadline<T, F>(&self, url: &str, transfer: F) -> Result<T, GitError>
    where
        F: FnOnce(FetchOptions<'_>) -> Result<T, git2::Error>,
    {
        let deadline = Instant::now() + self.timeout;
        let expired = Cell::new(false);
        let within_deadline = || {
            if Instant::now() < deadline {
                true
            } else {
                expired.set(true);
                false
            }
        };

        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|progress| {
            trace!(
                "Received {}/{} objects from {}",
                progress.received_objects(),
                progress.total_objects(),
                url
            );
            within_deadline()
        });
        callbacks.sideband_progress(|_| within_deadline());

        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(callbacks)
            .download_tags(AutotagOption::None);

        match transfer(fetch_options) {
            Ok(value) => Ok(value),
            Err(_) if expired.get() => Err(GitError::TimedOut {
                url: url.to_owned(),
                timeout: self.timeout,
            }),
            Err(error) => Err(error.into()),
        }
    }
}

impl SourceCache for GitWorkingCopies {
    fn working_copy(&self, project: &Project) -> PathBuf {
        self.location.join(&project.name)
    }

    fn is_present(&self, project: &Project) -> bool {
        self.working_copy(project).exists()
    }

    fn clone_project(&self, project: &Project) -> Result<(), GitError> {
        let path = self.working_copy(project);
        debug!("Cloning {} into {}", project.url, path.display());
        std::fs::create_dir_all(&self.location)?;
        WorkingCopy::clone_into(self, &project.url, &path)?;
        Ok(())
    }

    fn pull_project(&self, project: &Project) -> Result<PullOutcome, GitError> {
        let path = self.working_copy(project);
        debug!("Pulling {} in {}", project.url, path.display());
        WorkingCopy::open(self, &path, &project.url)?.pull_fast_forward()
    }
}

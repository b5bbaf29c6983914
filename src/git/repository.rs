use std::path::Path;

use git2::{build::CheckoutBuilder, build::RepoBuilder, Repository};
use log::{debug, info, trace};

use super::{cache::GitWorkingCopies, GitError, PullOutcome};

const REMOTE: &str = "origin";

pub struct WorkingCopy<'a> {
    cache: &'a GitWorkingCopies,
    git_repo: Repository,
    url: String,
}

impl<'a> WorkingCopy<'a> {
    pub fn clone_into(
        cache: &'a GitWorkingCopies,
        url: &str,
        path: &Path,
    ) -> Result<WorkingCopy<'a>, GitError> {
        trace!("Cloning repo {}", url);
        let git_repo = cache.with_deadline(url, |fetch_options| {
            RepoBuilder::new().fetch_options(fetch_options).clone(url, path)
        })?;
        info!("Cloned {} into {}", url, path.display());
        Ok(WorkingCopy {
            cache,
            git_repo,
            url: url.to_owned(),
        })
    }

    pub fn open(
        cache: &'a GitWorkingCopies,
        path: &Path,
        url: &str,
    ) -> Result<WorkingCopy<'a>, GitError> {
        trace!("Opening existing working copy at {}", path.display());

        let git_repo = Repository::open(path)?;

        {
            let remote = git_repo.find_remote(REMOTE)?;
            if remote.url() != Some(url) {
                // The manifest moved the project to another remote.
                debug!(
                    "Updating remote existing url {:?} to new url {}",
                    remote.url(),
                    url
                );
                git_repo.remote_set_url(REMOTE, url)?;
            }
        }

        Ok(WorkingCopy {
            cache,
            git_repo,
            url: url.to_owned(),
        })
    }

    /// Fetches the checked-out branch and advances it only if that needs no
    /// merge. Local edits that touch files changed upstream keep the tree as is.
    pub fn pull_fast_forward(&self) -> Result<PullOutcome, GitError> {
        let head = self.git_repo.head()?;
        if !head.is_branch() {
            return Err(GitError::DetachedHead);
        }
        let refname = head.name().ok_or(GitError::DetachedHead)?.to_owned();
        let branch = head.shorthand().ok_or(GitError::DetachedHead)?.to_owned();

        let mut remote = self.git_repo.find_remote(REMOTE)?;
        self.cache.with_deadline(&self.url, |mut fetch_options| {
            remote.fetch(&[branch.as_str()], Some(&mut fetch_options), None)
        })?;

        let fetch_head = self.git_repo.find_reference("FETCH_HEAD")?;
        let fetched = self.git_repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.git_repo.merge_analysis(&[&fetched])?;

        if analysis.is_up_to_date() {
            debug!("{} is up to date", branch);
            return Ok(PullOutcome::UpToDate);
        }
        if !analysis.is_fast_forward() {
            return Err(GitError::Diverged { branch });
        }

        let target = self.git_repo.find_object(fetched.id(), None)?;
        self.git_repo
            .checkout_tree(&target, Some(CheckoutBuilder::new().safe()))
            .map_err(GitError::LocalChanges)?;
        self.git_repo
            .find_reference(&refname)?
            .set_target(fetched.id(), "rigup: fast-forward")?;

        info!("Fast-forwarded {} to {}", branch, fetched.id());
        Ok(PullOutcome::FastForwarded)
    }
}

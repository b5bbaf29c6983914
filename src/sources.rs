use std::path::PathBuf;

use log::info;

#[cfg(test)]
use mockall::automock;

use crate::{
    git::{GitError, PullOutcome},
    model::Project,
    step::{CommandRunner, Executor, Invocation, Stage, StepError},
};

/// Local working copies of the source projects.
#[cfg_attr(test, automock)]
pub trait SourceCache {
    fn working_copy(&self, project: &Project) -> PathBuf;

    fn is_present(&self, project: &Project) -> bool;

    fn clone_project(&self, project: &Project) -> Result<(), GitError>;

    fn pull_project(&self, project: &Project) -> Result<PullOutcome, GitError>;
}

/// Brings every project's working copy up to date and installs it, in the
/// given order. A project is either cloned or pulled, never both.
pub fn sync_and_build<R, S>(
    executor: &Executor<'_, R>,
    cache: &S,
    projects: &[&Project],
) -> Result<(), StepError>
where
    R: CommandRunner,
    S: SourceCache,
{
    for project in projects {
        sync(executor, cache, project)?;
        build(executor, cache, project)?;
    }
    Ok(())
}

fn sync<R, S>(executor: &Executor<'_, R>, cache: &S, project: &Project) -> Result<(), StepError>
where
    R: CommandRunner,
    S: SourceCache,
{
    if cache.is_present(project) {
        info!("Updating {}", project.name);
        let result = cache.pull_project(project).map(|outcome| {
            if outcome == PullOutcome::UpToDate {
                info!("{} is already up to date", project.name);
            }
        });
        executor.settle(Stage::SourcePull, &project.name, result)?;
    } else {
        info!("Cloning {} from {}", project.name, project.url);
        executor.settle(
            Stage::SourceClone,
            &project.name,
            cache.clone_project(project),
        )?;
    }
    Ok(())
}

/// Runs `make clean install` in the project's working copy.
pub fn build<R, S>(executor: &Executor<'_, R>, cache: &S, project: &Project) -> Result<(), StepError>
where
    R: CommandRunner,
    S: SourceCache,
{
    info!("Building {}", project.name);
    let invocation = Invocation::new("make")
        .args(["clean", "install"])
        .current_dir(cache.working_copy(project))
        .elevated(executor.privilege());
    executor.run(Stage::Build, &project.name, &invocation)?;
    Ok(())
}

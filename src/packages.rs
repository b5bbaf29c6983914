use log::{debug, info};

use crate::{
    model::PackageGroup,
    step::{CommandRunner, Executor, Invocation, Stage, StepError},
};

const APT_GET: &str = "apt-get";

/// Refreshes the package index, then installs every group with one apt-get call.
///
/// APT installs are idempotent, so a second run issues the same calls and
/// changes nothing.
pub fn install_packages<R: CommandRunner>(
    executor: &Executor<'_, R>,
    groups: &[PackageGroup],
) -> Result<(), StepError> {
    let groups: Vec<&PackageGroup> = groups.iter().filter(|g| !g.packages.is_empty()).collect();
    if groups.is_empty() {
        info!("No packages to install");
        return Ok(());
    }

    info!("Updating package index...");
    executor.run(Stage::PackageIndex, "apt", &update_invocation(executor))?;

    for group in groups {
        info!(
            "Installing package group {} ({} packages)",
            group.name,
            group.packages.len()
        );
        debug!("Packages: {}", group.packages.join(" "));
        executor.run(
            Stage::PackageInstall,
            &format!("package group {}", group.name),
            &install_invocation(executor, group),
        )?;
    }

    Ok(())
}

fn update_invocation<R>(executor: &Executor<'_, R>) -> Invocation
where
    R: CommandRunner,
{
    apt().arg("update").elevated(executor.privilege())
}

fn install_invocation<R>(executor: &Executor<'_, R>, group: &PackageGroup) -> Invocation
where
    R: CommandRunner,
{
    apt()
        .args(["install", "-y"])
        .args(group.packages.iter().cloned())
        .elevated(executor.privilege())
}

fn apt() -> Invocation {
    Invocation::new(APT_GET).env("DEBIAN_FRONTEND", "noninteractive")
}

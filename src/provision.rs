use std::path::Path;

use log::info;

use crate::{
    model::{Manifest, ParseError, Project},
    packages::install_packages,
    patch::{config_header, process_patches, Downloader, PatchCache},
    services::enable_services,
    sources::{self, SourceCache},
    startup::write_startup_file,
    step::{CommandRunner, Executor, Stage, StepError},
};

/// Runs the manifest's stages against one executor.
pub struct Provisioner<'a, R, S, D> {
    executor: Executor<'a, R>,
    sources: &'a S,
    patches: PatchCache<'a, D>,
    manifest: &'a Manifest,
    build_order: Vec<&'a Project>,
    home: &'a Path,
}

impl<'a, R, S, D> Provisioner<'a, R, S, D>
where
    R: CommandRunner,
    S: SourceCache,
    D: Downloader,
{
    pub fn new(
        executor: Executor<'a, R>,
        sources: &'a S,
        patches: PatchCache<'a, D>,
        manifest: &'a Manifest,
        home: &'a Path,
    ) -> Result<Self, ParseError> {
        Ok(Provisioner {
            executor,
            sources,
            patches,
            manifest,
            build_order: manifest.build_order()?,
            home,
        })
    }

    /// Every stage in order, stopping at the first fatal step.
    pub fn run(&self) -> Result<(), StepError> {
        self.packages()?;
        self.services()?;
        self.sources()?;
        self.patches()?;
        self.startup()?;
        info!("Provisioning finished");
        Ok(())
    }

    pub fn packages(&self) -> Result<(), StepError> {
        install_packages(&self.executor, &self.manifest.package_groups)
    }

    pub fn services(&self) -> Result<(), StepError> {
        enable_services(&self.executor, &self.manifest.services)
    }

    pub fn sources(&self) -> Result<(), StepError> {
        sources::sync_and_build(&self.executor, self.sources, &self.build_order)
    }

    /// Downloads and applies patches, then reinstalls every project that
    /// received one, in build order.
    ///
    /// A `config.h` generated from the unpatched template is regenerated so
    /// the rebuild sees the settings the patches added.
    pub fn patches(&self) -> Result<(), StepError> {
        let patched = process_patches(&self.executor, &self.patches, self.sources, self.manifest)?;
        for project in &self.build_order {
            let Some(patched) = patched.iter().find(|p| p.project == project.name) else {
                continue;
            };
            info!("Rebuilding {} with its patches", project.name);
            let refreshed = config_header::refresh(
                &self.sources.working_copy(project),
                patched.defaults_before.as_deref(),
            );
            self.executor
                .settle(Stage::Build, &project.name, refreshed.map(|_| ()))?;
            sources::build(&self.executor, self.sources, project)?;
        }
        Ok(())
    }

    pub fn startup(&self) -> Result<(), StepError> {
        let Some(startup) = &self.manifest.startup else {
            info!("No startup file configured");
            return Ok(());
        };
        let subject = startup.file.display().to_string();
        self.executor.settle(
            Stage::StartupFile,
            &subject,
            write_startup_file(self.home, startup).map(|_| ()),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        collections::HashSet,
        path::PathBuf,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        },
    };

    use pretty_assertions::assert_eq;

    use crate::{
        git::PullOutcome,
        patch::download::MockDownloader,
        sources::MockSourceCache,
        step::{Invocation, MockCommandRunner, RunError, StepPolicies, SystemRunner},
    };

    const MANIFEST: &str = r#"
        patch_base_url = "https://dwm.suckless.org/patches"

        [[packages]]
        name = "core"
        packages = ["xorg", "xinit"]

        [[services]]
        name = "tlp"

        [[projects]]
        name = "dwm"
        url = "https://git.suckless.org/dwm"
        after = ["st"]

        [[projects]]
        name = "st"
        url = "https://git.suckless.org/st"

        [[patches]]
        name = "systray"
        project = "dwm"
        path = "systray/systray.diff"

        [startup]
        exec = "dwm"
    "#;

    fn sources(root: &Path) -> MockSourceCache {
        let root = root.to_path_buf();
        let mut sources = MockSourceCache::new();
        sources
            .expect_working_copy()
            .returning(move |p| root.join(&p.name));
        sources.expect_is_present().return_const(true);
        sources
            .expect_pull_project()
            .returning(|_| Ok(PullOutcome::UpToDate));
        sources
    }

    type Calls = Arc<Mutex<Vec<Invocation>>>;

    /// Records every invocation; builds inside `fail_in` exit non-zero.
    fn recording_runner(fail_in: Option<&'static str>) -> (MockCommandRunner, Calls) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |i| {
            log.lock().unwrap().push(i.clone());
            match (fail_in, &i.current_dir) {
                (Some(name), Some(dir)) if dir.ends_with(name) => Err(RunError::Failed {
                    program: i.program.clone(),
                    code: Some(2),
                }),
                _ => Ok(()),
            }
        });
        (runner, calls)
    }

    #[test]
    fn build_failure_stops_before_any_patch_download() {
        let dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir_in(dir.path()).unwrap();
        let home = tempfile::tempdir().unwrap();
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        let sources = sources(dir.path());
        let mut downloader = MockDownloader::new();
        downloader.expect_download().times(0);
        let (runner, _) = recording_runner(Some("dwm"));
        let executor = Executor::new(&runner, StepPolicies::default(), None);
        let cache = PatchCache::new(
            &downloader,
            dir.path(),
            staging.path(),
            &manifest.patch_base_url,
        );

        let provisioner =
            Provisioner::new(executor, &sources, cache, &manifest, home.path()).unwrap();
        let error = provisioner.run().unwrap_err();

        assert_eq!(error.stage, Stage::Build);
        assert_eq!(error.subject, "dwm");
        assert!(!home.path().join(".xinitrc").exists());
    }

    #[test]
    fn full_run_rebuilds_patched_project_and_writes_startup_file() {
        let dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir_in(dir.path()).unwrap();
        let home = tempfile::tempdir().unwrap();
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();
        let sources = sources(dir.path());
        let mut downloader = MockDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(|_, destination| {
                std::fs::write(destination, "diff")?;
                Ok(4)
            });
        let (runner, calls) = recording_runner(None);
        let executor = Executor::new(&runner, StepPolicies::default(), Some("sudo".into()));
        let cache = PatchCache::new(
            &downloader,
            dir.path(),
            staging.path(),
            &manifest.patch_base_url,
        );

        let provisioner =
            Provisioner::new(executor, &sources, cache, &manifest, home.path()).unwrap();
        provisioner.run().unwrap();

        let calls = calls.lock().unwrap();
        let commands: Vec<String> = calls.iter().map(|i| i.program.clone()).collect();
        assert_eq!(
            commands,
            vec!["sudo", "sudo", "sudo", "sudo", "sudo", "patch", "patch", "sudo"]
        );
        let builds: Vec<PathBuf> = calls
            .iter()
            .filter(|i| i.args.iter().any(|a| a == "make"))
            .filter_map(|i| i.current_dir.clone())
            .collect();
        assert_eq!(
            builds,
            vec![
                dir.path().join("st"),
                dir.path().join("dwm"),
                dir.path().join("dwm"),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(home.path().join(".xinitrc")).unwrap(),
            "#!/bin/sh\nexec dwm\n"
        );
    }

    #[test]
    fn missing_startup_section_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir_in(dir.path()).unwrap();
        let home = tempfile::tempdir().unwrap();
        let manifest =
            Manifest::from_toml_str(r#"patch_base_url = "https://dwm.suckless.org/patches""#)
                .unwrap();
        let sources = MockSourceCache::new();
        let downloader = MockDownloader::new();
        let runner = MockCommandRunner::new();
        let executor = Executor::new(&runner, StepPolicies::default(), None);
        let cache = PatchCache::new(
            &downloader,
            dir.path(),
            staging.path(),
            &manifest.patch_base_url,
        );

        let provisioner =
            Provisioner::new(executor, &sources, cache, &manifest, home.path()).unwrap();
        provisioner.startup().unwrap();
        assert_eq!(std::fs::read_dir(home.path()).unwrap().count(), 0);
    }

    fn has_flag(invocation: &Invocation, flag: &str) -> bool {
        invocation.args.iter().any(|a| a == flag)
    }

    fn programs(calls: &[Invocation]) -> Vec<String> {
        calls.iter().map(|i| i.program.clone()).collect()
    }

    #[test]
    fn second_run_pulls_reuses_cache_and_skips_applied_patch() {
        let dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir_in(dir.path()).unwrap();
        let home = tempfile::tempdir().unwrap();
        let manifest = Manifest::from_toml_str(MANIFEST).unwrap();

        let git_ops = Arc::new(Mutex::new(Vec::new()));
        let cloned = Arc::new(Mutex::new(HashSet::new()));
        let root = dir.path().to_path_buf();
        let mut sources = MockSourceCache::new();
        sources
            .expect_working_copy()
            .returning(move |p| root.join(&p.name));
        let present = cloned.clone();
        sources
            .expect_is_present()
            .returning(move |p| present.lock().unwrap().contains(&p.name));
        let (log, present) = (git_ops.clone(), cloned.clone());
        sources
            .expect_clone_project()
            .times(2)
            .returning(move |p| {
                log.lock().unwrap().push(format!("clone {}", p.name));
                present.lock().unwrap().insert(p.name.clone());
                Ok(())
            });
        let log = git_ops.clone();
        sources
            .expect_pull_project()
            .times(2)
            .returning(move |p| {
                log.lock().unwrap().push(format!("pull {}", p.name));
                Ok(PullOutcome::UpToDate)
            });

        let mut downloader = MockDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(|_, destination| {
                std::fs::write(destination, "diff")?;
                Ok(4)
            });

        // Tracks whether the patch is in the working copy, the way `patch`
        // answers forward and reverse dry runs.
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let in_tree = Arc::new(AtomicBool::new(false));
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |i| {
            log.lock().unwrap().push(i.clone());
            if i.program != "patch" {
                return Ok(());
            }
            let applied = in_tree.load(Ordering::SeqCst);
            let rejected = match (has_flag(i, "--dry-run"), has_flag(i, "--reverse")) {
                (true, false) => applied,
                (true, true) => !applied,
                (false, _) => {
                    in_tree.store(true, Ordering::SeqCst);
                    false
                }
            };
            if rejected {
                Err(RunError::Failed {
                    program: i.program.clone(),
                    code: Some(1),
                })
            } else {
                Ok(())
            }
        });

        let xinitrc = home.path().join(".xinitrc");
        let backup = home.path().join(".xinitrc.bak");
        let mut startup_files = Vec::new();
        let mut runs = Vec::new();
        for _ in 0..2 {
            let policies =
                StepPolicies::default().with(Stage::PatchApply, manifest.patch_apply_failure);
            let executor = Executor::new(&runner, policies, None);
            let cache = PatchCache::new(
                &downloader,
                dir.path(),
                staging.path(),
                &manifest.patch_base_url,
            );
            let provisioner =
                Provisioner::new(executor, &sources, cache, &manifest, home.path()).unwrap();
            provisioner.run().unwrap();

            let invocations: Vec<Invocation> = calls.lock().unwrap().drain(..).collect();
            let ops: Vec<String> = git_ops.lock().unwrap().drain(..).collect();
            runs.push((invocations, ops));
            startup_files.push(std::fs::read_to_string(&xinitrc).unwrap());
            if runs.len() == 1 {
                assert!(!backup.exists());
            }
        }

        let (first, first_ops) = &runs[0];
        let (second, second_ops) = &runs[1];
        assert_eq!(first_ops, &vec!["clone st", "clone dwm"]);
        assert_eq!(second_ops, &vec!["pull st", "pull dwm"]);

        assert_eq!(
            programs(first),
            vec!["apt-get", "apt-get", "systemctl", "make", "make", "patch", "patch", "make"]
        );
        assert_eq!(
            programs(second),
            vec!["apt-get", "apt-get", "systemctl", "make", "make", "patch", "patch"]
        );
        let last = second.last().unwrap();
        assert!(has_flag(last, "--reverse") && has_flag(last, "--dry-run"));

        assert_eq!(startup_files[0], "#!/bin/sh\nexec dwm\n");
        assert_eq!(startup_files[1], startup_files[0]);
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), startup_files[0]);
    }

    const FIXTURE_MAKEFILE: &str = "\
dwm: config.h dwm.c
\tif grep -q showsystray dwm.c; then grep -q showsystray config.h; fi
\tcat config.h dwm.c > dwm

config.h:
\tcp config.def.h $@

clean:
\trm -f dwm

install: dwm
\tcp dwm installed

.PHONY: clean install
";

    const FIXTURE_PATCH: &str = "\
--- a/config.def.h
+++ b/config.def.h
@@ -1 +1,2 @@
 static int borderpx = 1;
+static int showsystray = 1;
--- a/dwm.c
+++ b/dwm.c
@@ -1 +1,2 @@
 int main(void) { return borderpx; }
+int systray(void) { return showsystray; }
";

    /// Runs real `make` and `patch` against a tiny project whose build fails
    /// when `config.h` lags behind a patched `config.def.h`.
    #[test]
    fn patched_template_reaches_the_rebuild_and_rerun_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir_in(dir.path()).unwrap();
        let home = tempfile::tempdir().unwrap();
        let working_copy = dir.path().join("dwm");
        std::fs::create_dir(&working_copy).unwrap();
        std::fs::write(working_copy.join("config.def.h"), "static int borderpx = 1;\n").unwrap();
        std::fs::write(
            working_copy.join("dwm.c"),
            "int main(void) { return borderpx; }\n",
        )
        .unwrap();
        std::fs::write(working_copy.join("Makefile"), FIXTURE_MAKEFILE).unwrap();

        let manifest = Manifest::from_toml_str(
            r#"
            patch_base_url = "https://dwm.suckless.org/patches"
            patch_apply_failure = "abort"

            [[projects]]
            name = "dwm"
            url = "https://git.suckless.org/dwm"

            [[patches]]
            name = "systray"
            project = "dwm"
            path = "systray/systray.diff"
        "#,
        )
        .unwrap();
        let sources = sources(dir.path());
        let mut downloader = MockDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(|_, destination| {
                std::fs::write(destination, FIXTURE_PATCH)?;
                Ok(FIXTURE_PATCH.len() as u64)
            });
        let runner = SystemRunner::new().unwrap();

        for _ in 0..2 {
            let policies =
                StepPolicies::default().with(Stage::PatchApply, manifest.patch_apply_failure);
            let executor = Executor::new(&runner, policies, None);
            let cache = PatchCache::new(
                &downloader,
                dir.path(),
                staging.path(),
                &manifest.patch_base_url,
            );
            let provisioner =
                Provisioner::new(executor, &sources, cache, &manifest, home.path()).unwrap();
            provisioner.run().unwrap();

            let header = std::fs::read_to_string(working_copy.join("config.h")).unwrap();
            assert!(header.contains("showsystray"));
            assert!(working_copy.join("installed").exists());
        }

        let defaults = std::fs::read_to_string(working_copy.join("config.def.h")).unwrap();
        assert_eq!(defaults.matches("showsystray").count(), 1);
    }
}

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, trace, warn};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::model::FailurePolicy;

/// One external command, fully described before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Prefixes the command with the privilege command, e.g. `sudo`.
    ///
    /// sudo resets the environment, so variables are handed over through
    /// `env` on the elevated side.
    pub fn elevated(self, privilege: Option<&str>) -> Self {
        let Some(privilege) = privilege else {
            return self;
        };
        let mut args = Vec::with_capacity(self.args.len() + self.env.len() + 2);
        if !self.env.is_empty() {
            args.push("env".to_owned());
            args.extend(self.env.iter().map(|(key, value)| format!("{key}={value}")));
        }
        args.push(self.program);
        args.extend(self.args);
        Invocation {
            program: privilege.to_owned(),
            args,
            env: Vec::new(),
            ..self
        }
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {}", exit_code(.code))]
    Failed { program: String, code: Option<i32> },
    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_owned(),
    }
}

#[cfg_attr(test, automock)]
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), RunError>;
}

/// Runs invocations as child processes, inheriting stdio.
pub struct SystemRunner {
    runtime: tokio::runtime::Runtime,
}

impl SystemRunner {
    pub fn new() -> Result<Self, RunError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(SystemRunner { runtime })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), RunError> {
        debug!("Running {}", invocation);

        let mut command = tokio::process::Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            trace!("Working directory {}", dir.display());
            command.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        self.runtime
            .block_on(wait(command, &invocation.program, invocation.timeout))
    }
}

async fn wait(
    mut command: tokio::process::Command,
    program: &str,
    timeout: Option<Duration>,
) -> Result<(), RunError> {
    let mut child = command.spawn().map_err(|source| RunError::Spawn {
        program: program.to_owned(),
        source,
    })?;
    let status = match timeout {
        // Dropping the child on timeout kills it.
        Some(timeout) => tokio::time::timeout(timeout, child.wait())
            .await
            .map_err(|_| RunError::TimedOut {
                program: program.to_owned(),
                timeout,
            })??,
        None => child.wait().await?,
    };
    if status.success() {
        Ok(())
    } else {
        Err(RunError::Failed {
            program: program.to_owned(),
            code: status.code(),
        })
    }
}

/// Pipeline stages, each with its own failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PackageIndex,
    PackageInstall,
    ServiceEnable,
    SourceClone,
    SourcePull,
    Build,
    PatchDownload,
    PatchApply,
    StartupFile,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::PackageIndex => "package index update",
            Stage::PackageInstall => "package install",
            Stage::ServiceEnable => "service enable",
            Stage::SourceClone => "source clone",
            Stage::SourcePull => "source pull",
            Stage::Build => "build",
            Stage::PatchDownload => "patch download",
            Stage::PatchApply => "patch apply",
            Stage::StartupFile => "startup file",
        })
    }
}

const DEFAULT_POLICIES: [(Stage, FailurePolicy); 9] = [
    (Stage::PackageIndex, FailurePolicy::Abort),
    (Stage::PackageInstall, FailurePolicy::Abort),
    (Stage::ServiceEnable, FailurePolicy::Continue),
    (Stage::SourceClone, FailurePolicy::Abort),
    (Stage::SourcePull, FailurePolicy::Continue),
    (Stage::Build, FailurePolicy::Abort),
    (Stage::PatchDownload, FailurePolicy::Abort),
    (Stage::PatchApply, FailurePolicy::Continue),
    (Stage::StartupFile, FailurePolicy::Abort),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPolicies {
    table: [(Stage, FailurePolicy); 9],
}

impl Default for StepPolicies {
    fn default() -> Self {
        StepPolicies {
            table: DEFAULT_POLICIES,
        }
    }
}

impl StepPolicies {
    pub fn with(mut self, stage: Stage, policy: FailurePolicy) -> Self {
        for entry in self.table.iter_mut().filter(|(s, _)| *s == stage) {
            entry.1 = policy;
        }
        self
    }

    pub fn policy(&self, stage: Stage) -> FailurePolicy {
        self.table
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, policy)| *policy)
            .unwrap_or(FailurePolicy::Abort)
    }

    pub fn outcome<E: Display>(&self, stage: Stage, result: Result<(), E>) -> StepOutcome {
        match (result, self.policy(stage)) {
            (Ok(()), _) => StepOutcome::Success,
            (Err(error), FailurePolicy::Continue) => StepOutcome::Recoverable(error.to_string()),
            (Err(error), FailurePolicy::Abort) => StepOutcome::Fatal(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Recoverable(String),
    Fatal(String),
}

/// A step failed in a stage whose policy is to abort the run.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("{stage} failed for {subject}: {reason}")]
pub struct StepError {
    pub stage: Stage,
    pub subject: String,
    pub reason: String,
}

/// Runs steps and applies the policy table to their results.
pub struct Executor<'a, R> {
    runner: &'a R,
    policies: StepPolicies,
    privilege: Option<String>,
    command_timeout: Option<Duration>,
}

impl<'a, R: CommandRunner> Executor<'a, R> {
    pub fn new(runner: &'a R, policies: StepPolicies, privilege: Option<String>) -> Self {
        Executor {
            runner,
            policies,
            privilege,
            command_timeout: None,
        }
    }

    /// Bounds every invocation that does not carry its own timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn privilege(&self) -> Option<&str> {
        self.privilege.as_deref()
    }

    /// Runs `invocation`; returns whether it succeeded, or the fatal error.
    pub fn run(
        &self,
        stage: Stage,
        subject: &str,
        invocation: &Invocation,
    ) -> Result<bool, StepError> {
        self.settle(stage, subject, self.try_run(invocation))
    }

    /// Runs `invocation` without consulting the policy table.
    pub fn try_run(&self, invocation: &Invocation) -> Result<(), RunError> {
        match (invocation.timeout, self.command_timeout) {
            (None, Some(timeout)) => self.runner.run(&invocation.clone().timeout(timeout)),
            _ => self.runner.run(invocation),
        }
    }

    /// Same as [`Executor::run`] for steps that do not spawn a process.
    pub fn settle<E: Display>(
        &self,
        stage: Stage,
        subject: &str,
        result: Result<(), E>,
    ) -> Result<bool, StepError> {
        match self.policies.outcome(stage, result) {
            StepOutcome::Success => Ok(true),
            StepOutcome::Recoverable(reason) => {
                warn!("{stage} failed for {subject}, continuing: {reason}");
                Ok(false)
            }
            StepOutcome::Fatal(reason) => Err(StepError {
                stage,
                subject: subject.to_owned(),
                reason,
            }),
        }
    }
}

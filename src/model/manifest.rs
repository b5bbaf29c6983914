use std::{
    collections::{BTreeSet, HashSet},
    fmt::{Display, Write},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use log::{debug, error};
use regex_lite::Regex;
use serde::Deserialize;

use crate::model::{order, ParseError};

/// Manifest shipped with the binary and written out by `rigup init`.
pub const DEFAULT_MANIFEST: &str = include_str!("../../resources/rigup.toml");

/// Name of the project subdirectory that holds the patch cache.
pub const PATCHES_DIR: &str = "patches";

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9+.\-]+(:[a-z0-9\-]+)?$").expect("package name pattern is valid")
});

static ITEM_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+@\-]*$").expect("item name pattern is valid")
});

/// Everything rigup provisions, in the order it is declared.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub patch_base_url: String,
    #[serde(default)]
    pub patch_apply_failure: FailurePolicy,
    #[serde(default, rename = "packages")]
    pub package_groups: Vec<PackageGroup>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub patches: Vec<Patch>,
    pub startup: Option<Startup>,
}

/// What happens to the run when a step of some stage fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum FailurePolicy {
    #[serde(rename = "abort")]
    Abort,
    #[default]
    #[serde(rename = "skip", alias = "continue")]
    Continue,
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Abort => f.write_str("abort"),
            FailurePolicy::Continue => f.write_str("skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageGroup {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub scope: ServiceScope,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    #[default]
    System,
    User,
}

/// A source tree that is cloned into the workspace and installed with make.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    pub name: String,
    pub url: String,
    /// Projects that must be installed before this one is built.
    #[serde(default)]
    pub after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Patch {
    pub name: String,
    pub project: String,
    /// Location relative to the manifest's `patch_base_url`, or a full URL.
    pub path: String,
    #[serde(default = "default_apply")]
    pub apply: bool,
}

impl Patch {
    /// Cache location of this patch below the workspace root.
    pub fn cache_path(&self, root: &Path) -> PathBuf {
        root.join(PATCHES_DIR)
            .join(&self.project)
            .join(format!("{}.diff", self.name))
    }

    pub fn url(&self, base_url: &str) -> String {
        if self.path.starts_with("https://") || self.path.starts_with("http://") {
            self.path.clone()
        } else {
            format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                self.path.trim_start_matches('/')
            )
        }
    }
}

fn default_apply() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Startup {
    /// Relative paths are resolved against the home directory.
    #[serde(default = "default_startup_file")]
    pub file: PathBuf,
    #[serde(default)]
    pub background: Vec<String>,
    pub exec: String,
}

fn default_startup_file() -> PathBuf {
    PathBuf::from(".xinitrc")
}

impl Startup {
    pub fn render(&self) -> String {
        let mut content = String::from("#!/bin/sh\n");
        for command in &self.background {
            // Writing to a String cannot fail.
            let _ = writeln!(content, "{} &", command.trim());
        }
        let _ = writeln!(content, "exec {}", self.exec.trim());
        content
    }
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Manifest, ParseError> {
        debug!("Attempting to read manifest from {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let manifest = Manifest::from_toml_str(&contents);
        if let Err(err) = &manifest {
            error!(
                "Could not build a valid manifest from {} due to err {err}",
                path.display()
            )
        }
        manifest
    }

    pub fn from_toml_str(data: &str) -> Result<Manifest, ParseError> {
        let manifest = toml::from_str::<Manifest>(data)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn builtin() -> Result<Manifest, ParseError> {
        Manifest::from_toml_str(DEFAULT_MANIFEST)
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Projects in the order they have to be built.
    pub fn build_order(&self) -> Result<Vec<&Project>, ParseError> {
        order::build_order(&self.projects)
    }

    fn validate(&self) -> Result<(), ParseError> {
        for group in &self.package_groups {
            check_name("package group", &group.name, &ITEM_NAME)?;
            for package in &group.packages {
                check_name("package", package, &PACKAGE_NAME)?;
            }
        }

        for service in &self.services {
            check_name("service", &service.name, &ITEM_NAME)?;
        }

        let mut projects = HashSet::new();
        for project in &self.projects {
            check_name("project", &project.name, &ITEM_NAME)?;
            if project.name == PATCHES_DIR {
                return Err(ParseError::ReservedName(project.name.clone()));
            }
            if !projects.insert(project.name.as_str()) {
                return Err(ParseError::Duplicate {
                    kind: "project",
                    name: project.name.clone(),
                });
            }
        }

        let mut patches = BTreeSet::new();
        for patch in &self.patches {
            check_name("patch", &patch.name, &ITEM_NAME)?;
            if !projects.contains(patch.project.as_str()) {
                return Err(ParseError::UnknownPatchTarget {
                    patch: patch.name.clone(),
                    project: patch.project.clone(),
                });
            }
            if !patches.insert((patch.project.as_str(), patch.name.as_str())) {
                return Err(ParseError::Duplicate {
                    kind: "patch",
                    name: format!("{}/{}", patch.project, patch.name),
                });
            }
        }

        if let Some(startup) = &self.startup {
            if startup.exec.trim().is_empty() {
                return Err(ParseError::EmptyExec);
            }
        }

        // Unknown prerequisites and cycles surface here rather than mid-run.
        self.build_order()?;

        Ok(())
    }
}

fn check_name(kind: &'static str, name: &str, pattern: &Regex) -> Result<(), ParseError> {
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(ParseError::InvalidName {
            kind,
            name: name.to_owned(),
        })
    }
}

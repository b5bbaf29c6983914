use thiserror::Error;

pub mod manifest;
pub mod order;

pub use manifest::{
    FailurePolicy, Manifest, PackageGroup, Patch, Project, Service, ServiceScope, Startup,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading manifest: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid {kind} name `{name}`")]
    InvalidName { kind: &'static str, name: String },
    #[error("Duplicate {kind} `{name}`")]
    Duplicate { kind: &'static str, name: String },
    #[error("Project name `{0}` is reserved")]
    ReservedName(String),
    #[error("Patch `{patch}` targets unknown project `{project}`")]
    UnknownPatchTarget { patch: String, project: String },
    #[error("Project `{project}` must be built after unknown project `{after}`")]
    UnknownDependency { project: String, after: String },
    #[error("Projects {0:?} depend on each other in a cycle")]
    DependencyCycle(Vec<String>),
    #[error("Startup file must exec a program")]
    EmptyExec,
}

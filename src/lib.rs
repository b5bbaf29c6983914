pub mod cli;
pub mod config;
pub mod flock;
pub mod git;
pub mod model;
pub mod packages;
pub mod patch;
pub mod provision;
pub mod services;
pub mod sources;
pub mod startup;
pub mod step;
pub mod workspace;

mod api;

pub use api::{Rigup, RigupBuilder, Selection};

//! art - GitLab artifact installer
//!
//! Resolves declared CI job artifacts, repository snapshots and generic
//! packages to immutable identifiers, caches their archives locally and
//! installs selected members into a working directory.

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod gitlab;
pub mod install;
pub mod manifest;
pub mod resolve;
pub mod ui;
pub mod workflow;

pub use error::{ArtError, ArtResult};

//! Installing archive members into the working directory
//!
//! Planning matches install requests against archive members and produces
//! the `files` mapping recorded in the lock manifest. Applying writes that
//! mapping out in two phases (content, then modes). Cleaning walks it
//! backwards to undo an install.

pub mod action;
pub mod apply;
pub mod clean;
pub mod permissions;
pub mod plan;

pub use action::{join, InstallAction, PatternKind};
pub use apply::{install_from_archive, install_unextracted, InstalledFile};
pub use clean::{remove_installed, Removal};
pub use permissions::{FileMode, Umask};
pub use plan::{check_extraction, plan, plan_unextracted, PlanOptions};

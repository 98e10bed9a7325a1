//! Terminal output
//!
//! Uses `cliclack` for interactive terminals with automatic fallback to
//! plain `[OK]`/`[WARN]` lines in CI. A quiet context (`--json`) prints
//! nothing, leaving stdout to the JSON document.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, note, outro_success, remark, step_info, step_ok, step_ok_detail, step_warn,
};
pub use progress::{DownloadProgress, TaskSpinner};

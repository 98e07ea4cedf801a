//! CLI command handlers, one per file.

mod batch;
mod clean;
mod get;
mod run;

pub use batch::run_batch;
pub use clean::run_clean;
pub use get::run_get;

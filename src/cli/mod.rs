//! Command line interface module
//!
//! Argument parsing, the report/prune mode switch and the runner that ties configuration,
//! registry client and pruner together.

pub mod args;
pub mod operation_mode;
pub mod runner;

pub use args::Args;
pub use operation_mode::OperationMode;
pub use runner::{EXIT_DELETE_FAILED, EXIT_FAILURE, EXIT_OK, Runner};

//! registry-pruner binary entry point

use registry_pruner::cli::{Args, Runner};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();
    let runner = Runner::new(args);
    ExitCode::from(runner.run().await)
}

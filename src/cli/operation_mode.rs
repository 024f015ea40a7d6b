//! Operation modes

use clap::ValueEnum;
use std::fmt;

/// What a run does with its classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OperationMode {
    /// Print the keep/delete table without touching the registry
    #[default]
    Report,
    /// Delete every artifact classified for deletion
    Prune,
}

impl OperationMode {
    pub fn description(&self) -> &'static str {
        match self {
            OperationMode::Report => "Report which images would be kept and deleted",
            OperationMode::Prune => "Delete images the rules mark for deletion",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, OperationMode::Prune)
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Report => write!(f, "report"),
            OperationMode::Prune => write!(f, "prune"),
        }
    }
}

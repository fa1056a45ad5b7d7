//! Conflict handling vocabulary

use serde::{Deserialize, Serialize};

/// User decision for a pending package conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    /// Drop the offending package and continue with the rest of the queue.
    Skip,
    /// Retry the same package, replacing the conflicting one.
    Replace,
    /// Replace now and auto-replace every later conflict of this session.
    ReplaceAll,
    /// Abort the whole session.
    Cancel,
}

impl std::fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Replace => write!(f, "replace"),
            Self::ReplaceAll => write!(f, "replace all"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// A package conflict surfaced by the package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Package whose installation produced the conflict.
    pub package: String,
    /// Package named in the conflict line, when one could be parsed.
    pub hint: Option<String>,
    /// The output line that triggered the detection.
    pub raw_message: String,
}

/// How a package step is issued to the helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    #[default]
    Normal,
    /// Re-issue after the user chose to replace a conflicting package.
    Replace,
}

//! Final session summary

use lunaris_types::Phase;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PackageFailure {
    pub package: String,
    pub message: String,
}

/// What a session did, returned when it ends
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub phase: Phase,
    pub progress: usize,
    pub total: usize,
    pub installed: Vec<String>,
    pub already_installed: Vec<String>,
    /// Dropped after a conflict
    pub skipped: Vec<String>,
    pub failed: Vec<PackageFailure>,
    pub backup_dir: Option<String>,
    pub dotfiles_installed: bool,
    /// Failure message when `phase` is `Failed`
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl SessionReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.phase == Phase::Complete
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.phase == Phase::Cancelled
    }
}

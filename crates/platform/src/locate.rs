//! Executable lookup on `PATH`

use std::path::PathBuf;

pub trait ExecutableLocator: Send + Sync {
    fn locate(&self, name: &str) -> Option<PathBuf>;

    fn is_installed(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }
}

/// Looks executables up with the `which` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct PathLocator;

impl ExecutableLocator for PathLocator {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_shell() {
        assert!(PathLocator.is_installed("sh"));
        assert!(!PathLocator.is_installed("lunaris-definitely-not-installed"));
    }
}

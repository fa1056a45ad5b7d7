//! Fixed names and defaults used by the installer

/// Directory name under the XDG config/state dirs
pub const APP_DIR_NAME: &str = "lunaris";

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration repository cloned during post-install
pub const DEFAULT_CONFIG_REPO: &str = "https://github.com/Lunaris-Project/HyprLuna.git";

/// Checkout location, relative to the home directory
pub const DEFAULT_CHECKOUT_DIR: &str = "HyprLuna";

/// Backup location, relative to the home directory
pub const DEFAULT_BACKUP_DIR: &str = "HyprLuna-User-Bak";

/// System package manager driven by the AUR helper
pub const PACKAGE_MANAGER: &str = "pacman";

/// Marker entry inserted where the message log dropped lines
pub const TRUNCATION_MARKER: &str = "... (messages truncated) ...";

pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;
pub const DEFAULT_LOG_CAPACITY: usize = 50;
pub const MIN_LOG_CAPACITY: usize = 3;

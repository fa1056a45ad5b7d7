#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for lunaris
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/lunaris/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)

pub mod catalog;
pub mod constants;

use constants::{
    APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_BACKUP_DIR, DEFAULT_CHECKOUT_DIR, DEFAULT_CONFIG_REPO,
    DEFAULT_LOG_CAPACITY, DEFAULT_SETTLE_DELAY_MS, DEFAULT_STEP_TIMEOUT_SECS, MIN_LOG_CAPACITY,
    PACKAGE_MANAGER,
};
use lunaris_errors::{ConfigError, Error};
use lunaris_types::{ColorChoice, HelperKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub process: ProcessConfig,

    #[serde(default)]
    pub packages: PackagesConfig,

    #[serde(default)]
    pub dotfiles: DotfilesConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub helper: HelperKind,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
    #[serde(default = "default_log_capacity")]
    pub message_log_capacity: usize,
    /// Capacity of the bounded channel carrying subprocess output lines
    #[serde(default = "default_line_channel_capacity")]
    pub line_channel_capacity: usize,
    /// Log lines attached to failure reports
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

/// Subprocess supervision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
    /// Pause after killing stale package-manager processes
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_helper_poll_interval")]
    pub helper_poll_interval_ms: u64,
    /// How long to keep reading output after the process exited
    #[serde(default = "default_drain_grace")]
    pub drain_grace_ms: u64,
    /// Run helper builds and installs under `ionice -c 3 nice -n 19`
    #[serde(default = "default_true")]
    pub low_priority: bool,
    #[serde(default = "default_helper_build_jobs")]
    pub helper_build_jobs: usize,
    #[serde(default = "default_package_build_jobs")]
    pub package_build_jobs: usize,
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
}

/// Package selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagesConfig {
    #[serde(default = "default_base_packages")]
    pub base: Vec<String>,
    /// Catalog option ids; empty means the catalog defaults
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub extra: Vec<String>,
    /// Ask the package manager first and skip packages already present
    #[serde(default = "default_true")]
    pub skip_installed: bool,
}

/// Configuration repository, backup and post-install hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DotfilesConfig {
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default = "default_checkout_dir")]
    pub checkout_dir: String,
    #[serde(default = "default_config_dirs")]
    pub config_dirs: Vec<String>,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    #[serde(default = "default_backup_sources")]
    pub backup_sources: Vec<String>,
    #[serde(default = "default_script_dirs")]
    pub script_dirs: Vec<String>,
    #[serde(default = "default_post_install_script")]
    pub post_install_script: Option<String>,
    /// Count the two confirmation prompts as progress steps
    #[serde(default)]
    pub count_confirmation_steps: bool,
    /// Overrides the detected home directory
    #[serde(default)]
    pub home: Option<PathBuf>,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            helper: HelperKind::default(),
            color: default_color_choice(),
            message_log_capacity: default_log_capacity(),
            line_channel_capacity: default_line_channel_capacity(),
            tail_lines: default_tail_lines(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout(),
            settle_delay_ms: default_settle_delay(),
            helper_poll_interval_ms: default_helper_poll_interval(),
            drain_grace_ms: default_drain_grace(),
            low_priority: true,
            helper_build_jobs: default_helper_build_jobs(),
            package_build_jobs: default_package_build_jobs(),
            package_manager: default_package_manager(),
        }
    }
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            base: default_base_packages(),
            options: Vec::new(),
            extra: Vec::new(),
            skip_installed: true,
        }
    }
}

impl Default for DotfilesConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            checkout_dir: default_checkout_dir(),
            config_dirs: default_config_dirs(),
            backup_dir: default_backup_dir(),
            backup_sources: default_backup_sources(),
            script_dirs: default_script_dirs(),
            post_install_script: default_post_install_script(),
            count_confirmation_steps: false,
            home: None,
        }
    }
}

// Default value functions for serde
fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_line_channel_capacity() -> usize {
    64
}

fn default_tail_lines() -> usize {
    8
}

fn default_step_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

fn default_settle_delay() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_helper_poll_interval() -> u64 {
    2_000
}

fn default_drain_grace() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

fn default_helper_build_jobs() -> usize {
    2
}

fn default_package_build_jobs() -> usize {
    1
}

fn default_package_manager() -> String {
    PACKAGE_MANAGER.to_string()
}

fn default_base_packages() -> Vec<String> {
    catalog::BASE_PACKAGES
        .iter()
        .map(|name| (*name).to_string())
        .collect()
}

fn default_repository() -> String {
    DEFAULT_CONFIG_REPO.to_string()
}

fn default_checkout_dir() -> String {
    DEFAULT_CHECKOUT_DIR.to_string()
}

fn default_config_dirs() -> Vec<String> {
    [".config", ".local", ".fonts", ".ags", "Pictures", ".cursor", ".vscode"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_backup_dir() -> String {
    DEFAULT_BACKUP_DIR.to_string()
}

fn default_backup_sources() -> Vec<String> {
    [".config", ".local", ".ags"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_script_dirs() -> Vec<String> {
    [".config/hypr/scripts", ".config/ags/scripts/hyprland"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[allow(clippy::unnecessary_wraps)]
fn default_post_install_script() -> Option<String> {
    Some(".config/ags/scripts/color_generation/wallpapers.sh".to_string())
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Directory for debug log files
    #[must_use]
    pub fn log_dir() -> Option<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::cache_dir)
            .map(|dir| dir.join(APP_DIR_NAME).join("logs"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            tracing::debug!(path = %config_path.display(), "loading configuration");
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // LUNARIS_HELPER
        if let Ok(helper) = std::env::var("LUNARIS_HELPER") {
            self.general.helper = helper.parse().map_err(|_| ConfigError::InvalidValue {
                field: "LUNARIS_HELPER".to_string(),
                value: helper,
            })?;
        }

        // LUNARIS_COLOR
        if let Ok(color) = std::env::var("LUNARIS_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "LUNARIS_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        // LUNARIS_STEP_TIMEOUT
        if let Ok(timeout) = std::env::var("LUNARIS_STEP_TIMEOUT") {
            self.process.step_timeout_secs =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "LUNARIS_STEP_TIMEOUT".to_string(),
                    value: timeout,
                })?;
        }

        // LUNARIS_LOG_CAPACITY
        if let Ok(capacity) = std::env::var("LUNARIS_LOG_CAPACITY") {
            self.general.message_log_capacity =
                capacity.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "LUNARIS_LOG_CAPACITY".to_string(),
                    value: capacity,
                })?;
        }

        // LUNARIS_CONFIG_REPO
        if let Ok(repository) = std::env::var("LUNARIS_CONFIG_REPO") {
            self.dotfiles.repository = repository;
        }

        // LUNARIS_LOW_PRIORITY
        if let Ok(low) = std::env::var("LUNARIS_LOW_PRIORITY") {
            self.process.low_priority = match low.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "LUNARIS_LOW_PRIORITY".to_string(),
                        value: low,
                    }
                    .into())
                }
            };
        }

        Ok(())
    }

    /// Check values that serde cannot reject on its own
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first offending field.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |field: &str, value: String| -> Error {
            ConfigError::InvalidValue {
                field: field.to_string(),
                value,
            }
            .into()
        };

        if self.general.message_log_capacity < MIN_LOG_CAPACITY {
            return Err(invalid(
                "general.message_log_capacity",
                self.general.message_log_capacity.to_string(),
            ));
        }
        if self.general.line_channel_capacity == 0 {
            return Err(invalid("general.line_channel_capacity", "0".to_string()));
        }
        if self.process.step_timeout_secs == 0 {
            return Err(invalid("process.step_timeout_secs", "0".to_string()));
        }
        if self.dotfiles.repository.trim().is_empty() {
            return Err(invalid("dotfiles.repository", String::new()));
        }
        if self.dotfiles.checkout_dir.trim().is_empty() {
            return Err(invalid("dotfiles.checkout_dir", String::new()));
        }
        for name in &self.packages.options {
            if catalog::find_option(name).is_none() {
                return Err(ConfigError::UnknownOption {
                    option: name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Resolve the home directory the dotfiles are installed into
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingHomeDir` when no override is set and the
    /// platform reports no home directory.
    pub fn home_dir(&self) -> Result<PathBuf, Error> {
        if let Some(home) = &self.dotfiles.home {
            return Ok(home.clone());
        }
        dirs::home_dir().ok_or_else(|| ConfigError::MissingHomeDir.into())
    }

    /// Build the initial package queue from the configured selection
    ///
    /// # Errors
    ///
    /// Returns an error if an option id is not part of the catalog.
    pub fn package_queue(&self) -> Result<Vec<String>, Error> {
        let options: Vec<String> = if self.packages.options.is_empty() {
            catalog::default_selection()
                .into_iter()
                .map(String::from)
                .collect()
        } else {
            self.packages.options.clone()
        };
        catalog::build_queue(&self.packages.base, &options, &self.packages.extra)
            .map_err(Into::into)
    }

    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.process.step_timeout_secs)
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.process.settle_delay_ms)
    }

    #[must_use]
    pub fn helper_poll_interval(&self) -> Duration {
        Duration::from_millis(self.process.helper_poll_interval_ms)
    }

    #[must_use]
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.process.drain_grace_ms)
    }
}

#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Installation session orchestration for lunaris
//!
//! This crate sits between the CLI and the installers. It owns the phase
//! state machine, progress accounting and the user decision points; the
//! actual work is delegated to `lunaris-install`.

mod command;
mod handle;
mod progress;
mod report;
mod session;

pub use command::SessionCommand;
pub use handle::SessionHandle;
pub use progress::{ProgressTracker, StepPlan};
pub use report::{PackageFailure, SessionReport};
pub use session::{InstallationSession, SessionSettings};

use lunaris_config::Config;
use lunaris_errors::Error;
use lunaris_install::{AurBackend, DotfilesInstaller};
use lunaris_platform::PlatformContext;

/// A session wired to the real helper, package manager and git
pub type SystemSession = InstallationSession<AurBackend, DotfilesInstaller>;

/// Build a session for `packages` from configuration.
///
/// # Errors
///
/// Returns an error if the home directory cannot be resolved or the queue
/// is empty.
pub fn session_from_config(
    config: &Config,
    platform: PlatformContext,
    packages: Vec<String>,
) -> Result<(SystemSession, SessionHandle), Error> {
    let backend = AurBackend::from_config(config);
    let materializer = DotfilesInstaller::from_config(config)?;
    InstallationSession::new(
        platform,
        backend,
        materializer,
        packages,
        SessionSettings::from_config(config),
    )
}

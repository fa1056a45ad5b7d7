//! One package at a time through the AUR helper

use std::sync::Arc;
use std::time::Duration;

use lunaris_config::Config;
use lunaris_errors::{Error, InstallError};
use lunaris_events::EventEmitter;
use lunaris_platform::{process::execute_command, PlatformCommand, PlatformContext, ProcessSlot};
use lunaris_types::{HelperKind, InstallMode, LogKind};

use crate::classifier::OutputClassifier;
use crate::command::{deprioritized, limit_build_jobs, package_install};
use crate::helper::exit_message;
use crate::preflight::Preflight;
use crate::step::{run_supervised, StepContext, StepFailure, StepSettings};

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Installed,
    AlreadyInstalled,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub package_manager: String,
    pub build_jobs: usize,
    pub low_priority: bool,
    pub skip_installed: bool,
}

impl BatchSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            package_manager: config.process.package_manager.clone(),
            build_jobs: config.process.package_build_jobs,
            low_priority: config.process.low_priority,
            skip_installed: config.packages.skip_installed,
        }
    }
}

pub struct BatchInstaller {
    helper: HelperKind,
    preflight: Preflight,
    classifier: Arc<dyn OutputClassifier>,
    settings: BatchSettings,
}

impl BatchInstaller {
    pub fn new(
        helper: HelperKind,
        preflight: Preflight,
        classifier: Arc<dyn OutputClassifier>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            helper,
            preflight,
            classifier,
            settings,
        }
    }

    /// Whether the package database already has `package`.
    ///
    /// # Errors
    ///
    /// Returns `QueryFailed` if the package manager cannot be run.
    pub async fn is_installed(&self, ctx: &PlatformContext, package: &str) -> Result<bool, Error> {
        let mut cmd = PlatformCommand::new(&self.settings.package_manager);
        cmd.args(["-Q", package]);
        let output = execute_command(ctx, &cmd, QUERY_TIMEOUT)
            .await
            .map_err(|err| InstallError::QueryFailed {
                message: err.to_string(),
            })?;
        Ok(output.success())
    }

    #[must_use]
    pub fn command_for(&self, package: &str, mode: InstallMode, with_credential: bool) -> PlatformCommand {
        let mut cmd = package_install(self.helper.name(), package, mode, with_credential);
        limit_build_jobs(&mut cmd, self.settings.build_jobs);
        deprioritized(cmd, self.settings.low_priority)
    }

    /// Install a single package.
    ///
    /// A conflict stops the helper and is returned as
    /// [`StepFailure::Conflict`]; the caller decides what happens next.
    ///
    /// # Errors
    ///
    /// Returns the [`StepFailure`] matching how the helper ended.
    pub async fn install_package(
        &self,
        slot: &mut ProcessSlot,
        step: &StepSettings,
        ctx: &mut StepContext<'_>,
        package: &str,
        mode: InstallMode,
    ) -> Result<PackageStatus, StepFailure> {
        let helper = self.helper.name();

        if self.settings.skip_installed && mode == InstallMode::Normal {
            match self.is_installed(ctx.platform, package).await {
                Ok(true) => {
                    ctx.note(
                        LogKind::Info,
                        helper,
                        format!("{package} is already installed, skipping"),
                    );
                    return Ok(PackageStatus::AlreadyInstalled);
                }
                Ok(false) => {}
                Err(err) => ctx.platform.emit_warning_with_context(
                    format!("could not check whether {package} is installed"),
                    err.to_string(),
                ),
            }
        }

        self.preflight.run(ctx.platform).await;

        ctx.note(LogKind::Info, helper, format!("Installing {package}"));
        let cmd = self.command_for(package, mode, ctx.credential.is_some());
        run_supervised(slot, &cmd, step, ctx, &self.classifier, helper, true, true)
            .await?
            .into_result(package, Some(package), step.timeout, |code, tail| {
                InstallError::PackageFailed {
                    package: package.to_string(),
                    message: exit_message(code),
                    tail,
                }
                .into()
            })?;

        ctx.note(LogKind::Success, helper, format!("{package} installed"));
        Ok(PackageStatus::Installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::DefaultClassifier;
    use lunaris_platform::StaleProcessReaper;

    struct NoStale;

    impl StaleProcessReaper for NoStale {
        fn terminate_by_name(&self, _names: &[&str]) -> usize {
            0
        }
    }

    fn installer() -> BatchInstaller {
        let mut config = Config::default();
        config.process.low_priority = false;
        BatchInstaller::new(
            HelperKind::Paru,
            Preflight::new(Arc::new(NoStale), HelperKind::Paru, "pacman", Duration::ZERO),
            Arc::new(DefaultClassifier::default()),
            BatchSettings::from_config(&config),
        )
    }

    #[test]
    fn command_uses_package_job_limit() {
        let batch = installer();
        let cmd = batch.command_for("kitty", InstallMode::Normal, false);
        assert_eq!(cmd.program(), "paru");
        assert!(cmd
            .get_env_vars()
            .iter()
            .any(|(k, v)| k == "CARGO_BUILD_JOBS" && v == "1"));
    }
}

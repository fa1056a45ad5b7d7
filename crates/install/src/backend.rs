//! The package backend seam used by the session

use std::sync::Arc;

use async_trait::async_trait;
use lunaris_config::Config;
use lunaris_platform::{PathLocator, ProcessSlot, SystemReaper};
use lunaris_types::InstallMode;

use crate::batch::{BatchInstaller, BatchSettings, PackageStatus};
use crate::classifier::{DefaultClassifier, OutputClassifier};
use crate::helper::{HelperController, HelperProbe, HelperSettings, HelperStatus};
use crate::preflight::Preflight;
use crate::step::{StepContext, StepFailure, StepSettings};

/// Installs the AUR helper and then packages, one at a time.
///
/// Implementations run at most one subprocess at a time and must stop it
/// in [`PackageBackend::shutdown`].
#[async_trait]
pub trait PackageBackend: Send {
    fn helper_name(&self) -> &str;

    /// A detached check for the helper, usable while an install is running.
    fn helper_probe(&self) -> HelperProbe;

    async fn install_helper(
        &mut self,
        mode: InstallMode,
        ctx: &mut StepContext<'_>,
    ) -> Result<HelperStatus, StepFailure>;

    async fn install_package(
        &mut self,
        package: &str,
        mode: InstallMode,
        ctx: &mut StepContext<'_>,
    ) -> Result<PackageStatus, StepFailure>;

    /// Terminate the active subprocess, if any. Returns whether one was running.
    async fn shutdown(&mut self) -> bool;
}

/// Real backend: yay or paru on top of pacman
pub struct AurBackend {
    slot: ProcessSlot,
    helper: HelperController,
    batch: BatchInstaller,
    step: StepSettings,
}

impl AurBackend {
    #[must_use]
    pub fn new(helper: HelperController, batch: BatchInstaller, step: StepSettings) -> Self {
        Self {
            slot: ProcessSlot::new(),
            helper,
            batch,
            step,
        }
    }

    /// Backend wired to the system: `PATH` lookup, `sysinfo` reaper and the
    /// default output vocabulary.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let classifier: Arc<dyn OutputClassifier> = Arc::new(DefaultClassifier::default());
        let preflight = Preflight::from_config(config, Arc::new(SystemReaper));
        let helper = HelperController::new(
            config.general.helper,
            Arc::new(PathLocator),
            Arc::clone(&classifier),
            preflight.clone(),
            HelperSettings::from_config(config),
        );
        let batch = BatchInstaller::new(
            config.general.helper,
            preflight,
            classifier,
            BatchSettings::from_config(config),
        );
        Self::new(helper, batch, StepSettings::from_config(config))
    }
}

#[async_trait]
impl PackageBackend for AurBackend {
    fn helper_name(&self) -> &str {
        self.helper.kind().name()
    }

    fn helper_probe(&self) -> HelperProbe {
        self.helper.probe()
    }

    async fn install_helper(
        &mut self,
        mode: InstallMode,
        ctx: &mut StepContext<'_>,
    ) -> Result<HelperStatus, StepFailure> {
        self.helper.install(&mut self.slot, &self.step, ctx, mode).await
    }

    async fn install_package(
        &mut self,
        package: &str,
        mode: InstallMode,
        ctx: &mut StepContext<'_>,
    ) -> Result<PackageStatus, StepFailure> {
        self.batch
            .install_package(&mut self.slot, &self.step, ctx, package, mode)
            .await
    }

    async fn shutdown(&mut self) -> bool {
        self.slot.terminate().await
    }
}

//! AUR helper bootstrap
//!
//! The helper is built from its AUR recipe as the invoking user and only
//! the final `pacman -U` runs privileged.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lunaris_config::Config;
use lunaris_errors::{Error, HelperError};
use lunaris_platform::{
    process::execute_command, ExecutableLocator, PlatformCommand, PlatformContext, ProcessSlot,
};
use lunaris_types::{HelperKind, InstallMode, LogKind};

use crate::classifier::OutputClassifier;
use crate::command::{deprioritized, limit_build_jobs, privileged};
use crate::preflight::Preflight;
use crate::step::{run_supervised, StepContext, StepFailure, StepReport, StepSettings};

/// Timeout for short metadata queries such as `makepkg --packagelist`
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperStatus {
    AlreadyInstalled,
    Installed,
}

#[derive(Debug, Clone)]
pub struct HelperSettings {
    pub build_jobs: usize,
    pub low_priority: bool,
    pub package_manager: String,
}

impl HelperSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            build_jobs: config.process.helper_build_jobs,
            low_priority: config.process.low_priority,
            package_manager: config.process.package_manager.clone(),
        }
    }
}

/// Answers "is the helper on PATH yet" without borrowing the controller
#[derive(Clone)]
pub struct HelperProbe {
    name: String,
    locator: Arc<dyn ExecutableLocator>,
}

impl HelperProbe {
    pub fn new(name: impl Into<String>, locator: Arc<dyn ExecutableLocator>) -> Self {
        Self {
            name: name.into(),
            locator,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.locator.is_installed(&self.name)
    }
}

impl std::fmt::Debug for HelperProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperProbe").field("name", &self.name).finish()
    }
}

pub struct HelperController {
    kind: HelperKind,
    locator: Arc<dyn ExecutableLocator>,
    classifier: Arc<dyn OutputClassifier>,
    preflight: Preflight,
    settings: HelperSettings,
}

impl HelperController {
    pub fn new(
        kind: HelperKind,
        locator: Arc<dyn ExecutableLocator>,
        classifier: Arc<dyn OutputClassifier>,
        preflight: Preflight,
        settings: HelperSettings,
    ) -> Self {
        Self {
            kind,
            locator,
            classifier,
            preflight,
            settings,
        }
    }

    #[must_use]
    pub fn kind(&self) -> HelperKind {
        self.kind
    }

    #[must_use]
    pub fn probe(&self) -> HelperProbe {
        HelperProbe::new(self.kind.name(), Arc::clone(&self.locator))
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.locator.is_installed(self.kind.name())
    }

    /// Make sure the helper is installed, building it if necessary.
    ///
    /// In [`InstallMode::Replace`] the built package may overwrite files
    /// owned by a conflicting package.
    ///
    /// # Errors
    ///
    /// Returns a [`StepFailure`] describing the first sub-step that failed.
    /// A conflict while installing the built package is reported as
    /// [`StepFailure::Conflict`].
    pub async fn install(
        &self,
        slot: &mut ProcessSlot,
        step: &StepSettings,
        ctx: &mut StepContext<'_>,
        mode: InstallMode,
    ) -> Result<HelperStatus, StepFailure> {
        let name = self.kind.name();
        if self.is_installed() {
            ctx.note(LogKind::Info, name, format!("{name} is already installed"));
            return Ok(HelperStatus::AlreadyInstalled);
        }

        ctx.note(LogKind::Info, name, format!("Installing AUR helper {name}"));
        let workdir = tempfile::Builder::new()
            .prefix("lunaris-helper-")
            .tempdir()
            .map_err(|err| StepFailure::Failed(Error::from(err)))?;
        let recipe = workdir.path().join(name);

        self.clone_recipe(slot, step, ctx, &recipe).await?;
        self.install_build_dependencies(slot, step, ctx, &recipe)
            .await?;
        self.build(slot, step, ctx, &recipe).await?;

        let artifacts = self.artifacts(ctx.platform, &recipe).await?;
        if artifacts.is_empty() {
            return Err(StepFailure::Failed(
                HelperError::NoArtifacts {
                    helper: name.to_string(),
                }
                .into(),
            ));
        }
        self.install_artifacts(slot, step, ctx, &artifacts, mode)
            .await?;

        if !self.is_installed() {
            return Err(StepFailure::Failed(
                HelperError::MissingAfterInstall {
                    helper: name.to_string(),
                }
                .into(),
            ));
        }
        ctx.note(LogKind::Success, name, format!("{name} installed"));
        Ok(HelperStatus::Installed)
    }

    async fn clone_recipe(
        &self,
        slot: &mut ProcessSlot,
        step: &StepSettings,
        ctx: &mut StepContext<'_>,
        recipe: &Path,
    ) -> Result<(), StepFailure> {
        let cmd = self.clone_command(recipe);
        let helper = self.kind.name().to_string();
        run_supervised(slot, &cmd, step, ctx, &self.classifier, "git", false, false)
            .await?
            .into_result(&format!("clone {helper}"), None, step.timeout, |code, tail| {
                HelperError::CloneFailed {
                    helper,
                    message: exit_message(code),
                    tail,
                }
                .into()
            })
    }

    fn clone_command(&self, recipe: &Path) -> PlatformCommand {
        let mut cmd = PlatformCommand::new("git");
        cmd.args(["clone", "--depth=1", self.kind.recipe_url().as_str()])
            .arg(recipe.to_string_lossy())
            .env("LC_ALL", "C");
        deprioritized(cmd, self.settings.low_priority)
    }

    /// Run a privileged package-manager command once stale processes are gone.
    async fn run_package_manager(
        &self,
        slot: &mut ProcessSlot,
        cmd: &PlatformCommand,
        step: &StepSettings,
        ctx: &mut StepContext<'_>,
        abort_on_conflict: bool,
    ) -> Result<StepReport, StepFailure> {
        self.preflight.run(ctx.platform).await;
        let source = self.settings.package_manager.clone();
        run_supervised(slot, cmd, step, ctx, &self.classifier, &source, true, abort_on_conflict).await
    }

    async fn install_build_dependencies(
        &self,
        slot: &mut ProcessSlot,
        step: &StepSettings,
        ctx: &mut StepContext<'_>,
        recipe: &Path,
    ) -> Result<(), StepFailure> {
        let mut srcinfo = PlatformCommand::new("makepkg");
        srcinfo.arg("--printsrcinfo").current_dir(recipe);
        let output = execute_command(ctx.platform, &srcinfo, QUERY_TIMEOUT)
            .await
            .map_err(|err| StepFailure::Failed(err.into()))?;
        let declared = parse_srcinfo_dependencies(&output.stdout_lossy());
        if declared.is_empty() {
            return Ok(());
        }

        // `pacman -T` prints only the unsatisfied ones
        let mut deptest = PlatformCommand::new(&self.settings.package_manager);
        deptest.arg("-T").args(&declared);
        let missing: Vec<String> = execute_command(ctx.platform, &deptest, QUERY_TIMEOUT)
            .await
            .map_err(|err| StepFailure::Failed(err.into()))?
            .stdout_lossy()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let helper = self.kind.name().to_string();
        ctx.note(
            LogKind::Info,
            &helper,
            format!("Installing build dependencies: {}", missing.join(" ")),
        );
        let mut cmd = PlatformCommand::new(&self.settings.package_manager);
        cmd.args(["-S", "--needed", "--noconfirm", "--noprogressbar", "--asdeps"])
            .args(&missing)
            .env("LC_ALL", "C");
        let cmd = privileged(&cmd, ctx.credential.is_some());

        self.run_package_manager(slot, &cmd, step, ctx, false)
            .await?
            .into_result(
                &format!("{helper} build dependencies"),
                None,
                step.timeout,
                |code, tail| {
                    HelperError::BuildFailed {
                        helper,
                        message: format!("dependency install {}", exit_message(code)),
                        tail,
                    }
                    .into()
                },
            )
    }

    async fn build(
        &self,
        slot: &mut ProcessSlot,
        step: &StepSettings,
        ctx: &mut StepContext<'_>,
        recipe: &Path,
    ) -> Result<(), StepFailure> {
        let mut cmd = PlatformCommand::new("makepkg");
        cmd.args(["--noconfirm", "--noprogressbar", "--force"])
            .current_dir(recipe);
        limit_build_jobs(&mut cmd, self.settings.build_jobs);
        let cmd = deprioritized(cmd, self.settings.low_priority);

        let helper = self.kind.name().to_string();
        run_supervised(slot, &cmd, step, ctx, &self.classifier, "makepkg", false, false)
            .await?
            .into_result(&format!("build {helper}"), None, step.timeout, |code, tail| {
                HelperError::BuildFailed {
                    helper,
                    message: exit_message(code),
                    tail,
                }
                .into()
            })
    }

    async fn artifacts(
        &self,
        platform: &PlatformContext,
        recipe: &Path,
    ) -> Result<Vec<PathBuf>, StepFailure> {
        let mut cmd = PlatformCommand::new("makepkg");
        cmd.arg("--packagelist").current_dir(recipe);
        let output = execute_command(platform, &cmd, QUERY_TIMEOUT)
            .await
            .map_err(|err| StepFailure::Failed(err.into()))?;

        let mut found = Vec::new();
        for line in output.stdout_lossy().lines() {
            let path = PathBuf::from(line.trim());
            if !line.trim().is_empty() && tokio::fs::try_exists(&path).await.unwrap_or(false) {
                found.push(path);
            }
        }
        tracing::debug!(count = found.len(), "helper build artifacts");
        Ok(found)
    }

    async fn install_artifacts(
        &self,
        slot: &mut ProcessSlot,
        step: &StepSettings,
        ctx: &mut StepContext<'_>,
        artifacts: &[PathBuf],
        mode: InstallMode,
    ) -> Result<(), StepFailure> {
        let mut cmd = PlatformCommand::new(&self.settings.package_manager);
        cmd.args(["-U", "--noconfirm", "--needed", "--noprogressbar"]);
        if mode == InstallMode::Replace {
            cmd.args(["--overwrite", "*", "--ask", "4"]);
        }
        cmd.args(artifacts.iter().map(|p| p.to_string_lossy().into_owned()))
            .env("LC_ALL", "C");
        let cmd = privileged(&cmd, ctx.credential.is_some());

        let helper = self.kind.name().to_string();
        self.run_package_manager(slot, &cmd, step, ctx, true)
            .await?
            .into_result(&format!("install {helper}"), Some(&helper), step.timeout, |code, tail| {
                HelperError::InstallFailed {
                    helper: helper.clone(),
                    message: exit_message(code),
                    tail,
                }
                .into()
            })
    }
}

pub(crate) fn exit_message(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Runtime and build dependencies declared in `.SRCINFO`, without version
/// constraints and in first-seen order.
#[must_use]
pub fn parse_srcinfo_dependencies(srcinfo: &str) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    for line in srcinfo.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !(key.starts_with("depends") || key.starts_with("makedepends")) {
            continue;
        }
        let name = value
            .trim()
            .split(['<', '>', '='])
            .next()
            .unwrap_or_default()
            .trim();
        if !name.is_empty() && !deps.iter().any(|d| d == name) {
            deps.push(name.to_string());
        }
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::DefaultClassifier;
    use crate::message_log::MessageLog;
    use lunaris_platform::{CancelSignal, StaleProcessReaper};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed;

    impl ExecutableLocator for Fixed {
        fn locate(&self, name: &str) -> Option<PathBuf> {
            (name == "paru").then(|| PathBuf::from("/usr/bin/paru"))
        }
    }

    #[derive(Default)]
    struct CountingReaper(AtomicUsize);

    impl StaleProcessReaper for CountingReaper {
        fn terminate_by_name(&self, _names: &[&str]) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    fn controller(reaper: Arc<CountingReaper>) -> HelperController {
        let config = Config::default();
        HelperController::new(
            HelperKind::Yay,
            Arc::new(Fixed),
            Arc::new(DefaultClassifier::default()),
            Preflight::new(reaper, HelperKind::Yay, "pacman", Duration::ZERO),
            HelperSettings::from_config(&config),
        )
    }

    #[test]
    fn srcinfo_dependencies() {
        let srcinfo = "\
pkgbase = yay
\tpkgver = 12.4.2
\tmakedepends = go>=1.21
\tdepends = pacman>6.1
\tdepends = git
\tdepends_x86_64 = git
\toptdepends = sudo
\tcheckdepends = bats

pkgname = yay
";
        assert_eq!(parse_srcinfo_dependencies(srcinfo), ["go", "pacman", "git"]);
    }

    #[test]
    fn probe_uses_locator() {
        let probe = HelperProbe::new("paru", Arc::new(Fixed));
        assert!(probe.is_installed());
        assert!(!HelperProbe::new("yay", Arc::new(Fixed)).is_installed());
    }

    #[test]
    fn exit_messages() {
        assert_eq!(exit_message(Some(1)), "exited with status 1");
        assert_eq!(exit_message(None), "terminated by signal");
    }

    #[test]
    fn recipe_clone_runs_at_low_priority() {
        let helper = controller(Arc::default());
        let cmd = helper.clone_command(Path::new("/tmp/lunaris-helper/yay"));

        assert_eq!(cmd.program(), "ionice");
        let args: Vec<&str> = cmd.get_args().iter().map(String::as_str).collect();
        assert_eq!(args[..7], ["-c", "3", "nice", "-n", "19", "git", "clone"]);
        assert_eq!(args.last(), Some(&"/tmp/lunaris-helper/yay"));
    }

    #[tokio::test]
    async fn package_manager_steps_clear_stale_processes_first() {
        let reaper = Arc::new(CountingReaper::default());
        let helper = controller(Arc::clone(&reaper));
        let platform = PlatformContext::default();
        let mut log = MessageLog::new(10);
        let mut ctx = StepContext {
            platform: &platform,
            log: &mut log,
            cancel: CancelSignal::never(),
            credential: None,
        };
        let mut slot = ProcessSlot::new();
        let mut cmd = PlatformCommand::new("sh");
        cmd.args(["-c", "echo 'installing yay'"]);

        let report = helper
            .run_package_manager(&mut slot, &cmd, &StepSettings::default(), &mut ctx, true)
            .await
            .unwrap();

        assert!(report.outcome.is_success());
        assert_eq!(reaper.0.load(Ordering::SeqCst), 1);
        assert_eq!(log.filter_by_source("pacman").len(), 1);
    }
}

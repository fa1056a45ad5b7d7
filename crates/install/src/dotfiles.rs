//! Backup and configuration repository materialization

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lunaris_config::{Config, DotfilesConfig};
use lunaris_errors::{DotfilesError, Error};
use lunaris_events::EventEmitter;
use lunaris_platform::{fs, PlatformCommand, ProcessSlot};
use lunaris_types::LogKind;

use crate::classifier::{DefaultClassifier, OutputClassifier};
use crate::command::deprioritized;
use crate::helper::exit_message;
use crate::step::{run_supervised, StepContext, StepFailure, StepSettings};

const SOURCE: &str = "dotfiles";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub directory: PathBuf,
    /// Backed up source names
    pub saved: Vec<String>,
    pub files: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Copied { files: u64 },
    /// Not present in the checkout
    Absent,
}

/// Fetches the configuration repository into a directory.
#[async_trait]
pub trait RepositoryCloner: Send {
    async fn clone_repository(
        &mut self,
        url: &str,
        dest: &Path,
        ctx: &mut StepContext<'_>,
    ) -> Result<(), StepFailure>;

    /// Stop a running clone. Returns whether one was running.
    async fn shutdown(&mut self) -> bool {
        false
    }
}

/// Shallow, single branch `git clone`
pub struct GitCloner {
    slot: ProcessSlot,
    step: StepSettings,
    classifier: Arc<dyn OutputClassifier>,
    low_priority: bool,
}

impl GitCloner {
    pub fn new(step: StepSettings, classifier: Arc<dyn OutputClassifier>, low_priority: bool) -> Self {
        Self {
            slot: ProcessSlot::new(),
            step,
            classifier,
            low_priority,
        }
    }
}

#[async_trait]
impl RepositoryCloner for GitCloner {
    async fn clone_repository(
        &mut self,
        url: &str,
        dest: &Path,
        ctx: &mut StepContext<'_>,
    ) -> Result<(), StepFailure> {
        let mut cmd = PlatformCommand::new("git");
        cmd.args(["clone", "--depth=1", "--single-branch", url])
            .arg(dest.to_string_lossy())
            .env("LC_ALL", "C");
        let cmd = deprioritized(cmd, self.low_priority);

        run_supervised(&mut self.slot, &cmd, &self.step, ctx, &self.classifier, "git", false, false)
            .await?
            .into_result("clone configuration", None, self.step.timeout, |code, tail| {
                DotfilesError::CloneFailed {
                    repository: url.to_string(),
                    message: exit_message(code),
                    tail,
                }
                .into()
            })
    }

    async fn shutdown(&mut self) -> bool {
        self.slot.terminate().await
    }
}

/// Backs up and writes the user's configuration.
///
/// The session drives the individual calls so it can report progress per
/// directory and stop between them.
#[async_trait]
pub trait ConfigMaterializer: Send {
    /// Directory names copied from the checkout, in order.
    fn config_dirs(&self) -> Vec<String>;

    fn backup_dir(&self) -> PathBuf;

    async fn backup(&mut self, ctx: &mut StepContext<'_>) -> Result<BackupReport, StepFailure>;

    /// Replace any previous checkout with a fresh clone and make sure it has content.
    async fn fetch(&mut self, ctx: &mut StepContext<'_>) -> Result<(), StepFailure>;

    async fn copy_dir(
        &mut self,
        name: &str,
        ctx: &mut StepContext<'_>,
    ) -> Result<CopyStatus, StepFailure>;

    /// Post-copy fixups: script permissions and the post-install hook.
    async fn finalize(&mut self, ctx: &mut StepContext<'_>) -> Result<(), StepFailure>;

    async fn shutdown(&mut self) -> bool;
}

pub struct DotfilesInstaller<C = GitCloner> {
    config: DotfilesConfig,
    home: PathBuf,
    cloner: C,
    slot: ProcessSlot,
    step: StepSettings,
    classifier: Arc<dyn OutputClassifier>,
}

impl DotfilesInstaller<GitCloner> {
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let step = StepSettings::from_config(config);
        let classifier: Arc<dyn OutputClassifier> = Arc::new(DefaultClassifier::default());
        let cloner = GitCloner::new(step.clone(), Arc::clone(&classifier), config.process.low_priority);
        Ok(Self::new(
            config.dotfiles.clone(),
            config.home_dir()?,
            cloner,
            step,
            classifier,
        ))
    }
}

impl<C: RepositoryCloner> DotfilesInstaller<C> {
    pub fn new(
        config: DotfilesConfig,
        home: PathBuf,
        cloner: C,
        step: StepSettings,
        classifier: Arc<dyn OutputClassifier>,
    ) -> Self {
        Self {
            config,
            home,
            cloner,
            slot: ProcessSlot::new(),
            step,
            classifier,
        }
    }

    #[must_use]
    pub fn checkout_dir(&self) -> PathBuf {
        self.home.join(&self.config.checkout_dir)
    }

    async fn run_post_install_script(&mut self, ctx: &mut StepContext<'_>) -> Result<(), StepFailure> {
        let Some(script) = self.config.post_install_script.clone() else {
            return Ok(());
        };
        let path = self.home.join(&script);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            ctx.platform
                .emit_debug(format!("{script} not present, no post-install hook"));
            return Ok(());
        }

        ctx.note(LogKind::Info, SOURCE, format!("Running {script}"));
        let mut cmd = PlatformCommand::new("sh");
        cmd.arg(path.to_string_lossy()).arg("-r").current_dir(&self.home);

        let result = run_supervised(&mut self.slot, &cmd, &self.step, ctx, &self.classifier, SOURCE, false, false)
            .await
            .and_then(|report| {
                report.into_result(&script, None, self.step.timeout, |code, _| {
                    Error::internal(format!("{script} {}", exit_message(code)))
                })
            });
        match result {
            Ok(()) => Ok(()),
            Err(StepFailure::Cancelled) => Err(StepFailure::Cancelled),
            Err(failure) => {
                let message = failure.into_error().to_string();
                ctx.note(
                    LogKind::Warning,
                    SOURCE,
                    format!("warning: post-install script failed: {message}"),
                );
                Ok(())
            }
        }
    }
}

fn platform_failure(err: lunaris_errors::PlatformError) -> StepFailure {
    StepFailure::Failed(err.into())
}

#[async_trait]
impl<C: RepositoryCloner> ConfigMaterializer for DotfilesInstaller<C> {
    fn config_dirs(&self) -> Vec<String> {
        self.config.config_dirs.clone()
    }

    fn backup_dir(&self) -> PathBuf {
        self.home.join(&self.config.backup_dir)
    }

    async fn backup(&mut self, ctx: &mut StepContext<'_>) -> Result<BackupReport, StepFailure> {
        let directory = self.backup_dir();
        let mut report = BackupReport {
            directory: directory.clone(),
            ..BackupReport::default()
        };

        for name in &self.config.backup_sources {
            if ctx.cancel.is_cancelled() {
                return Err(StepFailure::Cancelled);
            }
            let source = self.home.join(name);
            if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
                ctx.note(LogKind::Info, SOURCE, format!("{name} not found, nothing to back up"));
                continue;
            }

            let files = fs::copy_dir_all(&source, &directory.join(name))
                .await
                .map_err(|err| {
                    StepFailure::Failed(
                        DotfilesError::BackupFailed {
                            path: source.display().to_string(),
                            message: err.to_string(),
                        }
                        .into(),
                    )
                })?;
            report.files += files;
            report.saved.push(name.clone());
            ctx.note(LogKind::Info, SOURCE, format!("Backed up {name} ({files} files)"));
        }

        ctx.note(
            LogKind::Success,
            SOURCE,
            format!("Backup saved to {}", directory.display()),
        );
        Ok(report)
    }

    async fn fetch(&mut self, ctx: &mut StepContext<'_>) -> Result<(), StepFailure> {
        let checkout = self.checkout_dir();
        fs::remove_if_exists(&checkout)
            .await
            .map_err(platform_failure)?;

        ctx.note(
            LogKind::Info,
            SOURCE,
            format!("Cloning {}", self.config.repository),
        );
        let repository = self.config.repository.clone();
        self.cloner
            .clone_repository(&repository, &checkout, ctx)
            .await?;

        if !fs::has_content(&checkout).await {
            return Err(StepFailure::Failed(
                DotfilesError::EmptyCheckout {
                    path: checkout.display().to_string(),
                }
                .into(),
            ));
        }
        ctx.note(LogKind::Success, SOURCE, "Configuration repository cloned");
        Ok(())
    }

    async fn copy_dir(
        &mut self,
        name: &str,
        ctx: &mut StepContext<'_>,
    ) -> Result<CopyStatus, StepFailure> {
        if ctx.cancel.is_cancelled() {
            return Err(StepFailure::Cancelled);
        }
        let from = self.checkout_dir().join(name);
        if !tokio::fs::try_exists(&from).await.unwrap_or(false) {
            ctx.note(LogKind::Info, SOURCE, format!("{name} not in repository, skipping"));
            return Ok(CopyStatus::Absent);
        }

        let to = self.home.join(name);
        let files = fs::copy_dir_all(&from, &to).await.map_err(|err| {
            StepFailure::Failed(
                DotfilesError::CopyFailed {
                    from: from.display().to_string(),
                    to: to.display().to_string(),
                    message: err.to_string(),
                }
                .into(),
            )
        })?;
        ctx.note(LogKind::Info, SOURCE, format!("Copied {name} ({files} files)"));
        Ok(CopyStatus::Copied { files })
    }

    async fn finalize(&mut self, ctx: &mut StepContext<'_>) -> Result<(), StepFailure> {
        for dir in &self.config.script_dirs {
            let path = self.home.join(dir);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            let changed = fs::make_files_executable(&path).await.map_err(|err| {
                StepFailure::Failed(
                    DotfilesError::PrepareFailed {
                        path: path.display().to_string(),
                        message: err.to_string(),
                    }
                    .into(),
                )
            })?;
            tracing::debug!(dir, changed, "marked scripts executable");
        }

        self.run_post_install_script(ctx).await
    }

    async fn shutdown(&mut self) -> bool {
        let hook = self.slot.terminate().await;
        let clone = self.cloner.shutdown().await;
        hook || clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_log::MessageLog;
    use lunaris_platform::{CancelSignal, PlatformContext};
    use tempfile::TempDir;

    struct EmptyCloner;

    #[async_trait]
    impl RepositoryCloner for EmptyCloner {
        async fn clone_repository(
            &mut self,
            _url: &str,
            dest: &Path,
            _ctx: &mut StepContext<'_>,
        ) -> Result<(), StepFailure> {
            tokio::fs::create_dir_all(dest.join(".git")).await.unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_checkout_is_fatal() {
        let home = TempDir::new().unwrap();
        let mut installer = DotfilesInstaller::new(
            DotfilesConfig::default(),
            home.path().to_path_buf(),
            EmptyCloner,
            StepSettings::default(),
            Arc::new(DefaultClassifier::default()),
        );
        let platform = PlatformContext::default();
        let mut log = MessageLog::new(10);
        let mut ctx = StepContext {
            platform: &platform,
            log: &mut log,
            cancel: CancelSignal::never(),
            credential: None,
        };

        let failure = installer.fetch(&mut ctx).await.unwrap_err();
        match failure {
            StepFailure::Failed(Error::Dotfiles(DotfilesError::EmptyCheckout { .. })) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}

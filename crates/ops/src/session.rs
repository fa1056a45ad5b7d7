//! The installation session state machine
//!
//! A session owns one backend and one materializer and walks them through
//! the phases in order. It runs as a task; the presentation layer talks to
//! it through a [`SessionHandle`] and listens to the event stream.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use lunaris_config::Config;
use lunaris_errors::{Error, HelperError, InstallError};
use lunaris_events::{EventEmitter, FailureContext, SessionEvent};
use lunaris_install::{
    ConfigMaterializer, CopyStatus, HelperStatus, MessageLog, PackageBackend, PackageStatus,
    StepContext, StepFailure,
};
use lunaris_platform::{cancel_pair, CancelSignal, PlatformContext};
use lunaris_types::{Conflict, ConflictChoice, Credential, InstallMode, LogKind, Phase};
use tokio::sync::{mpsc, oneshot};

use crate::command::SessionCommand;
use crate::handle::SessionHandle;
use crate::progress::{ProgressTracker, StepPlan};
use crate::report::{PackageFailure, SessionReport};

const SOURCE: &str = "session";

/// Build a [`StepContext`] from disjoint session fields, leaving the
/// backend and materializer free to borrow.
macro_rules! step_context {
    ($session:expr) => {
        StepContext {
            platform: &$session.platform,
            log: &mut $session.log,
            cancel: $session.cancel.clone(),
            credential: $session.credential.as_ref(),
        }
    };
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub log_capacity: usize,
    pub tail_lines: usize,
    pub count_confirmation_steps: bool,
    pub helper_poll_interval: Duration,
    /// Time the helper step gets to finish after the helper shows up on `PATH`
    pub helper_grace: Duration,
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_capacity: config.general.message_log_capacity,
            tail_lines: config.general.tail_lines,
            count_confirmation_steps: config.dotfiles.count_confirmation_steps,
            helper_poll_interval: config.helper_poll_interval(),
            helper_grace: config.drain_grace() * 15,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why the session stopped early
enum Halt {
    Cancelled(Option<oneshot::Sender<()>>),
    Failed(Error),
}

impl From<StepFailure> for Halt {
    fn from(failure: StepFailure) -> Self {
        match failure {
            StepFailure::Cancelled => Self::Cancelled(None),
            other => Self::Failed(other.into_error()),
        }
    }
}

enum Resolution {
    Skip,
    Replace,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Dotfiles,
    Backup,
}

pub struct InstallationSession<B, M> {
    id: String,
    platform: PlatformContext,
    backend: B,
    materializer: M,
    settings: SessionSettings,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    cancel: CancelSignal,
    log: MessageLog,
    phase: Phase,
    queue: VecDeque<String>,
    progress: ProgressTracker,
    credential: Option<Credential>,
    replace_all: bool,
    pending_conflict: Option<Conflict>,
    installed: Vec<String>,
    already_installed: Vec<String>,
    skipped: Vec<String>,
    failed: Vec<PackageFailure>,
    backup_dir: Option<String>,
    dotfiles_installed: bool,
}

impl<B, M> InstallationSession<B, M>
where
    B: PackageBackend,
    M: ConfigMaterializer,
{
    /// Create a session for `packages` and the handle that drives it.
    ///
    /// The step total is fixed here from the queue and the materializer's
    /// directory list.
    ///
    /// # Errors
    ///
    /// Returns `NoPackagesSpecified` for an empty queue.
    pub fn new(
        platform: PlatformContext,
        backend: B,
        materializer: M,
        packages: Vec<String>,
        settings: SessionSettings,
    ) -> Result<(Self, SessionHandle), Error> {
        if packages.is_empty() {
            return Err(InstallError::NoPackagesSpecified.into());
        }

        let id = uuid::Uuid::new_v4().to_string();
        let platform = platform.with_correlation_id(id.clone());
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (trigger, cancel) = cancel_pair();

        let plan = StepPlan {
            packages: packages.len(),
            config_dirs: materializer.config_dirs().len(),
            count_confirmations: settings.count_confirmation_steps,
        };

        let session = Self {
            id: id.clone(),
            platform,
            backend,
            materializer,
            log: MessageLog::new(settings.log_capacity),
            settings,
            commands,
            cancel,
            phase: Phase::Preparation,
            queue: packages.into(),
            progress: ProgressTracker::new(plan),
            credential: None,
            replace_all: false,
            pending_conflict: None,
            installed: Vec::new(),
            already_installed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            backup_dir: None,
            dotfiles_installed: false,
        };
        Ok((session, SessionHandle::new(command_tx, trigger, id)))
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    #[must_use]
    pub fn pending_conflict(&self) -> Option<&Conflict> {
        self.pending_conflict.as_ref()
    }

    #[must_use]
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Drive the session to a terminal phase.
    pub async fn run(mut self) -> SessionReport {
        let started = Instant::now();
        tracing::info!(session = %self.id, packages = self.queue.len(), "session started");
        self.progress
            .report(&self.platform, Phase::Preparation.label(), Phase::Preparation);

        let mut error = None;
        match self.drive().await {
            Ok(()) => {
                self.transition(Phase::Complete);
                self.platform.emit_session(SessionEvent::SessionComplete {
                    progress: self.progress.progress(),
                    total: self.progress.total(),
                });
                tracing::info!(session = %self.id, "session complete");
            }
            Err(Halt::Cancelled(ack)) => self.finish_cancelled(ack).await,
            Err(Halt::Failed(err)) => {
                self.shutdown_children().await;
                let tail = if err.output_tail().is_empty() {
                    self.log.tail_text(self.settings.tail_lines)
                } else {
                    err.output_tail().to_vec()
                };
                self.transition(Phase::Failed);
                self.platform.emit_session(SessionEvent::SessionFailed {
                    failure: FailureContext::from_error(&err),
                    tail,
                });
                tracing::error!(session = %self.id, "session failed: {err}");
                error = Some(err.to_string());
            }
        }

        SessionReport {
            session_id: self.id.clone(),
            phase: self.phase,
            progress: self.progress.progress(),
            total: self.progress.total(),
            installed: std::mem::take(&mut self.installed),
            already_installed: std::mem::take(&mut self.already_installed),
            skipped: std::mem::take(&mut self.skipped),
            failed: std::mem::take(&mut self.failed),
            backup_dir: self.backup_dir.take(),
            dotfiles_installed: self.dotfiles_installed,
            error,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn drive(&mut self) -> Result<(), Halt> {
        self.transition(Phase::HelperInstall);
        self.helper_step().await?;

        self.transition(Phase::PackageInstall);
        self.package_loop().await?;

        self.transition(Phase::DotfilesConfirmation);
        if !self.await_confirmation(Confirmation::Dotfiles).await? {
            self.note(LogKind::Info, "Configuration files left untouched");
            return Ok(());
        }

        self.transition(Phase::BackupConfirmation);
        if self.await_confirmation(Confirmation::Backup).await? {
            self.transition(Phase::Backup);
            let mut ctx = step_context!(self);
            let report = self.materializer.backup(&mut ctx).await?;
            self.backup_dir = Some(report.directory.display().to_string());
        }

        self.transition(Phase::PostInstall);
        self.post_install().await?;
        self.dotfiles_installed = true;
        Ok(())
    }

    fn transition(&mut self, next: Phase) {
        if self.phase == next {
            return;
        }
        if !self.phase.can_transition_to(next) {
            // every call site follows the table; reaching this is a bug
            tracing::error!(from = %self.phase, to = %next, "illegal phase transition");
            self.platform
                .emit_error(format!("illegal phase transition {} -> {next}", self.phase));
            return;
        }
        let from = std::mem::replace(&mut self.phase, next);
        tracing::debug!(%from, to = %next, "phase changed");
        self.platform
            .emit_session(SessionEvent::PhaseChanged { from, to: next });
    }

    fn note(&mut self, kind: LogKind, text: impl Into<String>) {
        let text = text.into();
        self.log.push(kind, SOURCE, text.clone());
        self.platform.emit_log_line(kind, SOURCE, text);
    }

    fn advance(&mut self, step: impl Into<String>) {
        self.progress.advance(&self.platform, step, self.phase);
    }

    /// Wait for the next command. Cancellation and a dropped handle end
    /// the wait with [`Halt::Cancelled`].
    async fn next_command(&mut self) -> Result<SessionCommand, Halt> {
        match self.commands.recv().await {
            None => {
                tracing::info!(session = %self.id, "all handles dropped, cancelling");
                Err(Halt::Cancelled(None))
            }
            Some(SessionCommand::Cancel { ack }) => Err(Halt::Cancelled(Some(ack))),
            Some(command) => Ok(command),
        }
    }

    /// Handle commands that arrived while a step was running.
    fn drain_commands(&mut self) -> Result<(), Halt> {
        loop {
            match self.commands.try_recv() {
                Ok(SessionCommand::Cancel { ack }) => return Err(Halt::Cancelled(Some(ack))),
                Ok(command) => self.ignore(&command),
                Err(mpsc::error::TryRecvError::Empty) => return Ok(()),
                Err(mpsc::error::TryRecvError::Disconnected) => return Err(Halt::Cancelled(None)),
            }
        }
    }

    fn ignore(&self, command: &SessionCommand) {
        tracing::warn!(phase = %self.phase, command = command.name(), "ignoring unexpected command");
        self.platform.emit_warning_with_context(
            format!("ignored {} while {}", command.name(), self.phase.label()),
            self.phase.to_string(),
        );
    }

    async fn request_credential(&mut self, step: &str) -> Result<(), Halt> {
        let rejected = self.credential.is_some();
        self.platform.emit_session(SessionEvent::CredentialRequested {
            step: step.to_string(),
            rejected,
        });
        loop {
            match self.next_command().await? {
                SessionCommand::SubmitCredential(credential) => {
                    self.credential = Some(credential);
                    return Ok(());
                }
                other => self.ignore(&other),
            }
        }
    }

    async fn resolve_conflict(&mut self, conflict: Conflict) -> Result<Resolution, Halt> {
        if self.replace_all {
            self.note(
                LogKind::Warning,
                format!("Conflict on {}, replacing", conflict.package),
            );
            return Ok(Resolution::Replace);
        }

        let resume = self.phase;
        self.platform.emit_session(SessionEvent::ConflictRaised {
            package: conflict.package.clone(),
            hint: conflict.hint.clone(),
            raw_message: conflict.raw_message.clone(),
        });
        self.pending_conflict = Some(conflict);
        self.transition(Phase::ConflictPending);

        let choice = loop {
            match self.next_command().await? {
                SessionCommand::ResolveConflict(choice) => break choice,
                other => self.ignore(&other),
            }
        };
        self.pending_conflict = None;
        tracing::info!(%choice, "conflict resolved");

        let resolution = match choice {
            ConflictChoice::Cancel => return Err(Halt::Cancelled(None)),
            ConflictChoice::Skip => Resolution::Skip,
            ConflictChoice::Replace => Resolution::Replace,
            ConflictChoice::ReplaceAll => {
                self.replace_all = true;
                Resolution::Replace
            }
        };
        self.transition(resume);
        Ok(resolution)
    }

    async fn await_confirmation(&mut self, which: Confirmation) -> Result<bool, Halt> {
        let event = match which {
            Confirmation::Dotfiles => SessionEvent::DotfilesConfirmationRequested,
            Confirmation::Backup => SessionEvent::BackupConfirmationRequested {
                backup_dir: self.materializer.backup_dir().display().to_string(),
            },
        };
        self.platform.emit_session(event);

        let answer = loop {
            match (which, self.next_command().await?) {
                (Confirmation::Dotfiles, SessionCommand::ConfirmDotfiles(answer))
                | (Confirmation::Backup, SessionCommand::ConfirmBackup(answer)) => break answer,
                (_, other) => self.ignore(&other),
            }
        };
        if self.settings.count_confirmation_steps {
            self.advance(self.phase.label());
        }
        Ok(answer)
    }

    async fn helper_step(&mut self) -> Result<(), Halt> {
        let helper = self.backend.helper_name().to_string();
        let mut mode = InstallMode::Normal;
        let mut auth_retried = false;

        loop {
            match self.helper_attempt(mode).await {
                Ok(status) => {
                    if !self.backend.helper_probe().is_installed() {
                        return Err(Halt::Failed(
                            HelperError::MissingAfterInstall { helper }.into(),
                        ));
                    }
                    tracing::debug!(?status, "helper ready");
                    self.advance(format!("{helper} ready"));
                    return Ok(());
                }
                Err(StepFailure::AuthRequired { .. }) if !auth_retried => {
                    auth_retried = true;
                    self.request_credential(&helper).await?;
                }
                Err(StepFailure::Conflict(conflict)) if mode == InstallMode::Normal => {
                    match self.resolve_conflict(conflict).await? {
                        Resolution::Replace => mode = InstallMode::Replace,
                        Resolution::Skip => {
                            if self.backend.helper_probe().is_installed() {
                                self.advance(format!("{helper} ready"));
                                return Ok(());
                            }
                            return Err(Halt::Failed(
                                HelperError::MissingAfterInstall { helper }.into(),
                            ));
                        }
                    }
                }
                Err(failure) => return Err(failure.into()),
            }
        }
    }

    /// One helper install attempt, with the `PATH` poll as a safety net for
    /// a step that never reports back.
    async fn helper_attempt(&mut self, mode: InstallMode) -> Result<HelperStatus, StepFailure> {
        let probe = self.backend.helper_probe();
        let poll_interval = self.settings.helper_poll_interval;
        let grace = self.settings.helper_grace;
        let present_at_start = probe.is_installed();

        let finished = {
            let mut ctx = step_context!(self);
            let install = self.backend.install_helper(mode, &mut ctx);
            tokio::pin!(install);

            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut give_up_at: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    result = &mut install => break Some(result),
                    _ = ticker.tick(), if give_up_at.is_none() && !present_at_start => {
                        if probe.is_installed() {
                            tracing::info!(helper = probe.name(), "helper detected on PATH");
                            self.platform.emit_debug(format!("{} found on PATH", probe.name()));
                            give_up_at = Some(tokio::time::Instant::now() + grace);
                        }
                    }
                    () = tokio::time::sleep_until(give_up_at.unwrap_or_else(tokio::time::Instant::now)),
                        if give_up_at.is_some() => break None,
                }
            }
        };

        match finished {
            Some(result) => result,
            None => {
                self.backend.shutdown().await;
                self.note(
                    LogKind::Warning,
                    format!(
                        "warning: {} is installed but its install step did not finish; continuing",
                        probe.name()
                    ),
                );
                Ok(HelperStatus::Installed)
            }
        }
    }

    async fn package_loop(&mut self) -> Result<(), Halt> {
        while let Some(package) = self.queue.front().cloned() {
            self.drain_commands()?;

            let mut mode = InstallMode::Normal;
            let mut auth_retried = false;
            loop {
                let result = {
                    let mut ctx = step_context!(self);
                    self.backend.install_package(&package, mode, &mut ctx).await
                };

                match result {
                    Ok(status) => {
                        self.queue.pop_front();
                        match status {
                            PackageStatus::Installed => self.installed.push(package.clone()),
                            PackageStatus::AlreadyInstalled => {
                                self.already_installed.push(package.clone());
                            }
                        }
                        self.advance(format!("Installed {package}"));
                        break;
                    }
                    Err(StepFailure::AuthRequired { .. }) if !auth_retried => {
                        auth_retried = true;
                        self.request_credential(&package).await?;
                    }
                    Err(StepFailure::Conflict(conflict)) if mode == InstallMode::Normal => {
                        match self.resolve_conflict(conflict).await? {
                            Resolution::Replace => mode = InstallMode::Replace,
                            Resolution::Skip => {
                                self.queue.pop_front();
                                self.note(LogKind::Warning, format!("Skipped {package}"));
                                self.skipped.push(package.clone());
                                self.advance(format!("Skipped {package}"));
                                break;
                            }
                        }
                    }
                    Err(StepFailure::Conflict(conflict)) => {
                        let err = InstallError::PackageFailed {
                            package: package.clone(),
                            message: format!(
                                "conflict persisted after replacement: {}",
                                conflict.raw_message
                            ),
                            tail: self.log.tail_text(self.settings.tail_lines),
                        };
                        self.package_failed(&package, err.into())?;
                        break;
                    }
                    Err(StepFailure::Failed(err)) => {
                        self.package_failed(&package, err)?;
                        break;
                    }
                    Err(failure) => return Err(failure.into()),
                }
            }
        }
        Ok(())
    }

    /// Record a failed package. Fatal only for the last queued package when
    /// nothing has succeeded.
    fn package_failed(&mut self, package: &str, err: Error) -> Result<(), Halt> {
        self.queue.pop_front();
        let nothing_succeeded = self.installed.is_empty() && self.already_installed.is_empty();
        if self.queue.is_empty() && nothing_succeeded {
            let tail = if err.output_tail().is_empty() {
                self.log.tail_text(self.settings.tail_lines)
            } else {
                err.output_tail().to_vec()
            };
            return Err(Halt::Failed(
                InstallError::BatchFailed {
                    message: err.to_string(),
                    tail,
                }
                .into(),
            ));
        }

        self.note(LogKind::Error, format!("Failed to install {package}: {err}"));
        self.failed.push(PackageFailure {
            package: package.to_string(),
            message: err.to_string(),
        });
        self.advance(format!("Failed {package}"));
        Ok(())
    }

    async fn post_install(&mut self) -> Result<(), Halt> {
        {
            let mut ctx = step_context!(self);
            self.materializer.fetch(&mut ctx).await?;
        }
        self.advance("Configuration repository cloned");

        for dir in self.materializer.config_dirs() {
            self.drain_commands()?;
            let status = {
                let mut ctx = step_context!(self);
                self.materializer.copy_dir(&dir, &mut ctx).await?
            };
            let label = match status {
                CopyStatus::Copied { .. } => format!("Copied {dir}"),
                CopyStatus::Absent => format!("Skipped {dir}"),
            };
            self.advance(label);
        }

        let mut ctx = step_context!(self);
        self.materializer.finalize(&mut ctx).await?;
        Ok(())
    }

    async fn shutdown_children(&mut self) {
        let backend = self.backend.shutdown().await;
        let materializer = self.materializer.shutdown().await;
        if backend || materializer {
            tracing::info!(session = %self.id, "terminated running subprocess");
        }
    }

    async fn finish_cancelled(&mut self, ack: Option<oneshot::Sender<()>>) {
        self.shutdown_children().await;
        self.pending_conflict = None;
        self.transition(Phase::Cancelled);
        self.platform.emit_session(SessionEvent::SessionCancelled);
        tracing::info!(session = %self.id, "session cancelled");

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        // cancel() calls that raced with the end of the session
        while let Ok(command) = self.commands.try_recv() {
            if let SessionCommand::Cancel { ack } = command {
                let _ = ack.send(());
            }
        }
    }
}

//! Session scenarios against scripted backends

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lunaris_errors::{DotfilesError, InstallError};
use lunaris_events::{AppEvent, EventReceiver, SessionEvent};
use lunaris_install::{
    BackupReport, ConfigMaterializer, CopyStatus, HelperProbe, HelperStatus, PackageBackend,
    PackageStatus, StepContext, StepFailure,
};
use lunaris_ops::{InstallationSession, SessionHandle, SessionReport, SessionSettings};
use lunaris_platform::{ExecutableLocator, PlatformContext};
use lunaris_types::{Conflict, ConflictChoice, Credential, InstallMode, Phase};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
enum Step {
    Ok,
    Already,
    Conflict,
    Auth,
    Fail,
    WaitForCancel,
}

struct FlagLocator(Arc<AtomicBool>);

impl ExecutableLocator for FlagLocator {
    fn locate(&self, _name: &str) -> Option<PathBuf> {
        self.0
            .load(Ordering::SeqCst)
            .then(|| PathBuf::from("/usr/bin/yay"))
    }
}

#[derive(Default)]
struct FakeBackend {
    helper_present: Arc<AtomicBool>,
    helper_hangs: bool,
    script: HashMap<String, VecDeque<Step>>,
    calls: Arc<Mutex<Vec<(String, InstallMode, bool)>>>,
    shutdowns: Arc<AtomicUsize>,
}

impl FakeBackend {
    fn with_helper() -> Self {
        let backend = Self::default();
        backend.helper_present.store(true, Ordering::SeqCst);
        backend
    }

    fn script(mut self, package: &str, steps: &[Step]) -> Self {
        self.script
            .insert(package.to_string(), steps.iter().copied().collect());
        self
    }
}

#[async_trait]
impl PackageBackend for FakeBackend {
    fn helper_name(&self) -> &str {
        "yay"
    }

    fn helper_probe(&self) -> HelperProbe {
        HelperProbe::new("yay", Arc::new(FlagLocator(Arc::clone(&self.helper_present))))
    }

    async fn install_helper(
        &mut self,
        _mode: InstallMode,
        _ctx: &mut StepContext<'_>,
    ) -> Result<HelperStatus, StepFailure> {
        if self.helper_present.load(Ordering::SeqCst) {
            return Ok(HelperStatus::AlreadyInstalled);
        }
        self.helper_present.store(true, Ordering::SeqCst);
        if self.helper_hangs {
            std::future::pending::<()>().await;
        }
        Ok(HelperStatus::Installed)
    }

    async fn install_package(
        &mut self,
        package: &str,
        mode: InstallMode,
        ctx: &mut StepContext<'_>,
    ) -> Result<PackageStatus, StepFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((package.to_string(), mode, ctx.credential.is_some()));
        let step = self
            .script
            .get_mut(package)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Ok);
        match step {
            Step::Ok => Ok(PackageStatus::Installed),
            Step::Already => Ok(PackageStatus::AlreadyInstalled),
            Step::Conflict => Err(StepFailure::Conflict(Conflict {
                package: package.to_string(),
                hint: Some("old-".to_string() + package),
                raw_message: format!(":: {package} and old-{package} are in conflict"),
            })),
            Step::Auth => Err(StepFailure::AuthRequired {
                step: package.to_string(),
                tail: vec!["sudo: a password is required".to_string()],
            }),
            Step::Fail => Err(StepFailure::Failed(
                InstallError::PackageFailed {
                    package: package.to_string(),
                    message: "exited with status 1".to_string(),
                    tail: vec![format!("error: target not found: {package}")],
                }
                .into(),
            )),
            Step::WaitForCancel => {
                ctx.cancel.cancelled().await;
                Err(StepFailure::Cancelled)
            }
        }
    }

    async fn shutdown(&mut self) -> bool {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[derive(Default)]
struct FakeMaterializer {
    dirs: Vec<String>,
    empty_checkout: bool,
    copied: Arc<Mutex<Vec<String>>>,
    backups: Arc<AtomicUsize>,
    finalized: Arc<AtomicBool>,
}

impl FakeMaterializer {
    fn with_dirs(dirs: &[&str]) -> Self {
        Self {
            dirs: dirs.iter().map(|d| (*d).to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ConfigMaterializer for FakeMaterializer {
    fn config_dirs(&self) -> Vec<String> {
        self.dirs.clone()
    }

    fn backup_dir(&self) -> PathBuf {
        PathBuf::from("/home/luna/HyprLuna-User-Bak")
    }

    async fn backup(&mut self, _ctx: &mut StepContext<'_>) -> Result<BackupReport, StepFailure> {
        self.backups.fetch_add(1, Ordering::SeqCst);
        Ok(BackupReport {
            directory: self.backup_dir(),
            saved: vec![".config".to_string()],
            files: 3,
        })
    }

    async fn fetch(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), StepFailure> {
        if self.empty_checkout {
            return Err(StepFailure::Failed(
                DotfilesError::EmptyCheckout {
                    path: "/home/luna/HyprLuna".to_string(),
                }
                .into(),
            ));
        }
        Ok(())
    }

    async fn copy_dir(
        &mut self,
        name: &str,
        _ctx: &mut StepContext<'_>,
    ) -> Result<CopyStatus, StepFailure> {
        self.copied.lock().unwrap().push(name.to_string());
        if name == ".missing" {
            Ok(CopyStatus::Absent)
        } else {
            Ok(CopyStatus::Copied { files: 2 })
        }
    }

    async fn finalize(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), StepFailure> {
        self.finalized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&mut self) -> bool {
        false
    }
}

fn settings() -> SessionSettings {
    SessionSettings {
        log_capacity: 50,
        tail_lines: 8,
        count_confirmation_steps: false,
        helper_poll_interval: Duration::from_secs(2),
        helper_grace: Duration::from_secs(30),
    }
}

fn packages(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

fn start(
    backend: FakeBackend,
    materializer: FakeMaterializer,
    queue: Vec<String>,
) -> (SessionHandle, EventReceiver, JoinHandle<SessionReport>) {
    let (tx, rx) = lunaris_events::channel();
    let (session, handle) = InstallationSession::new(
        PlatformContext::new(Some(tx)),
        backend,
        materializer,
        queue,
        settings(),
    )
    .unwrap();
    (handle, rx, tokio::spawn(session.run()))
}

/// Collect session events until `want` matches; returns the match and
/// everything seen before it.
async fn until(
    rx: &mut EventReceiver,
    want: impl Fn(&SessionEvent) -> bool,
) -> (SessionEvent, Vec<SessionEvent>) {
    let mut seen = Vec::new();
    loop {
        let message = tokio::time::timeout(Duration::from_secs(300), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if let AppEvent::Session(event) = message.event {
            if want(&event) {
                return (event, seen);
            }
            seen.push(event);
        }
    }
}

fn last_progress(events: &[SessionEvent]) -> Option<(usize, usize)> {
    events.iter().rev().find_map(|e| match e {
        SessionEvent::ProgressUpdate {
            progress, total, ..
        } => Some((*progress, *total)),
        _ => None,
    })
}

#[tokio::test]
async fn full_run_counts_every_step() {
    let backend = FakeBackend::with_helper();
    let materializer = FakeMaterializer::with_dirs(&[".config", ".local", ".missing"]);
    let copied = Arc::clone(&materializer.copied);
    let finalized = Arc::clone(&materializer.finalized);
    let (handle, mut rx, task) = start(
        backend,
        materializer,
        packages(&["a", "b", "c", "d", "e"]),
    );

    let (_, seen) = until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    assert_eq!(last_progress(&seen), Some((6, 10)));
    handle.confirm_dotfiles(true).unwrap();

    until(&mut rx, |e| {
        matches!(e, SessionEvent::BackupConfirmationRequested { .. })
    })
    .await;
    handle.confirm_backup(false).unwrap();

    let (event, seen) = until(&mut rx, |e| matches!(e, SessionEvent::SessionComplete { .. })).await;
    assert!(matches!(
        event,
        SessionEvent::SessionComplete {
            progress: 10,
            total: 10
        }
    ));
    assert!(!seen.iter().any(|e| matches!(
        e,
        SessionEvent::PhaseChanged {
            to: Phase::Backup,
            ..
        }
    )));

    let report = task.await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.installed.len(), 5);
    assert!(report.dotfiles_installed);
    assert_eq!(*copied.lock().unwrap(), [".config", ".local", ".missing"]);
    assert!(finalized.load(Ordering::SeqCst));
}

#[tokio::test]
async fn conflict_freezes_progress_until_skip() {
    let backend = FakeBackend::with_helper().script("pkgB", &[Step::Conflict]);
    let calls = Arc::clone(&backend.calls);
    let (handle, mut rx, task) = start(
        backend,
        FakeMaterializer::default(),
        packages(&["pkgA", "pkgB"]),
    );

    let (event, seen) = until(&mut rx, |e| matches!(e, SessionEvent::ConflictRaised { .. })).await;
    match event {
        SessionEvent::ConflictRaised { package, hint, .. } => {
            assert_eq!(package, "pkgB");
            assert_eq!(hint.as_deref(), Some("old-pkgB"));
        }
        other => panic!("unexpected {other:?}"),
    }
    // helper + pkgA
    assert_eq!(last_progress(&seen), Some((2, 4)));

    // wrong decision for this suspension point is ignored
    handle.confirm_backup(true).unwrap();
    handle.resolve_conflict(ConflictChoice::Skip).unwrap();

    let (_, seen) = until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    assert_eq!(last_progress(&seen), Some((3, 4)));
    handle.confirm_dotfiles(false).unwrap();

    let report = task.await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.skipped, ["pkgB"]);
    assert_eq!(report.installed, ["pkgA"]);
    assert!(!report.dotfiles_installed);
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn skip_keeps_the_rest_of_the_queue() {
    let backend = FakeBackend::with_helper().script("b", &[Step::Conflict]);
    let calls = Arc::clone(&backend.calls);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a", "b", "c"]));

    let (raised, _) = until(&mut rx, |e| matches!(e, SessionEvent::ConflictRaised { .. })).await;
    assert!(matches!(raised, SessionEvent::ConflictRaised { ref package, .. } if package == "b"));
    handle.resolve_conflict(ConflictChoice::Skip).unwrap();

    let (_, seen) = until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    // helper + a + b (skipped) + c out of helper + 3 packages + clone
    assert_eq!(last_progress(&seen), Some((4, 5)));
    handle.confirm_dotfiles(false).unwrap();

    let report = task.await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.installed, ["a", "c"]);
    assert_eq!(report.skipped, ["b"]);
    let attempted: Vec<_> = calls.lock().unwrap().iter().map(|(p, _, _)| p.clone()).collect();
    assert_eq!(attempted, ["a", "b", "c"]);
}

#[tokio::test]
async fn replace_all_stops_asking() {
    let backend = FakeBackend::with_helper()
        .script("b", &[Step::Conflict, Step::Ok])
        .script("c", &[Step::Conflict, Step::Ok]);
    let calls = Arc::clone(&backend.calls);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a", "b", "c"]));

    until(&mut rx, |e| matches!(e, SessionEvent::ConflictRaised { .. })).await;
    handle.resolve_conflict(ConflictChoice::ReplaceAll).unwrap();

    let (_, seen) = until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SessionEvent::ConflictRaised { .. })));
    handle.confirm_dotfiles(false).unwrap();

    let report = task.await.unwrap();
    assert_eq!(report.installed, ["a", "b", "c"]);
    let modes: Vec<_> = calls
        .lock()
        .unwrap()
        .iter()
        .map(|(p, m, _)| (p.clone(), *m))
        .collect();
    assert_eq!(
        modes,
        [
            ("a".to_string(), InstallMode::Normal),
            ("b".to_string(), InstallMode::Normal),
            ("b".to_string(), InstallMode::Replace),
            ("c".to_string(), InstallMode::Normal),
            ("c".to_string(), InstallMode::Replace),
        ]
    );
}

#[tokio::test]
async fn conflict_after_replace_is_a_package_failure() {
    let backend = FakeBackend::with_helper().script("b", &[Step::Conflict, Step::Conflict]);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a", "b"]));

    until(&mut rx, |e| matches!(e, SessionEvent::ConflictRaised { .. })).await;
    handle.resolve_conflict(ConflictChoice::Replace).unwrap();
    until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    handle.confirm_dotfiles(false).unwrap();

    let report = task.await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].package, "b");
}

#[tokio::test]
async fn auth_failure_requests_credential_and_retries_once() {
    let backend = FakeBackend::with_helper().script("a", &[Step::Auth, Step::Ok]);
    let calls = Arc::clone(&backend.calls);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a"]));

    let (event, _) = until(&mut rx, |e| {
        matches!(e, SessionEvent::CredentialRequested { .. })
    })
    .await;
    assert!(matches!(
        event,
        SessionEvent::CredentialRequested { rejected: false, .. }
    ));
    handle.submit_credential(Credential::new("hunter2")).unwrap();

    until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    handle.confirm_dotfiles(false).unwrap();
    assert!(task.await.unwrap().is_success());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].2);
    assert!(calls[1].2, "retry carries the credential");
}

#[tokio::test]
async fn second_auth_failure_is_fatal() {
    let backend = FakeBackend::with_helper().script("a", &[Step::Auth, Step::Auth]);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a"]));

    until(&mut rx, |e| {
        matches!(e, SessionEvent::CredentialRequested { .. })
    })
    .await;
    handle.submit_credential(Credential::new("wrong")).unwrap();

    let (event, _) = until(&mut rx, |e| matches!(e, SessionEvent::SessionFailed { .. })).await;
    if let SessionEvent::SessionFailed { failure, tail } = event {
        assert_eq!(failure.code.as_deref(), Some("install.authentication_failed"));
        assert_eq!(tail, ["sudo: a password is required"]);
    }
    assert_eq!(task.await.unwrap().phase, Phase::Failed);
}

#[tokio::test]
async fn failure_of_an_earlier_package_is_not_fatal() {
    let backend = FakeBackend::with_helper().script("a", &[Step::Fail]);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a", "b"]));

    let (_, seen) = until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    assert_eq!(last_progress(&seen), Some((3, 4)));
    handle.confirm_dotfiles(false).unwrap();

    let report = task.await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.failed[0].package, "a");
    assert_eq!(report.installed, ["b"]);
}

#[tokio::test]
async fn only_package_failing_aborts_the_session() {
    let backend = FakeBackend::with_helper().script("a", &[Step::Fail]);
    let (_handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a"]));

    let (event, seen) = until(&mut rx, |e| matches!(e, SessionEvent::SessionFailed { .. })).await;
    if let SessionEvent::SessionFailed { failure, tail } = event {
        assert_eq!(failure.code.as_deref(), Some("install.batch_failed"));
        assert_eq!(tail, ["error: target not found: a"]);
    }
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SessionEvent::DotfilesConfirmationRequested)));
    assert_eq!(task.await.unwrap().phase, Phase::Failed);
}

#[tokio::test]
async fn already_installed_counts_as_success() {
    let backend = FakeBackend::with_helper().script("a", &[Step::Already]);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a"]));

    until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    handle.confirm_dotfiles(false).unwrap();
    let report = task.await.unwrap();
    assert_eq!(report.already_installed, ["a"]);
    assert_eq!(report.progress, 2);
}

#[tokio::test]
async fn cancel_during_a_step_stops_it_and_acknowledges() {
    let backend = FakeBackend::with_helper().script("a", &[Step::WaitForCancel]);
    let shutdowns = Arc::clone(&backend.shutdowns);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a", "b"]));

    until(&mut rx, |e| {
        matches!(
            e,
            SessionEvent::PhaseChanged {
                to: Phase::PackageInstall,
                ..
            }
        )
    })
    .await;
    tokio::time::timeout(Duration::from_secs(5), handle.cancel())
        .await
        .expect("cancel was not acknowledged");
    assert!(shutdowns.load(Ordering::SeqCst) >= 1);

    until(&mut rx, |e| matches!(e, SessionEvent::SessionCancelled)).await;
    let report = task.await.unwrap();
    assert!(report.is_cancelled());
    assert!(report.installed.is_empty());
    assert!(handle.is_finished());
}

#[tokio::test]
async fn conflict_cancel_choice_cancels() {
    let backend = FakeBackend::with_helper().script("a", &[Step::Conflict]);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a"]));

    until(&mut rx, |e| matches!(e, SessionEvent::ConflictRaised { .. })).await;
    handle.resolve_conflict(ConflictChoice::Cancel).unwrap();
    until(&mut rx, |e| matches!(e, SessionEvent::SessionCancelled)).await;
    assert!(task.await.unwrap().is_cancelled());
}

#[tokio::test]
async fn dropping_the_handle_cancels_at_a_suspension_point() {
    let (handle, mut rx, task) = start(
        FakeBackend::with_helper(),
        FakeMaterializer::default(),
        packages(&["a"]),
    );
    until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    drop(handle);
    assert!(task.await.unwrap().is_cancelled());
}

#[tokio::test]
async fn empty_checkout_fails_before_copying() {
    let materializer = FakeMaterializer {
        empty_checkout: true,
        ..FakeMaterializer::with_dirs(&[".config", ".local"])
    };
    let copied = Arc::clone(&materializer.copied);
    let backups = Arc::clone(&materializer.backups);
    let (handle, mut rx, task) = start(FakeBackend::with_helper(), materializer, packages(&["a"]));

    until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    handle.confirm_dotfiles(true).unwrap();
    let (event, _) = until(&mut rx, |e| {
        matches!(e, SessionEvent::BackupConfirmationRequested { .. })
    })
    .await;
    if let SessionEvent::BackupConfirmationRequested { backup_dir } = event {
        assert!(backup_dir.ends_with("HyprLuna-User-Bak"));
    }
    handle.confirm_backup(true).unwrap();

    let (event, _) = until(&mut rx, |e| matches!(e, SessionEvent::SessionFailed { .. })).await;
    if let SessionEvent::SessionFailed { failure, .. } = event {
        assert!(failure.message.contains("appears to be empty"));
    }
    let report = task.await.unwrap();
    assert_eq!(report.phase, Phase::Failed);
    assert!(copied.lock().unwrap().is_empty());
    assert_eq!(backups.load(Ordering::SeqCst), 1);
    assert!(report.backup_dir.is_some());
}

#[tokio::test(start_paused = true)]
async fn helper_poll_moves_on_when_install_never_returns() {
    let backend = FakeBackend {
        helper_hangs: true,
        ..FakeBackend::default()
    };
    let shutdowns = Arc::clone(&backend.shutdowns);
    let (handle, mut rx, task) = start(backend, FakeMaterializer::default(), packages(&["a"]));

    until(&mut rx, |e| {
        matches!(
            e,
            SessionEvent::PhaseChanged {
                to: Phase::PackageInstall,
                ..
            }
        )
    })
    .await;
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

    until(&mut rx, |e| {
        matches!(e, SessionEvent::DotfilesConfirmationRequested)
    })
    .await;
    handle.confirm_dotfiles(false).unwrap();
    let report = task.await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.progress, 2);
}

#[test]
fn empty_queue_is_rejected() {
    let result = InstallationSession::new(
        PlatformContext::default(),
        FakeBackend::with_helper(),
        FakeMaterializer::default(),
        Vec::new(),
        settings(),
    );
    assert!(result.is_err());
}

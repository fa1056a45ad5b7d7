//! Shared plumbing for one supervised subprocess step

use std::sync::Arc;
use std::time::Duration;

use lunaris_config::Config;
use lunaris_errors::{Error, InstallError};
use lunaris_events::EventEmitter;
use lunaris_platform::{
    CancelSignal, LineSink, LineVerdict, Outcome, OutputLine, PlatformCommand, PlatformContext,
    ProcessSlot, Supervisor,
};
use lunaris_types::{Conflict, Credential, LogKind};

use crate::classifier::{LineClass, OutputClassifier};
use crate::message_log::MessageLog;

/// Everything a step borrows from the session that runs it
pub struct StepContext<'a> {
    pub platform: &'a PlatformContext,
    pub log: &'a mut MessageLog,
    pub cancel: CancelSignal,
    pub credential: Option<&'a Credential>,
}

impl StepContext<'_> {
    /// Record a message in the log and forward it to the event stream.
    pub fn note(&mut self, kind: LogKind, source: &str, text: impl Into<String>) {
        let text = text.into();
        self.log.push(kind, source, text.clone());
        self.platform.emit_log_line(kind, source, text);
    }
}

/// Timing and buffering knobs for supervised steps
#[derive(Debug, Clone)]
pub struct StepSettings {
    pub timeout: Duration,
    pub drain_grace: Duration,
    pub line_capacity: usize,
    pub tail_lines: usize,
}

impl StepSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.step_timeout(),
            drain_grace: config.drain_grace(),
            line_capacity: config.general.line_channel_capacity,
            tail_lines: config.general.tail_lines,
        }
    }
}

impl Default for StepSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a step did not complete
#[derive(Debug, Clone)]
pub enum StepFailure {
    /// Privilege escalation asked for, or rejected, a password
    AuthRequired { step: String, tail: Vec<String> },
    /// The package manager reported a conflict and the step was stopped
    Conflict(Conflict),
    TimedOut {
        step: String,
        timeout_seconds: u64,
        tail: Vec<String>,
    },
    Cancelled,
    Failed(Error),
}

impl StepFailure {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Convert into the session level error.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Self::AuthRequired { step, tail } => {
                InstallError::AuthenticationFailed { step, tail }.into()
            }
            Self::Conflict(conflict) => InstallError::Conflict {
                package: conflict.package,
                message: conflict.raw_message,
            }
            .into(),
            Self::TimedOut {
                step,
                timeout_seconds,
                tail,
            } => InstallError::Timeout {
                step,
                timeout_seconds,
                tail,
            }
            .into(),
            Self::Cancelled => Error::Cancelled,
            Self::Failed(err) => err,
        }
    }
}

impl From<Error> for StepFailure {
    fn from(err: Error) -> Self {
        if err.is_cancellation() {
            Self::Cancelled
        } else {
            Self::Failed(err)
        }
    }
}

/// What a finished step looked like
#[derive(Debug, Clone)]
pub struct StepReport {
    pub outcome: Outcome,
    /// Conflict line and parsed hint, if one was seen
    pub conflict: Option<(String, Option<String>)>,
    pub auth_prompt: bool,
    pub tail: Vec<String>,
}

impl StepReport {
    /// Map the common failure shapes; `on_error` builds the step specific
    /// error for a plain non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns the [`StepFailure`] matching the outcome.
    pub fn into_result(
        self,
        step: &str,
        package: Option<&str>,
        timeout: Duration,
        on_error: impl FnOnce(Option<i32>, Vec<String>) -> Error,
    ) -> Result<(), StepFailure> {
        if let (Some(package), Some((raw_message, hint))) = (package, &self.conflict) {
            if !self.outcome.is_success() && !matches!(self.outcome, Outcome::Cancelled) {
                return Err(StepFailure::Conflict(Conflict {
                    package: package.to_string(),
                    hint: hint.clone(),
                    raw_message: raw_message.clone(),
                }));
            }
        }

        match self.outcome {
            Outcome::ExitedOk => Ok(()),
            Outcome::Cancelled => Err(StepFailure::Cancelled),
            Outcome::TimedOut => Err(StepFailure::TimedOut {
                step: step.to_string(),
                timeout_seconds: timeout.as_secs(),
                tail: self.tail,
            }),
            Outcome::ExitedWithError(_) | Outcome::Aborted(_) if self.auth_prompt => {
                Err(StepFailure::AuthRequired {
                    step: step.to_string(),
                    tail: self.tail,
                })
            }
            Outcome::ExitedWithError(code) => Err(StepFailure::Failed(on_error(code, self.tail))),
            Outcome::Aborted(reason) => {
                let mut tail = self.tail;
                tail.push(reason);
                Err(StepFailure::Failed(on_error(None, tail)))
            }
        }
    }
}

/// Classifies every line, keeps the interesting ones and watches for
/// conflicts and password prompts.
pub struct ClassifyingSink<'a> {
    classifier: &'a dyn OutputClassifier,
    log: &'a mut MessageLog,
    events: &'a PlatformContext,
    source: &'a str,
    abort_on_conflict: bool,
    conflict: Option<(String, Option<String>)>,
    auth_prompt: bool,
}

impl<'a> ClassifyingSink<'a> {
    pub fn new(
        classifier: &'a dyn OutputClassifier,
        log: &'a mut MessageLog,
        events: &'a PlatformContext,
        source: &'a str,
    ) -> Self {
        Self {
            classifier,
            log,
            events,
            source,
            abort_on_conflict: false,
            conflict: None,
            auth_prompt: false,
        }
    }

    /// Stop the process on the first conflict line.
    #[must_use]
    pub fn abort_on_conflict(mut self, abort: bool) -> Self {
        self.abort_on_conflict = abort;
        self
    }

    #[must_use]
    pub fn conflict(&self) -> Option<&(String, Option<String>)> {
        self.conflict.as_ref()
    }

    #[must_use]
    pub fn saw_auth_prompt(&self) -> bool {
        self.auth_prompt
    }

    fn into_parts(self) -> (Option<(String, Option<String>)>, bool) {
        (self.conflict, self.auth_prompt)
    }
}

impl LineSink for ClassifyingSink<'_> {
    fn on_line(&mut self, line: &OutputLine) -> LineVerdict {
        let text = line.text.trim_end();
        if text.is_empty() {
            return LineVerdict::Continue;
        }
        tracing::trace!(source = self.source, stream = line.stream.as_str(), "{text}");

        if self.classifier.is_auth_prompt(text) {
            self.auth_prompt = true;
        }

        let class = self.classifier.classify(text);
        if self.classifier.is_worth_keeping(text) {
            let kind = class.log_kind();
            self.log.push(kind, self.source, text);
            self.events.emit_log_line(kind, self.source, text);
        }

        if let LineClass::Conflict { hint } = class {
            if self.conflict.is_none() {
                self.conflict = Some((text.to_string(), hint));
            }
            if self.abort_on_conflict {
                return LineVerdict::Abort(text.to_string());
            }
        }
        LineVerdict::Continue
    }
}

/// Run `cmd` through the slot under a [`Supervisor`] and report how it went.
///
/// # Errors
///
/// Only spawn and input failures are errors here; every way the process
/// itself can end is described by the returned [`StepReport`].
#[allow(clippy::too_many_arguments)]
pub async fn run_supervised(
    slot: &mut ProcessSlot,
    cmd: &PlatformCommand,
    settings: &StepSettings,
    ctx: &mut StepContext<'_>,
    classifier: &Arc<dyn OutputClassifier>,
    source: &str,
    feed_credential: bool,
    abort_on_conflict: bool,
) -> Result<StepReport, StepFailure> {
    if ctx.cancel.is_cancelled() {
        return Err(StepFailure::Cancelled);
    }

    let credential = if feed_credential { ctx.credential } else { None };
    slot.start(ctx.platform, cmd, settings.line_capacity, credential)
        .await
        .map_err(|err| StepFailure::Failed(err.into()))?;

    let supervisor = Supervisor::new(ctx.platform.clone(), settings.timeout, ctx.cancel.clone())
        .with_drain_grace(settings.drain_grace);

    let mut sink = ClassifyingSink::new(classifier.as_ref(), ctx.log, ctx.platform, source)
        .abort_on_conflict(abort_on_conflict);
    let outcome = slot
        .supervise(&supervisor, &mut sink)
        .await
        .map_err(|err| StepFailure::Failed(err.into()))?;
    let (conflict, auth_prompt) = sink.into_parts();

    tracing::debug!(source, ?outcome, "step finished");
    Ok(StepReport {
        outcome,
        conflict,
        auth_prompt,
        tail: ctx.log.tail_text(settings.tail_lines),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::DefaultClassifier;
    use lunaris_platform::OutputStream;

    fn line(text: &str) -> OutputLine {
        OutputLine {
            stream: OutputStream::Stdout,
            text: text.to_string(),
        }
    }

    #[test]
    fn sink_keeps_interesting_lines_and_stops_on_conflict() {
        let classifier = DefaultClassifier::default();
        let mut log = MessageLog::new(10);
        let platform = PlatformContext::default();
        let mut sink = ClassifyingSink::new(&classifier, &mut log, &platform, "yay")
            .abort_on_conflict(true);

        assert_eq!(sink.on_line(&line("resolving dependencies...")), LineVerdict::Continue);
        assert_eq!(sink.on_line(&line("installing kitty")), LineVerdict::Continue);
        assert_eq!(sink.on_line(&line("[sudo] password for luna:")), LineVerdict::Continue);
        let verdict = sink.on_line(&line(":: kitty-git and kitty are in conflict"));
        assert!(matches!(verdict, LineVerdict::Abort(_)));
        assert!(sink.saw_auth_prompt());
        assert_eq!(
            sink.conflict().and_then(|(_, hint)| hint.clone()),
            Some("kitty".to_string())
        );

        let texts: Vec<_> = log.entries().map(|e| e.text.clone()).collect();
        assert_eq!(texts, ["installing kitty", ":: kitty-git and kitty are in conflict"]);
    }

    #[test]
    fn conflict_report_wins_over_exit_code() {
        let report = StepReport {
            outcome: Outcome::Aborted("conflict".into()),
            conflict: Some(("conflict".into(), Some("foo".into()))),
            auth_prompt: false,
            tail: vec![],
        };
        let failure = report
            .into_result("kitty", Some("kitty"), Duration::from_secs(1), |_, _| {
                Error::internal("unused")
            })
            .unwrap_err();
        assert!(matches!(failure, StepFailure::Conflict(c) if c.hint.as_deref() == Some("foo")));
    }

    #[test]
    fn auth_prompt_turns_exit_into_auth_failure() {
        let report = StepReport {
            outcome: Outcome::ExitedWithError(Some(1)),
            conflict: None,
            auth_prompt: true,
            tail: vec!["sudo: a password is required".into()],
        };
        let failure = report
            .into_result("kitty", Some("kitty"), Duration::from_secs(1), |_, _| {
                Error::internal("unused")
            })
            .unwrap_err();
        assert!(matches!(failure, StepFailure::AuthRequired { .. }));
    }

    #[test]
    fn timeout_carries_tail() {
        let report = StepReport {
            outcome: Outcome::TimedOut,
            conflict: None,
            auth_prompt: false,
            tail: vec!["building".into()],
        };
        let failure = report
            .into_result("yay", None, Duration::from_secs(90), |_, _| {
                Error::internal("unused")
            })
            .unwrap_err();
        match failure {
            StepFailure::TimedOut {
                timeout_seconds,
                tail,
                ..
            } => {
                assert_eq!(timeout_seconds, 90);
                assert_eq!(tail, ["building"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

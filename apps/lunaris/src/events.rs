//! Event handling and progress display

use console::Style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lunaris_events::{AppEvent, EventMessage, GeneralEvent, ProcessEvent, SessionEvent};
use lunaris_types::LogKind;
use std::time::Duration;

use crate::logging::log_event_with_tracing;
use crate::prompt::Prompt;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// Renders session events and reports the decisions the session waits on
pub struct EventHandler {
    bar: ProgressBar,
    /// Whether the bar draws to the terminal when not paused
    visible: bool,
    colors_enabled: bool,
    debug_enabled: bool,
}

impl EventHandler {
    /// Create new event handler drawing to stderr
    pub fn new(colors_enabled: bool, debug_enabled: bool) -> Self {
        Self::with_target(ProgressDrawTarget::stderr(), colors_enabled, debug_enabled)
    }

    fn with_target(target: ProgressDrawTarget, colors_enabled: bool, debug_enabled: bool) -> Self {
        let visible = !target.is_hidden();
        let bar = ProgressBar::with_draw_target(Some(0), target);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        if visible {
            bar.enable_steady_tick(Duration::from_millis(120));
        }
        Self {
            bar,
            visible,
            colors_enabled,
            debug_enabled,
        }
    }

    /// Handle incoming event, returning the question it asks, if any
    pub fn handle_event(&mut self, message: EventMessage) -> Option<Prompt> {
        log_event_with_tracing(&message);

        match message.event {
            AppEvent::Session(event) => self.handle_session_event(event),
            AppEvent::Process(event) => {
                self.handle_process_event(event);
                None
            }
            AppEvent::General(event) => {
                self.handle_general_event(event);
                None
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) -> Option<Prompt> {
        match event {
            SessionEvent::ProgressUpdate {
                progress,
                total,
                current_step,
                phase: _,
            } => {
                self.bar.set_length(total as u64);
                self.bar.set_position(progress as u64);
                self.bar.set_message(current_step);
            }
            SessionEvent::LogLine { kind, source, text } => {
                self.show_line(kind, &source, &text);
            }
            SessionEvent::PhaseChanged { from: _, to } => {
                if self.debug_enabled {
                    self.show(&self.style(LogKind::Debug, &format!("phase: {}", to.label())));
                }
            }
            SessionEvent::ConflictRaised {
                package,
                hint,
                raw_message,
            } => {
                self.show(&self.style(LogKind::Warning, &format!("Conflict: {raw_message}")));
                return Some(Prompt::Conflict { package, hint });
            }
            SessionEvent::CredentialRequested { step, rejected } => {
                return Some(Prompt::Credential { step, rejected });
            }
            SessionEvent::DotfilesConfirmationRequested => return Some(Prompt::Dotfiles),
            SessionEvent::BackupConfirmationRequested { backup_dir } => {
                return Some(Prompt::Backup { backup_dir });
            }
            SessionEvent::SessionComplete { progress, total } => {
                self.bar.set_length(total as u64);
                self.bar.set_position(progress as u64);
                self.bar.finish_with_message("Installation complete");
            }
            SessionEvent::SessionFailed { failure, tail } => {
                self.bar.abandon_with_message("Installation failed");
                self.show(&self.style(LogKind::Error, &failure.message));
                if let Some(hint) = &failure.hint {
                    self.show(&format!("  Hint: {hint}"));
                }
                if !tail.is_empty() {
                    self.show("Last messages:");
                    for line in &tail {
                        self.show(&format!("  {line}"));
                    }
                }
            }
            SessionEvent::SessionCancelled => {
                self.bar.abandon_with_message("Installation cancelled");
            }
        }
        None
    }

    fn handle_process_event(&self, event: ProcessEvent) {
        match event {
            ProcessEvent::TimedOut {
                descriptor,
                timeout_seconds,
            } => {
                self.show(&self.style(
                    LogKind::Warning,
                    &format!(
                        "{} did not finish within {timeout_seconds}s",
                        descriptor.program
                    ),
                ));
            }
            ProcessEvent::StaleProcessesTerminated { name, count } => {
                self.show_line(
                    LogKind::Info,
                    "system",
                    &format!("Stopped {count} leftover {name} process(es)"),
                );
            }
            ProcessEvent::Started { descriptor, .. } if self.debug_enabled => {
                self.show(&self.style(LogKind::Debug, &format!("$ {}", descriptor.command_line())));
            }
            // Shown through the message log lines
            _ => {}
        }
    }

    fn handle_general_event(&self, event: GeneralEvent) {
        match event {
            GeneralEvent::Warning { message, context } => {
                let text = match context {
                    Some(context) => format!("{message} ({context})"),
                    None => message,
                };
                self.show(&self.style(LogKind::Warning, &text));
            }
            GeneralEvent::Error { message } => {
                self.show(&self.style(LogKind::Error, &message));
            }
            GeneralEvent::DebugLog { message } => {
                if self.debug_enabled {
                    self.show(&self.style(LogKind::Debug, &message));
                }
            }
        }
    }

    /// Print a message without disturbing the bar
    pub fn notice(&self, message: &str) {
        self.show(&self.style(LogKind::Info, message));
    }

    /// Hide the bar while a prompt owns the terminal
    pub fn pause(&self) {
        if self.visible {
            self.bar.disable_steady_tick();
            self.bar.set_draw_target(ProgressDrawTarget::hidden());
        }
    }

    pub fn resume(&self) {
        if self.visible {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
            self.bar.enable_steady_tick(Duration::from_millis(120));
        }
    }

    /// Stop the spinner if the session ended without a terminal event
    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }

    fn show_line(&self, kind: LogKind, source: &str, text: &str) {
        if kind == LogKind::Debug && !self.debug_enabled {
            return;
        }
        self.show(&self.style(kind, &format!("{source}: {text}")));
    }

    fn show(&self, line: &str) {
        if self.visible {
            self.bar.println(line);
        } else {
            eprintln!("{line}");
        }
    }

    fn style(&self, kind: LogKind, text: &str) -> String {
        if !self.colors_enabled {
            return text.to_string();
        }
        let style = match kind {
            LogKind::Success => Style::new().green(),
            LogKind::Warning => Style::new().yellow(),
            LogKind::Error => Style::new().red().bold(),
            LogKind::Debug => Style::new().dim(),
            LogKind::Info => return text.to_string(),
        };
        style.apply_to(text).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lunaris_events::FailureContext;
    use lunaris_types::Phase;

    fn handler() -> EventHandler {
        EventHandler::with_target(ProgressDrawTarget::hidden(), false, false)
    }

    fn session(event: SessionEvent) -> EventMessage {
        EventMessage::from_event(AppEvent::Session(event))
    }

    #[test]
    fn progress_updates_move_the_bar() {
        let mut handler = handler();

        let prompt = handler.handle_event(session(SessionEvent::ProgressUpdate {
            progress: 3,
            total: 10,
            current_step: "Installing kitty".to_string(),
            phase: Phase::PackageInstall,
        }));

        assert!(prompt.is_none());
        assert_eq!(handler.bar.length(), Some(10));
        assert_eq!(handler.bar.position(), 3);
        assert_eq!(handler.bar.message(), "Installing kitty");
    }

    #[test]
    fn suspension_events_become_prompts() {
        let mut handler = handler();

        let prompt = handler.handle_event(session(SessionEvent::ConflictRaised {
            package: "kitty".to_string(),
            hint: Some("kitty-git".to_string()),
            raw_message: "kitty and kitty-git are in conflict".to_string(),
        }));
        assert_eq!(
            prompt,
            Some(Prompt::Conflict {
                package: "kitty".to_string(),
                hint: Some("kitty-git".to_string()),
            })
        );

        let prompt = handler.handle_event(session(SessionEvent::CredentialRequested {
            step: "kitty".to_string(),
            rejected: true,
        }));
        assert!(matches!(prompt, Some(Prompt::Credential { rejected: true, .. })));

        let prompt = handler.handle_event(session(SessionEvent::BackupConfirmationRequested {
            backup_dir: "HyprLuna-User-Bak".to_string(),
        }));
        assert!(matches!(prompt, Some(Prompt::Backup { .. })));
    }

    #[test]
    fn terminal_events_finish_the_bar() {
        let mut handler = handler();
        handler.handle_event(session(SessionEvent::SessionFailed {
            failure: FailureContext::new(
                Some("install.batch_failed"),
                "no package could be installed",
                None::<String>,
                false,
            ),
            tail: vec!["error: target not found: nope".to_string()],
        }));

        assert!(handler.bar.is_finished());
    }
}

//! lunaris command line interface
//!
//! Thin terminal presentation over an installation session: renders its
//! events, answers its questions and turns Ctrl-C into a cancellation.

mod cli;
mod display;
mod error;
mod events;
mod logging;
mod prompt;

use crate::cli::{Cli, Commands, GlobalArgs, InstallArgs};
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use crate::prompt::{Prompt, Prompter};
use clap::Parser;
use lunaris_config::{catalog, Config};
use lunaris_errors::{Error, OpsError};
use lunaris_events::EventReceiver;
use lunaris_ops::{SessionHandle, SessionReport, SystemSession};
use lunaris_platform::PlatformContext;
use lunaris_types::ColorChoice;
use std::process;
use tokio::select;
use tracing::{debug, error, info, warn};

/// Exit status after a cancelled session, as for SIGINT
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.debug);

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<i32, CliError> {
    info!("Starting lunaris v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration with proper precedence:
    // 1. Start with file config (or defaults)
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;

    // 2. Merge environment variables
    config.merge_env()?;

    // 3. Apply CLI flags (highest precedence)
    apply_cli_config(&mut config, &cli.global, &cli.command);
    config.validate()?;

    let renderer = OutputRenderer::new(config.general.color);
    let colors_enabled = match config.general.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stderr().features().colors_supported(),
    };

    match cli.command {
        Commands::Catalog => {
            renderer.render_catalog(catalog::CATEGORIES, &config.packages.options);
            Ok(0)
        }
        Commands::Install(args) => {
            let queue = config.package_queue()?;
            if queue.is_empty() {
                return Err(CliError::InvalidArguments(
                    "nothing to install: select an option or pass --package".to_string(),
                ));
            }

            let (event_sender, event_receiver) = lunaris_events::channel();
            let platform = PlatformContext::new(Some(event_sender));
            let (session, handle) = lunaris_ops::session_from_config(&config, platform, queue)?;
            info!(session = handle.session_id(), helper = %config.general.helper, "session created");

            let prompter = Prompter::new(args.yes_dotfiles, args.yes_backup, colors_enabled);
            let mut event_handler = EventHandler::new(colors_enabled, cli.global.debug);

            let report = drive_session(
                session,
                &handle,
                event_receiver,
                &mut event_handler,
                prompter,
            )
            .await?;

            renderer.render_report(&report);
            Ok(exit_code(&report))
        }
    }
}

fn exit_code(report: &SessionReport) -> i32 {
    if report.is_success() {
        0
    } else if report.is_cancelled() {
        EXIT_CANCELLED
    } else {
        1
    }
}

/// Run the session while rendering its events and answering its prompts
async fn drive_session(
    session: SystemSession,
    handle: &SessionHandle,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
    prompter: Prompter,
) -> Result<SessionReport, CliError> {
    let mut session_task = tokio::spawn(session.run());
    let mut events_open = true;
    let mut cancelling = false;

    loop {
        select! {
            // Session finished
            joined = &mut session_task => {
                // Drain any remaining events
                while let Ok(message) = event_receiver.try_recv() {
                    event_handler.handle_event(message);
                }
                event_handler.finish();
                return joined.map_err(|e| {
                    CliError::Ops(Error::internal(format!("session task failed: {e}")))
                });
            }

            // Event received
            message = event_receiver.recv(), if events_open => {
                let Some(message) = message else {
                    // Channel closed: keep waiting for the session to finish
                    events_open = false;
                    continue;
                };
                let Some(prompt) = event_handler.handle_event(message) else {
                    continue;
                };
                if cancelling {
                    continue;
                }
                if !answer(prompt, handle, event_handler, prompter).await {
                    cancelling = true;
                    event_handler.notice("Cancelling, waiting for running steps to stop...");
                    handle.cancel().await;
                }
            }

            _ = tokio::signal::ctrl_c(), if !cancelling => {
                cancelling = true;
                event_handler.notice("Cancelling, waiting for running steps to stop...");
                handle.cancel().await;
            }
        }
    }
}

/// Answer one prompt. Returns `false` when the session should be cancelled.
async fn answer(
    prompt: Prompt,
    handle: &SessionHandle,
    event_handler: &EventHandler,
    prompter: Prompter,
) -> bool {
    let answer = if let Some(answer) = prompter.preset(&prompt) {
        debug!(?prompt, "answered from flags");
        answer
    } else {
        event_handler.pause();
        let mut asking = tokio::task::spawn_blocking(move || prompter.ask(prompt));
        let asked = select! {
            joined = &mut asking => Some(joined),
            _ = tokio::signal::ctrl_c() => None,
        };
        event_handler.resume();

        match asked {
            Some(Ok(Ok(answer))) => answer,
            Some(Ok(Err(e))) => {
                warn!(error = %e, "prompt failed");
                event_handler.notice(&e.to_string());
                return false;
            }
            Some(Err(e)) => {
                warn!(error = %e, "prompt task failed");
                return false;
            }
            None => return false,
        }
    };

    match answer.send(handle) {
        Ok(()) => true,
        // the session ended while the user was answering
        Err(Error::Ops(OpsError::SessionFinished)) => true,
        Err(e) => {
            warn!(error = %e, "failed to forward answer");
            false
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(debug_flag: bool) {
    // Check if debug logging is enabled
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_flag;

    if debug_enabled {
        // Debug mode: structured JSON logs to file
        if let Some(log_dir) = Config::log_dir() {
            if let Err(e) = std::fs::create_dir_all(&log_dir) {
                eprintln!("Warning: Failed to create log directory: {e}");
            }

            let log_file = log_dir.join(format!(
                "lunaris-{}.log",
                chrono::Utc::now().format("%Y%m%d-%H%M%S")
            ));

            match std::fs::File::create(&log_file) {
                Ok(file) => {
                    tracing_subscriber::fmt()
                        .json()
                        .with_writer(file)
                        .with_env_filter(
                            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                                |_| {
                                    tracing_subscriber::EnvFilter::new(
                                        "info,lunaris=debug,lunaris_ops=debug,lunaris_install=debug",
                                    )
                                },
                            ),
                        )
                        .init();

                    eprintln!("Debug logging enabled: {}", log_file.display());
                    return;
                }
                Err(e) => {
                    eprintln!("Warning: Failed to create log file: {e}");
                }
            }
        }
    }

    // Normal mode: warnings to stderr; events are already rendered on screen
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("warn,lunaris::logging=off")
            }),
        )
        .init();
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &GlobalArgs, command: &Commands) {
    // Global CLI flags override everything
    if let Some(color) = global.color {
        config.general.color = color;
    }

    // Command-specific CLI flags
    if let Commands::Install(args) = command {
        apply_install_args(config, args);
    }
}

fn apply_install_args(config: &mut Config, args: &InstallArgs) {
    if let Some(helper) = args.helper {
        config.general.helper = helper;
    }
    if !args.select.is_empty() {
        config.packages.options.clone_from(&args.select);
    }
    if args.no_base {
        config.packages.base.clear();
    }
    config.packages.extra.extend(args.package.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use lunaris_types::HelperKind;

    #[test]
    fn install_flags_override_configuration() {
        let mut config = Config::default();
        config.packages.extra = vec!["htop".to_string()];

        let args = InstallArgs {
            helper: Some(HelperKind::Paru),
            select: vec!["kitty".to_string()],
            package: vec!["btop".to_string()],
            no_base: true,
            ..InstallArgs::default()
        };
        apply_install_args(&mut config, &args);

        assert_eq!(config.general.helper, HelperKind::Paru);
        assert!(config.packages.base.is_empty());
        assert_eq!(config.package_queue().unwrap(), ["kitty", "htop", "btop"]);
    }

    #[test]
    fn exit_codes_follow_the_outcome() {
        let mut report = SessionReport {
            session_id: "s".to_string(),
            phase: lunaris_types::Phase::Complete,
            progress: 4,
            total: 4,
            installed: Vec::new(),
            already_installed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            backup_dir: None,
            dotfiles_installed: false,
            error: None,
            duration_ms: 0,
        };
        assert_eq!(exit_code(&report), 0);

        report.phase = lunaris_types::Phase::Cancelled;
        assert_eq!(exit_code(&report), EXIT_CANCELLED);

        report.phase = lunaris_types::Phase::Failed;
        assert_eq!(exit_code(&report), 1);
    }
}

//! Interactive answers to the session's decision points

use dialoguer::theme::{ColorfulTheme, SimpleTheme, Theme};
use dialoguer::{Confirm, Password, Select};
use lunaris_errors::Error;
use lunaris_ops::SessionHandle;
use lunaris_types::{ConflictChoice, Credential};

use crate::error::CliError;

/// A question the session is waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Credential { step: String, rejected: bool },
    Conflict { package: String, hint: Option<String> },
    Dotfiles,
    Backup { backup_dir: String },
}

#[derive(Debug)]
pub enum Answer {
    Credential(Credential),
    Conflict(ConflictChoice),
    Dotfiles(bool),
    Backup(bool),
}

impl Answer {
    /// Forward the decision to the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionFinished` if the session ended while the user was
    /// answering.
    pub fn send(self, handle: &SessionHandle) -> Result<(), Error> {
        match self {
            Answer::Credential(credential) => handle.submit_credential(credential),
            Answer::Conflict(choice) => handle.resolve_conflict(choice),
            Answer::Dotfiles(install) => handle.confirm_dotfiles(install),
            Answer::Backup(backup) => handle.confirm_backup(backup),
        }
    }
}

const CONFLICT_CHOICES: [ConflictChoice; 4] = [
    ConflictChoice::Skip,
    ConflictChoice::Replace,
    ConflictChoice::ReplaceAll,
    ConflictChoice::Cancel,
];

/// Asks the user, or answers from command line flags
#[derive(Debug, Clone, Copy)]
pub struct Prompter {
    yes_dotfiles: bool,
    yes_backup: bool,
    colors_enabled: bool,
}

impl Prompter {
    pub fn new(yes_dotfiles: bool, yes_backup: bool, colors_enabled: bool) -> Self {
        Self {
            yes_dotfiles,
            yes_backup,
            colors_enabled,
        }
    }

    /// Answer decided up front by a flag, if any
    pub fn preset(&self, prompt: &Prompt) -> Option<Answer> {
        match prompt {
            Prompt::Dotfiles if self.yes_dotfiles => Some(Answer::Dotfiles(true)),
            Prompt::Backup { .. } if self.yes_backup => Some(Answer::Backup(true)),
            _ => None,
        }
    }

    /// Block on the terminal until the user answers.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Prompt` when there is no terminal to read from or
    /// the prompt was interrupted.
    pub fn ask(&self, prompt: Prompt) -> Result<Answer, CliError> {
        let colorful = ColorfulTheme::default();
        let simple = SimpleTheme;
        let theme: &dyn Theme = if self.colors_enabled {
            &colorful
        } else {
            &simple
        };

        match prompt {
            Prompt::Credential { step, rejected } => {
                if rejected {
                    eprintln!("The password was rejected, try again.");
                }
                let secret = Password::with_theme(theme)
                    .with_prompt(format!("Password needed for {step}"))
                    .interact()?;
                Ok(Answer::Credential(Credential::new(secret)))
            }
            Prompt::Conflict { package, hint } => {
                let other = hint.as_deref().unwrap_or("the conflicting package");
                let items = vec![
                    format!("Skip {package}"),
                    format!("Replace {other}"),
                    "Replace this and every later conflict".to_string(),
                    "Cancel the installation".to_string(),
                ];
                let picked = Select::with_theme(theme)
                    .with_prompt(format!("{package} conflicts with {other}"))
                    .items(&items)
                    .default(0)
                    .interact()?;
                Ok(Answer::Conflict(conflict_choice(picked)))
            }
            Prompt::Dotfiles => {
                let install = Confirm::with_theme(theme)
                    .with_prompt("Install the desktop configuration files?")
                    .default(true)
                    .interact()?;
                Ok(Answer::Dotfiles(install))
            }
            Prompt::Backup { backup_dir } => {
                let backup = Confirm::with_theme(theme)
                    .with_prompt(format!(
                        "Back up your current configuration to ~/{backup_dir}?"
                    ))
                    .default(true)
                    .interact()?;
                Ok(Answer::Backup(backup))
            }
        }
    }
}

fn conflict_choice(index: usize) -> ConflictChoice {
    CONFLICT_CHOICES
        .get(index)
        .copied()
        .unwrap_or(ConflictChoice::Cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_answer_confirmations_only() {
        let prompter = Prompter::new(true, true, false);

        assert!(matches!(
            prompter.preset(&Prompt::Dotfiles),
            Some(Answer::Dotfiles(true))
        ));
        assert!(matches!(
            prompter.preset(&Prompt::Backup {
                backup_dir: "HyprLuna-User-Bak".to_string()
            }),
            Some(Answer::Backup(true))
        ));
        assert!(prompter
            .preset(&Prompt::Credential {
                step: "git".to_string(),
                rejected: false
            })
            .is_none());
        assert!(prompter
            .preset(&Prompt::Conflict {
                package: "kitty".to_string(),
                hint: None
            })
            .is_none());
    }

    #[test]
    fn without_flags_everything_is_asked() {
        let prompter = Prompter::new(false, false, false);
        assert!(prompter.preset(&Prompt::Dotfiles).is_none());
    }

    #[test]
    fn selection_order_matches_choices() {
        assert_eq!(conflict_choice(0), ConflictChoice::Skip);
        assert_eq!(conflict_choice(2), ConflictChoice::ReplaceAll);
        assert_eq!(conflict_choice(9), ConflictChoice::Cancel);
    }
}

#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package and configuration installation for lunaris
//!
//! This crate turns package-manager subprocesses into typed step results:
//! - [`classifier`] decides what an output line means
//! - [`MessageLog`] keeps a bounded record of the interesting lines
//! - [`HelperController`] bootstraps the AUR helper from its recipe
//! - [`BatchInstaller`] installs one package at a time through the helper
//! - [`DotfilesInstaller`] backs up and materializes the configuration repository
//!
//! The session talks to the last three through the [`PackageBackend`] and
//! [`ConfigMaterializer`] traits.

pub mod backend;
pub mod batch;
pub mod classifier;
pub mod command;
pub mod dotfiles;
pub mod helper;
pub mod message_log;
pub mod preflight;
pub mod step;

pub use backend::{AurBackend, PackageBackend};
pub use batch::{BatchInstaller, BatchSettings, PackageStatus};
pub use classifier::{DefaultClassifier, LineClass, OutputClassifier, Vocabulary};
pub use dotfiles::{
    BackupReport, ConfigMaterializer, CopyStatus, DotfilesInstaller, GitCloner, RepositoryCloner,
};
pub use helper::{HelperController, HelperProbe, HelperSettings, HelperStatus};
pub use message_log::{LogEntry, MessageLog};
pub use preflight::Preflight;
pub use step::{
    run_supervised, ClassifyingSink, StepContext, StepFailure, StepReport, StepSettings,
};

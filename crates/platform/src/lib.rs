//! Platform layer for the lunaris installer.
//!
//! This crate owns everything that touches the operating system directly:
//! - Subprocess execution: [`ProcessHandle`], the timeout [`Supervisor`] and
//!   the single-occupant [`ProcessSlot`]
//! - Stale process termination backed by `sysinfo`
//! - Executable lookup on `PATH`
//! - Recursive copies and permission fixes for the dotfiles step
//!
//! Every subprocess lifecycle change is reported through the event system.

pub mod core;
pub mod fs;
pub mod locate;
pub mod process;

pub use core::PlatformContext;
pub use locate::{ExecutableLocator, PathLocator};
pub use process::{
    cancel_pair, CancelSignal, CancelTrigger, CommandOutput, LineSink, LineVerdict, Outcome,
    OutputLine, OutputStream, PlatformCommand, ProcessHandle, ProcessSlot, StaleProcessReaper,
    Supervisor, SystemReaper,
};

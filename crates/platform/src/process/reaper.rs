//! Termination of leftover package-manager processes

use std::ffi::OsStr;
use sysinfo::{ProcessesToUpdate, System};

/// Kills processes left behind by an earlier, interrupted run.
pub trait StaleProcessReaper: Send + Sync {
    /// Kill every process whose name is exactly one of `names`.
    ///
    /// Returns how many processes were signalled. Processes that cannot be
    /// signalled (other owners) are skipped.
    fn terminate_by_name(&self, names: &[&str]) -> usize;
}

/// `sysinfo` backed reaper
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemReaper;

impl StaleProcessReaper for SystemReaper {
    fn terminate_by_name(&self, names: &[&str]) -> usize {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let own_pid = std::process::id();

        let mut count = 0;
        for name in names {
            for process in system.processes_by_exact_name(OsStr::new(name)) {
                if process.pid().as_u32() == own_pid {
                    continue;
                }
                if process.kill() {
                    tracing::info!(name, pid = process.pid().as_u32(), "killed stale process");
                    count += 1;
                }
            }
        }
        count
    }
}

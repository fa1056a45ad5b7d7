//! Command line construction for package-manager invocations

use lunaris_platform::PlatformCommand;
use lunaris_types::InstallMode;

/// `ionice`/`nice` prefix for best-effort, idle priority work
pub const LOW_PRIORITY_PREFIX: [&str; 6] = ["ionice", "-c", "3", "nice", "-n", "19"];

/// Flags handed to `sudo` when a credential is written to stdin
pub const SUDO_STDIN: &str = "-S";
/// Flags handed to `sudo` when no credential is available; fails instead of prompting
pub const SUDO_NON_INTERACTIVE: &str = "-n";

#[must_use]
pub fn sudo_flag(with_credential: bool) -> &'static str {
    if with_credential {
        SUDO_STDIN
    } else {
        SUDO_NON_INTERACTIVE
    }
}

/// Run `cmd` through `sudo`.
#[must_use]
pub fn privileged(cmd: &PlatformCommand, with_credential: bool) -> PlatformCommand {
    cmd.wrapped(&["sudo", sudo_flag(with_credential)])
}

/// Wrap `cmd` in the low priority prefix when enabled.
#[must_use]
pub fn deprioritized(cmd: PlatformCommand, low_priority: bool) -> PlatformCommand {
    if low_priority {
        cmd.wrapped(&LOW_PRIORITY_PREFIX)
    } else {
        cmd
    }
}

/// Set the variables that cap build parallelism and pin the locale.
pub fn limit_build_jobs(cmd: &mut PlatformCommand, jobs: usize) {
    let jobs = jobs.max(1).to_string();
    cmd.env("MAKEFLAGS", format!("-j{jobs}"))
        .env("CARGO_BUILD_JOBS", &jobs)
        .env("RUSTFLAGS", "-Ccodegen-units=1")
        .env("LC_ALL", "C");
}

/// The helper invocation that installs a single package.
#[must_use]
pub fn package_install(
    helper: &str,
    package: &str,
    mode: InstallMode,
    with_credential: bool,
) -> PlatformCommand {
    let mut cmd = PlatformCommand::new(helper);
    cmd.args(["-S", "--needed", "--noconfirm", "--noprogressbar"]);
    if mode == InstallMode::Replace {
        cmd.args(["--overwrite", "*", "--ask", "4"]);
    }
    cmd.args(["--sudoflags", sudo_flag(with_credential)]).arg(package);
    cmd
}

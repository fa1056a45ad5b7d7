//! Command line interface definition

use clap::{Parser, Subcommand};
use lunaris_types::{ColorChoice, HelperKind};
use std::path::PathBuf;

/// lunaris - Hyprland desktop installer for Arch Linux
#[derive(Parser)]
#[command(name = "lunaris")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hyprland desktop installer for Arch Linux")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Write JSON debug logs to the state directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Install the helper, the package set and the desktop configuration
    #[command(alias = "i")]
    Install(InstallArgs),

    /// Show the optional applications that can be selected
    Catalog,
}

#[derive(clap::Args, Default)]
pub struct InstallArgs {
    /// AUR helper to bootstrap and install packages with
    #[arg(long, value_enum)]
    pub helper: Option<HelperKind>,

    /// Catalog option to install (repeatable, replaces the defaults)
    #[arg(short, long = "select", value_name = "OPTION")]
    pub select: Vec<String>,

    /// Additional package to install (repeatable)
    #[arg(short, long = "package", value_name = "PKG")]
    pub package: Vec<String>,

    /// Do not install the base desktop package set
    #[arg(long)]
    pub no_base: bool,

    /// Install the configuration files without asking
    #[arg(long)]
    pub yes_dotfiles: bool,

    /// Back up existing configuration without asking
    #[arg(long)]
    pub yes_backup: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_flags_repeat() {
        let cli = Cli::try_parse_from([
            "lunaris", "install", "--helper", "paru", "-s", "kitty", "-s", "fish", "-p", "htop",
            "--no-base",
        ])
        .unwrap();

        let Commands::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.helper, Some(HelperKind::Paru));
        assert_eq!(args.select, ["kitty", "fish"]);
        assert_eq!(args.package, ["htop"]);
        assert!(args.no_base);
        assert!(!args.yes_dotfiles);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["lunaris", "catalog", "--color", "never", "--debug"]).unwrap();
        assert!(matches!(cli.command, Commands::Catalog));
        assert_eq!(cli.global.color, Some(ColorChoice::Never));
        assert!(cli.global.debug);
    }

    #[test]
    fn unknown_helper_is_rejected() {
        assert!(Cli::try_parse_from(["lunaris", "install", "--helper", "pikaur"]).is_err());
    }
}

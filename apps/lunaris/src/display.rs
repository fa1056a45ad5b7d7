//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use lunaris_config::catalog::{PackageCategory, BASE_PACKAGES};
use lunaris_ops::SessionReport;
use lunaris_types::ColorChoice;

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Color configuration
    color_choice: ColorChoice,
    /// Terminal instance
    term: Term,
}

impl OutputRenderer {
    pub fn new(color_choice: ColorChoice) -> Self {
        Self {
            color_choice,
            term: Term::stdout(),
        }
    }

    /// Render the catalog, marking the options that would be installed
    pub fn render_catalog(&self, categories: &[PackageCategory], selected: &[String]) {
        println!(
            "{} base packages are always installed.",
            BASE_PACKAGES.len()
        );
        println!();
        println!("{}", catalog_table(categories, selected, self.supports_color()));
        println!();
        println!("Select options with `lunaris install --select <option>`.");
    }

    /// Render the summary of a finished session
    pub fn render_report(&self, report: &SessionReport) {
        println!();
        let headline = if report.is_success() {
            self.styled(Style::new().green().bold(), "Installation complete")
        } else if report.is_cancelled() {
            self.styled(Style::new().yellow().bold(), "Installation cancelled")
        } else {
            self.styled(Style::new().red().bold(), "Installation failed")
        };
        println!(
            "{headline} ({}/{} steps, {:.1}s)",
            report.progress,
            report.total,
            report.duration_ms as f64 / 1000.0
        );

        print_group("Installed", &report.installed);
        print_group("Already installed", &report.already_installed);
        print_group("Skipped after a conflict", &report.skipped);

        if !report.failed.is_empty() {
            println!("Failed ({}):", report.failed.len());
            for failure in &report.failed {
                println!("  • {}: {}", self.style_package_name(&failure.package), failure.message);
            }
        }

        if let Some(dir) = &report.backup_dir {
            println!("Previous configuration saved to {dir}");
        }
        if report.dotfiles_installed {
            println!("Desktop configuration installed. Log out and pick Hyprland to start it.");
        }
        if let Some(error) = &report.error {
            println!("Error: {error}");
        }
    }

    fn style_package_name(&self, name: &str) -> String {
        self.styled(Style::new().bold(), name)
    }

    fn styled(&self, style: Style, text: &str) -> String {
        if self.supports_color() {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Check if color output is supported
    fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

fn print_group(title: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    println!("{title} ({}):", names.len());
    println!("  {}", names.join(" "));
}

fn catalog_table(categories: &[PackageCategory], selected: &[String], color: bool) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    if !color {
        table.force_no_tty();
    }

    table.set_header(vec![
        Cell::new("Category").add_attribute(Attribute::Bold),
        Cell::new("Option").add_attribute(Attribute::Bold),
        Cell::new("Description").add_attribute(Attribute::Bold),
        Cell::new("Packages").add_attribute(Attribute::Bold),
        Cell::new("Selected").add_attribute(Attribute::Bold),
    ]);

    for category in categories {
        for option in category.options {
            let chosen = if selected.is_empty() {
                option.default
            } else {
                selected.iter().any(|id| id.eq_ignore_ascii_case(option.id))
            };
            let marker = if chosen {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("")
            };
            table.add_row(vec![
                Cell::new(category.name),
                Cell::new(option.id),
                Cell::new(option.description),
                Cell::new(option.packages.join(" ")),
                marker,
            ]);
        }
    }
    table
}

//! Terminal output: colour control, spinners and result formatting.
//!
//! Colour follows the NO_COLOR standard (https://no-color.org/) and the
//! CLICOLOR conventions:
//!
//! - `NO_COLOR` set to anything disables colour
//! - `CLICOLOR_FORCE` set to non-zero forces colour even without a TTY
//! - `CLICOLOR=0` disables colour
//!
//! Otherwise colour is used only when stdout is a terminal.

use crate::api::PackageInfo;
use crate::database::Classification;
use colored::{ColoredString, Colorize, control};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const DEFAULT_WIDTH: usize = 80;
const INDENT: &str = "    ";

/// Decide whether to emit colour. Call once at startup.
pub fn init_colors() {
    control::set_override(color_enabled(
        |key| std::env::var(key).ok(),
        std::io::IsTerminal::is_terminal(&std::io::stdout()),
    ));
}

fn color_enabled(lookup: impl Fn(&str) -> Option<String>, is_tty: bool) -> bool {
    if lookup("NO_COLOR").is_some() {
        return false;
    }
    if lookup("CLICOLOR_FORCE").is_some_and(|v| v != "0") {
        return true;
    }
    if lookup("CLICOLOR").is_some_and(|v| v == "0") {
        return false;
    }
    is_tty
}

pub fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

/// Spinner on a TTY, hidden otherwise.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    if !is_tty() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn terminal_width() -> usize {
    term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(DEFAULT_WIDTH)
}

/// `aur/<name> <version> (<votes>)` followed by the indented description.
pub fn format_search_result(pkg: &PackageInfo, width: usize) -> String {
    let mut out = format!(
        "{}{} {} ({})",
        "aur/".magenta().bold(),
        pkg.name.bold(),
        version_text(pkg),
        pkg.num_votes
    );
    if let Some(desc) = pkg.description.as_deref().filter(|d| !d.is_empty()) {
        for line in wrap(desc, width.saturating_sub(INDENT.len()).max(20)) {
            out.push('\n');
            out.push_str(INDENT);
            out.push_str(&line);
        }
    }
    out
}

fn version_text(pkg: &PackageInfo) -> ColoredString {
    if pkg.out_of_date.is_some() {
        format!("{} [out of date]", pkg.version).red().bold()
    } else {
        pkg.version.green().bold()
    }
}

/// Greedy word wrap.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

pub fn print_search_results(results: &[PackageInfo], quiet: bool) {
    let width = terminal_width();
    for pkg in results {
        if quiet {
            println!("{}", pkg.name);
        } else {
            println!("{}", format_search_result(pkg, width));
        }
    }
}

pub fn print_info(pkg: &PackageInfo) {
    let field = |label: &str, value: &str| {
        println!("{:<16}: {}", label.bold(), value);
    };
    let list = |values: &[String]| {
        if values.is_empty() {
            "None".to_string()
        } else {
            values.join("  ")
        }
    };

    field("Repository", "aur");
    field("Name", &pkg.name);
    if let Some(base) = pkg.package_base.as_deref().filter(|b| *b != pkg.name) {
        field("Package Base", base);
    }
    field("Version", &pkg.version);
    field("Description", pkg.description.as_deref().unwrap_or("None"));
    field("URL", pkg.url.as_deref().unwrap_or("None"));
    field("Provides", &list(&pkg.provides));
    field("Depends On", &list(&pkg.depends));
    field("Make Deps", &list(&pkg.make_depends));
    field("Maintainer", pkg.maintainer.as_deref().unwrap_or("None"));
    field("Votes", &pkg.num_votes.to_string());
    field("Popularity", &format!("{:.2}", pkg.popularity));
    field("Out Of Date", &format_timestamp(pkg.out_of_date).unwrap_or_else(|| "No".to_string()));
    field("Last Modified", &format_timestamp(pkg.last_modified).unwrap_or_else(|| "Unknown".to_string()));
}

/// Render a unix timestamp as UTC `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(timestamp: Option<i64>) -> Option<String> {
    timestamp
        .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// One line of the `deps` listing.
pub fn format_dependency(name: &str, class: &Classification) -> String {
    let label = match class {
        Classification::Installed => class.label().green(),
        Classification::Repo { .. } => class.label().cyan(),
        Classification::External => class.label().yellow().bold(),
    };
    match class.alias() {
        Some(alias) => format!("{:<24} {} ({})", name, label, alias.dimmed()),
        None => format!("{:<24} {}", name, label),
    }
}

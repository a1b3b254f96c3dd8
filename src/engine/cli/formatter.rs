//! CLI Output Formatting Module
//! Colorized terminal output for the rbac CLI

use colored::Colorize;

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a denial
    pub fn denied(message: &str) {
        println!("{} {}", "✗".red().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a list item
    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Print a list of names, or a placeholder when empty
    pub fn names<'a>(names: impl IntoIterator<Item = &'a String>) {
        let mut any = false;
        for name in names {
            Self::item(name);
            any = true;
        }
        if !any {
            println!("  {}", "(none)".bright_black());
        }
    }
}

/// Item line: name plus description when present
pub fn describe(name: &str, description: &str) -> String {
    if description.is_empty() {
        name.to_string()
    } else {
        format!("{} - {}", name, description)
    }
}

//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;

use crate::engine::rbac::{AccessMask, Action, ActionFlags};

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

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(rule_width(&[title])).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Print a list item
    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Print a table header
    pub fn table_header(columns: &[&str]) {
        let header = columns
            .iter()
            .map(|c| c.bright_white().bold().to_string())
            .collect::<Vec<_>>()
            .join(" │ ");
        println!("  {}", header);
        println!("  {}", "─".repeat(rule_width(columns)).bright_black());
    }

    /// Print a table row
    pub fn table_row(values: &[&str]) {
        println!("  {}", values.join(" │ "));
    }

    /// Print an empty line
    pub fn blank() {
        println!();
    }
}

/// Width in characters of `columns` joined by ` │ `
fn rule_width(columns: &[&str]) -> usize {
    let separators = 3 * columns.len().saturating_sub(1);
    columns.iter().map(|c| c.chars().count()).sum::<usize>() + separators
}

/// Compact `rcud` rendering, with `-` for a missing action
pub fn format_mask(mask: AccessMask) -> String {
    Action::ALL
        .into_iter()
        .map(|action| {
            if mask.contains(action) {
                action.name().chars().next().unwrap_or('?')
            } else {
                '-'
            }
        })
        .collect()
}

pub fn format_flags(flags: &ActionFlags) -> String {
    format_mask(flags.to_mask())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mask() {
        assert_eq!(format_mask(AccessMask::ALL), "rcud");
        assert_eq!(format_mask(AccessMask::EMPTY), "----");
        assert_eq!(format_mask(AccessMask::from_bits(5).unwrap()), "r-u-");
    }

    #[test]
    fn test_format_flags() {
        let flags = ActionFlags {
            read: false,
            create: true,
            update: false,
            delete: true,
        };
        assert_eq!(format_flags(&flags), "-c-d");
    }

    #[test]
    fn test_rule_width_matches_joined_row() {
        assert_eq!(rule_width(&[]), 0);
        assert_eq!(rule_width(&["Roles"]), 5);

        let columns = ["ID", "Name", "Módulo"];
        assert_eq!(rule_width(&columns), columns.join(" │ ").chars().count());
    }
}

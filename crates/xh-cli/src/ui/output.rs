//! Status lines for commands.
//!
//! Informational lines go to stdout. Warnings and errors go to stderr so
//! that machine-readable output (`xh nodes --json`) stays parseable.

use super::theme::Theme;
use crossterm::style::Stylize;

/// Prints themed status messages.
#[derive(Debug, Clone, Default)]
pub struct Output {
    theme: Theme,
    quiet: bool,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress info and success lines, keeping warnings and errors.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    /// Prints a visual section header for an operation phase.
    pub fn section(&self, title: &str) {
        if self.quiet {
            return;
        }
        println!();
        println!("  {}", title.bold());
    }

    /// Prints an informational message to the console.
    pub fn info(&self, msg: &str) {
        if self.quiet {
            return;
        }
        println!(
            "  {} {}",
            self.theme.icons.info.with(self.theme.colors.secondary),
            msg
        );
    }

    /// Prints a success message to the console.
    pub fn success(&self, msg: &str) {
        if self.quiet {
            return;
        }
        println!(
            "  {} {}",
            self.theme.icons.success.with(self.theme.colors.success),
            msg
        );
    }

    /// Prints a warning message to stderr.
    pub fn warning(&self, msg: &str) {
        eprintln!(
            "  {} {}",
            self.theme.icons.warning.with(self.theme.colors.warning),
            msg
        );
    }

    /// Prints an error message to stderr.
    pub fn error(&self, msg: &str) {
        eprintln!(
            "  {} {}",
            self.theme.icons.error.with(self.theme.colors.error),
            msg
        );
    }
}

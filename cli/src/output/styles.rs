//! Output styles using owo-colors stylesheet pattern

use owo_colors::Style;

/// Centralized stylesheet for CLI output colors.
#[derive(Default, Clone)]
pub struct Styles {
    /// Success messages and running workers (green)
    pub success: Style,
    /// Error messages and failed workers (red)
    pub error: Style,
    /// Dimmed/secondary text, table borders and stopped workers
    pub dim: Style,
    /// Table headers
    pub header: Style,
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.error = Style::new().red();
        self.dim = Style::new().dimmed();
        self.header = Style::new().bold().cyan();
    }

    /// Style for a value of the `status` column.
    #[must_use]
    pub fn status(&self, status: &str) -> Style {
        match status {
            "running" => self.success,
            "error" => self.error,
            _ => self.dim,
        }
    }
}

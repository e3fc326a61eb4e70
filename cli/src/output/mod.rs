//! Output formatting module

pub mod json;
pub mod styles;
pub mod table;

use console::Term;
use owo_colors::OwoColorize as _;
pub use styles::Styles;
use vbmc_common::Response;

use crate::client::ClientError;

/// Output context carrying styling and terminal state.
pub struct OutputContext {
    /// Stylesheet for colored output.
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress non-error output.
    pub quiet: bool,
}

impl OutputContext {
    /// Create output context based on CLI flags and environment.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let use_colors = !no_color && is_tty && std::env::var("NO_COLOR").is_err();

        let mut styles = Styles::default();
        if use_colors {
            styles.colorize();
        }

        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Human-readable text for a successful response, if it has any.
    #[must_use]
    pub fn render(&self, response: &Response) -> Option<String> {
        if let (Some(header), Some(rows)) = (&response.header, &response.rows) {
            return Some(table::render(header, rows, &self.styles));
        }
        let msg = response.message();
        (!msg.is_empty()).then_some(msg)
    }

    /// Print a successful response. Suppressed when `quiet`.
    pub fn response(&self, response: &Response) {
        if self.quiet {
            return;
        }
        if let Some(text) = self.render(response) {
            println!("{text}");
        }
    }

    /// Print an error message prefixed with `✗` to stderr. Never suppressed.
    pub fn error(&self, msg: &str) {
        eprintln!("{} {msg}", "✗".style(self.styles.error));
    }

    /// Print the response document as JSON. Never suppressed.
    pub fn json_response(&self, response: &Response) {
        match json::format_response(response) {
            Ok(text) => println!("{text}"),
            Err(e) => self.error(&format!("{e:#}")),
        }
    }

    /// Print a client failure as a JSON error object. Never suppressed.
    pub fn json_error(&self, error: &ClientError) {
        match json::format_error(error) {
            Ok(text) => println!("{text}"),
            Err(e) => self.error(&format!("{e:#}")),
        }
    }
}

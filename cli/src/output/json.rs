//! JSON output helpers for `--json`.

use anyhow::{Context, Result};
use vbmc_common::Response;

use crate::client::ClientError;

/// The response document exactly as vbmcd sent it, pretty-printed.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_response(response: &Response) -> Result<String> {
    serde_json::to_string_pretty(response).context("JSON serialization failed")
}

/// Error object for failures that produced no response document.
///
/// ```json
/// { "error": true, "message": "...", "code": "connect" }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(error: &ClientError) -> Result<String> {
    let code = match error {
        ClientError::Connect { .. } => "connect",
        ClientError::Timeout { .. } => "timeout",
        ClientError::Decode(_) => "decode",
        ClientError::Server { .. } => "server",
    };
    let obj = serde_json::json!({
        "error": true,
        "message": error.to_string(),
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

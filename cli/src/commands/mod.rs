//! Command execution: send the request, render the response.

mod add;

pub use add::AddArgs;
use vbmc_common::Request;

use crate::client::{Transport, check};
use crate::output::OutputContext;

/// Run one request and return the process exit code.
///
/// A response's `rc` becomes the exit code verbatim; failures that never
/// produced a response exit with 1.
pub async fn run<T: Transport>(ctx: &OutputContext, transport: &T, request: Request, json: bool) -> i32 {
    let result = transport.exchange(&request).await;
    if json {
        return match result {
            Ok(response) => {
                ctx.json_response(&response);
                response.rc
            }
            Err(e) => {
                ctx.json_error(&e);
                e.exit_code()
            }
        };
    }
    match result.and_then(check) {
        Ok(response) => {
            ctx.response(&response);
            0
        }
        Err(e) => {
            ctx.error(&e.to_string());
            e.exit_code()
        }
    }
}

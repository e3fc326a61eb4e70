//! Exit codes of command execution.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::time::Duration;

use vbmc_cli::client::{ClientError, Transport};
use vbmc_cli::commands;
use vbmc_cli::output::{OutputContext, Styles};
use vbmc_common::{Request, Response};

/// Replies with a canned result and records what it was sent.
struct Canned {
    reply: fn() -> Result<Response, ClientError>,
    sent: RefCell<Vec<Request>>,
}

impl Canned {
    fn new(reply: fn() -> Result<Response, ClientError>) -> Self {
        Self {
            reply,
            sent: RefCell::new(Vec::new()),
        }
    }
}

impl Transport for Canned {
    async fn exchange(&self, request: &Request) -> Result<Response, ClientError> {
        self.sent.borrow_mut().push(request.clone());
        (self.reply)()
    }
}

fn addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50891))
}

fn quiet() -> OutputContext {
    OutputContext {
        styles: Styles::default(),
        is_tty: false,
        quiet: true,
    }
}

#[tokio::test]
async fn success_exits_zero() {
    let t = Canned::new(|| Ok(Response::ok()));
    assert_eq!(commands::run(&quiet(), &t, Request::List, false).await, 0);
    assert_eq!(*t.sent.borrow(), vec![Request::List]);
}

#[tokio::test]
async fn server_rc_is_the_exit_code() {
    let t = Canned::new(|| Ok(Response::error(2, "BMC instance 'bmc9' not found")));
    let req = Request::Show { name: "bmc9".into() };
    assert_eq!(commands::run(&quiet(), &t, req, false).await, 2);
}

#[tokio::test]
async fn json_mode_keeps_the_rc() {
    let t = Canned::new(|| Ok(Response::errors(3, vec!["BMC instance 'a' already exists".into()])));
    assert_eq!(commands::run(&quiet(), &t, Request::List, true).await, 3);
}

#[tokio::test]
async fn connectivity_failures_exit_one() {
    let t = Canned::new(|| {
        Err(ClientError::Connect {
            addr: addr(),
            reason: "connection refused".into(),
        })
    });
    assert_eq!(commands::run(&quiet(), &t, Request::List, false).await, 1);

    let t = Canned::new(|| {
        Err(ClientError::Timeout {
            addr: addr(),
            timeout: Duration::from_secs(10),
        })
    });
    assert_eq!(commands::run(&quiet(), &t, Request::List, true).await, 1);
}

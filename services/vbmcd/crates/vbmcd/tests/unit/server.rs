//! RPC server: request dispatch and the one-exchange-per-connection framing.

#![allow(clippy::expect_used)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use vbmc_common::{Message, Request, Response};
use vbmcd::infra::store::IniConfigStore;
use vbmcd::server::{LIST_HEADER, Server, ServerSettings};

use crate::mocks::{FakeProbe, FakeSpawner, TestSupervisor, hypervisor, supervisor};

fn settings(show_passwords: bool) -> ServerSettings {
    ServerSettings {
        read_timeout: Duration::from_secs(2),
        reconcile_interval: Duration::from_secs(3600),
        show_passwords,
    }
}

type TestServer = Server<IniConfigStore, FakeSpawner, FakeProbe>;

fn server(show_passwords: bool) -> (TestServer, FakeSpawner, tempfile::TempDir) {
    let (sup, spawner, dir): (TestSupervisor, _, _) = supervisor(FakeProbe::default());
    (Server::new(sup, settings(show_passwords)), spawner, dir)
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

fn cell<'a>(rsp: &'a Response, property: &str) -> Option<&'a str> {
    rsp.rows
        .as_ref()?
        .iter()
        .find(|row| row[0] == property)
        .map(|row| row[1].as_str())
}

// ── dispatch ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_on_empty_store_is_an_empty_table() {
    let (mut srv, _spawner, _dir) = server(false);
    let rsp = srv.handle(Request::List).await;
    assert_eq!(rsp.rc, 0);
    assert_eq!(rsp.header, Some(names(&LIST_HEADER)));
    assert_eq!(rsp.rows, Some(Vec::new()));
}

#[tokio::test]
async fn show_unknown_name_is_not_found() {
    let (mut srv, _spawner, _dir) = server(false);
    let rsp = srv.handle(Request::Show { name: "bmc9".into() }).await;
    assert_eq!(rsp.rc, 2);
    assert!(rsp.message().contains("not found"), "got: {}", rsp.message());
}

#[tokio::test]
async fn malformed_names_are_not_found_outside_add() {
    let (mut srv, _spawner, _dir) = server(false);
    let rsp = srv.handle(Request::Show { name: "a b".into() }).await;
    assert_eq!(rsp.rc, 2, "got: {}", rsp.message());
    let rsp = srv.handle(Request::Stop { names: names(&["a b"]) }).await;
    assert_eq!(rsp.rc, 2, "got: {}", rsp.message());
}

#[tokio::test]
async fn show_masks_passwords_unless_configured() {
    let (mut srv, _spawner, _dir) = server(false);
    assert!(srv.handle(Request::Add(hypervisor("bmc1"))).await.is_ok());
    let rsp = srv.handle(Request::Show { name: "bmc1".into() }).await;
    assert_eq!(cell(&rsp, "password"), Some("***"));
    assert_eq!(cell(&rsp, "status"), Some("down"));
    assert_eq!(cell(&rsp, "enabled"), Some("false"));

    let (mut srv, _spawner, _dir) = server(true);
    assert!(srv.handle(Request::Add(hypervisor("bmc1"))).await.is_ok());
    let rsp = srv.handle(Request::Show { name: "bmc1".into() }).await;
    assert_eq!(cell(&rsp, "password"), Some("password"));
}

#[tokio::test]
async fn multi_name_start_attempts_every_name() {
    let (mut srv, spawner, _dir) = server(false);
    for name in ["a", "b"] {
        assert!(srv.handle(Request::Add(hypervisor(name))).await.is_ok());
    }
    let rsp = srv
        .handle(Request::Start {
            names: names(&["a", "ghost", "b"]),
        })
        .await;
    assert_eq!(rsp.rc, 2);
    let Some(Message::Lines(lines)) = &rsp.msg else {
        panic!("expected one line per failure, got {:?}", rsp.msg);
    };
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("ghost"));
    assert_eq!(spawner.live("a"), 1);
    assert_eq!(spawner.live("b"), 1);
}

#[tokio::test]
async fn multi_name_needs_a_name() {
    let (mut srv, _spawner, _dir) = server(false);
    let rsp = srv.handle(Request::Stop { names: Vec::new() }).await;
    assert_eq!(rsp.rc, 4);
}

#[tokio::test]
async fn undecodable_requests_get_an_error_response() {
    let (mut srv, _spawner, _dir) = server(false);
    let rsp = srv.handle_bytes(br#"{"command":"reboot"}"#).await;
    assert_ne!(rsp.rc, 0);
    assert!(rsp.message().contains("reboot"));

    let rsp = srv.handle_bytes(b"\xff\xfe").await;
    assert_ne!(rsp.rc, 0);
}

#[tokio::test]
async fn add_with_unknown_backend_type_is_a_validation_error() {
    let (mut srv, _spawner, _dir) = server(false);
    let rsp = srv
        .handle_bytes(br#"{"command":"add","name":"bmc1","backend_type":"vmware"}"#)
        .await;
    assert_eq!(rsp.rc, 4, "got: {}", rsp.message());
}

// ── framing ───────────────────────────────────────────────────────────────────

async fn exchange(addr: SocketAddr, request: &[u8]) -> Response {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request).await.expect("write");
    stream.shutdown().await.expect("half-close");
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.expect("read");
    Response::decode(&buf).expect("decode")
}

/// Run `client` against a live server; the server drains once it returns.
async fn with_server<F, Fut>(srv: TestServer, client: F)
where
    F: FnOnce(SocketAddr) -> Fut,
    Fut: Future<Output = ()>,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    srv.run(listener, client(addr)).await.expect("server");
}

#[tokio::test]
async fn one_request_per_connection_over_tcp() {
    let (srv, spawner, _dir) = server(false);
    with_server(srv, |addr| async move {
        let add = Request::Add(hypervisor("bmc1")).encode().expect("encode");
        assert!(exchange(addr, &add).await.is_ok());

        let start = Request::Start { names: names(&["bmc1"]) }.encode().expect("encode");
        assert!(exchange(addr, &start).await.is_ok());

        let list = exchange(addr, &Request::List.encode().expect("encode")).await;
        let rows = list.rows.expect("rows");
        assert_eq!(rows, vec![names(&["bmc1", "running", "hypervisor", "127.0.0.1", "1623"])]);

        let garbage = exchange(addr, b"not json").await;
        assert_ne!(garbage.rc, 0);
    })
    .await;
    // the shutdown sweep drains workers
    assert_eq!(spawner.live("bmc1"), 0);
}

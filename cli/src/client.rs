//! RPC client: one TCP connection per command.
//!
//! The request is written and the write side half-closed; the response is
//! read until the server closes the connection.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use vbmc_common::rpc::MAX_MESSAGE_BYTES;
use vbmc_common::{Request, Response};

/// Why an exchange with vbmcd failed.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to vbmcd at {addr}: {reason}")]
    Connect { addr: SocketAddr, reason: String },

    #[error("vbmcd at {addr} did not respond within {}s", .timeout.as_secs_f32())]
    Timeout { addr: SocketAddr, timeout: Duration },

    #[error("cannot decode vbmcd response: {0}")]
    Decode(String),

    #[error("({rc}): {msg}")]
    Server { rc: i32, msg: String },
}

impl ClientError {
    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Server { rc, .. } => *rc,
            _ => 1,
        }
    }
}

/// Sends one request and waits for its response.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// # Errors
    ///
    /// Connection, timeout and decoding failures. A response with a non-zero
    /// `rc` is returned as `Ok`.
    async fn exchange(&self, request: &Request) -> Result<Response, ClientError>;
}

/// [`Transport`] over TCP.
#[derive(Debug, Clone, Copy)]
pub struct RpcClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl RpcClient {
    #[must_use]
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn connect_error(&self, reason: impl ToString) -> ClientError {
        ClientError::Connect {
            addr: self.addr,
            reason: reason.to_string(),
        }
    }

    async fn round_trip(&self, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| self.connect_error(e))?;
        stream
            .write_all(payload)
            .await
            .map_err(|e| self.connect_error(e))?;
        stream.shutdown().await.map_err(|e| self.connect_error(e))?;

        let mut buf = Vec::new();
        (&mut stream)
            .take(MAX_MESSAGE_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| self.connect_error(e))?;
        Ok(buf)
    }
}

impl Transport for RpcClient {
    async fn exchange(&self, request: &Request) -> Result<Response, ClientError> {
        let payload = request
            .encode()
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let bytes = tokio::time::timeout(self.timeout, self.round_trip(&payload))
            .await
            .map_err(|_| ClientError::Timeout {
                addr: self.addr,
                timeout: self.timeout,
            })??;
        Response::decode(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Turn a non-zero `rc` into [`ClientError::Server`].
///
/// # Errors
///
/// Returns `Server` when the response reports failure.
pub fn check(response: Response) -> Result<Response, ClientError> {
    if response.is_ok() {
        Ok(response)
    } else {
        Err(ClientError::Server {
            rc: response.rc,
            msg: response.message(),
        })
    }
}

//! IPMI v1.5 LAN framing: RMCP header, session header and the IPMI message.
//!
//! ```text
//! RMCP     | 06 00 ff 07 |
//! session  | auth_type | seq (LE u32) | session id (LE u32) | [auth code 16] | len |
//! message  | rsAddr | netFn/lun | chk1 | rqAddr | seq/lun | cmd | data.. | chk2 |
//! ```

use thiserror::Error;

const RMCP_VERSION: u8 = 0x06;
const RMCP_NO_ACK: u8 = 0xff;
const RMCP_CLASS_IPMI: u8 = 0x07;

/// Length of the authentication code field.
pub const AUTH_CODE_LEN: usize = 16;

/// Session authentication types.
pub const AUTH_NONE: u8 = 0x00;
pub const AUTH_STRAIGHT_PASSWORD: u8 = 0x04;

/// Network function codes (requests; responses are `+1`).
pub const NETFN_CHASSIS: u8 = 0x00;
pub const NETFN_APP: u8 = 0x06;

/// Slave address of the BMC.
pub const BMC_ADDR: u8 = 0x20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet truncated at {0}")]
    Truncated(&'static str),

    #[error("not an IPMI RMCP packet")]
    NotIpmi,

    #[error("unsupported authentication type {0:#04x}")]
    UnsupportedAuth(u8),

    #[error("bad {0} checksum")]
    Checksum(&'static str),
}

/// Two's complement checksum: the covered bytes plus the checksum sum to zero.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    0u8.wrapping_sub(bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)))
}

/// IPMI v1.5 session header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHeader {
    pub auth_type: u8,
    pub sequence: u32,
    pub session_id: u32,
    pub auth_code: Option<[u8; AUTH_CODE_LEN]>,
}

impl SessionHeader {
    /// Header of a message sent outside any session.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self {
            auth_type: AUTH_NONE,
            sequence: 0,
            session_id: 0,
            auth_code: None,
        }
    }
}

/// A decoded IPMI request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub session: SessionHeader,
    pub rs_addr: u8,
    pub net_fn: u8,
    pub rs_lun: u8,
    pub rq_addr: u8,
    pub rq_seq: u8,
    pub rq_lun: u8,
    pub cmd: u8,
    pub data: Vec<u8>,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated(what))?;
        let bytes = self.buf.get(self.pos..end).ok_or(CodecError::Truncated(what))?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, what)?[0])
    }

    fn u32_le(&mut self, what: &'static str) -> Result<u32, CodecError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Decode one RMCP/IPMI v1.5 request packet.
///
/// # Errors
///
/// Returns [`CodecError`] for anything that is not a well-formed request.
pub fn decode(packet: &[u8]) -> Result<Request, CodecError> {
    let mut r = Reader { buf: packet, pos: 0 };
    let rmcp = r.take(4, "rmcp header")?;
    if rmcp[0] != RMCP_VERSION || rmcp[2] != RMCP_NO_ACK || rmcp[3] != RMCP_CLASS_IPMI {
        return Err(CodecError::NotIpmi);
    }

    let auth_type = r.u8("auth type")?;
    let sequence = r.u32_le("session sequence")?;
    let session_id = r.u32_le("session id")?;
    let auth_code = match auth_type {
        AUTH_NONE => None,
        AUTH_STRAIGHT_PASSWORD => {
            let mut code = [0u8; AUTH_CODE_LEN];
            code.copy_from_slice(r.take(AUTH_CODE_LEN, "auth code")?);
            Some(code)
        }
        other => return Err(CodecError::UnsupportedAuth(other)),
    };
    let len = usize::from(r.u8("message length")?);
    if len < 7 {
        return Err(CodecError::Truncated("message"));
    }
    let msg = r.take(len, "message")?;

    if checksum(&msg[..2]) != msg[2] {
        return Err(CodecError::Checksum("header"));
    }
    if checksum(&msg[3..len - 1]) != msg[len - 1] {
        return Err(CodecError::Checksum("body"));
    }

    Ok(Request {
        session: SessionHeader {
            auth_type,
            sequence,
            session_id,
            auth_code,
        },
        rs_addr: msg[0],
        net_fn: msg[1] >> 2,
        rs_lun: msg[1] & 0x03,
        rq_addr: msg[3],
        rq_seq: msg[4] >> 2,
        rq_lun: msg[4] & 0x03,
        cmd: msg[5],
        data: msg[6..len - 1].to_vec(),
    })
}

/// Encode the response to `request` under `session`.
#[must_use]
pub fn encode_response(
    request: &Request,
    session: &SessionHeader,
    completion: u8,
    data: &[u8],
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + data.len());
    msg.push(request.rq_addr);
    msg.push(((request.net_fn | 1) << 2) | request.rq_lun);
    msg.push(checksum(&msg[..2]));
    msg.push(request.rs_addr);
    msg.push((request.rq_seq << 2) | request.rs_lun);
    msg.push(request.cmd);
    msg.push(completion);
    msg.extend_from_slice(data);
    msg.push(checksum(&msg[3..]));

    let mut out = Vec::with_capacity(30 + msg.len());
    out.extend_from_slice(&[RMCP_VERSION, 0x00, RMCP_NO_ACK, RMCP_CLASS_IPMI]);
    out.push(session.auth_type);
    out.extend_from_slice(&session.sequence.to_le_bytes());
    out.extend_from_slice(&session.session_id.to_le_bytes());
    if let Some(code) = session.auth_code {
        out.extend_from_slice(&code);
    }
    // Message length is a single byte; responses built here stay well below it.
    out.push(u8::try_from(msg.len()).unwrap_or(u8::MAX));
    out.extend_from_slice(&msg);
    out
}

/// Pad or truncate a credential to the fixed 16-byte field.
#[must_use]
pub fn pad16(value: &str) -> [u8; AUTH_CODE_LEN] {
    let mut out = [0u8; AUTH_CODE_LEN];
    for (dst, src) in out.iter_mut().zip(value.as_bytes()) {
        *dst = *src;
    }
    out
}

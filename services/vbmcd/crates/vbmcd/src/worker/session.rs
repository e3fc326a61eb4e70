//! IPMI v1.5 session establishment with straight-password authentication.
//!
//! A console asks for a challenge under its username, then activates a
//! session by echoing the challenge with the password as the auth code.
//! Every later request must carry the session id and the same auth code.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};

use super::ipmi::{AUTH_CODE_LEN, AUTH_STRAIGHT_PASSWORD, SessionHeader, pad16};

/// Completion codes used by session commands.
pub mod cc {
    pub const OK: u8 = 0x00;
    pub const INVALID_USERNAME: u8 = 0x81;
    pub const INVALID_SESSION_ID: u8 = 0x87;
    pub const OUT_OF_RANGE: u8 = 0xC9;
    pub const INVALID_DATA: u8 = 0xCC;
    pub const INSUFFICIENT_PRIVILEGE: u8 = 0xD4;
}

/// Highest privilege level granted (administrator).
pub const MAX_PRIVILEGE: u8 = 0x04;

/// Channel the LAN interface reports itself on.
const LAN_CHANNEL: u8 = 0x01;

/// Outstanding challenges kept at once; the oldest is evicted past this.
pub const MAX_CHALLENGES: usize = 64;

/// Result of a session command: completion code plus response data.
pub type Reply = (u8, Vec<u8>);

#[derive(Debug)]
struct Challenge {
    bytes: [u8; AUTH_CODE_LEN],
    issued: Instant,
    serial: u64,
}

#[derive(Debug)]
struct Session {
    privilege: u8,
    outbound_seq: u32,
    last_seen: Instant,
}

/// Sessions and outstanding challenges of one worker.
pub struct SessionTable {
    username: [u8; AUTH_CODE_LEN],
    password: [u8; AUTH_CODE_LEN],
    timeout: Duration,
    challenges: HashMap<u32, Challenge>,
    challenge_serial: u64,
    sessions: HashMap<u32, Session>,
}

impl SessionTable {
    pub fn new(username: &str, password: &str, timeout: Duration) -> Self {
        Self {
            username: pad16(username),
            password: pad16(password),
            timeout,
            challenges: HashMap::new(),
            challenge_serial: 0,
            sessions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn pending_challenges(&self) -> usize {
        self.challenges.len()
    }

    /// Get Channel Authentication Capabilities.
    #[must_use]
    pub fn auth_capabilities(data: &[u8]) -> Reply {
        let channel = match data.first().map(|c| c & 0x0f) {
            None | Some(0x0e) => LAN_CHANNEL,
            Some(c) => c,
        };
        // straight password only; per-message auth enabled; no OEM id
        (
            cc::OK,
            vec![channel, 1 << AUTH_STRAIGHT_PASSWORD, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00],
        )
    }

    /// Get Session Challenge: `[auth type, username(16)]`.
    pub fn challenge(&mut self, data: &[u8]) -> Reply {
        if data.len() < 1 + AUTH_CODE_LEN || data[0] != AUTH_STRAIGHT_PASSWORD {
            return (cc::INVALID_DATA, Vec::new());
        }
        if data[1..=AUTH_CODE_LEN] != self.username {
            debug!("session challenge for unknown user");
            return (cc::INVALID_USERNAME, Vec::new());
        }
        let mut rng = rand::rng();
        let id = loop {
            let id: u32 = rng.random();
            if id != 0 && !self.challenges.contains_key(&id) && !self.sessions.contains_key(&id) {
                break id;
            }
        };
        let mut bytes = [0u8; AUTH_CODE_LEN];
        rng.fill(&mut bytes);
        if self.challenges.len() >= MAX_CHALLENGES {
            let oldest = self.challenges.iter().min_by_key(|(_, c)| c.serial).map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                self.challenges.remove(&oldest);
            }
        }
        self.challenge_serial += 1;
        self.challenges.insert(
            id,
            Challenge {
                bytes,
                issued: Instant::now(),
                serial: self.challenge_serial,
            },
        );
        let mut out = id.to_le_bytes().to_vec();
        out.extend_from_slice(&bytes);
        (cc::OK, out)
    }

    /// Activate Session: `[auth type, max priv, challenge(16), initial outbound seq(4)]`.
    ///
    /// `None` means the request failed authentication and is dropped silently.
    pub fn activate(&mut self, header: &SessionHeader, data: &[u8]) -> Option<(SessionHeader, Reply)> {
        if header.auth_type != AUTH_STRAIGHT_PASSWORD || header.auth_code != Some(self.password) {
            debug!(session_id = header.session_id, "activate session with bad credentials");
            return None;
        }
        if data.len() < 2 + AUTH_CODE_LEN + 4 {
            return None;
        }
        let challenge = self.challenges.get(&header.session_id)?;
        if data[2..2 + AUTH_CODE_LEN] != challenge.bytes {
            debug!(session_id = header.session_id, "activate session with stale challenge");
            return None;
        }
        self.challenges.remove(&header.session_id);

        let id = header.session_id;
        let seq = &data[2 + AUTH_CODE_LEN..2 + AUTH_CODE_LEN + 4];
        let outbound_seq = u32::from_le_bytes([seq[0], seq[1], seq[2], seq[3]]);
        let inbound_seq: u32 = rand::rng().random_range(1..u32::MAX / 2);
        self.sessions.insert(
            id,
            Session {
                privilege: 0x02,
                outbound_seq,
                last_seen: Instant::now(),
            },
        );
        info!(session_id = id, "session activated");

        let mut out = vec![AUTH_STRAIGHT_PASSWORD];
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&inbound_seq.to_le_bytes());
        out.push(MAX_PRIVILEGE);
        Some((self.reply_header(id, outbound_seq), (cc::OK, out)))
    }

    /// Check a request against the active sessions, returning the header
    /// to answer under.
    pub fn authenticate(&mut self, header: &SessionHeader) -> Option<SessionHeader> {
        if header.auth_type != AUTH_STRAIGHT_PASSWORD || header.auth_code != Some(self.password) {
            return None;
        }
        let session = self.sessions.get_mut(&header.session_id)?;
        session.last_seen = Instant::now();
        session.outbound_seq = session.outbound_seq.wrapping_add(1);
        let seq = session.outbound_seq;
        Some(self.reply_header(header.session_id, seq))
    }

    /// Set Session Privilege Level for an authenticated session.
    pub fn set_privilege(&mut self, session_id: u32, data: &[u8]) -> Reply {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return (cc::INVALID_SESSION_ID, Vec::new());
        };
        match data.first().map(|b| b & 0x0f) {
            None => (cc::INVALID_DATA, Vec::new()),
            Some(0) => (cc::OK, vec![session.privilege]),
            Some(level) if level > MAX_PRIVILEGE => (cc::OUT_OF_RANGE, Vec::new()),
            Some(level) => {
                session.privilege = level;
                (cc::OK, vec![level])
            }
        }
    }

    /// Close Session: `[session id(4)]`.
    pub fn close(&mut self, data: &[u8]) -> Reply {
        let Some(bytes) = data.get(..4) else {
            return (cc::INVALID_DATA, Vec::new());
        };
        let id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if self.sessions.remove(&id).is_some() {
            info!(session_id = id, "session closed");
            (cc::OK, Vec::new())
        } else {
            (cc::INVALID_SESSION_ID, Vec::new())
        }
    }

    /// Drop sessions and challenges idle for longer than the timeout.
    pub fn prune(&mut self, now: Instant) {
        let timeout = self.timeout;
        self.challenges
            .retain(|_, c| now.saturating_duration_since(c.issued) <= timeout);
        self.sessions.retain(|id, s| {
            let keep = now.saturating_duration_since(s.last_seen) <= timeout;
            if !keep {
                debug!(session_id = id, "session expired");
            }
            keep
        });
    }

    fn reply_header(&self, session_id: u32, sequence: u32) -> SessionHeader {
        SessionHeader {
            auth_type: AUTH_STRAIGHT_PASSWORD,
            sequence,
            session_id,
            auth_code: Some(self.password),
        }
    }
}

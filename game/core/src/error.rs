//! The error taxonomy of spec §7, collapsed into one enum the outer
//! per-connection handler matches on. Mirrors the shape of the teacher's
//! `flux::shared::NetworkError`/`ErrorType` pair: a small closed set of
//! fatal categories, no exceptions crossing component boundaries.

use std::fmt;

#[derive(Debug)]
pub enum ServerError {
    /// Corrupt packet, bad magic, bad length, checksum/decrypt failure.
    WireFault,
    /// EOF or socket error from the peer.
    PeerGone,
    /// `MOVE_TIMEOUT` elapsed waiting on a player read.
    Timeout,
    /// First packet not Username, empty username, spectator sending Move.
    ProtocolMisuse(&'static str),
    /// Username already present in the presence registry's `active` map.
    PresenceConflict,
    /// Returning username had no live snapshot, or a mismatched game_id.
    ResumeConflict,
    /// Any other uncaught failure inside the session engine.
    Fatal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::WireFault => write!(f, "wire fault"),
            ServerError::PeerGone => write!(f, "peer disconnected"),
            ServerError::Timeout => write!(f, "timed out waiting for a response"),
            ServerError::ProtocolMisuse(reason) => write!(f, "protocol misuse: {reason}"),
            ServerError::PresenceConflict => write!(f, "username already in use"),
            ServerError::ResumeConflict => write!(f, "no resumable session for this username"),
            ServerError::Fatal(reason) => write!(f, "fatal session error: {reason}"),
        }
    }
}

impl std::error::Error for ServerError {}

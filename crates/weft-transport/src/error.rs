//! Error types for participant-to-participant communication.

use std::fmt;
use std::io;

/// Errors that can occur while connecting, sending, or receiving.
#[derive(Debug)]
pub enum TransportError {
    /// An I/O error on the underlying stream.
    Io(io::Error),
    /// The stream does not start with the expected `b"WEFT"` magic bytes.
    InvalidMagic,
    /// The peer speaks a format version this build does not support.
    UnsupportedVersion {
        /// The version announced by the peer.
        found: u8,
    },
    /// A message could not be decoded (truncated or corrupt data).
    MalformedMessage {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// A message tag is not recognized.
    UnknownMessageTag {
        /// The unrecognized tag.
        tag: u8,
    },
    /// No message arrived from the peer within the configured timeout.
    Timeout {
        /// Name of the peer participant.
        peer: String,
    },
    /// The peer closed its end of the channel.
    Disconnected {
        /// Name of the peer participant.
        peer: String,
    },
    /// The participant on the other end introduced itself under a
    /// different name.
    PeerMismatch {
        /// The name the local side expected.
        expected: String,
        /// The name the peer announced.
        found: String,
    },
    /// Could not reach the peer before the deadline.
    ConnectFailed {
        /// The address that was tried.
        address: String,
        /// Description of the last failure.
        reason: String,
    },
    /// The shared rendezvous table was poisoned by a panic in another thread.
    Poisoned,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic => write!(f, "invalid magic bytes (expected b\"WEFT\")"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported format version {found}")
            }
            Self::MalformedMessage { detail } => write!(f, "malformed message: {detail}"),
            Self::UnknownMessageTag { tag } => write!(f, "unknown message tag {tag}"),
            Self::Timeout { peer } => write!(f, "timed out waiting for '{peer}'"),
            Self::Disconnected { peer } => write!(f, "'{peer}' closed the connection"),
            Self::PeerMismatch { expected, found } => {
                write!(f, "expected peer '{expected}', '{found}' connected instead")
            }
            Self::ConnectFailed { address, reason } => {
                write!(f, "could not connect to {address}: {reason}")
            }
            Self::Poisoned => write!(f, "local network table poisoned"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

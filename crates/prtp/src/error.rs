use prtp_binary::BinaryError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Reasons a wire segment fails to parse. All of them result in a silent
/// drop at the session layer; the sender's timer recovers the loss.
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("segment truncated: {0}")]
    Truncated(#[from] BinaryError),

    #[error("payload length {0} exceeds the {max} byte maximum", max = crate::consts::MAX_PAYLOAD)]
    PayloadTooLong(usize),

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
}

/// Errors surfaced by the connection layer. The reliability layer and the
/// congestion controller never fail upward.
#[derive(Error, Debug)]
pub enum PrtpError {
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("handshake failed after {attempts} attempts")]
    HandshakeFailed { attempts: u32 },

    #[error("retransmit ceiling reached: segment {seq} still unacknowledged after {elapsed:.1?}")]
    RetransmitCeiling { seq: u32, elapsed: Duration },

    #[error("session timed out after {0:?} of inactivity")]
    SessionTimeout(Duration),

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("close handshake timed out")]
    CloseTimedOut,

    #[error("no established peer")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, PrtpError>;

//! Error taxonomy for the synchronization core.
//!
//! None of these are fatal. Each variant maps to a recovery: drop the
//! message, resync from the next snapshot, reconnect, or let server truth
//! overwrite local state.

use thiserror::Error;

/// A message that could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Well-formed frame carrying a message kind this build does not know.
    #[error("unrecognized message kind `{kind}`")]
    Unrecognized { kind: String },
    /// Bytes that are not a valid message.
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
}

/// Why local prediction lost track of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesyncReason {
    /// The input buffer filled up without acknowledgements.
    BufferExhausted { capacity: usize },
    /// A newer snapshot acknowledged an older input sequence.
    AckRegression { last: u32, got: u32 },
}

impl std::fmt::Display for DesyncReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesyncReason::BufferExhausted { capacity } => {
                write!(f, "input buffer exhausted ({capacity} unacknowledged samples)")
            }
            DesyncReason::AckRegression { last, got } => {
                write!(f, "acknowledged sequence went back from {last} to {got}")
            }
        }
    }
}

/// Failure kinds surfaced by the synchronization core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Log and drop the message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Local predicted state discarded; rebuilt from the next snapshot.
    #[error("desync: {0}")]
    Desync(DesyncReason),
    /// Socket closed or timed out; reconnect policy applies.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// Local optimistic state contradicted by the server; server wins.
    #[error("authority conflict: {0}")]
    AuthorityConflict(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

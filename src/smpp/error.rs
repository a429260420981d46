// ABOUTME: Error types for SMPP client operations with fatality classification
// ABOUTME: Distinguishes connection-ending failures from per-request rejections

use std::io;

use thiserror::Error;

use crate::smpp::pdu::{CodecError, CommandStatus};

/// Error type for SMPP session operations.
#[derive(Debug, Error)]
pub enum SmppError {
    /// I/O error during connect, read or write.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The peer sent bytes that do not decode to a valid PDU.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peer rejected a request via the command_status field.
    #[error("protocol error: {0:?}")]
    Protocol(CommandStatus),

    /// Wrong response type for the request we sent.
    #[error("unexpected PDU: expected {expected}, got {actual}")]
    UnexpectedPdu {
        expected: &'static str,
        actual: &'static str,
    },

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,
}

impl SmppError {
    /// Whether the underlying transport is unusable and the session must
    /// rebind. Anything else is a per-attempt failure the caller may retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SmppError::Connection(_) | SmppError::Codec(_) | SmppError::ConnectionClosed
        )
    }
}

pub type SmppResult<T> = Result<T, SmppError>;

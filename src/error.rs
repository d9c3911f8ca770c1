use thiserror::Error;

use crate::codec::Command;

/// Errors produced by the protocol engine. Every variant is fatal to the
/// session: the caller must abandon the connection, no recovery is attempted
/// inside the engine.
#[derive(Debug, Error)]
pub enum MilterError {
    /// The underlying byte stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Received bytes violate the wire format (unknown command code,
    /// truncated payload, missing NUL terminator, bad fixed length,
    /// trailing bytes, malformed reply code).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer sent a well-formed message that is wrong for the current
    /// point of the dialog.
    #[error("unexpected message: got {got}, expected {expected}")]
    UnexpectedMessage { got: Command, expected: &'static str },

    /// A server callback failed. Reported through `on_error`, then the
    /// session terminates.
    #[error("callback error: {0}")]
    Callback(anyhow::Error),
}

//! Error types for protocol handling.

use thiserror::Error;

/// Errors that can occur when encoding or decoding channel traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The envelope itself could not be decoded.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// The envelope decoded but its action data did not.
    #[error("malformed {action} data: {source}")]
    MalformedData {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization error on the outbound path.
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

//! Error types for the miniserver-client crate.

/// Errors produced by the Miniserver protocol client.
///
/// Parse failures (`MalformedFrame`, `MalformedEventTable`,
/// `TruncatedTextEvent`) are logged and dropped by the reader task; the
/// session keeps running. `Transport` ends the session, after which every
/// pending or new request resolves to `SessionClosed`.
#[derive(Debug, thiserror::Error)]
pub enum MiniserverError {
    /// Underlying socket I/O failure; fatal to the session
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame violated the out-of-band header protocol
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An event-table payload could not be decoded
    #[error("malformed event table: {0}")]
    MalformedEventTable(String),

    /// A text event declared more text than its payload carries
    #[error("truncated text event: declared {declared} bytes, {remaining} remain")]
    TruncatedTextEvent { declared: u32, remaining: usize },

    /// A UUID string could not be converted back to its wire form
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),

    /// The authentication handshake failed before reaching the server
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The server answered with a non-success status code
    #[error("control error: server returned code {0}")]
    ControlError(String),

    /// The response did not match the outstanding request
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The session is closed; no further requests are accepted
    #[error("session closed")]
    SessionClosed,
}

/// Convenience type alias for Results using MiniserverError.
pub type Result<T> = std::result::Result<T, MiniserverError>;

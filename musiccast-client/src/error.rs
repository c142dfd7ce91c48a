//! Error types for the musiccast-client crate.

/// Errors produced by the MusicCast client.
///
/// `UnmatchedDeviceId` and `UnhandledEventFragment` are partial failures:
/// reconciliation applies and publishes whatever it could before
/// surfacing them, and the UDP listener only logs them.
#[derive(Debug, thiserror::Error)]
pub enum MusicCastError {
    /// Underlying socket I/O failure
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// HTTP request against the Extended Control surface failed
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-zero `response_code` in an Extended Control envelope
    #[error("extended control error {0}")]
    ControlError(i64),

    /// A vendor payload did not have the expected shape
    #[error("malformed envelope: {0}")]
    Envelope(String),

    /// An event was dispatched to a device it does not belong to
    #[error("unmatched device id: expected {expected}, received {received:?}")]
    UnmatchedDeviceId {
        expected: String,
        received: Option<String>,
    },

    /// Top-level event keys nobody consumed; the decoded portion was
    /// still applied and published
    #[error("unhandled event fragment: {0:?}")]
    UnhandledEventFragment(Vec<String>),

    /// A presentation URL could not serve as an Extended Control base
    #[error("invalid url: {0}")]
    Url(String),
}

/// Convenience type alias for Results using MusicCastError.
pub type Result<T> = std::result::Result<T, MusicCastError>;

//! Error taxonomy for the archive-to-registry push engine.
//!
//! One variant per failure kind: malformed/unsafe archives, local file
//! access, transport/HTTP failures, digest mismatches, malformed registry
//! responses, and bad configuration. Callers match on the variant, never on
//! message text.

pub type Result<T> = std::result::Result<T, PusherError>;

#[derive(Debug, thiserror::Error)]
pub enum PusherError {
    /// Malformed tar, or an entry whose resolved path escapes the target directory.
    #[error("archive error: {0}")]
    Archive(String),

    /// Local file access failure (unreadable layer, missing manifest.json, ...).
    #[error("I/O error: {0}")]
    Io(String),

    /// Transport failure or an HTTP status the protocol did not expect.
    #[error("network error: {0}")]
    Network(String),

    /// Server-returned digest did not match the client-computed digest.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Missing `Location` header, malformed upload response, etc.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Bad CLI input or an archive manifest that doesn't parse.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PusherError {
    pub fn archive(msg: impl Into<String>) -> Self {
        PusherError::Archive(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        PusherError::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        PusherError::Config(msg.into())
    }

    /// True for the kinds the coordinator treats as fatal for the whole run
    /// (every kind currently qualifies; kept as a seam for future retry logic).
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl From<std::io::Error> for PusherError {
    fn from(err: std::io::Error) -> Self {
        PusherError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for PusherError {
    fn from(err: reqwest::Error) -> Self {
        PusherError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for PusherError {
    fn from(err: serde_json::Error) -> Self {
        PusherError::Config(format!("failed to parse JSON: {err}"))
    }
}

impl From<url::ParseError> for PusherError {
    fn from(err: url::ParseError) -> Self {
        PusherError::Config(format!("invalid URL: {err}"))
    }
}

/// Attaches the offending path to an I/O error, used where the extra
/// context is worth the allocation (extraction, digesting).
pub fn io_context(err: std::io::Error, path: &std::path::Path) -> PusherError {
    PusherError::Io(format!("{}: {err}", path.display()))
}

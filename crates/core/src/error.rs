//! Unified error types for tunecache.
//!
//! Every variant carries a code prefix so callers on the other side of the
//! MCP boundary can tell failures apart without parsing prose.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the resource cache and resolution engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty phrase).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No entry matched the given phrase or id.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// A phrase was attached to an id that has no entry.
    #[error("CONFLICT: {0}")]
    Conflict(String),

    /// The persisted legacy document could not be parsed.
    #[error("STORE_CORRUPT: {0}")]
    StoreCorrupt(String),

    /// The audio source could not resolve a phrase to an id.
    #[error("EXTRACTION_FAILED: {0}")]
    ExtractionFailed(String),

    /// The audio source failed to download a resolved id.
    #[error("DOWNLOAD_FAILED: {0}")]
    DownloadFailed(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Filesystem access failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the legacy document or an export failed.
    #[error("CACHE_ERROR: serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::ExtractionFailed(msg) => (-32000, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::Conflict(msg) => (-32003, msg.clone()),
            Error::DownloadFailed(msg) => (-32004, msg.clone()),
            Error::StoreCorrupt(msg) => (-32002, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::Io(e) => (-32005, e.to_string()),
            Error::Serialization(e) => (-32002, e.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("dQw4w9WgXcQ".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("dQw4w9WgXcQ"));

        let err = Error::Conflict("unknown id".to_string());
        assert!(err.to_string().starts_with("CONFLICT"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::NotFound("abc".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);

        let mcp_err: McpError = Error::ExtractionFailed("no results".into()).into();
        assert_eq!(mcp_err.code.0, -32000);
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Database(_)));
    }
}

//! Error types surfaced by the synchronization engine.
//!
//! Protocol-level inconsistencies (revision drift, undecodable deltas) are
//! deliberately absent here: the engine treats them as self-healing states
//! and answers with a `Raw` resynchronization on the next flush instead of
//! failing the request.

/// Errors returned to callers of the engine and paper agents.
#[derive(Debug)]
pub enum SyncError {
    /// The document store failed during `load`, `save` or `delete`.
    Store(std::io::Error),
    /// A client-supplied filename escapes the paper root.
    InvalidPath(String),
    /// A `Raw` payload could not be URI-decoded into UTF-8 text.
    Encoding(String),
    /// The paper agent has been stopped; no further requests succeed.
    Stopped,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Store(e) => write!(f, "document store error: {}", e),
            SyncError::InvalidPath(path) => write!(f, "invalid file path: {}", path),
            SyncError::Encoding(msg) => write!(f, "undecodable payload: {}", msg),
            SyncError::Stopped => write!(f, "synchronization stopped"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        SyncError::Store(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = SyncError::from(io);
        assert!(matches!(err, SyncError::Store(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_stopped_message() {
        assert_eq!(SyncError::Stopped.to_string(), "synchronization stopped");
    }
}

//! Registry error types

use crate::ingest::IngestError;

use super::id::StreamId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Stream not found
    StreamNotFound(StreamId),
    /// Ingest could not be started; the stream stays stopped and can be retried
    IngestStartFailed(StreamId, IngestError),
    /// Stream id already names a different source
    StreamIdCollision {
        id: StreamId,
        existing: String,
        requested: String,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamNotFound(id) => write!(f, "Stream not found: {}", id),
            RegistryError::IngestStartFailed(id, err) => {
                write!(f, "Ingest start failed for {}: {}", id, err)
            }
            RegistryError::StreamIdCollision {
                id,
                existing,
                requested,
            } => write!(
                f,
                "Stream id {} already used by {} (requested {})",
                id, existing, requested
            ),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::IngestStartFailed(_, err) => Some(err),
            _ => None,
        }
    }
}

use std::sync::Arc;
use thiserror::Error;

/// Errors emitted while repackaging an archive.
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("'{0}' cannot be used as the root directory of an archive")]
    InvalidRootName(String),
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

//! Hash index errors.

use crate::storage::BufferPoolError;

/// Errors that can occur during hash index operations.
#[derive(Debug)]
pub enum IndexError {
    /// Underlying buffer pool error (pool exhausted, disk I/O failure).
    BufferPool(BufferPoolError),

    /// The requested number of block pages does not fit in one header page.
    TooManyBlocks {
        /// Block pages requested.
        requested: usize,
        /// Block page ids one header page can list.
        max: usize,
    },

    /// Internal invariant violation (should not happen in correct usage).
    Internal(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::BufferPool(e) => write!(f, "buffer pool error: {}", e),
            IndexError::TooManyBlocks { requested, max } => {
                write!(f, "too many block pages: {} requested, header holds {}", requested, max)
            }
            IndexError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IndexError::BufferPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferPoolError> for IndexError {
    fn from(e: BufferPoolError) -> Self {
        IndexError::BufferPool(e)
    }
}

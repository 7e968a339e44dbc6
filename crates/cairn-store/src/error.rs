use std::io;
use std::path::PathBuf;

use cairn_pack::PackError;
use cairn_types::ObjectId;

/// Errors from object database operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading the source failed part way through an object.
    #[error("failed to read source at byte {offset}: {source}")]
    SourceRead {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// The source ended before the declared size was reached.
    #[error("failed to read {expected} bytes from source, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    /// The deflater reported an unexpected failure.
    #[error("unexpected deflate failure: {0}")]
    Compression(String),

    /// Flushing an object file to stable storage failed.
    #[error("could not fsync {}: {source}", path.display())]
    Fsync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Moving a committed object into place failed.
    #[error("could not rename '{}' to '{}': {source}", from.display(), to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing, rolling back or sealing the bulk check-in pack failed.
    #[error("could not write bulk check-in pack: {0}")]
    PackWrite(#[source] PackError),

    /// The source could not report or restore its position.
    #[error("cannot seek source: {0}")]
    CannotSeek(#[source] io::Error),

    #[error("bulk check-in is already plugged")]
    AlreadyPlugged,

    #[error("bulk check-in is not plugged")]
    NotPlugged,

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// A loose object failed to decode or hash back to its name.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Whether the store may be left inconsistent by this failure.
    ///
    /// A fatal error means an object was partly hashed or a durable commit
    /// was promised and not completed; callers should stop using the
    /// database rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SourceRead { .. }
                | Self::ShortRead { .. }
                | Self::Compression(_)
                | Self::Fsync { .. }
                | Self::RenameFailed { .. }
                | Self::PackWrite(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

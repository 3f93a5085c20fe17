/// Result alias that carries the custom [`StitchError`] type.
pub type Result<T> = std::result::Result<T, StitchError>;

/// Boxed error produced by a block sorter implementation.
pub type BoxedSortError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    /// Sorting parameters do not fit the recording's geometry, sampling
    /// rate or length.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A frame range falls outside `[0, frame_count)`.
    #[error("frame range [{start}, {end}) is outside the recording (0..{frame_count})")]
    OutOfRange {
        start: usize,
        end: usize,
        frame_count: usize,
    },
    /// The block sorter failed on one chunk. The whole run is aborted.
    #[error("block sort failed on chunk {} of {chunk_count} (frames [{start}, {end})): {source}", .chunk_index + 1)]
    BlockSort {
        chunk_index: usize,
        chunk_count: usize,
        start: usize,
        end: usize,
        #[source]
        source: BoxedSortError,
    },
    /// Any other failure while preparing a chunk, tagged with its padded bounds.
    #[error("chunk {} (frames [{start}, {end})) failed: {source}", .chunk_index + 1)]
    Chunk {
        chunk_index: usize,
        start: usize,
        end: usize,
        #[source]
        source: Box<StitchError>,
    },
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl StitchError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Returns the innermost error, looking through [`StitchError::Chunk`] wrappers.
    pub fn root(&self) -> &StitchError {
        match self {
            Self::Chunk { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<&str> for StitchError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for StitchError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

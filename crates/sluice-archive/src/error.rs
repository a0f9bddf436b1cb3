use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::report::ExtractionResult;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid archive: {reason}")]
    InvalidArchive { reason: String },

    #[error("archive is corrupted: {reason}")]
    CorruptedArchive { reason: String },

    #[error("entry '{path}' is too large: {size} bytes exceeds {limit}")]
    EntryTooLarge { path: String, size: u64, limit: u64 },

    #[error("memory limit exceeded: {used} of {limit} bytes in use")]
    MemoryLimitExceeded { used: u64, limit: u64 },

    #[error("unsupported archive format")]
    UnsupportedFormat,

    #[error("stream failure on '{path}': {source}")]
    StreamFailure { path: String, source: io::Error },

    #[error("extraction cancelled")]
    Cancelled,

    #[error("extraction timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unsafe entry path '{path}': {reason}")]
    UnsafePath { path: String, reason: &'static str },

    #[error("strip_components({count}) removed all path components from '{original}'")]
    NoComponentsRemaining { original: PathBuf, count: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("destination failure: {0}")]
    Sink(#[from] sluice_fs::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error ends the whole run rather than a single entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidArchive { .. }
                | Self::CorruptedArchive { .. }
                | Self::MemoryLimitExceeded { .. }
                | Self::UnsupportedFormat
                | Self::Cancelled
                | Self::Timeout { .. }
                | Self::InvalidPattern { .. }
                | Self::Config(_)
        )
    }

    /// The entry an error is about, when it concerns a single entry.
    pub fn entry_path(&self) -> Option<&str> {
        match self {
            Self::EntryTooLarge { path, .. }
            | Self::StreamFailure { path, .. }
            | Self::UnsafePath { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A run that stopped early. The work already done travels with the error.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct Aborted {
    #[source]
    pub error: Error,
    pub partial: ExtractionResult,
}

impl Aborted {
    pub fn new(error: Error, partial: ExtractionResult) -> Self {
        Self { error, partial }
    }

    pub fn into_parts(self) -> (Error, ExtractionResult) {
        (self.error, self.partial)
    }
}

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no entry is open for writing")]
    NotOpen,

    #[error("entry '{path}' is still open")]
    AlreadyOpen { path: PathBuf },

    #[error("destination already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("path is not relative to the destination root: {path}")]
    OutsideRoot { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to set permissions on {path}: {source}")]
    Permissions { path: PathBuf, source: io::Error },

    #[error("failed to replace directory {path}: {source}")]
    ReplaceDir { path: PathBuf, source: io::Error },
}

impl Error {
    /// The underlying I/O error kind, when there is one.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Write { source, .. }
            | Self::CreateDir { source, .. }
            | Self::Permissions { source, .. }
            | Self::ReplaceDir { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// error.rs - Error types for the watchlist store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, writing or editing a watchlist.
#[derive(Debug, Error)]
pub enum WatchlistError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The watchlist file is not valid JSON for the expected schema.
    #[error("malformed watchlist {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize the watchlist.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Refused to overwrite something that is not a regular file.
    #[error("refusing to write watchlist: {path} is not a regular file")]
    NotARegularFile { path: PathBuf },

    /// A repository with this name is already watched.
    #[error("[{0}] is already watched")]
    AlreadyWatched(String),

    /// No repository with this name is watched.
    #[error("[{0}] is not watched")]
    NotWatched(String),

    /// The path has no final component to derive a name from.
    #[error("cannot derive a repository name from {path}")]
    UnnamedPath { path: PathBuf },

    /// Paths must be UTF-8 to be stored as JSON and passed on as git flags.
    #[error("path is not valid UTF-8: {path}")]
    NonUtf8Path { path: PathBuf },

    /// A `--match` pattern failed to compile.
    #[error("invalid repository pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

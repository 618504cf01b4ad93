//! Error taxonomy for the ingestion pipeline.
//!
//! Most variants are fatal for a single file only: the orchestrator logs
//! them with file context and continues with the next file. Store errors
//! outside per-row upserts and configuration failures abort the run at
//! the binary boundary.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(PathBuf),

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A capability needed for this file was not compiled in.
    #[error("missing capability: {0}")]
    MissingDependency(String),

    /// Transient provider failures exhausted the retry budget.
    #[error("embedding request failed after {attempts} attempts: {reason}")]
    Embedding { attempts: u32, reason: String },

    /// The provider rejected the request outright; retrying would not help.
    #[error("embedding request rejected (HTTP {status}): {reason}")]
    EmbeddingRejected { status: u16, reason: String },

    /// One or more rows failed during a bulk upsert. The file's state is
    /// not updated, so the next run reprocesses it.
    #[error("store write to '{collection}' failed for {failed} of {total} documents")]
    StoreWrite {
        collection: String,
        failed: usize,
        total: usize,
    },

    /// The state file exists but cannot be read as JSON. The loader
    /// absorbs this into an empty state; it never aborts a run.
    #[error("state file {path} is corrupt: {reason}")]
    StateCorruption { path: PathBuf, reason: String },

    /// A corpus item does not match any accepted shape.
    #[error("unrecognized corpus item shape in {file} at index {index}")]
    CorpusShape { file: PathBuf, index: usize },

    #[error("invalid collection name {0:?} (letters, digits, underscores only)")]
    InvalidCollection(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl IngestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

//! Core data models flowing through the ingestion pipeline.
//!
//! These types represent chunks, their provenance, and the embedded
//! documents written to the store.

/// A text window produced by the chunker. Indices are contiguous
/// emission order; `span` is the untrimmed `[start, end)` character
/// window for character-mode chunks (token windows carry no span).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub span: Option<(usize, usize)>,
}

/// Provenance of an embedded document.
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub source_id: String,
    pub path: String,
    pub source_type: String,
    pub mtime: String,
}

/// Descriptive fields stored beside each chunk.
#[derive(Debug, Clone)]
pub struct DocMetadata {
    pub title: String,
    pub section: String,
    pub tags: Vec<String>,
    pub lang: String,
}

/// One row of a collection: a chunk, its provenance, and its vector.
/// The id is content-derived (see [`crate::identity::stable_id`]), so
/// re-writing identical content overwrites the same row.
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    pub id: String,
    pub chunk_id: String,
    pub source: SourceRef,
    pub text: String,
    pub metadata: DocMetadata,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub dims: usize,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregate counters for one run. Failed files are logged and counted;
/// they never abort the run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks_upserted: usize,
    pub deleted_stale: u64,
}

//! Ingestion pipeline orchestration.
//!
//! Coordinates the full run: discovery, normalization, change detection,
//! chunking, embedding, and storage. Files are processed sequentially in
//! sorted path order so runs are reproducible; a failing file is logged
//! and counted, never fatal to the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSetBuilder};
use sqlx::SqlitePool;
use walkdir::WalkDir;

use crate::chunk::Chunker;
use crate::config::Settings;
use crate::embedding::EmbeddingClient;
use crate::error::IngestError;
use crate::identity::{chunk_id, hash_text, mtime_iso, now_iso, stable_id};
use crate::models::{Chunk, DocMetadata, EmbeddedDocument, IngestSummary, SourceRef};
use crate::normalize::{normalize_file, FileType, NormalizedDoc};
use crate::state::IngestState;
use crate::store;

const DEFAULT_PATTERNS: [&str; 4] = ["**/*.json", "**/*.md", "**/*.txt", "**/*.pdf"];

struct RunCtx {
    pool: SqlitePool,
    collection: String,
    /// `None` on dry runs: chunk counts are reported without touching
    /// the network or the store.
    client: Option<EmbeddingClient>,
    chunker: Chunker,
    batch_size: usize,
}

enum FileOutcome {
    Skipped,
    Empty,
    Written { chunks: usize, deleted: u64 },
}

pub async fn run_ingest(
    settings: &Settings,
    env: &str,
    pattern: Option<&str>,
    force: bool,
    dry_run: bool,
) -> Result<IngestSummary> {
    let collection = settings.collection_for(env)?.to_string();
    let files = discover_files(&settings.ingest.data_root, pattern)?;
    tracing::info!(
        count = files.len(),
        root = %settings.ingest.data_root.display(),
        %collection,
        "Discovered source files"
    );

    // Forced runs ignore the ledger entirely
    let mut state = if force {
        IngestState::default()
    } else {
        IngestState::load(&settings.ingest.state_file)
    };

    let client = if dry_run {
        None
    } else {
        Some(EmbeddingClient::from_config(&settings.embedding)?)
    };

    let pool = store::connect(&settings.store.path).await?;
    store::ensure_collection(&pool, &collection).await?;

    let ctx = RunCtx {
        pool,
        collection,
        client,
        chunker: Chunker::for_model(&settings.embedding.model, settings.chunking.params()),
        batch_size: settings.embedding.batch_size,
    };

    let mut summary = IngestSummary::default();
    for path in &files {
        match process_file(&ctx, &mut state, path, force).await {
            Ok(FileOutcome::Skipped) => {
                tracing::debug!(path = %path.display(), "Unchanged, skipping");
                summary.skipped += 1;
            }
            Ok(FileOutcome::Empty) => {
                tracing::info!(path = %path.display(), "No chunkable content");
                summary.processed += 1;
            }
            Ok(FileOutcome::Written { chunks, deleted }) => {
                summary.processed += 1;
                summary.chunks_upserted += chunks;
                summary.deleted_stale += deleted;
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "Failed to ingest file");
                summary.failed += 1;
            }
        }
    }

    if !force && !dry_run {
        state
            .save(&settings.ingest.state_file)
            .context("Failed to save ingest state")?;
    }

    print_summary(&format!("run {env}"), &summary, dry_run);
    ctx.pool.close().await;
    Ok(summary)
}

async fn process_file(
    ctx: &RunCtx,
    state: &mut IngestState,
    path: &Path,
    force: bool,
) -> Result<FileOutcome, IngestError> {
    let prepared = prepare_file(path)?;
    let state_key = path.to_string_lossy().to_string();

    if !force && state.is_unchanged(&state_key, &prepared.content_hash, &prepared.mtime) {
        return Ok(FileOutcome::Skipped);
    }

    let chunks = ctx.chunker.chunk(&prepared.doc.text);
    if chunks.is_empty() {
        return Ok(FileOutcome::Empty);
    }

    let client = match &ctx.client {
        Some(client) => client,
        None => {
            return Ok(FileOutcome::Written {
                chunks: chunks.len(),
                deleted: 0,
            })
        }
    };

    // Embed first: an API failure must leave existing rows untouched.
    let vectors = embed_chunks(client, &chunks, ctx.batch_size).await?;

    let spec = DocSpec {
        source_id: prepared.source_id.clone(),
        source_path: state_key.clone(),
        source_type: type_label(prepared.file_type).to_string(),
        mtime: prepared.mtime.clone(),
        title: title_or_stem(prepared.doc.title.as_deref(), path),
        tags: tags_for_filename(&prepared.source_id),
        model: client.model().to_string(),
    };
    let docs = build_documents(&spec, &chunks, &vectors);

    // Drop rows from the previous version of this source, then rewrite.
    let deleted = store::delete_by_source(&ctx.pool, &ctx.collection, &prepared.source_id).await?;
    let written = store::upsert_documents(&ctx.pool, &ctx.collection, &docs).await?;

    if !force {
        state.update(state_key, prepared.content_hash, prepared.mtime);
    }
    Ok(FileOutcome::Written {
        chunks: written,
        deleted,
    })
}

struct PreparedFile {
    source_id: String,
    file_type: FileType,
    doc: NormalizedDoc,
    content_hash: String,
    mtime: String,
}

/// Normalize once and derive everything change detection needs.
fn prepare_file(path: &Path) -> Result<PreparedFile, IngestError> {
    let file_type =
        FileType::detect(path).ok_or_else(|| IngestError::UnsupportedType(path.to_path_buf()))?;
    let doc = normalize_file(path, file_type)?;
    let content_hash = hash_text(&doc.text);
    let mtime = mtime_iso(path)?;
    Ok(PreparedFile {
        source_id: file_name_of(path),
        file_type,
        doc,
        content_hash,
        mtime,
    })
}

fn type_label(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Json => "json",
        FileType::Markdown => "md",
        FileType::Text => "txt",
        FileType::Pdf => "pdf",
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Walk the data root and keep files matching the pattern (or the
/// supported-extension defaults), relative to the root, sorted.
pub(crate) fn discover_files(root: &Path, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut builder = GlobSetBuilder::new();
    match pattern {
        Some(pattern) => {
            builder.add(compile_glob(pattern)?);
        }
        None => {
            for pattern in DEFAULT_PATTERNS {
                builder.add(compile_glob(pattern)?);
            }
        }
    }
    let globs = builder.build()?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or_else(|_| entry.path());
        if globs.is_match(rel) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn compile_glob(pattern: &str) -> Result<globset::Glob> {
    // literal_separator keeps `*` from crossing directories, matching
    // the path semantics users expect from shell globs
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("Invalid glob pattern: {pattern}"))
}

/// Filename-driven tags for retrieval-side filtering.
pub(crate) fn tags_for_filename(file_name: &str) -> Vec<String> {
    let lower = file_name.to_lowercase();
    let tags: &[&str] = if lower.contains("profile") {
        &["profile", "resume", "candidate"]
    } else if lower.contains("resume") {
        &["resume", "candidate"]
    } else if lower.contains("qa") {
        &["qa", "questions"]
    } else {
        &["document"]
    };
    tags.iter().map(|t| t.to_string()).collect()
}

pub(crate) fn title_or_stem(title: Option<&str>, path: &Path) -> String {
    if let Some(title) = title {
        let trimmed = title.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name_of(path))
}

pub(crate) struct DocSpec {
    pub source_id: String,
    pub source_path: String,
    pub source_type: String,
    pub mtime: String,
    pub title: String,
    pub tags: Vec<String>,
    pub model: String,
}

pub(crate) async fn embed_chunks(
    client: &EmbeddingClient,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, IngestError> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let mut batch_vectors = client.embed_batch(batch).await?;
        vectors.append(&mut batch_vectors);
    }
    Ok(vectors)
}

/// Pair chunks with their vectors and stamp identity, provenance, and
/// metadata onto each row.
pub(crate) fn build_documents(
    spec: &DocSpec,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Vec<EmbeddedDocument> {
    let dims = vectors.first().map(|v| v.len()).unwrap_or(1536);
    let now = now_iso();
    chunks
        .iter()
        .zip(vectors.iter())
        .map(|(chunk, vector)| {
            let chunk_id = chunk_id(&spec.source_id, chunk.index);
            let content_hash = hash_text(&chunk.text);
            EmbeddedDocument {
                id: stable_id(&spec.source_id, &chunk_id, &content_hash),
                chunk_id,
                source: SourceRef {
                    source_id: spec.source_id.clone(),
                    path: spec.source_path.clone(),
                    source_type: spec.source_type.clone(),
                    mtime: spec.mtime.clone(),
                },
                text: chunk.text.clone(),
                metadata: DocMetadata {
                    title: spec.title.clone(),
                    section: format!("chunk_{}", chunk.index),
                    tags: spec.tags.clone(),
                    lang: "en".to_string(),
                },
                embedding: vector.clone(),
                embedding_model: spec.model.clone(),
                dims,
                created_at: now.clone(),
                updated_at: now.clone(),
            }
        })
        .collect()
}

pub(crate) fn print_summary(label: &str, summary: &IngestSummary, dry_run: bool) {
    if dry_run {
        println!("{label} (dry-run)");
        println!("  would process: {} files", summary.processed);
        println!("  would skip: {} files", summary.skipped);
        println!("  failed: {} files", summary.failed);
        println!("  estimated chunks: {}", summary.chunks_upserted);
    } else {
        println!("{label}");
        println!("  processed: {} files", summary.processed);
        println!("  skipped: {} files", summary.skipped);
        println!("  failed: {} files", summary.failed);
        println!("  chunks upserted: {}", summary.chunks_upserted);
        println!("  stale rows deleted: {}", summary.deleted_stale);
    }
    println!("ok");
}

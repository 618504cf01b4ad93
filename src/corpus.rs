//! Corpus-mode ingestion: routed JSON item files.
//!
//! A corpus file is a JSON file whose items each become their own
//! source: chunked, embedded, and delete-then-upserted under the item's
//! own source id. Files are routed to collections by name through the
//! `[routes]` table; change detection runs per corpus file, keyed on
//! the raw file text.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::chunk::Chunker;
use crate::config::Settings;
use crate::embedding::EmbeddingClient;
use crate::error::IngestError;
use crate::identity::{hash_text, mtime_iso};
use crate::ingest::{
    build_documents, embed_chunks, file_name_of, print_summary, tags_for_filename, DocSpec,
};
use crate::models::IngestSummary;
use crate::state::IngestState;
use crate::store;

struct RoutedFile {
    path: PathBuf,
    collection: String,
}

enum CorpusOutcome {
    Skipped,
    Written { chunks: usize, deleted: u64 },
}

pub async fn run_corpus(settings: &Settings, env: &str, force: bool) -> Result<IngestSummary> {
    let env_collection = settings.collection_for(env)?.to_string();
    let files = discover_corpus_files(&settings.ingest.data_root);
    let routed = route_files(&files, settings, &env_collection);
    tracing::info!(count = routed.len(), "Corpus files to ingest");

    let mut state = if force {
        IngestState::default()
    } else {
        IngestState::load(&settings.ingest.state_file)
    };

    let client = EmbeddingClient::from_config(&settings.embedding)?;
    let pool = store::connect(&settings.store.path).await?;
    let chunker = Chunker::for_model(&settings.embedding.model, settings.chunking.params());

    let mut summary = IngestSummary::default();
    for file in &routed {
        // Route targets may name collections no other run has created yet
        store::ensure_collection(&pool, &file.collection).await?;
        match process_corpus_file(&pool, &client, &chunker, settings, file, &mut state, force).await
        {
            Ok(CorpusOutcome::Skipped) => {
                tracing::debug!(path = %file.path.display(), "Unchanged, skipping");
                summary.skipped += 1;
            }
            Ok(CorpusOutcome::Written { chunks, deleted }) => {
                summary.processed += 1;
                summary.chunks_upserted += chunks;
                summary.deleted_stale += deleted;
            }
            Err(err) => {
                tracing::error!(path = %file.path.display(), error = %err, "Failed to ingest corpus file");
                summary.failed += 1;
            }
        }
    }

    if !force {
        state
            .save(&settings.ingest.state_file)
            .context("Failed to save ingest state")?;
    }

    print_summary(&format!("corpus {env}"), &summary, false);
    pool.close().await;
    Ok(summary)
}

/// Top-level `*.json` files under the data root, sorted by name.
fn discover_corpus_files(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(root = %root.display(), error = %err, "Cannot read corpus root");
            return Vec::new();
        }
    };
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    files
}

/// Apply `[routes]`. When nothing is routed, fall back to `files.json`
/// if present, else to every scanned file, all into the environment's
/// collection.
fn route_files(files: &[PathBuf], settings: &Settings, env_collection: &str) -> Vec<RoutedFile> {
    let mut routed = Vec::new();
    let mut unrouted = Vec::new();
    for path in files {
        match settings.routes.get(&file_name_of(path)) {
            Some(collection) => routed.push(RoutedFile {
                path: path.clone(),
                collection: collection.clone(),
            }),
            None => unrouted.push(path.clone()),
        }
    }

    if !routed.is_empty() {
        for path in &unrouted {
            tracing::warn!(path = %path.display(), "No route for corpus file, skipping");
        }
        return routed;
    }

    let fallback: Vec<PathBuf> = match files.iter().find(|p| file_name_of(p) == "files.json") {
        Some(path) => vec![path.clone()],
        None => files.to_vec(),
    };
    fallback
        .into_iter()
        .map(|path| RoutedFile {
            path,
            collection: env_collection.to_string(),
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn process_corpus_file(
    pool: &SqlitePool,
    client: &EmbeddingClient,
    chunker: &Chunker,
    settings: &Settings,
    file: &RoutedFile,
    state: &mut IngestState,
    force: bool,
) -> Result<CorpusOutcome, IngestError> {
    let raw =
        std::fs::read_to_string(&file.path).map_err(|err| IngestError::io(&file.path, err))?;
    let state_key = file.path.to_string_lossy().to_string();
    let content_hash = hash_text(&raw);
    let mtime = mtime_iso(&file.path)?;

    if !force && state.is_unchanged(&state_key, &content_hash, &mtime) {
        return Ok(CorpusOutcome::Skipped);
    }

    let value: Value = serde_json::from_str(&raw)
        .map_err(|err| IngestError::parse(&file.path, err.to_string()))?;
    let items = items_from_root(value);
    let tags = tags_for_filename(&file_name_of(&file.path));

    let mut chunks_total = 0usize;
    let mut deleted_total = 0u64;
    for (index, item) in items.iter().enumerate() {
        let item = resolve_item(&file.path, index, item)?;
        let chunks = chunker.chunk(&item.text);
        if chunks.is_empty() {
            continue;
        }

        let vectors = embed_chunks(client, &chunks, settings.embedding.batch_size).await?;
        let spec = DocSpec {
            source_id: item.source_id.clone(),
            source_path: state_key.clone(),
            source_type: "corpus".to_string(),
            mtime: mtime.clone(),
            title: item.source_id.clone(),
            tags: tags.clone(),
            model: client.model().to_string(),
        };
        let docs = build_documents(&spec, &chunks, &vectors);

        deleted_total += store::delete_by_source(pool, &file.collection, &item.source_id).await?;
        chunks_total += store::upsert_documents(pool, &file.collection, &docs).await?;
    }

    if !force {
        state.update(state_key, content_hash, mtime);
    }
    Ok(CorpusOutcome::Written {
        chunks: chunks_total,
        deleted: deleted_total,
    })
}

/// A corpus root is an array of items, an object wrapping one under
/// `files` or `documents`, or a single item.
fn items_from_root(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(obj) => {
            for key in ["files", "documents"] {
                if let Some(Value::Array(items)) = obj.get(key) {
                    return items.clone();
                }
            }
            vec![Value::Object(obj)]
        }
        other => vec![other],
    }
}

#[derive(Debug, Default, Deserialize)]
struct ItemObject {
    id: Option<String>,
    source: Option<String>,
    text: Option<String>,
    content: Option<String>,
    body: Option<String>,
    q: Option<String>,
    a: Option<String>,
}

struct CorpusItem {
    source_id: String,
    text: String,
}

/// Resolve one corpus item. Only strings and the known object shape are
/// accepted; anything else is a [`IngestError::CorpusShape`] for the
/// whole file.
fn resolve_item(file: &Path, index: usize, value: &Value) -> Result<CorpusItem, IngestError> {
    let default_source = || format!("{}::{}", file.display(), index);
    match value {
        Value::String(text) => Ok(CorpusItem {
            source_id: default_source(),
            text: text.clone(),
        }),
        Value::Object(_) => {
            let item: ItemObject =
                serde_json::from_value(value.clone()).map_err(|_| IngestError::CorpusShape {
                    file: file.to_path_buf(),
                    index,
                })?;

            let text = match first_non_empty(&[&item.text, &item.content, &item.body]) {
                Some(text) => text,
                None if item.q.is_some() || item.a.is_some() => {
                    let mut parts = Vec::new();
                    if let Some(q) = item.q.as_deref() {
                        if !q.is_empty() {
                            parts.push(q);
                        }
                    }
                    if let Some(a) = item.a.as_deref() {
                        if !a.is_empty() {
                            parts.push(a);
                        }
                    }
                    parts.join(" ")
                }
                None => {
                    return Err(IngestError::CorpusShape {
                        file: file.to_path_buf(),
                        index,
                    })
                }
            };

            let source_id = item
                .id
                .as_deref()
                .filter(|s| !s.is_empty())
                .or_else(|| item.source.as_deref().filter(|s| !s.is_empty()))
                .map(str::to_string)
                .unwrap_or_else(default_source);

            Ok(CorpusItem { source_id, text })
        }
        _ => Err(IngestError::CorpusShape {
            file: file.to_path_buf(),
            index,
        }),
    }
}

fn first_non_empty(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

//! # Chunk Silo
//!
//! An incremental document-to-vector ingestion pipeline backed by SQLite.
//!
//! Chunk Silo walks a data directory, normalizes JSON / Markdown / plain
//! text / PDF files into canonical text, cuts deterministic overlapping
//! chunks, embeds them through the OpenAI embeddings API, and upserts the
//! vectors into per-environment SQLite collections. Content-derived ids
//! make every write idempotent, and a per-file (hash, mtime) ledger keeps
//! re-runs incremental: unchanged files are skipped, changed files replace
//! exactly their own rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌───────┐   ┌────────┐
//! │ discover │──▶│ normalize │──▶│  chunk  │──▶│ embed │──▶│ upsert │
//! └──────────┘   └───────────┘   └─────────┘   └───────┘   └────────┘
//!   glob walk     canonical      sliding       OpenAI      SQLite
//!   + ledger      text + title   windows       batches     collections
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! silo init                       # create the store and collections
//! silo run dev                    # ingest data/ into the dev collection
//! silo run dev '**/*.md' --force  # reprocess all markdown
//! silo corpus qa                  # ingest routed JSON corpus files
//! silo status                     # ledger entries and collection counts
//! silo purge dev notes.md         # drop one source's rows
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and env overrides |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`identity`] | Hashing and stable-id derivation |
//! | [`normalize`] | File-type detection and canonical text |
//! | [`pdf`] | PDF extraction backends |
//! | [`chunk`] | Deterministic sliding-window chunking |
//! | [`state`] | Per-file (hash, mtime) ledger |
//! | [`embedding`] | OpenAI embeddings client |
//! | [`store`] | SQLite collections and upserts |
//! | [`ingest`] | File pipeline orchestration |
//! | [`corpus`] | Routed JSON corpus ingestion |

pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod pdf;
pub mod state;
pub mod store;

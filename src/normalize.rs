//! Source-file normalization into canonical text.
//!
//! Normalization is deterministic: the same file bytes always yield the
//! same canonical text, which is what gets hashed for change detection
//! and chunked for embedding. JSON is re-serialized with sorted keys so
//! key order never perturbs hashes; Markdown and plain text pass through
//! verbatim; PDFs go through the extraction backend.

use std::path::Path;

use serde_json::Value;

use crate::error::IngestError;
use crate::identity::stable_json_text;
use crate::pdf::extract_pdf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Json,
    Markdown,
    Text,
    Pdf,
}

impl FileType {
    /// Classify by extension, case-insensitively. Unsupported extensions
    /// yield `None` and are rejected by the caller.
    pub fn detect(path: &Path) -> Option<FileType> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(FileType::Json),
            "md" | "markdown" => Some(FileType::Markdown),
            "txt" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }
}

/// Canonical text plus whatever title the format carries.
#[derive(Debug, Clone)]
pub struct NormalizedDoc {
    pub text: String,
    pub title: Option<String>,
}

pub fn normalize_file(path: &Path, file_type: FileType) -> Result<NormalizedDoc, IngestError> {
    match file_type {
        FileType::Json => {
            let raw = read(path)?;
            let value: Value =
                serde_json::from_str(&raw).map_err(|err| IngestError::parse(path, err.to_string()))?;
            let text =
                stable_json_text(&value).map_err(|err| IngestError::parse(path, err.to_string()))?;
            Ok(NormalizedDoc {
                text,
                title: json_title(&value),
            })
        }
        FileType::Markdown => {
            let text = read(path)?;
            let title = markdown_title(&text);
            Ok(NormalizedDoc { text, title })
        }
        FileType::Text => Ok(NormalizedDoc {
            text: read(path)?,
            title: None,
        }),
        FileType::Pdf => {
            let (text, title) = extract_pdf(path)?;
            Ok(NormalizedDoc { text, title })
        }
    }
}

fn read(path: &Path) -> Result<String, IngestError> {
    std::fs::read_to_string(path).map_err(|err| IngestError::io(path, err))
}

/// Title conventions for known JSON shapes: documents carrying a
/// `metadata` object use its `title`; profile exports use the profile's
/// name, falling back to its title, then to a generic label.
fn json_title(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    if let Some(metadata) = obj.get("metadata") {
        return metadata
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|t| !t.is_empty());
    }
    if let Some(profile) = obj.get("profile").and_then(Value::as_object) {
        let name = profile
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let title = profile
            .get("title")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        return Some(
            name.or(title)
                .map(str::to_string)
                .unwrap_or_else(|| "Profile".to_string()),
        );
    }
    None
}

/// First `# ` heading within the opening lines.
fn markdown_title(text: &str) -> Option<String> {
    for line in text.lines().take(10) {
        if let Some(rest) = line.strip_prefix("# ") {
            let trimmed = rest.trim();
            if trimmed.is_empty() {
                return None;
            }
            return Some(trimmed.to_string());
        }
    }
    None
}

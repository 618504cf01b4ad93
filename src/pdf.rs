//! PDF text extraction behind feature-selected backends.
//!
//! `pdf-layout` (default) uses `pdf-extract` for layout-aware text plus
//! `lopdf` for metadata; `pdf-raw` walks the page text operators with
//! `lopdf` alone, which is lighter but loses column and table ordering.
//! Builds without either feature reject PDF sources at runtime.

use std::path::Path;

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfBackend {
    Layout,
    Raw,
}

impl PdfBackend {
    /// Preferred backend for this build, layout-aware first.
    pub fn detect() -> Option<PdfBackend> {
        if cfg!(feature = "pdf-layout") {
            Some(PdfBackend::Layout)
        } else if cfg!(feature = "pdf-raw") {
            Some(PdfBackend::Raw)
        } else {
            None
        }
    }
}

/// Extract `(text, title)` from a PDF file. The title comes from the
/// document Info dictionary when present.
pub fn extract_pdf(path: &Path) -> Result<(String, Option<String>), IngestError> {
    let backend = PdfBackend::detect().ok_or_else(|| {
        IngestError::MissingDependency(
            "PDF support requires the pdf-layout or pdf-raw feature".to_string(),
        )
    })?;
    extract_with(backend, path)
}

#[allow(unreachable_patterns)]
fn extract_with(backend: PdfBackend, path: &Path) -> Result<(String, Option<String>), IngestError> {
    match backend {
        #[cfg(feature = "pdf-layout")]
        PdfBackend::Layout => {
            let bytes = std::fs::read(path).map_err(|err| IngestError::io(path, err))?;
            let text = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|err| IngestError::parse(path, err.to_string()))?;
            let title = lopdf::Document::load_mem(&bytes)
                .ok()
                .and_then(|doc| pdf_title(&doc));
            Ok((text, title))
        }
        #[cfg(feature = "pdf-raw")]
        PdfBackend::Raw => {
            let bytes = std::fs::read(path).map_err(|err| IngestError::io(path, err))?;
            let doc = lopdf::Document::load_mem(&bytes)
                .map_err(|err| IngestError::parse(path, err.to_string()))?;
            let pages: Vec<String> = doc
                .get_pages()
                .keys()
                .map(|page| doc.extract_text(&[*page]).unwrap_or_default())
                .collect();
            let title = pdf_title(&doc);
            Ok((pages.join("\n\n"), title))
        }
        _ => Err(IngestError::MissingDependency(format!(
            "PDF backend {:?} is not compiled in",
            backend
        ))),
    }
}

#[cfg(any(feature = "pdf-layout", feature = "pdf-raw"))]
fn pdf_title(doc: &lopdf::Document) -> Option<String> {
    let info = match doc.trailer.get(b"Info").ok()? {
        lopdf::Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok()?,
        lopdf::Object::Dictionary(dict) => dict,
        _ => return None,
    };
    let raw = match info.get(b"Title").ok()? {
        lopdf::Object::String(bytes, _) => bytes,
        _ => return None,
    };
    let title = decode_pdf_string(raw);
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Text strings are UTF-16BE when they carry a BOM, otherwise
/// PDFDocEncoding, which Latin-1 approximates for titles.
#[cfg(any(feature = "pdf-layout", feature = "pdf-raw"))]
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

#[cfg(all(test, any(feature = "pdf-layout", feature = "pdf-raw")))]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream, StringFormat};

    fn build_pdf(text: &str, title: Option<Object>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some(title) = title {
            let info_id = doc.add_object(dictionary! { "Title" => title });
            doc.trailer.set("Info", info_id);
        }
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save pdf");
        out
    }

    fn write_pdf(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).expect("write pdf");
        path
    }

    #[test]
    fn test_extract_text_and_title() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bytes = build_pdf(
            "Hello PDF ingestion",
            Some(Object::string_literal("Quarterly Report")),
        );
        let path = write_pdf(&dir, "report.pdf", &bytes);

        let (text, title) = extract_pdf(&path).expect("extract");
        assert!(text.contains("Hello PDF ingestion"));
        assert_eq!(title.as_deref(), Some("Quarterly Report"));
    }

    #[test]
    fn test_missing_info_means_no_title() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bytes = build_pdf("body text", None);
        let path = write_pdf(&dir, "untitled.pdf", &bytes);

        let (_, title) = extract_pdf(&path).expect("extract");
        assert!(title.is_none());
    }

    #[test]
    fn test_utf16_title_decodes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut raw = vec![0xFE, 0xFF];
        for unit in "R\u{e9}sum\u{e9} 2024".encode_utf16() {
            raw.extend_from_slice(&unit.to_be_bytes());
        }
        let bytes = build_pdf(
            "body",
            Some(Object::String(raw, StringFormat::Hexadecimal)),
        );
        let path = write_pdf(&dir, "cv.pdf", &bytes);

        let (_, title) = extract_pdf(&path).expect("extract");
        assert_eq!(title.as_deref(), Some("R\u{e9}sum\u{e9} 2024"));
    }

    #[test]
    fn test_garbage_bytes_are_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pdf(&dir, "broken.pdf", b"%PDF-1.5 this is not a pdf");

        let err = extract_pdf(&path).expect_err("must fail");
        assert!(matches!(err, IngestError::Parse { .. }));
    }

    #[test]
    fn test_decode_latin1_fallback() {
        assert_eq!(decode_pdf_string(b"Caf\xe9"), "Caf\u{e9}");
    }
}

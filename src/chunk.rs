//! Deterministic sliding-window text chunker.
//!
//! Windows advance by `size - overlap` positions (minimum stride 1), so
//! consecutive chunks share `overlap` positions of context and the final
//! window always reaches the end of the sequence. The same text and
//! parameters always produce the same chunk list; store primary keys are
//! derived from it.
//!
//! With the `token-chunking` feature (default) windows are cut over the
//! BPE tokens of the configured embedding model; without it, or when no
//! tokenizer is available, windows are cut over characters.

use crate::models::Chunk;

#[cfg(feature = "token-chunking")]
use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};

/// Window sizes for both chunking modes.
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub chunk_tokens: usize,
    pub overlap_tokens: usize,
    pub chunk_chars: usize,
    pub overlap_chars: usize,
}

pub struct Chunker {
    params: ChunkParams,
    #[cfg(feature = "token-chunking")]
    bpe: Option<CoreBPE>,
}

impl Chunker {
    /// Build a chunker for `model`. Unknown models fall back to the
    /// `cl100k_base` encoding; if no tokenizer can be constructed at all,
    /// character windows are used instead.
    pub fn for_model(model: &str, params: ChunkParams) -> Chunker {
        #[cfg(feature = "token-chunking")]
        {
            let bpe = match get_bpe_from_model(model).or_else(|_| cl100k_base()) {
                Ok(bpe) => Some(bpe),
                Err(err) => {
                    tracing::warn!(%model, error = %err, "no tokenizer available, using character windows");
                    None
                }
            };
            Chunker { params, bpe }
        }
        #[cfg(not(feature = "token-chunking"))]
        {
            let _ = model;
            Chunker { params }
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        #[cfg(feature = "token-chunking")]
        if let Some(bpe) = &self.bpe {
            return chunk_by_tokens(
                bpe,
                text,
                self.params.chunk_tokens,
                self.params.overlap_tokens,
            );
        }
        chunk_by_chars(text, self.params.chunk_chars, self.params.overlap_chars)
    }
}

/// Emit `[start, min(start + size, len))` windows advancing by
/// `max(1, size - overlap)` until a window reaches the end.
fn windows(len: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    if len == 0 || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        out.push((start, end));
        if end >= len {
            break;
        }
        start += step;
    }
    out
}

/// Character-mode chunking: windows over the char sequence, trimmed, with
/// whitespace-only windows dropped.
pub fn chunk_by_chars(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    for (start, end) in windows(chars.len(), size, overlap) {
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if trimmed.is_empty() {
            continue;
        }
        chunks.push(Chunk {
            index: chunks.len(),
            text: trimmed.to_string(),
            span: Some((start, end)),
        });
    }
    chunks
}

#[cfg(feature = "token-chunking")]
fn chunk_by_tokens(bpe: &CoreBPE, text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    let tokens = bpe.encode_ordinary(text);
    let total = tokens.len();
    let mut chunks = Vec::new();
    for (start, end) in windows(total, size, overlap) {
        let piece = match bpe.decode(tokens[start..end].to_vec()) {
            Ok(piece) => piece,
            // A window edge can split a multi-byte sequence; approximate
            // that window with a proportional character slice.
            Err(_) => char_slice_fraction(text, start, end, total),
        };
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            continue;
        }
        chunks.push(Chunk {
            index: chunks.len(),
            text: trimmed.to_string(),
            span: None,
        });
    }
    chunks
}

#[cfg(feature = "token-chunking")]
fn char_slice_fraction(text: &str, start: usize, end: usize, total: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let total = total.max(1);
    let from = (start * chars.len() / total).min(chars.len());
    let to = (end * chars.len() / total).clamp(from, chars.len());
    chars[from..to].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_windows_alphabet() {
        // size 10, overlap 3 -> stride 7
        let chunks = chunk_by_chars("abcdefghijklmnopqrstuvwxyz", 10, 3);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert_eq!(chunks[2].text, "opqrstuvwx");
        assert_eq!(chunks[3].text, "vwxyz");
        assert_eq!(chunks[0].span, Some((0, 10)));
        assert_eq!(chunks[1].span, Some((7, 17)));
        assert_eq!(chunks[2].span, Some((14, 24)));
        assert_eq!(chunks[3].span, Some((21, 26)));
    }

    #[test]
    fn test_char_windows_count_formula() {
        // ceil((len - overlap) / (size - overlap)) = ceil(96 / 6) = 16
        let text = "x".repeat(100);
        let chunks = chunk_by_chars(&text, 10, 4);
        assert_eq!(chunks.len(), 16);
        assert_eq!(chunks[15].span, Some((90, 100)));
    }

    #[test]
    fn test_overlap_at_least_size_degrades_to_stride_one() {
        let chunks = chunk_by_chars("abcdefghij", 3, 5);
        assert_eq!(chunks.len(), 8);
        assert_eq!(chunks[0].span, Some((0, 3)));
        assert_eq!(chunks[1].span, Some((1, 4)));
        assert_eq!(chunks[7].span, Some((7, 10)));
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(chunk_by_chars("", 10, 3).is_empty());
        assert!(chunk_by_chars("   \n\t   ", 10, 3).is_empty());
    }

    #[test]
    fn test_whitespace_windows_do_not_consume_indices() {
        let text = format!("{}{}{}", "a".repeat(10), " ".repeat(10), "b".repeat(10));
        let chunks = chunk_by_chars(&text, 10, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].text, "bbbbbbbbbb");
    }

    #[test]
    fn test_single_window_when_text_fits() {
        let chunks = chunk_by_chars("hello world", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].span, Some((0, 11)));
    }

    #[test]
    fn test_final_window_reaches_end() {
        // last span must end exactly at the char count
        let text = "abcdef ".repeat(30);
        let chunks = chunk_by_chars(&text, 50, 10);
        let last = chunks.last().expect("chunks");
        assert_eq!(last.span.expect("span").1, text.chars().count());
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let a = chunk_by_chars(&text, 50, 10);
        let b = chunk_by_chars(&text, 50, 10);
        assert_eq!(a, b);
    }

    #[cfg(feature = "token-chunking")]
    fn test_params(chunk_tokens: usize, overlap_tokens: usize) -> ChunkParams {
        ChunkParams {
            chunk_tokens,
            overlap_tokens,
            chunk_chars: 5000,
            overlap_chars: 800,
        }
    }

    #[cfg(feature = "token-chunking")]
    #[test]
    fn test_token_mode_small_text_single_chunk() {
        let chunker = Chunker::for_model("text-embedding-3-small", test_params(1000, 150));
        let chunks = chunker.chunk("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert!(chunks[0].span.is_none());
    }

    #[cfg(feature = "token-chunking")]
    #[test]
    fn test_token_mode_empty_input() {
        let chunker = Chunker::for_model("text-embedding-3-small", test_params(1000, 150));
        assert!(chunker.chunk("").is_empty());
    }

    #[cfg(feature = "token-chunking")]
    #[test]
    fn test_token_mode_windows_cover_text() {
        let chunker = Chunker::for_model("text-embedding-3-small", test_params(8, 2));
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = chunker.chunk(text);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(!chunk.text.is_empty());
        }
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
        assert!(joined.contains("one"));
        assert!(joined.contains("twelve"));
        // deterministic across invocations
        assert_eq!(chunker.chunk(text), chunks);
    }

    #[cfg(feature = "token-chunking")]
    #[test]
    fn test_token_mode_unknown_model_falls_back_to_cl100k() {
        let chunker = Chunker::for_model("not-a-real-model", test_params(1000, 150));
        let chunks = chunker.chunk("some text");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "some text");
    }
}

//! Chunk production: bounded text chunks carrying provenance metadata.
//!
//! The pipeline treats chunking as a pluggable boundary: anything
//! implementing [`Chunker`] can turn file content into [`Chunk`]s, as long
//! as every chunk stays within the configured token budget and its metadata
//! carries the `file_path`, `url` and `text` fields the vector index needs.
//!
//! The shipped implementation splits on paragraph boundaries (`\n\n`) to
//! keep chunks semantically coherent, hard-splitting paragraphs that exceed
//! the budget on their own.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Approximate chars-per-token ratio used for the budget.
const CHARS_PER_TOKEN: usize = 4;

/// Provenance of a file yielded by the repository walk. Immutable once built.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Path relative to the snapshot root, e.g. `src/main.rs`.
    pub file_path: String,
    /// Browsable URL for the file at the resolved branch.
    pub url: String,
}

/// A bounded unit of text plus its metadata, the unit submitted to the
/// vector index. The metadata map always carries `file_path`, `url` and
/// `text`; `text` is the tensorized field on submission.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Turns file content into token-bounded chunks.
pub trait Chunker {
    fn chunk(&self, content: &str, meta: &FileMetadata) -> Vec<Chunk>;
}

/// Paragraph-boundary splitter under an approximate token budget.
pub struct ParagraphChunker {
    max_tokens: usize,
}

impl ParagraphChunker {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, content: &str, meta: &FileMetadata) -> Vec<Chunk> {
        let max_chars = self.max_tokens * CHARS_PER_TOKEN;

        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut index: i64 = 0;

        for paragraph in content.split("\n\n") {
            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Flush the buffer when appending would exceed the budget.
            let appended_len = if buffer.is_empty() {
                trimmed.len()
            } else {
                buffer.len() + 2 + trimmed.len()
            };
            if appended_len > max_chars && !buffer.is_empty() {
                chunks.push(make_chunk(meta, index, &buffer));
                index += 1;
                buffer.clear();
            }

            if trimmed.len() > max_chars {
                // A single paragraph over the budget: hard-split it.
                if !buffer.is_empty() {
                    chunks.push(make_chunk(meta, index, &buffer));
                    index += 1;
                    buffer.clear();
                }
                let mut remaining = trimmed;
                while !remaining.is_empty() {
                    let split_at = split_point(remaining, max_chars);
                    chunks.push(make_chunk(meta, index, remaining[..split_at].trim()));
                    index += 1;
                    remaining = &remaining[split_at..];
                }
            } else {
                if !buffer.is_empty() {
                    buffer.push_str("\n\n");
                }
                buffer.push_str(trimmed);
            }
        }

        if !buffer.is_empty() {
            chunks.push(make_chunk(meta, index, &buffer));
        }

        if chunks.is_empty() {
            chunks.push(make_chunk(meta, 0, content.trim()));
        }

        chunks
    }
}

/// Where to cut an oversized paragraph: the last newline or space before the
/// budget, else a straight cut floored to a char boundary.
fn split_point(text: &str, max_chars: usize) -> usize {
    if text.len() <= max_chars {
        return text.len();
    }

    let mut cut = max_chars;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    text[..cut]
        .rfind('\n')
        .or_else(|| text[..cut].rfind(' '))
        .map(|pos| pos + 1)
        .unwrap_or(cut)
}

fn make_chunk(meta: &FileMetadata, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let mut metadata = Map::new();
    metadata.insert("_id".to_string(), json!(Uuid::new_v4().to_string()));
    metadata.insert("file_path".to_string(), json!(meta.file_path));
    metadata.insert("url".to_string(), json!(meta.url));
    metadata.insert("text".to_string(), json!(text));
    metadata.insert("chunk_index".to_string(), json!(index));
    metadata.insert("hash".to_string(), json!(hash));

    Chunk {
        text: text.to_string(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> FileMetadata {
        FileMetadata {
            file_path: "src/lib.rs".to_string(),
            url: "https://gitlab.example.com/acme/billing/-/blob/main/src/lib.rs".to_string(),
        }
    }

    #[test]
    fn small_text_yields_single_chunk() {
        let chunks = ParagraphChunker::new(700).chunk("Hello, world!", &meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn metadata_carries_provenance_fields() {
        let chunks = ParagraphChunker::new(700).chunk("Some content.", &meta());
        let metadata = &chunks[0].metadata;
        assert_eq!(metadata["file_path"], "src/lib.rs");
        assert_eq!(
            metadata["url"],
            "https://gitlab.example.com/acme/billing/-/blob/main/src/lib.rs"
        );
        assert_eq!(metadata["text"], "Some content.");
        assert_eq!(metadata["chunk_index"], 0);
        assert!(metadata.contains_key("_id"));
        assert!(metadata.contains_key("hash"));
    }

    #[test]
    fn chunks_respect_the_token_budget() {
        let text = (0..60)
            .map(|i| format!("Paragraph number {i} with some filler words."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let max_tokens = 20;
        let chunks = ParagraphChunker::new(max_tokens).chunk(&text, &meta());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= max_tokens * CHARS_PER_TOKEN);
        }
    }

    #[test]
    fn chunk_indices_are_contiguous() {
        let text = (0..40)
            .map(|i| format!("Paragraph {i}."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = ParagraphChunker::new(5).chunk(&text, &meta());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata["chunk_index"], i as i64);
        }
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let text = "word ".repeat(200);
        let chunks = ParagraphChunker::new(10).chunk(&text, &meta());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 40);
        }
    }

    #[test]
    fn multibyte_content_splits_on_char_boundaries() {
        let text = "é".repeat(300);
        let chunks = ParagraphChunker::new(10).chunk(&text, &meta());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().all(|c| c == 'é'));
        }
    }

    #[test]
    fn chunk_text_and_hash_are_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma";
        let first = ParagraphChunker::new(5).chunk(text, &meta());
        let second = ParagraphChunker::new(5).chunk(text, &meta());
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.metadata["hash"], b.metadata["hash"]);
        }
    }
}

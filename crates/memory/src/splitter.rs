//! Recursive character text splitter.
//!
//! Splits on the coarsest separator present (paragraphs, then lines, then
//! words, then characters), recursing into pieces that are still too long,
//! and re-merges small pieces into chunks of at most `chunk_size`
//! characters. Consecutive chunks share up to `chunk_overlap` characters so
//! that context at a boundary is not lost.

use crate::loader::SourceDocument;
use llmcraft_core::retrieval::DocumentChunk;
use std::collections::VecDeque;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    /// `chunk_size` is clamped to at least 1 and `chunk_overlap` to below it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Split one document, tagging every chunk with its source.
    pub fn split_document(&self, doc: &SourceDocument) -> Vec<DocumentChunk> {
        self.split_text(&doc.content)
            .into_iter()
            .map(|content| DocumentChunk::new(content, doc.source.clone()))
            .collect()
    }

    pub fn split_documents(&self, docs: &[SourceDocument]) -> Vec<DocumentChunk> {
        docs.iter().flat_map(|d| self.split_document(d)).collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator that occurs in the text; "" always matches.
        let idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
            .unwrap_or(separators.len());
        let (separator, rest) = match separators.get(idx) {
            Some(sep) => (sep.as_str(), &separators[idx + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(std::mem::take(&mut pending), separator));
            }
            if rest.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, rest));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(pending, separator));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, carrying a tail of the previous
    /// chunk (at most `chunk_overlap` characters) into the next one.
    fn merge(&self, pieces: Vec<String>, separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut out = Vec::new();
        let mut window: VecDeque<String> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            let joined = if window.is_empty() { 0 } else { sep_len };

            if total + len + joined > self.chunk_size && !window.is_empty() {
                push_joined(&mut out, &window, separator);
                while total > self.chunk_overlap
                    || (total > 0 && total + len + sep_len > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(&front) + if window.is_empty() { 0 } else { sep_len };
                }
                if window.is_empty() {
                    total = 0;
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }

        push_joined(&mut out, &window, separator);
        out
    }
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<String>, separator: &str) {
    let joined = window.iter().map(String::as_str).collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(100, 20);
        assert_eq!(splitter.split_text("hello world"), vec!["hello world"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(TextSplitter::new(10, 2).split_text("").is_empty());
        assert!(TextSplitter::new(10, 2).split_text("\n\n\n").is_empty());
    }

    #[test]
    fn paragraphs_split_before_words() {
        let splitter = TextSplitter::new(12, 0);
        let chunks = splitter.split_text("first para\n\nsecond para");
        assert_eq!(chunks, vec!["first para", "second para"]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let splitter = TextSplitter::new(10, 4);
        let chunks = splitter.split_text("aa bb cc dd ee ff gg");
        for c in &chunks {
            assert!(c.chars().count() <= 10, "chunk too long: {c:?}");
        }
        assert_eq!(chunks, vec!["aa bb cc", "cc dd ee", "ee ff gg"]);
    }

    #[test]
    fn long_word_falls_back_to_characters() {
        let splitter = TextSplitter::new(4, 0);
        let chunks = splitter.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let splitter = TextSplitter::new(4, 0);
        let chunks = splitter.split_text("你好世界再见");
        assert_eq!(chunks, vec!["你好世界", "再见"]);
    }

    #[test]
    fn chunks_carry_source() {
        let splitter = TextSplitter::new(5, 0);
        let doc = SourceDocument {
            content: "one two three".into(),
            source: "docs/a.md".into(),
        };
        let chunks = splitter.split_document(&doc);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.source == "docs/a.md"));
    }

    #[test]
    fn overlap_clamped_below_size() {
        let splitter = TextSplitter::new(5, 50);
        assert_eq!(splitter.chunk_overlap, 4);
    }
}

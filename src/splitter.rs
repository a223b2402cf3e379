//! Recursive character splitting.
//!
//! Text is cut on the largest structural boundary it contains (paragraph,
//! line, sentence, word) and only falls back to single characters when a piece
//! has no smaller boundary left. Pieces are then merged greedily into chunks
//! of at most `chunk_size` characters, each chunk starting with up to
//! `chunk_overlap` characters carried over from the end of the previous one.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RagError, Result};
use crate::loader::{DocumentMetadata, RawDocument};

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits `text` after every occurrence of `separator`, or into single
/// characters when the separator is empty.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split_inclusive(separator)
            .filter(|piece| !piece.is_empty())
            .collect()
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be at least 1".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits every document, carrying its metadata over to each chunk.
    pub fn split_documents(&self, documents: &[RawDocument]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.text).into_iter().map(|text| Chunk {
                    text,
                    metadata: doc.metadata.clone(),
                })
            })
            .collect();

        info!("Documents split into {} chunks", chunks.len());
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending));
        }
        chunks
    }

    /// Greedily packs pieces into windows of at most `chunk_size` chars.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_window(&mut chunks, &window);

                // Keep at most `chunk_overlap` chars, and make room for `piece`.
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }

            window.push_back(piece);
            total += len;
        }

        push_window(&mut chunks, &window);
        chunks
    }
}

fn push_window(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str, source: &str) -> RawDocument {
        RawDocument {
            text: text.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                file_path: format!("docs/{source}"),
                page: Some(3),
            },
        }
    }

    const ESSAY: &str = "Sleep is the foundation of recovery. Adults need seven to nine hours. \
        Keep a regular schedule, even on weekends.\n\nLight exposure in the morning anchors \
        the circadian rhythm. Avoid screens an hour before bed. Caffeine lingers for hours, so \
        stop drinking coffee after noon.\n\nExercise improves sleep quality, but intense \
        workouts late at night can delay sleep onset. A cool, dark and quiet bedroom helps.";

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_short_document_single_chunk() -> anyhow::Result<()> {
        let splitter = TextSplitter::new(1000, 200)?;
        let chunks = splitter.split_documents(&[doc("Sleep 8 hours nightly for recovery.", "sleep.txt")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Sleep 8 hours nightly for recovery.");
        Ok(())
    }

    #[test]
    fn test_short_multi_paragraph_document_single_chunk() -> anyhow::Result<()> {
        let splitter = TextSplitter::new(1000, 200)?;
        let chunks = splitter.split_text(ESSAY);
        assert_eq!(chunks, vec![ESSAY.to_string()]);
        Ok(())
    }

    #[test]
    fn test_chunks_respect_size_and_are_substrings() -> anyhow::Result<()> {
        let splitter = TextSplitter::new(80, 20)?;
        let chunks = splitter.split_text(ESSAY);
        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 80, "too long: {chunk:?}");
            assert!(ESSAY.contains(chunk.as_str()), "not contiguous: {chunk:?}");
        }
        Ok(())
    }

    #[test]
    fn test_chunks_cover_every_word_in_order() -> anyhow::Result<()> {
        let splitter = TextSplitter::new(60, 15)?;
        let chunks = splitter.split_text(ESSAY);

        // Walk the chunks through the source; each must start at or before the
        // end of the previous one, leaving no gap.
        let mut covered_to = 0;
        let mut search_from = 0;
        for chunk in &chunks {
            let start = ESSAY[search_from..]
                .find(chunk.as_str())
                .map(|offset| offset + search_from)
                .expect("chunk not found after previous chunk");
            if start > covered_to {
                assert!(ESSAY[covered_to..start].trim().is_empty(), "gap before {chunk:?}");
            }
            covered_to = covered_to.max(start + chunk.len());
            search_from = start + 1;
        }
        assert!(ESSAY[covered_to..].trim().is_empty());
        Ok(())
    }

    #[test]
    fn test_consecutive_chunks_overlap() -> anyhow::Result<()> {
        let text = (1..=40).map(|n| format!("w{n:02}")).collect::<Vec<_>>().join(" ");
        let splitter = TextSplitter::new(30, 10)?;
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap_or_default();
            assert!(pair[1].starts_with(last_word) || pair[1].contains(last_word));
        }
        Ok(())
    }

    #[test]
    fn test_no_overlap_partitions_words() -> anyhow::Result<()> {
        let text = (1..=40).map(|n| format!("w{n:02}")).collect::<Vec<_>>().join(" ");
        let splitter = TextSplitter::new(30, 0)?;
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks.join(" "), text);
        Ok(())
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() -> anyhow::Result<()> {
        let text = "a".repeat(25);
        let splitter = TextSplitter::new(10, 2)?;
        let chunks = splitter.split_text(&text);
        assert!(chunks.iter().all(|c| c.len() <= 10));
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks.len(), 3);
        Ok(())
    }

    #[test]
    fn test_multibyte_text_counts_chars() -> anyhow::Result<()> {
        let text = "ñ".repeat(12);
        let splitter = TextSplitter::new(5, 0)?;
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
        Ok(())
    }

    #[test]
    fn test_metadata_inherited() -> anyhow::Result<()> {
        let splitter = TextSplitter::new(80, 10)?;
        let parent = doc(ESSAY, "essay.pdf");
        let chunks = splitter.split_documents(std::slice::from_ref(&parent));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.metadata == parent.metadata));
        Ok(())
    }

    #[test]
    fn test_blank_document_yields_nothing() -> anyhow::Result<()> {
        let splitter = TextSplitter::new(50, 5)?;
        assert!(splitter.split_documents(&[doc("  \n\n  ", "empty.txt")]).is_empty());
        Ok(())
    }
}

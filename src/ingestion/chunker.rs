//! Recursive character text splitting.
//!
//! Text is split on the first separator that occurs in it (paragraphs, then
//! lines, then words, then characters). Pieces that are still longer than the
//! chunk size are split again with the next separator; short pieces are
//! merged back together up to the chunk size, carrying up to `chunk_overlap`
//! characters of trailing context into the next chunk.
//!
//! All lengths are counted in characters, not bytes.

use std::collections::VecDeque;

/// Default maximum chunk length.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TextChunker {
    /// Create a chunker.
    ///
    /// # Errors
    /// Returns an error message if `chunk_size` is zero or the overlap is not
    /// smaller than the chunk size
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, String> {
        if chunk_size == 0 {
            return Err("chunk size must be greater than zero".to_string());
        }
        if chunk_overlap >= chunk_size {
            return Err(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    ///
    /// Chunks are trimmed; empty chunks are dropped.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text; "" always matches
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                chunks.extend(self.merge(&short_pieces, separator));
                short_pieces.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !short_pieces.is_empty() {
            chunks.extend(self.merge(&short_pieces, separator));
        }
        chunks
    }

    /// Join pieces with `separator` into chunks no longer than the chunk
    /// size, keeping up to `chunk_overlap` characters of the previous chunk.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |current: &VecDeque<&str>, total: usize| {
                total + len + if current.is_empty() { 0 } else { separator_len }
            };

            if joined_len(&current, total) > self.chunk_size && !current.is_empty() {
                push_chunk(&mut chunks, &current, separator);

                // Drop from the front until the overlap fits
                while total > self.chunk_overlap
                    || (joined_len(&current, total) > self.chunk_size && total > 0)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if current.is_empty() { 0 } else { separator_len };
                }
            }

            total += len + if current.is_empty() { 0 } else { separator_len };
            current.push_back(piece);
        }

        push_chunk(&mut chunks, &current, separator);
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_chunk(chunks: &mut Vec<String>, pieces: &VecDeque<&str>, separator: &str) {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = TextChunker::default();
        assert_eq!(chunker.split("  A short abstract.  "), vec!["A short abstract."]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(TextChunker::default().split("").is_empty());
        assert!(TextChunker::default().split(" \n\n ").is_empty());
    }

    #[test]
    fn test_paragraphs_kept_together_when_they_fit() {
        let chunker = TextChunker::new(30, 0).unwrap();
        let chunks = chunker.split("first paragraph\n\nsecond one\n\nthird paragraph here");
        assert_eq!(chunks, vec!["first paragraph\n\nsecond one", "third paragraph here"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = "word ".repeat(400);
        let chunker = TextChunker::new(100, 20).unwrap();
        let chunks = chunker.split(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text: String = (0..60).map(|i| format!("w{:02} ", i)).collect();
        let chunker = TextChunker::new(40, 12).unwrap();
        let chunks = chunker.split(&text);

        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "expected '{}' to carry into '{}'",
                last_word,
                pair[1]
            );
        }
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(25);
        let chunker = TextChunker::new(10, 0).unwrap();
        let chunks = chunker.split(&text);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_lengths_counted_in_chars() {
        let text = "é".repeat(12);
        let chunker = TextChunker::new(6, 0).unwrap();
        let chunks = chunker.split(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() == 6));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(50, 50).is_err());
        assert!(TextChunker::new(50, 49).is_ok());
    }
}

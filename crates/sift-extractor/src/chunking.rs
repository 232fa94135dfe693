//! Overlapping fixed-size text windows

use crate::config::ChunkProfile;
use crate::error::ExtractorError;
use serde::Serialize;

/// A contiguous window of the source text
///
/// Offsets are character (not byte) positions, half-open `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position of this chunk, starting at 0
    pub index: usize,

    /// Number of chunks produced for the document
    pub total: usize,

    /// First character offset
    pub start: usize,

    /// One past the last character offset
    pub end: usize,

    /// The window's text
    pub text: String,
}

impl Chunk {
    /// Whether this is the first chunk (the one that gets the initial prompt)
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Whether this is the final chunk
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits text into overlapping windows
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    max_chunks: Option<usize>,
}

impl TextChunker {
    /// Create a chunker; requires `chunk_size > overlap`
    pub fn new(
        chunk_size: usize,
        overlap: usize,
        max_chunks: Option<usize>,
    ) -> Result<Self, ExtractorError> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ExtractorError::Config(format!(
                "chunk_size ({}) must be greater than overlap ({})",
                chunk_size, overlap
            )));
        }
        if max_chunks == Some(0) {
            return Err(ExtractorError::Config(
                "max_chunks must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            overlap,
            max_chunks,
        })
    }

    /// Create a chunker from a configured profile
    pub fn from_profile(profile: ChunkProfile) -> Result<Self, ExtractorError> {
        Self::new(profile.chunk_size, profile.overlap, Some(profile.max_chunks))
    }

    /// Split `text`; an empty text yields no chunks
    ///
    /// Windows advance by `chunk_size - overlap` and stop once a window
    /// reaches the end of the text or `max_chunks` windows exist.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        // Byte offset of every character, plus the end of the string
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        let stride = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < char_len {
            if self.max_chunks.is_some_and(|max| chunks.len() >= max) {
                break;
            }

            let end = (start + self.chunk_size).min(char_len);
            chunks.push(Chunk {
                index: chunks.len(),
                total: 0,
                start,
                end,
                text: text[boundaries[start]..boundaries[end]].to_string(),
            });

            if end == char_len {
                break;
            }
            start += stride;
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total = total;
        }
        chunks
    }
}

/// Split `text` into windows of `chunk_size` characters overlapping by `overlap`
pub fn split(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    max_chunks: Option<usize>,
) -> Result<Vec<Chunk>, ExtractorError> {
    Ok(TextChunker::new(chunk_size, overlap, max_chunks)?.chunk(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(chunks: &[Chunk]) -> Vec<(usize, usize)> {
        chunks.iter().map(|c| (c.start, c.end)).collect()
    }

    #[test]
    fn test_empty_text() {
        let chunks = split("", 100, 10, None).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk_regardless_of_overlap() {
        let text = "a".repeat(900);
        let chunks = split(&text, 1000, 200, None).unwrap();
        assert_eq!(ranges(&chunks), vec![(0, 900)]);
        assert!(chunks[0].is_first() && chunks[0].is_last());
    }

    #[test]
    fn test_overlapping_windows() {
        let text = "x".repeat(2500);
        let chunks = split(&text, 1000, 200, None).unwrap();
        assert_eq!(ranges(&chunks), vec![(0, 1000), (800, 1800), (1600, 2500)]);
        assert!(chunks.iter().all(|c| c.total == 3));
        assert_eq!(chunks[2].len(), 900);
    }

    #[test]
    fn test_max_chunks_bound() {
        let text = "y".repeat(100_000);
        let chunks = split(&text, 3000, 500, Some(10)).unwrap();
        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks[9].start, 9 * 2500);
    }

    #[test]
    fn test_fulltext_profile_on_nine_thousand_chars() {
        let text = "z".repeat(9000);
        let chunker = TextChunker::from_profile(ChunkProfile::fulltext_default()).unwrap();
        let chunks = chunker.chunk(&text);
        assert_eq!(
            ranges(&chunks),
            vec![(0, 3000), (2500, 5500), (5000, 8000), (7500, 9000)]
        );
    }

    #[test]
    fn test_abstract_profile_truncates_to_one_chunk() {
        let text = "w".repeat(25_000);
        let chunker = TextChunker::from_profile(ChunkProfile::abstract_default()).unwrap();
        let chunks = chunker.chunk(&text);
        assert_eq!(ranges(&chunks), vec![(0, 10_000)]);
    }

    #[test]
    fn test_offsets_are_characters_not_bytes() {
        let text = "é".repeat(10);
        let chunks = split(&text, 4, 1, None).unwrap();
        assert_eq!(ranges(&chunks), vec![(0, 4), (3, 7), (6, 10)]);
        assert_eq!(chunks[0].text, "éééé");
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(split("abc", 10, 10, None), Err(ExtractorError::Config(_))));
        assert!(matches!(split("abc", 0, 0, None), Err(ExtractorError::Config(_))));
        assert!(matches!(split("abc", 10, 0, Some(0)), Err(ExtractorError::Config(_))));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: chunks cover the text with no gaps
        #[test]
        fn test_chunks_cover_text(len in 1usize..5_000, size in 2usize..800, overlap_pct in 0usize..100) {
            let overlap = (size - 1) * overlap_pct / 100;
            let text = "a".repeat(len);
            let chunks = split(&text, size, overlap, None).unwrap();

            prop_assert_eq!(chunks[0].start, 0);
            prop_assert_eq!(chunks.last().unwrap().end, len);
            for pair in chunks.windows(2) {
                prop_assert!(pair[1].start <= pair[0].end, "gap between chunks");
                prop_assert!(pair[1].start > pair[0].start);
            }
            for chunk in &chunks {
                prop_assert!(chunk.len() <= size);
                prop_assert_eq!(chunk.text.chars().count(), chunk.len());
            }
        }

        /// Property: the chunk count never exceeds max_chunks
        #[test]
        fn test_max_chunks_respected(len in 0usize..20_000, max in 1usize..12) {
            let text = "b".repeat(len);
            let chunks = split(&text, 500, 100, Some(max)).unwrap();
            prop_assert!(chunks.len() <= max);
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.total, chunks.len());
            }
        }
    }
}

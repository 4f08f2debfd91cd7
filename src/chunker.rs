//! Fixed-window text chunking with overlap.
//!
//! Splits a text unit into windows of `window_chars` characters that
//! advance by `window_chars - overlap_chars` each step, so consecutive
//! chunks share an overlap region. All arithmetic is in characters, never
//! bytes — window boundaries always land on valid UTF-8 char boundaries.

/// Overlapping fixed-size window chunker.
///
/// Deterministic and order-preserving: chunk index equals emission order.
#[derive(Debug, Clone)]
pub struct Chunker {
    window_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    /// # Panics
    ///
    /// Panics if `window_chars` is 0 or `overlap_chars >= window_chars`.
    /// Config validation rejects both before a pipeline is built.
    pub fn new(window_chars: usize, overlap_chars: usize) -> Self {
        assert!(window_chars > 0, "window_chars must be > 0");
        assert!(
            overlap_chars < window_chars,
            "overlap_chars must be < window_chars"
        );
        Self {
            window_chars,
            overlap_chars,
        }
    }

    pub fn window_chars(&self) -> usize {
        self.window_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }

    /// Split `text` into overlapping windows.
    ///
    /// Empty text yields an empty sequence; text shorter than one window
    /// yields exactly one chunk equal to the whole text. The final window
    /// may be shorter than `window_chars` but is never empty.
    pub fn split(&self, text: &str) -> Vec<String> {
        let char_offsets: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
        if char_offsets.is_empty() {
            return Vec::new();
        }

        let total_chars = char_offsets.len();
        let step = self.window_chars - self.overlap_chars;
        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let end = (start + self.window_chars).min(total_chars);
            let byte_start = char_offsets[start];
            let byte_end = if end < total_chars {
                char_offsets[end]
            } else {
                text.len()
            };
            chunks.push(text[byte_start..byte_end].to_string());

            if end == total_chars {
                break;
            }
            start += step;
        }

        chunks
    }
}

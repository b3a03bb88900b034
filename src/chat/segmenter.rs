//! Sentence segmentation of streamed reply text

/// Characters that end a speakable chunk
pub const TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Splits a stream of text fragments into sentence-sized chunks
///
/// A chunk ends at, and includes, every terminator character. Text after
/// the last terminator is carried into the next `feed` and released by
/// [`flush`](Self::flush). Concatenating every chunk reproduces the input.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    acc: String,
}

impl SentenceSegmenter {
    #[must_use]
    pub const fn new() -> Self {
        Self { acc: String::new() }
    }

    /// Append a fragment, returning the chunks it completes
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        let mut chunks = Vec::new();

        for c in fragment.chars() {
            self.acc.push(c);
            if TERMINATORS.contains(&c) {
                chunks.push(std::mem::take(&mut self.acc));
            }
        }

        chunks
    }

    /// Release the unterminated remainder, if any
    pub fn flush(&mut self) -> Option<String> {
        if self.acc.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.acc))
        }
    }

    /// Text held back waiting for a terminator
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.acc
    }
}

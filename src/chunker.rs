//! Chunking strategies.
//!
//! Every chunker slides a fixed-size window over some unit of the text
//! (characters, words or sentences). The window advances by
//! `chunk_length - floor(chunk_length * sliding_window_size)` units, so a
//! non-zero window size makes consecutive passages overlap.
//!
//! Chunking is re-run on every resume, so it must be a pure function of the
//! chunker's configuration and the input text.

use crate::cell::format_fraction;
use crate::error::{Result, SweepError};
use regex::Regex;
use std::ops::Range;

/// Splits a document into an ordered passage sequence.
pub trait Chunker: Send + Sync {
    /// Stable identity derived from the configuration.
    fn identity(&self) -> String;

    /// Chunk a document's text.
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Window geometry shared by all chunkers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    /// Units per passage.
    pub chunk_length: usize,
    /// Overlap fraction in `[0.0, 1.0)`.
    pub sliding_window_size: f64,
}

impl Window {
    pub fn new(chunk_length: usize, sliding_window_size: f64) -> Result<Self> {
        if chunk_length == 0 {
            return Err(SweepError::InvalidConfig(
                "chunk_length must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&sliding_window_size) {
            return Err(SweepError::InvalidConfig(format!(
                "sliding_window_size must be in [0.0, 1.0), got {}",
                sliding_window_size
            )));
        }
        Ok(Self {
            chunk_length,
            sliding_window_size,
        })
    }

    /// Units the window advances by. Always at least 1.
    pub fn step(&self) -> usize {
        let overlap = (self.chunk_length as f64 * self.sliding_window_size).floor() as usize;
        (self.chunk_length - overlap).max(1)
    }

    /// Unit ranges covering `len` units.
    pub fn ranges(&self, len: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..len)
            .step_by(self.step())
            .map(move |start| start..(start + self.chunk_length).min(len))
    }

    fn label(&self, kind: &str) -> String {
        format!(
            "{}_{}_{}",
            kind,
            self.chunk_length,
            format_fraction(self.sliding_window_size)
        )
    }
}

/// Window over characters.
#[derive(Debug, Clone)]
pub struct CharChunker {
    window: Window,
}

impl CharChunker {
    pub fn new(chunk_length: usize, sliding_window_size: f64) -> Result<Self> {
        Ok(Self {
            window: Window::new(chunk_length, sliding_window_size)?,
        })
    }
}

impl Chunker for CharChunker {
    fn identity(&self) -> String {
        self.window.label("CharChunker")
    }

    fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        self.window
            .ranges(chars.len())
            .map(|range| chars[range].iter().collect())
            .collect()
    }
}

/// Window over word tokens, re-joined with single spaces.
#[derive(Debug, Clone)]
pub struct WordChunker {
    window: Window,
    token: Regex,
}

impl WordChunker {
    pub fn new(chunk_length: usize, sliding_window_size: f64) -> Result<Self> {
        let token = Regex::new(r"\w+(?:'\w+)?|[^\w\s]")
            .map_err(|e| SweepError::InvalidConfig(format!("word pattern: {}", e)))?;
        Ok(Self {
            window: Window::new(chunk_length, sliding_window_size)?,
            token,
        })
    }
}

impl Chunker for WordChunker {
    fn identity(&self) -> String {
        self.window.label("WordChunker")
    }

    fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = self.token.find_iter(text).map(|m| m.as_str()).collect();
        join_windows(&self.window, &words)
    }
}

/// Window over sentences, re-joined with single spaces.
#[derive(Debug, Clone)]
pub struct SentChunker {
    window: Window,
    boundary: Regex,
}

impl SentChunker {
    pub fn new(chunk_length: usize, sliding_window_size: f64) -> Result<Self> {
        let boundary = Regex::new(r#"[.!?]+["')\]]*\s+"#)
            .map_err(|e| SweepError::InvalidConfig(format!("sentence pattern: {}", e)))?;
        Ok(Self {
            window: Window::new(chunk_length, sliding_window_size)?,
            boundary,
        })
    }

    fn sentences<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in self.boundary.find_iter(text) {
            let sentence = text[start..m.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = m.end();
        }

        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }

        sentences
    }
}

impl Chunker for SentChunker {
    fn identity(&self) -> String {
        self.window.label("SentChunker")
    }

    fn chunk(&self, text: &str) -> Vec<String> {
        let sentences = self.sentences(text);
        join_windows(&self.window, &sentences)
    }
}

/// Fewer units than one window yields a single passage with all of them.
fn join_windows(window: &Window, units: &[&str]) -> Vec<String> {
    if units.len() < window.chunk_length {
        return vec![units.join(" ")];
    }

    window
        .ranges(units.len())
        .map(|range| units[range].join(" "))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_rejects_bad_parameters() {
        assert!(CharChunker::new(0, 0.0).is_err());
        assert!(CharChunker::new(3, 1.0).is_err());
        assert!(CharChunker::new(3, -0.1).is_err());
        assert!(CharChunker::new(1, 0.5).is_ok());
    }

    #[test]
    fn test_char_chunker_identity() {
        assert_eq!(CharChunker::new(1, 0.5).unwrap().identity(), "CharChunker_1_0.5");
        assert_eq!(CharChunker::new(10, 0.0).unwrap().identity(), "CharChunker_10_0.0");
    }

    #[test]
    fn test_char_chunker_overlap() {
        let chunker = CharChunker::new(3, 0.5).unwrap();
        assert_eq!(chunker.chunk("abcdefgh"), vec!["abc", "cde", "efg", "gh"]);
    }

    #[test]
    fn test_char_chunker_no_overlap() {
        let chunker = CharChunker::new(3, 0.0).unwrap();
        assert_eq!(chunker.chunk("abcdefgh"), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn test_char_chunker_counts_chars_not_bytes() {
        let chunker = CharChunker::new(2, 0.0).unwrap();
        assert_eq!(chunker.chunk("héllo"), vec!["hé", "ll", "o"]);
    }

    #[test]
    fn test_sent_chunker_groups() {
        let chunker = SentChunker::new(3, 0.0).unwrap();
        assert_eq!(
            chunker.chunk("Aa. Bb. Cc. dd. Ee. ff. Gg. Hh."),
            vec!["Aa. Bb. Cc.", "dd. Ee. ff.", "Gg. Hh."]
        );
    }

    #[test]
    fn test_sent_chunker_short_document() {
        let chunker = SentChunker::new(5, 0.0).unwrap();
        assert_eq!(chunker.chunk("One. Two!"), vec!["One. Two!"]);
    }

    #[test]
    fn test_word_chunker_overlap() {
        let chunker = WordChunker::new(4, 0.5).unwrap();
        let chunks = chunker.chunk("the quick brown fox jumps over it");
        assert_eq!(
            chunks,
            vec![
                "the quick brown fox",
                "brown fox jumps over",
                "jumps over it",
                "it"
            ]
        );
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = SentChunker::new(2, 0.5).unwrap();
        let text = "First one. Second one? Third one! Fourth.";
        assert_eq!(chunker.chunk(text), chunker.chunk(text));
    }
}

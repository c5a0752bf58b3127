//! Text chunker: turns the text buffer into engine-sized pieces.
//!
//! Two strategies are supported:
//!
//! | Strategy    | Behaviour                                                        |
//! |-------------|------------------------------------------------------------------|
//! | `Packed`    | paragraphs pass through; long ones are re-packed by sentence     |
//! | `Paragraph` | one chunk per non-empty paragraph                                |
//!
//! Lengths are counted in `char`s, never bytes, so accented text and CJK
//! punctuation do not shrink the effective budget.

use std::fmt;
use std::str::FromStr;

use fancy_regex::Regex as LookaroundRegex;
use once_cell::sync::Lazy;
use regex::Regex;

/// Default chunk budget for the packed strategy.
pub const DEFAULT_MAX_CHARS: usize = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Compiled regexes
// ─────────────────────────────────────────────────────────────────────────────

/// A blank line (possibly containing spaces) separates paragraphs.
static RE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Whitespace that follows sentence-final punctuation.
static RE_SENTENCE_GAP: Lazy<LookaroundRegex> =
    Lazy::new(|| LookaroundRegex::new(r"(?<=[.!?])\s+").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Strategy
// ─────────────────────────────────────────────────────────────────────────────

/// How the text buffer is cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Paragraphs, with long paragraphs greedily re-packed by sentence.
    Packed { max_chars: usize },
    /// One chunk per paragraph, whatever its length.
    Paragraph,
}

impl Default for ChunkStrategy {
    fn default() -> Self {
        ChunkStrategy::Packed { max_chars: DEFAULT_MAX_CHARS }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkStrategy::Packed { max_chars } => write!(f, "packed (≤ {max_chars} chars)"),
            ChunkStrategy::Paragraph => f.write_str("paragraph"),
        }
    }
}

impl FromStr for ChunkStrategy {
    type Err = String;

    /// Parses `packed`, `packed:<n>` or `paragraph`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            None if s == "packed" => Ok(ChunkStrategy::default()),
            None if s == "paragraph" => Ok(ChunkStrategy::Paragraph),
            Some(("packed", n)) => match n.parse::<usize>() {
                Ok(max_chars) if max_chars > 0 => Ok(ChunkStrategy::Packed { max_chars }),
                _ => Err(format!("invalid chunk size {n:?}")),
            },
            _ => Err(format!("unknown chunk strategy {s:?} (expected packed or paragraph)")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Splitting
// ─────────────────────────────────────────────────────────────────────────────

/// Split on blank lines; paragraphs are trimmed and empty ones dropped.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    RE_PARAGRAPH
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split a paragraph after every `.`, `!` or `?` that is followed by whitespace.
///
/// The punctuation stays with its sentence; the whitespace is dropped.
pub fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    // The pattern is a fixed look-behind, so matching cannot hit the
    // backtrack limit; an error would only end the split early.
    for gap in RE_SENTENCE_GAP.find_iter(paragraph).flatten() {
        push_trimmed(&mut sentences, &paragraph[start..gap.start()]);
        start = gap.end();
    }
    push_trimmed(&mut sentences, &paragraph[start..]);
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s);
    }
}

/// Greedily pack sentences into chunks of at most `max_chars` characters.
///
/// Sentences are joined with one space and the space counts towards the
/// budget. A sentence that is longer than `max_chars` on its own becomes a
/// chunk by itself; sentences are never cut.
pub fn pack_sentences(sentences: &[&str], max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        let len = sentence.chars().count();
        if !current.is_empty() && current_len + 1 + len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(sentence);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Cut `text` into chunks according to `strategy`.
pub fn chunk_text(text: &str, strategy: ChunkStrategy) -> Vec<String> {
    let paragraphs = split_paragraphs(text);
    match strategy {
        ChunkStrategy::Paragraph => paragraphs.into_iter().map(str::to_owned).collect(),
        ChunkStrategy::Packed { max_chars } => {
            let mut chunks = Vec::with_capacity(paragraphs.len());
            for para in paragraphs {
                if para.chars().count() > max_chars {
                    chunks.extend(pack_sentences(&split_sentences(para), max_chars));
                } else {
                    chunks.push(para.to_owned());
                }
            }
            chunks
        }
    }
}

/// Number of whitespace-separated words, used for pacing estimates.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn packed() -> ChunkStrategy {
        ChunkStrategy::default()
    }

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        let p = split_paragraphs("First one.\n\nSecond one.\n   \n\nThird.");
        assert_eq!(p, vec!["First one.", "Second one.", "Third."]);
    }

    #[test]
    fn test_single_newline_stays_in_paragraph() {
        let p = split_paragraphs("line one\nline two");
        assert_eq!(p, vec!["line one\nline two"]);
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        assert!(chunk_text("", packed()).is_empty());
        assert!(chunk_text(" \n\n \t\n", packed()).is_empty());
        assert!(chunk_text("\n\n", ChunkStrategy::Paragraph).is_empty());
    }

    #[test]
    fn test_sentences_keep_punctuation() {
        let s = split_sentences("Hi there! How are you? Fine.  Thanks");
        assert_eq!(s, vec!["Hi there!", "How are you?", "Fine.", "Thanks"]);
    }

    #[test]
    fn test_abbreviation_without_space_not_split() {
        let s = split_sentences("Version 1.5 is out.Really");
        assert_eq!(s, vec!["Version 1.5 is out.Really"]);
    }

    #[test]
    fn test_short_paragraphs_never_merged() {
        let c = chunk_text("One.\n\nTwo.\n\nThree.", packed());
        assert_eq!(c, vec!["One.", "Two.", "Three."]);
    }

    #[test]
    fn test_long_paragraph_packed_within_budget() {
        let sentence = "This sentence is exactly fifty characters long ok.";
        assert_eq!(sentence.chars().count(), 50);
        let para = vec![sentence; 30].join(" ");
        let chunks = chunk_text(&para, packed());

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= DEFAULT_MAX_CHARS, "{} chars", chunk.len());
            // every chunk is made of whole sentences
            assert!(chunk.ends_with('.'));
        }
        // 9 sentences + 8 spaces = 458; a 10th would make 509
        assert_eq!(chunks[0].chars().count(), 458);
        assert_eq!(chunks.join(" "), para);
    }

    #[test]
    fn test_overlong_sentence_kept_whole() {
        let long = format!("{}.", "a".repeat(600));
        let para = format!("Short start. {long} Short end.");
        let chunks = chunk_text(&para, packed());
        assert_eq!(chunks, vec!["Short start.".to_string(), long, "Short end.".to_string()]);
    }

    #[test]
    fn test_paragraph_at_limit_passes_through() {
        let para = "b".repeat(DEFAULT_MAX_CHARS);
        let chunks = chunk_text(&para, packed());
        assert_eq!(chunks, vec![para]);
    }

    #[test]
    fn test_paragraph_strategy_ignores_length() {
        let para = vec!["Sentence number one here."; 40].join(" ");
        let chunks = chunk_text(&para, ChunkStrategy::Paragraph);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_budget_counts_chars_not_bytes() {
        // 'é' is two bytes; 300 chars = 600 bytes must still fit in one chunk
        let para = "é".repeat(300);
        assert_eq!(chunk_text(&para, packed()).len(), 1);
    }

    #[test]
    fn test_custom_budget() {
        let chunks = chunk_text("Aaa. Bbb. Ccc. Ddd.", ChunkStrategy::Packed { max_chars: 9 });
        assert_eq!(chunks, vec!["Aaa. Bbb.", "Ccc. Ddd."]);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("packed".parse::<ChunkStrategy>().unwrap(), packed());
        assert_eq!(
            "packed:120".parse::<ChunkStrategy>().unwrap(),
            ChunkStrategy::Packed { max_chars: 120 }
        );
        assert_eq!("Paragraph".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Paragraph);
        assert!("packed:0".parse::<ChunkStrategy>().is_err());
        assert!("words".parse::<ChunkStrategy>().is_err());
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree  "), 3);
        assert_eq!(word_count(""), 0);
    }
}

//! Caption segmentation.
//!
//! Tokens are grouped into caption-sized chunks, closing a chunk at the end
//! of the utterance or (when splitting is enabled) wherever the boundary
//! predicate holds between a token and its successor.

use crate::mora::count_mora;
use crate::tokenizer::{PartOfSpeech, Token};

/// Symbols that open a bracketed span; never split right after one.
const OPENING_BRACKETS: &str = "「『【（〈《〔［｛〘〖〝〟‘“([{";

/// Content words with these surfaces stay attached to a preceding particle.
const EXEMPT_SURFACES: &[&str] = &["ー", "♪"];

/// One caption-sized piece of an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub morae: usize,
}

/// Whether a caption break belongs between `current` and `next`.
pub fn is_boundary(current: &Token, next: &Token) -> bool {
    if current.pos == PartOfSpeech::Symbol
        && !is_opening_bracket(&current.surface)
        && next.pos != PartOfSpeech::Symbol
    {
        return true;
    }
    current.pos.is_function_word()
        && next.pos.is_content_word()
        && !EXEMPT_SURFACES.contains(&next.surface.as_str())
}

fn is_opening_bracket(surface: &str) -> bool {
    let mut chars = surface.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => OPENING_BRACKETS.contains(c),
        _ => false,
    }
}

/// Group `tokens` into chunks. Boundary tokens are ignored.
pub fn segment(tokens: &[Token], split: bool) -> Vec<Chunk> {
    let words: Vec<&Token> = tokens.iter().filter(|t| !t.is_boundary()).collect();
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut morae = 0usize;

    for (i, word) in words.iter().enumerate() {
        buffer.push_str(&word.surface);
        morae += count_mora(&word.reading);

        let is_last = i + 1 == words.len();
        if is_last || (split && is_boundary(word, words[i + 1])) {
            chunks.push(Chunk {
                text: std::mem::take(&mut buffer),
                morae,
            });
            morae = 0;
        }
    }

    chunks
}

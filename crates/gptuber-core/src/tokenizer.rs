//! Morphological tokenizer boundary.
//!
//! The synthesizer only needs each token's surface form, its coarse part of
//! speech and its katakana reading. [`MecabTokenizer`] gets those from the
//! `mecab` binary with the IPADIC dictionary; tests use hand-built tokens.

use std::io::Write;
use std::process::{Command, Stdio};
use std::str::FromStr;

use crate::error::{GptuberError, Result};

// ---------------------------------------------------------------------------
// PartOfSpeech
// ---------------------------------------------------------------------------

/// Coarse part of speech (IPADIC's first feature column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    PreNounAdjectival,
    AdjectivalNoun,
    Particle,
    AuxiliaryVerb,
    Symbol,
    /// Synthetic sentence start/end marker.
    Boundary,
    Other(String),
}

impl PartOfSpeech {
    /// Categories that open a new caption chunk after a particle.
    pub fn is_content_word(&self) -> bool {
        matches!(
            self,
            PartOfSpeech::Noun
                | PartOfSpeech::Verb
                | PartOfSpeech::Adjective
                | PartOfSpeech::Adverb
                | PartOfSpeech::PreNounAdjectival
                | PartOfSpeech::AdjectivalNoun
        )
    }

    pub fn is_function_word(&self) -> bool {
        matches!(self, PartOfSpeech::Particle | PartOfSpeech::AuxiliaryVerb)
    }
}

impl FromStr for PartOfSpeech {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "名詞" => PartOfSpeech::Noun,
            "動詞" => PartOfSpeech::Verb,
            "形容詞" => PartOfSpeech::Adjective,
            "副詞" => PartOfSpeech::Adverb,
            "連体詞" => PartOfSpeech::PreNounAdjectival,
            "形容動詞" => PartOfSpeech::AdjectivalNoun,
            "助詞" => PartOfSpeech::Particle,
            "助動詞" => PartOfSpeech::AuxiliaryVerb,
            "記号" => PartOfSpeech::Symbol,
            "BOS/EOS" => PartOfSpeech::Boundary,
            other => PartOfSpeech::Other(other.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub surface: String,
    pub pos: PartOfSpeech,
    /// Katakana reading; empty when the dictionary had none.
    pub reading: String,
}

impl Token {
    pub fn new(surface: impl Into<String>, pos: PartOfSpeech, reading: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            pos,
            reading: reading.into(),
        }
    }

    pub fn boundary() -> Self {
        Self::new("", PartOfSpeech::Boundary, "")
    }

    pub fn is_boundary(&self) -> bool {
        self.pos == PartOfSpeech::Boundary
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

pub trait Tokenizer: Send + Sync {
    /// Split `text` into tokens. Implementations may surround the result
    /// with [`PartOfSpeech::Boundary`] tokens.
    fn tokenize(&self, text: &str) -> Result<Vec<Token>>;
}

/// Runs the `mecab` binary once per call, feeding text on stdin.
#[derive(Debug, Clone)]
pub struct MecabTokenizer {
    program: String,
    args: Vec<String>,
}

impl Default for MecabTokenizer {
    fn default() -> Self {
        Self {
            program: "mecab".to_string(),
            args: Vec::new(),
        }
    }
}

impl MecabTokenizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// From a full argv; an empty one means plain `mecab`.
    pub fn from_argv(argv: &[String]) -> Self {
        match argv.split_first() {
            Some((program, args)) => Self::new(program.clone(), args.to_vec()),
            None => Self::default(),
        }
    }
}

impl Tokenizer for MecabTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GptuberError::TokenizerUnavailable(format!("{}: {e}", self.program)))?;

        // mecab answers line by line, so stdin is fed from its own thread
        // while stdout is drained here
        let writer = child.stdin.take().map(|mut stdin| {
            let input = format!("{text}\n");
            std::thread::spawn(move || stdin.write_all(input.as_bytes()))
        });

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GptuberError::Tokenizer(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(GptuberError::Tokenizer(format!(
                        "{}: stdin writer panicked",
                        self.program
                    )))
                }
            }
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        Ok(parse_mecab_output(text, &raw))
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Parse MeCab's default output format into tokens, wrapped in boundary
/// tokens.
///
/// MeCab drops whitespace from surfaces; anything between the previous token
/// and this one in `text` is glued back onto the front of this token's
/// surface so concatenated surfaces reproduce the input.
pub fn parse_mecab_output(text: &str, raw: &str) -> Vec<Token> {
    let mut tokens = vec![Token::boundary()];
    let mut offset = 0usize;

    for line in raw.lines() {
        if line == "EOS" || line.trim().is_empty() {
            continue;
        }
        let Some((surface, features)) = line.split_once('\t') else {
            continue;
        };
        let fields: Vec<&str> = features.split(',').collect();
        let pos: PartOfSpeech = fields
            .first()
            .copied()
            .unwrap_or("")
            .parse()
            .unwrap_or(PartOfSpeech::Other(String::new()));
        let reading = match fields.get(7) {
            Some(r) if *r != "*" => r.to_string(),
            _ => String::new(),
        };

        let mut full_surface = surface.to_string();
        if offset <= text.len() {
            if let Some(found) = text[offset..].find(surface) {
                let index = offset + found;
                full_surface = format!("{}{}", &text[offset..index], surface);
                offset = index + surface.len();
            } else {
                tracing::warn!(surface, "could not realign token with input text");
            }
        }

        tokens.push(Token::new(full_surface, pos, reading));
    }

    tokens.push(Token::boundary());
    tokens
}

//! Subtitle timeline synthesis.
//!
//! Caption timing is an estimate from mora counts, independent of actual
//! audio playback.

use std::sync::Arc;

use crate::emotes::{determine_expression, ExpressionLookup};
use crate::error::Result;
use crate::mora::{mora_to_seconds, DEFAULT_SECONDS_PER_MORA};
use crate::segment::segment;
use crate::text::remove_emojis;
use crate::tokenizer::Tokenizer;
use crate::types::TimelineEvent;

#[derive(Clone)]
pub struct TimelineSynthesizer {
    tokenizer: Arc<dyn Tokenizer>,
    expressions: Arc<dyn ExpressionLookup>,
    seconds_per_mora: f64,
}

impl TimelineSynthesizer {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, expressions: Arc<dyn ExpressionLookup>) -> Self {
        Self {
            tokenizer,
            expressions,
            seconds_per_mora: DEFAULT_SECONDS_PER_MORA,
        }
    }

    pub fn with_seconds_per_mora(mut self, seconds_per_mora: f64) -> Self {
        self.seconds_per_mora = seconds_per_mora;
        self
    }

    /// Build the caption timeline for one utterance.
    ///
    /// One event per chunk at the cumulative duration of the chunks before
    /// it, then a clearing event at the total duration. `prefix` goes on
    /// every caption except the clearing event.
    pub fn synthesize(&self, text: &str, split: bool, prefix: &str) -> Result<Vec<TimelineEvent>> {
        let tokens = self.tokenizer.tokenize(text)?;
        let chunks = segment(&tokens, split);

        let mut events = Vec::with_capacity(chunks.len() + 1);
        let mut elapsed_morae = 0usize;
        for chunk in &chunks {
            events.push(TimelineEvent {
                offset_seconds: mora_to_seconds(elapsed_morae, self.seconds_per_mora),
                caption: format!("{prefix}{}", remove_emojis(&chunk.text, "")),
                expression: determine_expression(&chunk.text, self.expressions.as_ref()),
            });
            elapsed_morae += chunk.morae;
        }
        events.push(TimelineEvent {
            offset_seconds: mora_to_seconds(elapsed_morae, self.seconds_per_mora),
            caption: String::new(),
            expression: None,
        });

        Ok(events)
    }
}

//! Emoji → expression mapping for the streamer's avatar.

use std::collections::HashMap;
use std::path::Path;

use crate::text::extract_emojis;

pub trait ExpressionLookup: Send + Sync {
    /// The expression asset for one emoji, if any.
    fn lookup(&self, emoji: &str) -> Option<String>;
}

/// In-memory emoji table.
#[derive(Debug, Clone, Default)]
pub struct ExpressionTable {
    entries: HashMap<String, String>,
}

impl ExpressionTable {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Keep only entries whose asset exists as a file under `assets_dir`.
    pub fn with_assets(entries: HashMap<String, String>, assets_dir: &Path) -> Self {
        let before = entries.len();
        let entries: HashMap<String, String> = entries
            .into_iter()
            .filter(|(_, asset)| assets_dir.join(asset).is_file())
            .collect();
        if entries.len() < before {
            tracing::debug!(
                dropped = before - entries.len(),
                dir = %assets_dir.display(),
                "expression entries without an asset file were dropped"
            );
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExpressionLookup for ExpressionTable {
    fn lookup(&self, emoji: &str) -> Option<String> {
        self.entries.get(emoji).cloned()
    }
}

/// The most frequent expression among the emoji in `text`. Emoji with no
/// mapping are not counted; ties go to the expression seen first.
pub fn determine_expression(text: &str, lookup: &dyn ExpressionLookup) -> Option<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for emoji in extract_emojis(text) {
        let Some(expr) = lookup.lookup(emoji) else {
            continue;
        };
        match counts.iter_mut().find(|(e, _)| *e == expr) {
            Some((_, n)) => *n += 1,
            None => counts.push((expr, 1)),
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (expr, n) in counts {
        let better = match &best {
            Some((_, m)) => n > *m,
            None => true,
        };
        if better {
            best = Some((expr, n));
        }
    }
    best.map(|(expr, _)| expr)
}

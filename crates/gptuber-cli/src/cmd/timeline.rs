use crate::output::print_json;
use anyhow::Context;
use gptuber_core::config::Config;
use gptuber_core::emotes::ExpressionTable;
use gptuber_core::timeline::TimelineSynthesizer;
use gptuber_core::tokenizer::MecabTokenizer;
use gptuber_core::types::DisplayMessage;
use std::path::Path;
use std::sync::Arc;

/// Synthesize the caption timeline for `text` and print the display message
/// the streamer would broadcast for it.
pub fn run(
    config_path: &Path,
    text: &str,
    split: bool,
    prefix: &str,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let tokenizer = MecabTokenizer::from_argv(&config.timeline.mecab_command);
    let expressions = match &config.expressions.assets_dir {
        Some(dir) => ExpressionTable::with_assets(config.expressions.table.clone(), dir),
        None => ExpressionTable::new(config.expressions.table.clone()),
    };
    let synth = TimelineSynthesizer::new(Arc::new(tokenizer), Arc::new(expressions))
        .with_seconds_per_mora(config.timeline.seconds_per_mora);

    let timeline = synth
        .synthesize(text, split, prefix)
        .context("failed to build the timeline")?;
    let message = DisplayMessage::Subtitle { timeline };

    if json {
        print_json(&message)
    } else {
        println!("{}", message.to_json()?);
        Ok(())
    }
}

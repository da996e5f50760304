use std::sync::Arc;

use anyhow::{bail, Context};
use gptuber_core::collab::{Completion, Speaker};
use gptuber_core::config::SpeechConfig;
use gptuber_core::text::convert_text_for_speech;
use gptuber_core::types::SpeechMode;
use tokio::process::Command;

use crate::command::run_command;

/// Speaks through external programs: a neural TTS script plus an audio
/// player, or the system `say` command.
///
/// Every call signals its completion when playback ends, whether or not it
/// succeeded.
#[derive(Debug, Clone)]
pub struct CommandSpeaker {
    config: Arc<SpeechConfig>,
}

impl CommandSpeaker {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&self, text: &str, mode: SpeechMode, done: Completion) {
        let config = self.config.clone();
        let text = convert_text_for_speech(text);
        tokio::spawn(async move {
            if let Err(e) = play(&config, &text, mode).await {
                tracing::warn!(mode = mode.as_str(), error = %e, "speech failed");
            }
            done.finish();
        });
    }
}

async fn play(config: &SpeechConfig, text: &str, mode: SpeechMode) -> anyhow::Result<()> {
    match mode {
        SpeechMode::NeuralJp => {
            let mut argv = config.neural_command.clone();
            argv.push(text.to_string());
            let out = run_command(&argv, "").await?;
            let audio = out.trim();
            if audio.is_empty() {
                bail!("neural TTS produced no audio path");
            }
            let mut player = config.player_command.clone();
            player.push(audio.to_string());
            run_to_end(&player).await
        }
        SpeechMode::ClassicJp => {
            say(config, &config.classic_jp_voice, text).await
        }
        SpeechMode::ClassicEn => {
            say(config, &config.classic_en_voice, text).await
        }
    }
}

async fn say(config: &SpeechConfig, voice: &str, text: &str) -> anyhow::Result<()> {
    let argv = vec![
        config.say_command.clone(),
        "-v".to_string(),
        voice.to_string(),
        text.to_string(),
    ];
    run_to_end(&argv).await
}

async fn run_to_end(argv: &[String]) -> anyhow::Result<()> {
    let (program, args) = argv.split_first().context("command is empty")?;
    let status = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("failed to spawn '{program}'"))?;
    if !status.success() {
        bail!("'{program}' exited with {status}");
    }
    Ok(())
}

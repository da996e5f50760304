//! Content generation and distraction backed by external commands.
//!
//! Both speak a plain-text protocol: the command gets its input on stdin
//! (the report, or nothing) and answers on stdout.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use gptuber_core::canned::parse_streamer_output;
use gptuber_core::collab::{Brain, Distractor};
use gptuber_core::types::Action;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Longest we wait for a generation command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Run `argv`, feed `input` on stdin and return stdout.
pub async fn run_command(argv: &[String], input: &str) -> anyhow::Result<String> {
    let (program, args) = argv.split_first().context("command is empty")?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn '{program}'"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
        // dropping stdin closes it
    }

    let output = tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
        .await
        .with_context(|| format!("'{program}' timed out"))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "'{program}' exited with {}: {}",
            output.status,
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ---------------------------------------------------------------------------
// CommandBrain
// ---------------------------------------------------------------------------

/// Report on stdin, raw utterance on stdout.
#[derive(Debug, Clone)]
pub struct CommandBrain {
    argv: Vec<String>,
}

impl CommandBrain {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Brain for CommandBrain {
    async fn generate(&self, report: &str) -> anyhow::Result<Action> {
        let raw = run_command(&self.argv, report).await?;
        if raw.trim().is_empty() {
            bail!("brain command produced no output");
        }
        Ok(parse_streamer_output(&raw))
    }
}

// ---------------------------------------------------------------------------
// CommandDistractor
// ---------------------------------------------------------------------------

/// Prints a TV script on stdout.
#[derive(Debug, Clone)]
pub struct CommandDistractor {
    argv: Vec<String>,
}

impl CommandDistractor {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Distractor for CommandDistractor {
    async fn generate(&self) -> anyhow::Result<String> {
        let script = run_command(&self.argv, "").await?;
        Ok(script.trim().to_string())
    }
}

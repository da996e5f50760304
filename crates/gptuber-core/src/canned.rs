//! Output parsing for generated utterances, plus stand-in collaborators used
//! when no language model, agent or speech engine is available.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::mpsc;

use crate::collab::{Brain, ChatFeed, Completion, Distractor, SmartAgent, Speaker};
use crate::mora::count_mora;
use crate::text::{pick_first_row, remove_emojis, remove_linebreaks};
use crate::types::{Action, ChatMessage, SpeechMode};

/// Longest query accepted from an "OK Google" phrase; longer matches are
/// taken to be extraction mistakes.
const MAX_QUERY_CHARS: usize = 40;

static QUERY_RE: OnceLock<Regex> = OnceLock::new();

/// Clean a raw model completion into a streamer [`Action`].
///
/// Keeps the first line, strips one layer of `「」`, `""` and `''`, and
/// pulls out a smart-agent query from `OK Google, ...`.
pub fn parse_streamer_output(raw: &str) -> Action {
    let first = remove_linebreaks(pick_first_row(raw.trim()));
    let mut text = first.trim();
    for (open, close) in [("「", "」"), ("\"", "\""), ("'", "'")] {
        text = text.strip_prefix(open).unwrap_or(text);
        text = text.strip_suffix(close).unwrap_or(text);
    }

    let re = QUERY_RE.get_or_init(|| Regex::new(r"OK Google[,，、](.+?(?:$|[?？!！。]))").unwrap());
    let query = re
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|q| q.chars().count() <= MAX_QUERY_CHARS);

    Action::streamer(text, query)
}

// ---------------------------------------------------------------------------
// Canned brain and distraction
// ---------------------------------------------------------------------------

/// Always says the same thing.
#[derive(Debug, Clone)]
pub struct CannedBrain {
    pub utterance: String,
}

impl Default for CannedBrain {
    fn default() -> Self {
        Self {
            utterance: "こんにちは。今日はいい天気ですね。".to_string(),
        }
    }
}

#[async_trait]
impl Brain for CannedBrain {
    async fn generate(&self, _report: &str) -> anyhow::Result<Action> {
        Ok(parse_streamer_output(&self.utterance))
    }
}

#[derive(Debug, Clone)]
pub struct CannedDistractor {
    pub script: String,
}

impl Default for CannedDistractor {
    fn default() -> Self {
        Self {
            script: "テスト放送中".to_string(),
        }
    }
}

#[async_trait]
impl Distractor for CannedDistractor {
    async fn generate(&self) -> anyhow::Result<String> {
        Ok(self.script.clone())
    }
}

// ---------------------------------------------------------------------------
// Mock agent
// ---------------------------------------------------------------------------

/// Pretends to think, then gives up.
#[derive(Debug, Clone)]
pub struct MockAgent {
    pub delay: Duration,
}

impl Default for MockAgent {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl SmartAgent for MockAgent {
    async fn run(&self, _query: &str, lines: mpsc::UnboundedSender<String>) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        let _ = lines.send("> Final Answer: Sorry I don't understand.".to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Paced speaker
// ---------------------------------------------------------------------------

/// Silent speaker that completes after roughly as long as the text would
/// take to say. Every character is treated as one mora.
#[derive(Debug, Clone)]
pub struct PacedSpeaker {
    pub seconds_per_mora: f64,
}

impl PacedSpeaker {
    pub fn new(seconds_per_mora: f64) -> Self {
        Self { seconds_per_mora }
    }

    fn estimate(&self, text: &str) -> Duration {
        let stripped = remove_emojis(text, "");
        let morae = if stripped.is_empty() {
            0
        } else {
            count_mora(&stripped)
        };
        Duration::from_secs_f64((morae as f64 * self.seconds_per_mora).max(0.0))
    }
}

impl Speaker for PacedSpeaker {
    fn speak(&self, text: &str, mode: SpeechMode, done: Completion) {
        let wait = self.estimate(text);
        tracing::debug!(mode = mode.as_str(), secs = wait.as_secs_f64(), "paced speech");
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            done.finish();
        });
    }
}

// ---------------------------------------------------------------------------
// ChatBuffer
// ---------------------------------------------------------------------------

/// Chat collected locally (e.g. from the front end). Polling drains it.
#[derive(Debug, Default)]
pub struct ChatBuffer {
    messages: Mutex<Vec<ChatMessage>>,
}

impl ChatBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn messages(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, message: ChatMessage) {
        self.messages().push(message);
    }

    pub fn drain(&self) -> Vec<ChatMessage> {
        std::mem::take(&mut *self.messages())
    }
}

#[async_trait]
impl ChatFeed for ChatBuffer {
    async fn poll_recent(&self) -> Vec<ChatMessage> {
        self.drain()
    }
}

// ---------------------------------------------------------------------------
// MergedChat
// ---------------------------------------------------------------------------

/// Several chat feeds polled in order and concatenated.
pub struct MergedChat {
    feeds: Vec<Arc<dyn ChatFeed>>,
}

impl MergedChat {
    pub fn new(feeds: Vec<Arc<dyn ChatFeed>>) -> Self {
        Self { feeds }
    }
}

#[async_trait]
impl ChatFeed for MergedChat {
    async fn poll_recent(&self) -> Vec<ChatMessage> {
        let mut all = Vec::new();
        for feed in &self.feeds {
            all.extend(feed.poll_recent().await);
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionSource;

    #[test]
    fn strips_quotes_and_keeps_first_line() {
        let a = parse_streamer_output("  「こんにちは！」\nAudience: ...");
        assert_eq!(a.text(), "こんにちは！");
        assert_eq!(a.source(), ActionSource::Streamer);
        assert!(a.query_to_external_agent().is_none());
    }

    #[test]
    fn extracts_ok_google_query() {
        let a = parse_streamer_output("気になるなあ。OK Google、東京の天気は？");
        assert_eq!(a.query_to_external_agent(), Some("東京の天気は？"));
    }

    #[test]
    fn query_runs_to_end_of_text() {
        let a = parse_streamer_output("OK Google, what time is it");
        assert_eq!(a.query_to_external_agent(), Some("what time is it"));
    }

    #[test]
    fn overlong_query_is_dropped() {
        let long = "あ".repeat(45);
        let a = parse_streamer_output(&format!("OK Google、{long}"));
        assert!(a.query_to_external_agent().is_none());
    }

    #[tokio::test]
    async fn canned_brain_says_hello() {
        let a = CannedBrain::default().generate("report").await.unwrap();
        assert_eq!(a.text(), "こんにちは。今日はいい天気ですね。");
    }

    #[tokio::test]
    async fn mock_agent_emits_final_answer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agent = MockAgent {
            delay: Duration::from_millis(1),
        };
        agent.run("q", tx).await.unwrap();
        let line = rx.recv().await.unwrap();
        assert!(line.contains("Final Answer: "));
    }

    #[tokio::test]
    async fn merged_chat_keeps_feed_order() {
        let remote = Arc::new(ChatBuffer::new());
        let local = Arc::new(ChatBuffer::new());
        local.push(ChatMessage::new("", "local"));
        remote.push(ChatMessage::new("viewer", "remote"));
        let merged = MergedChat::new(vec![remote as Arc<dyn ChatFeed>, local]);

        let texts: Vec<String> = merged
            .poll_recent()
            .await
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["remote", "local"]);
        assert!(merged.poll_recent().await.is_empty());
    }

    #[tokio::test]
    async fn chat_buffer_drains_once() {
        let buf = ChatBuffer::new();
        buf.push(ChatMessage::new("", "わーい"));
        assert_eq!(buf.poll_recent().await.len(), 1);
        assert!(buf.poll_recent().await.is_empty());
    }

    #[tokio::test]
    async fn paced_speaker_completes() {
        let speaker = PacedSpeaker::new(0.001);
        let (done, waiter) = Completion::channel();
        speaker.speak("こんにちは", SpeechMode::ClassicJp, done);
        assert_eq!(waiter.wait().await, crate::collab::Finished::Signalled);
    }
}

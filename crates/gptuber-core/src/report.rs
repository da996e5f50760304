//! Situation reports fed to content generation.
//!
//! A report is a few lines of plain text summarising what happened since the
//! previous one:
//!
//! ```text
//! Audience: こんにちは
//! (視聴者のチャットが無く2分経過)
//! (TV: 「...テスト放送中」)
//! (Google Home の答え: 晴れです)
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::collab::{ChatFeed, Distractor};
use crate::text::{build_time_expression, remove_linebreaks, truncate_chars};

/// Holds the most recent smart-agent answer until a report consumes it.
/// A newer answer replaces an unconsumed one.
#[derive(Debug, Clone, Default)]
pub struct AnswerSlot {
    inner: Arc<Mutex<Option<String>>>,
}

impl AnswerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, answer: impl Into<String>) {
        *self.slot() = Some(answer.into());
    }

    pub fn take(&self) -> Option<String> {
        self.slot().take()
    }

    pub fn is_set(&self) -> bool {
        self.slot().is_some()
    }
}

pub struct ReportBuilder {
    chat: Arc<dyn ChatFeed>,
    distractor: Option<Arc<dyn Distractor>>,
    answers: AnswerSlot,
    boredom_patience_secs: f64,
    max_chat_chars: usize,
    last_chat_time: DateTime<Utc>,
    last_non_boring_time: DateTime<Utc>,
}

impl ReportBuilder {
    /// Both idle timers start at `now`.
    pub fn new(chat: Arc<dyn ChatFeed>, answers: AnswerSlot, now: DateTime<Utc>) -> Self {
        Self {
            chat,
            distractor: None,
            answers,
            boredom_patience_secs: 120.0,
            max_chat_chars: 256,
            last_chat_time: now,
            last_non_boring_time: now,
        }
    }

    pub fn with_distractor(mut self, distractor: Arc<dyn Distractor>) -> Self {
        self.distractor = Some(distractor);
        self
    }

    pub fn with_boredom_patience(mut self, secs: f64) -> Self {
        self.boredom_patience_secs = secs;
        self
    }

    pub fn with_max_chat_chars(mut self, max: usize) -> Self {
        self.max_chat_chars = max;
        self
    }

    pub fn last_chat_time(&self) -> DateTime<Utc> {
        self.last_chat_time
    }

    pub fn last_non_boring_time(&self) -> DateTime<Utc> {
        self.last_non_boring_time
    }

    /// Poll chat and assemble the report for `now`.
    pub async fn build(&mut self, now: DateTime<Utc>) -> String {
        let messages: Vec<_> = self
            .chat
            .poll_recent()
            .await
            .into_iter()
            .filter(|m| {
                let ok = m.is_well_formed();
                if !ok {
                    tracing::debug!(author = %m.author, "dropping empty chat message");
                }
                ok
            })
            .collect();

        let mut report = String::new();
        if !messages.is_empty() {
            for m in &messages {
                let line = remove_linebreaks(&m.text);
                report.push_str("Audience: ");
                report.push_str(truncate_chars(&line, self.max_chat_chars));
                report.push('\n');
            }
            self.last_chat_time = now;
            self.last_non_boring_time = now;
        } else {
            let idle = seconds_between(self.last_chat_time, now);
            report.push_str(&format!(
                "(視聴者のチャットが無く{}経過)\n",
                build_time_expression(idle)
            ));

            let bored_for = seconds_between(self.last_non_boring_time, now);
            if bored_for > self.boredom_patience_secs {
                if let Some(distractor) = &self.distractor {
                    match distractor.generate().await {
                        Ok(script) => {
                            report.push_str(&format!(
                                "(TV: 「...{}」)\n",
                                remove_linebreaks(&script)
                            ));
                            self.last_non_boring_time = now;
                        }
                        Err(e) => tracing::warn!(error = %e, "distraction failed"),
                    }
                }
            }
        }

        if let Some(answer) = self.answers.take() {
            report.push_str(&format!(
                "(Google Home の答え: {})\n",
                remove_linebreaks(&answer)
            ));
        }

        report
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canned::{CannedDistractor, ChatBuffer};
    use crate::types::ChatMessage;
    use async_trait::async_trait;
    use chrono::Duration;

    struct FailingDistractor;

    #[async_trait]
    impl Distractor for FailingDistractor {
        async fn generate(&self) -> anyhow::Result<String> {
            anyhow::bail!("tv is broken")
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn builder(chat: Arc<ChatBuffer>, answers: AnswerSlot) -> ReportBuilder {
        ReportBuilder::new(chat, answers, t0())
            .with_distractor(Arc::new(CannedDistractor::default()))
    }

    #[test]
    fn answer_survives_a_poisoned_slot() {
        let answers = AnswerSlot::new();
        let poisoner = answers.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("holder crashed");
        })
        .join();
        assert!(answers.inner.is_poisoned());

        answers.set("晴れです");
        assert!(answers.is_set());
        assert_eq!(answers.take().as_deref(), Some("晴れです"));
    }

    #[tokio::test]
    async fn chat_lines_reset_both_timers() {
        let chat = Arc::new(ChatBuffer::new());
        chat.push(ChatMessage::new("", "こんにちは"));
        chat.push(ChatMessage::new("", "おはよう\nございます"));
        let mut b = builder(chat, AnswerSlot::new());
        let now = t0() + Duration::seconds(30);

        let report = b.build(now).await;
        assert_eq!(report, "Audience: こんにちは\nAudience: おはようございます\n");
        assert_eq!(b.last_chat_time(), now);
        assert_eq!(b.last_non_boring_time(), now);
    }

    #[tokio::test]
    async fn long_chat_is_truncated() {
        let chat = Arc::new(ChatBuffer::new());
        chat.push(ChatMessage::new("", "あ".repeat(300)));
        let mut b = builder(chat, AnswerSlot::new());
        let report = b.build(t0()).await;
        assert_eq!(report, format!("Audience: {}\n", "あ".repeat(256)));
    }

    #[tokio::test]
    async fn empty_messages_are_ignored() {
        let chat = Arc::new(ChatBuffer::new());
        chat.push(ChatMessage::new("troll", "   "));
        let mut b = builder(chat, AnswerSlot::new());
        let report = b.build(t0() + Duration::seconds(10)).await;
        assert_eq!(report, "(視聴者のチャットが無く10秒経過)\n");
        assert_eq!(b.last_chat_time(), t0());
    }

    #[tokio::test]
    async fn no_tv_before_patience_runs_out() {
        let mut b = builder(Arc::new(ChatBuffer::new()), AnswerSlot::new());
        let report = b.build(t0() + Duration::seconds(119)).await;
        assert_eq!(report, "(視聴者のチャットが無く1分経過)\n");
    }

    #[tokio::test]
    async fn no_tv_at_exactly_the_patience() {
        let mut b = builder(Arc::new(ChatBuffer::new()), AnswerSlot::new());
        let report = b.build(t0() + Duration::seconds(120)).await;
        assert_eq!(report, "(視聴者のチャットが無く2分経過)\n");
        assert_eq!(b.last_non_boring_time(), t0());
    }

    #[tokio::test]
    async fn tv_interrupts_after_patience() {
        let mut b = builder(Arc::new(ChatBuffer::new()), AnswerSlot::new());
        let now = t0() + Duration::seconds(121);
        let report = b.build(now).await;
        assert_eq!(
            report,
            "(視聴者のチャットが無く2分経過)\n(TV: 「...テスト放送中」)\n"
        );
        assert_eq!(b.last_non_boring_time(), now);
        // idle time keeps counting from the last chat
        assert_eq!(b.last_chat_time(), t0());
    }

    #[tokio::test]
    async fn tv_timer_restarts_after_interruption() {
        let mut b = builder(Arc::new(ChatBuffer::new()), AnswerSlot::new());
        b.build(t0() + Duration::seconds(121)).await;
        let report = b.build(t0() + Duration::seconds(125)).await;
        assert_eq!(report, "(視聴者のチャットが無く2分経過)\n");
    }

    #[tokio::test]
    async fn failed_distraction_keeps_the_timer() {
        let mut b = ReportBuilder::new(Arc::new(ChatBuffer::new()), AnswerSlot::new(), t0())
            .with_distractor(Arc::new(FailingDistractor));
        let report = b.build(t0() + Duration::seconds(200)).await;
        assert_eq!(report, "(視聴者のチャットが無く3分経過)\n");
        assert_eq!(b.last_non_boring_time(), t0());
    }

    #[tokio::test]
    async fn no_distractor_no_tv() {
        let mut b = ReportBuilder::new(Arc::new(ChatBuffer::new()), AnswerSlot::new(), t0());
        let report = b.build(t0() + Duration::seconds(600)).await;
        assert_eq!(report, "(視聴者のチャットが無く10分経過)\n");
    }

    #[tokio::test]
    async fn agent_answer_is_consumed_once() {
        let answers = AnswerSlot::new();
        answers.set("晴れ\nです");
        let mut b = builder(Arc::new(ChatBuffer::new()), answers.clone());

        let first = b.build(t0() + Duration::seconds(5)).await;
        assert!(first.ends_with("(Google Home の答え: 晴れです)\n"));
        assert!(!answers.is_set());

        let second = b.build(t0() + Duration::seconds(6)).await;
        assert!(!second.contains("Google Home"));
    }

    #[tokio::test]
    async fn agent_answer_follows_chat_lines() {
        let chat = Arc::new(ChatBuffer::new());
        chat.push(ChatMessage::new("", "天気は？"));
        let answers = AnswerSlot::new();
        answers.set("晴れです");
        let mut b = builder(chat, answers);
        let report = b.build(t0()).await;
        assert_eq!(
            report,
            "Audience: 天気は？\n(Google Home の答え: 晴れです)\n"
        );
    }

    #[test]
    fn newer_answer_replaces_unconsumed_one() {
        let slot = AnswerSlot::new();
        slot.set("first");
        slot.set("second");
        assert_eq!(slot.take().as_deref(), Some("second"));
        assert!(slot.take().is_none());
    }
}

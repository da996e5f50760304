//! The action scheduler.
//!
//! Two cooperating loops share one [`Scheduler`]:
//!
//! - the report tick builds a situation report every few seconds, asks the
//!   [`Brain`] for the next utterance and reserves it, unless the backlog is
//!   already full;
//! - the dispatcher takes one action at a time (agent actions first), hands
//!   it to the [`Speaker`] and waits for its [`Completion`] before taking the
//!   next.
//!
//! Captions and smart-agent sessions started by an action run as supervised
//! background tasks beside it.

mod subflow;
pub mod supervise;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;

use crate::collab::{
    Brain, Completion, CompletionWaiter, DisplaySink, Finished, SmartAgent, Speaker,
};
use crate::config::Config;
use crate::queue::ActionQueue;
use crate::report::{AnswerSlot, ReportBuilder};
use crate::timeline::TimelineSynthesizer;
use crate::types::{Action, ActionSource, DisplayMessage, SpeechMode};

pub use supervise::spawn_supervised;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub startup_delay: Duration,
    pub tick_interval: Duration,
    pub drain_interval: Duration,
    pub backlog_limit: usize,
    /// Voice streamer actions with the neural engine.
    pub neural_speech: bool,
    /// Caption prefix for agent actions.
    pub agent_caption_prefix: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            startup_delay: config.scheduler.startup_delay(),
            tick_interval: config.scheduler.tick_interval(),
            drain_interval: config.scheduler.drain_interval(),
            backlog_limit: config.scheduler.backlog_limit,
            neural_speech: config.speech.neural,
            agent_caption_prefix: config.timeline.agent_caption_prefix.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Mutable scheduling state. Only [`Scheduler`] touches it.
#[derive(Debug, Default)]
pub struct SchedulerState {
    queue: ActionQueue,
    is_acting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub pending: usize,
    pub agent_pending: usize,
    pub streamer_pending: usize,
    pub acting: bool,
}

/// Result of one report tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The backlog was full; nothing was polled or generated.
    Skipped,
    Reserved,
    /// Content generation failed; nothing was reserved.
    Failed,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Inner {
    state: Mutex<SchedulerState>,
    wake: Notify,
    settings: SchedulerSettings,
    speaker: Arc<dyn Speaker>,
    display: Option<Arc<dyn DisplaySink>>,
    timeline: Option<TimelineSynthesizer>,
    agent: Option<Arc<dyn SmartAgent>>,
    answers: AnswerSlot,
}

/// Handle to the shared scheduler. Cloning is cheap.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

pub struct SchedulerBuilder {
    settings: SchedulerSettings,
    speaker: Arc<dyn Speaker>,
    display: Option<Arc<dyn DisplaySink>>,
    timeline: Option<TimelineSynthesizer>,
    agent: Option<Arc<dyn SmartAgent>>,
    answers: AnswerSlot,
}

impl SchedulerBuilder {
    pub fn settings(mut self, settings: SchedulerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Captions are only produced when both a display and a synthesizer are set.
    pub fn display(mut self, display: Arc<dyn DisplaySink>, timeline: TimelineSynthesizer) -> Self {
        self.display = Some(display);
        self.timeline = Some(timeline);
        self
    }

    pub fn agent(mut self, agent: Arc<dyn SmartAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Share the slot with the [`ReportBuilder`] that should see agent answers.
    pub fn answers(mut self, answers: AnswerSlot) -> Self {
        self.answers = answers;
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState::default()),
                wake: Notify::new(),
                settings: self.settings,
                speaker: self.speaker,
                display: self.display,
                timeline: self.timeline,
                agent: self.agent,
                answers: self.answers,
            }),
        }
    }
}

impl Scheduler {
    pub fn builder(speaker: Arc<dyn Speaker>) -> SchedulerBuilder {
        SchedulerBuilder {
            settings: SchedulerSettings::default(),
            speaker,
            display: None,
            timeline: None,
            agent: None,
            answers: AnswerSlot::new(),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    pub fn answers(&self) -> &AnswerSlot {
        &self.inner.answers
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Queue operations
    // -----------------------------------------------------------------------

    /// Queue an action and wake the dispatcher.
    pub fn reserve(&self, action: Action) {
        let source = action.source();
        let pending = {
            let mut state = self.state();
            state.queue.push(action);
            state.queue.len()
        };
        tracing::info!(source = %source, pending, "action reserved");
        self.inner.wake.notify_one();
    }

    /// Take the next action if nothing is playing. Marks the scheduler as
    /// acting when it returns one.
    pub fn try_dispatch(&self) -> Option<Action> {
        let mut state = self.state();
        if state.is_acting {
            return None;
        }
        let action = state.queue.pop()?;
        state.is_acting = true;
        Some(action)
    }

    /// Reopen the gate after a playback ended.
    pub fn on_finish(&self) {
        self.state().is_acting = false;
        self.inner.wake.notify_one();
    }

    pub fn pending_len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_acting(&self) -> bool {
        self.state().is_acting
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state();
        SchedulerStatus {
            pending: state.queue.len(),
            agent_pending: state.queue.len_of(ActionSource::Agent),
            streamer_pending: state.queue.len_of(ActionSource::Streamer),
            acting: state.is_acting,
        }
    }

    // -----------------------------------------------------------------------
    // Acting
    // -----------------------------------------------------------------------

    /// Start playing `action` and its side effects. Returns the waiter that
    /// resolves when playback ends.
    pub fn act(&self, action: &Action) -> CompletionWaiter {
        let source = action.source();
        let mode = SpeechMode::for_source(source, self.inner.settings.neural_speech);
        tracing::info!(id = %action.id(), source = %source, mode = mode.as_str(), "acting");

        let (done, waiter) = Completion::channel();
        self.inner.speaker.speak(action.text(), mode, done);

        self.emit_timeline(action);

        if source == ActionSource::Streamer {
            if let Some(query) = action.query_to_external_agent() {
                let scheduler = self.clone();
                let query = query.to_string();
                spawn_supervised("smart-agent", async move {
                    scheduler.invoke_agent(&query).await;
                });
            }
        }

        waiter
    }

    fn emit_timeline(&self, action: &Action) {
        let (Some(display), Some(synth)) = (&self.inner.display, &self.inner.timeline) else {
            return;
        };
        let split = action.source() == ActionSource::Streamer;
        let prefix = if split {
            String::new()
        } else {
            self.inner.settings.agent_caption_prefix.clone()
        };
        let display = display.clone();
        let synth = synth.clone();
        let text = action.text().to_string();

        spawn_supervised("timeline", async move {
            let built =
                tokio::task::spawn_blocking(move || synth.synthesize(&text, split, &prefix)).await;
            let timeline = match built {
                Ok(Ok(timeline)) => timeline,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "timeline synthesis failed");
                    return;
                }
                Err(e) => {
                    tracing::error!("timeline synthesis crashed: {e}");
                    return;
                }
            };
            match (DisplayMessage::Subtitle { timeline }).to_json() {
                Ok(json) => display.send(json),
                Err(e) => tracing::warn!(error = %e, "failed to serialize subtitle"),
            }
        });
    }

    /// Play one action to completion and reopen the gate.
    async fn perform(&self, action: Action) {
        let id = action.id();
        let waiter = self.act(&action);
        match waiter.wait().await {
            Finished::Signalled => tracing::debug!(%id, "action finished"),
            Finished::Abandoned => {
                tracing::warn!(%id, "speaker dropped its completion; treating action as finished")
            }
        }
        self.on_finish();
    }

    // -----------------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------------

    /// Drain the queue forever. Wakes on every reservation and every
    /// completion, and at least once per drain interval.
    pub async fn run_dispatcher(&self) {
        loop {
            while let Some(action) = self.try_dispatch() {
                self.perform(action).await;
            }
            tokio::select! {
                _ = self.inner.wake.notified() => {}
                _ = tokio::time::sleep(self.inner.settings.drain_interval) => {}
            }
        }
    }

    /// One report tick: build a report and reserve what the brain makes of
    /// it. Does nothing while the backlog is full.
    pub async fn tick(&self, reports: &mut ReportBuilder, brain: &dyn Brain) -> TickOutcome {
        let pending = self.pending_len();
        if pending >= self.inner.settings.backlog_limit {
            tracing::debug!(pending, "backlog full, skipping tick");
            return TickOutcome::Skipped;
        }

        let report = reports.build(Utc::now()).await;
        tracing::debug!(report = %report.trim_end(), "report built");

        match brain.generate(&report).await {
            Ok(action) => {
                self.reserve(action.into_streamer());
                TickOutcome::Reserved
            }
            Err(e) => {
                tracing::warn!(error = %e, "content generation failed, skipping tick");
                TickOutcome::Failed
            }
        }
    }

    pub async fn run_ticks(&self, mut reports: ReportBuilder, brain: Arc<dyn Brain>) {
        tokio::time::sleep(self.inner.settings.startup_delay).await;
        loop {
            self.tick(&mut reports, brain.as_ref()).await;
            tokio::time::sleep(self.inner.settings.tick_interval).await;
        }
    }

    /// Run both loops for the life of the process.
    pub async fn run(&self, reports: ReportBuilder, brain: Arc<dyn Brain>) {
        tokio::join!(self.run_dispatcher(), self.run_ticks(reports, brain));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canned::{CannedBrain, ChatBuffer, MockAgent};
    use crate::emotes::ExpressionTable;
    use crate::tokenizer::{PartOfSpeech, Token, Tokenizer};
    use crate::types::ChatMessage;
    use async_trait::async_trait;

    /// Records every call and keeps completions until the test finishes them.
    #[derive(Default)]
    struct HoldingSpeaker {
        spoken: Mutex<Vec<(String, SpeechMode)>>,
        held: Mutex<Vec<Completion>>,
    }

    impl HoldingSpeaker {
        fn spoken(&self) -> Vec<(String, SpeechMode)> {
            self.spoken.lock().unwrap().clone()
        }

        fn finish_oldest(&self) {
            let done = self.held.lock().unwrap().remove(0);
            done.finish();
        }
    }

    impl Speaker for HoldingSpeaker {
        fn speak(&self, text: &str, mode: SpeechMode, done: Completion) {
            self.spoken.lock().unwrap().push((text.to_string(), mode));
            self.held.lock().unwrap().push(done);
        }
    }

    /// Drops every completion without signalling.
    #[derive(Default)]
    struct CarelessSpeaker {
        spoken: Mutex<Vec<String>>,
    }

    impl Speaker for CarelessSpeaker {
        fn speak(&self, text: &str, _mode: SpeechMode, _done: Completion) {
            self.spoken.lock().unwrap().push(text.to_string());
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
    }

    impl DisplaySink for RecordingSink {
        fn send(&self, message: String) {
            self.sent.lock().unwrap().push(message);
        }
    }

    /// One token for the whole text.
    struct WholeTextTokenizer;

    impl Tokenizer for WholeTextTokenizer {
        fn tokenize(&self, text: &str) -> crate::Result<Vec<Token>> {
            if text.is_empty() {
                return Ok(vec![]);
            }
            Ok(vec![Token::new(text, PartOfSpeech::Noun, text)])
        }
    }

    struct FailingBrain;

    #[async_trait]
    impl Brain for FailingBrain {
        async fn generate(&self, _report: &str) -> anyhow::Result<Action> {
            anyhow::bail!("503 service unavailable")
        }
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn reports(chat: Arc<ChatBuffer>) -> ReportBuilder {
        ReportBuilder::new(chat, AnswerSlot::new(), Utc::now())
    }

    #[test]
    fn agent_action_dispatches_first() {
        let scheduler = Scheduler::builder(Arc::new(HoldingSpeaker::default())).build();
        scheduler.reserve(Action::streamer("S1", None));
        scheduler.reserve(Action::streamer("S2", None));
        scheduler.reserve(Action::agent("A1"));

        let first = scheduler.try_dispatch().unwrap();
        assert_eq!(first.source(), ActionSource::Agent);
        assert_eq!(first.text(), "A1");
    }

    #[test]
    fn only_one_action_in_flight() {
        let scheduler = Scheduler::builder(Arc::new(HoldingSpeaker::default())).build();
        scheduler.reserve(Action::streamer("S1", None));
        scheduler.reserve(Action::streamer("S2", None));

        assert!(scheduler.try_dispatch().is_some());
        assert!(scheduler.is_acting());
        assert!(scheduler.try_dispatch().is_none());

        scheduler.on_finish();
        assert!(!scheduler.is_acting());
        assert_eq!(scheduler.try_dispatch().unwrap().text(), "S2");
    }

    #[test]
    fn status_counts_by_source() {
        let scheduler = Scheduler::builder(Arc::new(HoldingSpeaker::default())).build();
        scheduler.reserve(Action::agent("A1"));
        scheduler.reserve(Action::streamer("S1", None));
        scheduler.try_dispatch();
        assert_eq!(
            scheduler.status(),
            SchedulerStatus {
                pending: 1,
                agent_pending: 0,
                streamer_pending: 1,
                acting: true,
            }
        );
    }

    #[tokio::test]
    async fn dispatcher_waits_for_completion() {
        let speaker = Arc::new(HoldingSpeaker::default());
        let scheduler = Scheduler::builder(speaker.clone()).build();
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run_dispatcher().await });

        scheduler.reserve(Action::streamer("S1", None));
        scheduler.reserve(Action::streamer("S2", None));

        eventually(|| speaker.spoken().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(speaker.spoken().len(), 1);
        assert!(scheduler.is_acting());

        speaker.finish_oldest();
        eventually(|| speaker.spoken().len() == 2).await;
        assert_eq!(speaker.spoken()[1].0, "S2");

        speaker.finish_oldest();
        eventually(|| !scheduler.is_acting()).await;
        handle.abort();
    }

    #[tokio::test]
    async fn voices_follow_the_source() {
        let speaker = Arc::new(HoldingSpeaker::default());
        let scheduler = Scheduler::builder(speaker.clone()).build();
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run_dispatcher().await });

        scheduler.reserve(Action::agent("thinking..."));
        eventually(|| speaker.spoken().len() == 1).await;
        speaker.finish_oldest();
        scheduler.reserve(Action::streamer("こんにちは", None));
        eventually(|| speaker.spoken().len() == 2).await;

        let spoken = speaker.spoken();
        assert_eq!(spoken[0].1, SpeechMode::ClassicEn);
        assert_eq!(spoken[1].1, SpeechMode::NeuralJp);
        handle.abort();
    }

    #[tokio::test]
    async fn dropped_completion_reopens_the_gate() {
        let speaker = Arc::new(CarelessSpeaker::default());
        let scheduler = Scheduler::builder(speaker.clone()).build();
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run_dispatcher().await });

        scheduler.reserve(Action::streamer("S1", None));
        scheduler.reserve(Action::streamer("S2", None));
        eventually(|| speaker.spoken.lock().unwrap().len() == 2).await;
        eventually(|| !scheduler.is_acting()).await;
        handle.abort();
    }

    #[tokio::test]
    async fn captions_are_sent_with_the_agent_prefix() {
        let sink = Arc::new(RecordingSink::default());
        let synth = TimelineSynthesizer::new(
            Arc::new(WholeTextTokenizer),
            Arc::new(ExpressionTable::default()),
        );
        let scheduler = Scheduler::builder(Arc::new(HoldingSpeaker::default()))
            .display(sink.clone(), synth)
            .build();

        let _waiter = scheduler.act(&Action::agent("Thought: hmm"));
        eventually(|| !sink.sent.lock().unwrap().is_empty()).await;

        let json = sink.sent.lock().unwrap()[0].clone();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "subtitle");
        assert_eq!(v["timeline"][0][0], 0.0);
        assert_eq!(v["timeline"][0][1], "(Google Home) Thought: hmm");
        assert_eq!(v["timeline"][1][1], "");
    }

    #[tokio::test]
    async fn streamer_query_starts_the_agent() {
        let answers = AnswerSlot::new();
        let scheduler = Scheduler::builder(Arc::new(HoldingSpeaker::default()))
            .agent(Arc::new(MockAgent {
                delay: Duration::from_millis(1),
            }))
            .answers(answers.clone())
            .build();

        let _waiter = scheduler.act(&Action::streamer(
            "OK Google、明日の天気は？",
            Some("明日の天気は？".to_string()),
        ));
        eventually(|| scheduler.pending_len() == 1).await;
        eventually(|| answers.is_set()).await;

        let queued = scheduler.try_dispatch().unwrap();
        assert_eq!(queued.source(), ActionSource::Agent);
        assert_eq!(queued.text(), "> Final Answer: Sorry I don't understand.");
        assert_eq!(answers.take().as_deref(), Some("Sorry I don't understand."));
    }

    #[tokio::test]
    async fn tick_reserves_a_streamer_action() {
        let scheduler = Scheduler::builder(Arc::new(HoldingSpeaker::default())).build();
        let chat = Arc::new(ChatBuffer::new());
        chat.push(ChatMessage::new("", "こんにちは"));
        let mut reports = reports(chat);

        let outcome = scheduler.tick(&mut reports, &CannedBrain::default()).await;
        assert_eq!(outcome, TickOutcome::Reserved);
        let action = scheduler.try_dispatch().unwrap();
        assert_eq!(action.source(), ActionSource::Streamer);
    }

    #[tokio::test]
    async fn full_backlog_skips_the_tick() {
        let scheduler = Scheduler::builder(Arc::new(HoldingSpeaker::default())).build();
        for i in 0..3 {
            scheduler.reserve(Action::streamer(format!("S{i}"), None));
        }
        let chat = Arc::new(ChatBuffer::new());
        chat.push(ChatMessage::new("", "まだ？"));
        let mut reports = reports(chat.clone());

        let outcome = scheduler.tick(&mut reports, &CannedBrain::default()).await;
        assert_eq!(outcome, TickOutcome::Skipped);
        assert_eq!(scheduler.pending_len(), 3);
        // chat was left for the next tick
        assert_eq!(chat.drain().len(), 1);
    }

    #[tokio::test]
    async fn failed_generation_reserves_nothing() {
        let scheduler = Scheduler::builder(Arc::new(HoldingSpeaker::default())).build();
        let mut reports = reports(Arc::new(ChatBuffer::new()));
        let outcome = scheduler.tick(&mut reports, &FailingBrain).await;
        assert_eq!(outcome, TickOutcome::Failed);
        assert_eq!(scheduler.pending_len(), 0);
    }
}

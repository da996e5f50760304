//! Traits for the collaborators the scheduler drives but does not own:
//! content generation, chat, distraction, speech, the smart agent and the
//! display front end.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::types::{Action, ChatMessage, SpeechMode};

/// Turns a situation report into the streamer's next action.
#[async_trait]
pub trait Brain: Send + Sync {
    async fn generate(&self, report: &str) -> anyhow::Result<Action>;
}

/// Source of chat messages. Each call returns only messages not returned
/// before.
#[async_trait]
pub trait ChatFeed: Send + Sync {
    async fn poll_recent(&self) -> Vec<ChatMessage>;
}

/// Produces a short broadcast-style script to break a long silence.
#[async_trait]
pub trait Distractor: Send + Sync {
    async fn generate(&self) -> anyhow::Result<String>;
}

/// Text-to-speech playback.
///
/// `speak` must return promptly and signal `done` exactly once when playback
/// ends, including on failure. Nothing times out a playback that never
/// signals.
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str, mode: SpeechMode, done: Completion);
}

/// External smart agent. Streams log lines into `lines` until it finishes;
/// enforcing a time limit is the implementation's job.
#[async_trait]
pub trait SmartAgent: Send + Sync {
    async fn run(&self, query: &str, lines: mpsc::UnboundedSender<String>) -> anyhow::Result<()>;
}

/// Front-end sink for serialized display messages.
pub trait DisplaySink: Send + Sync {
    fn send(&self, message: String);
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// One-shot signal that a playback has ended.
///
/// Dropping a `Completion` without calling [`Completion::finish`] also
/// releases the waiter, which sees [`Finished::Abandoned`].
#[derive(Debug)]
pub struct Completion {
    tx: Option<oneshot::Sender<()>>,
}

/// How a playback ended, as seen by whoever awaits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    Signalled,
    Abandoned,
}

/// Awaitable side of a [`Completion`].
#[derive(Debug)]
pub struct CompletionWaiter {
    rx: oneshot::Receiver<()>,
}

impl Completion {
    pub fn channel() -> (Completion, CompletionWaiter) {
        let (tx, rx) = oneshot::channel();
        (Completion { tx: Some(tx) }, CompletionWaiter { rx })
    }

    pub fn finish(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl CompletionWaiter {
    pub async fn wait(self) -> Finished {
        match self.rx.await {
            Ok(()) => Finished::Signalled,
            Err(_) => Finished::Abandoned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finish_is_signalled() {
        let (done, waiter) = Completion::channel();
        done.finish();
        assert_eq!(waiter.wait().await, Finished::Signalled);
    }

    #[tokio::test]
    async fn drop_is_abandoned() {
        let (done, waiter) = Completion::channel();
        drop(done);
        assert_eq!(waiter.wait().await, Finished::Abandoned);
    }

    #[tokio::test]
    async fn panicking_task_releases_waiter() {
        let (done, waiter) = Completion::channel();
        let handle = tokio::spawn(async move {
            let _done = done;
            panic!("playback crashed");
        });
        assert!(handle.await.is_err());
        assert_eq!(waiter.wait().await, Finished::Abandoned);
    }
}

//! Smart-agent sessions: every line the agent logs becomes an agent action,
//! and its final answer is kept for the next report.

use tokio::sync::mpsc;

use super::Scheduler;
use crate::types::Action;

/// Marks the agent's answer within its log.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer: ";

impl Scheduler {
    /// Run one agent session to the end. Concurrent sessions are fine; each
    /// reserves its own lines.
    pub async fn invoke_agent(&self, query: &str) {
        let Some(agent) = self.inner.agent.clone() else {
            tracing::debug!(query, "no smart agent configured, query ignored");
            return;
        };

        tracing::info!(query, "smart agent started");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let owned_query = query.to_string();
        let session = tokio::spawn(async move { agent.run(&owned_query, tx).await });

        while let Some(line) = rx.recv().await {
            self.on_agent_line(&line);
        }

        match session.await {
            Ok(Ok(())) => tracing::info!(query, "smart agent finished"),
            Ok(Err(e)) => tracing::warn!(query, error = %e, "smart agent failed"),
            Err(e) => tracing::error!(query, "smart agent crashed: {e}"),
        }
    }

    /// Handle one raw log line from the agent.
    pub fn on_agent_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.reserve(Action::agent(line));
        if let Some(answer) = line.split(FINAL_ANSWER_MARKER).nth(1) {
            tracing::info!(answer, "smart agent answered");
            self.inner.answers.set(answer);
        }
    }
}

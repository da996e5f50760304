use async_trait::async_trait;
use gptuber_core::collab::SmartAgent;
use home_agent::AgentOptions;
use tokio::sync::mpsc;

/// The smart agent as an external process.
#[derive(Debug, Clone)]
pub struct ProcessAgent {
    opts: AgentOptions,
}

impl ProcessAgent {
    pub fn new(opts: AgentOptions) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl SmartAgent for ProcessAgent {
    async fn run(&self, query: &str, lines: mpsc::UnboundedSender<String>) -> anyhow::Result<()> {
        let summary = home_agent::run(self.opts.clone(), query, |line| {
            let _ = lines.send(line.to_string());
        })
        .await?;

        if summary.timed_out {
            tracing::warn!(
                query,
                lines = summary.lines.len(),
                "smart agent timed out before answering"
            );
        } else if summary.final_answer.is_none() {
            tracing::info!(query, "smart agent finished without an answer");
        }
        Ok(())
    }
}

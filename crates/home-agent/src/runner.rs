use futures::StreamExt;

use crate::stream::LineStream;
use crate::types::{AgentOptions, RunSummary};
use crate::{query, HomeAgentError, Result};

/// Marks the agent's answer within its log.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer: ";

// ─── Public API ───────────────────────────────────────────────────────────

/// Drive one agent session to the end, calling `on_line` for every log line
/// as it arrives.
///
/// A timeout is not an error: the lines seen so far are returned with
/// `timed_out` set. Spawn failures and non-zero exits are errors.
pub async fn run<F>(opts: AgentOptions, query_text: &str, on_line: F) -> Result<RunSummary>
where
    F: FnMut(&str),
{
    collect(query(query_text, opts), on_line).await
}

// ─── Internal ─────────────────────────────────────────────────────────────

pub(crate) async fn collect<F>(mut stream: LineStream, mut on_line: F) -> Result<RunSummary>
where
    F: FnMut(&str),
{
    let mut summary = RunSummary::default();

    while let Some(item) = stream.next().await {
        match item {
            Ok(line) => {
                on_line(&line);
                if let Some(answer) = line.split(FINAL_ANSWER_MARKER).nth(1) {
                    summary.final_answer = Some(answer.trim().to_string());
                }
                summary.lines.push(line);
            }
            Err(HomeAgentError::Timeout(_)) => {
                summary.timed_out = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(summary)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn mock_stream(items: Vec<Result<String>>) -> LineStream {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        LineStream::from_channel(rx)
    }

    #[tokio::test]
    async fn collect_finds_the_final_answer() {
        let stream = mock_stream(vec![
            Ok("Thought: look it up".into()),
            Ok("> Final Answer: 25 degrees".into()),
        ]);
        let mut seen = Vec::new();
        let summary = collect(stream, |l| seen.push(l.to_string())).await.unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(summary.lines, seen);
        assert_eq!(summary.final_answer.as_deref(), Some("25 degrees"));
        assert!(!summary.timed_out);
    }

    #[tokio::test]
    async fn collect_without_marker_has_no_answer() {
        let stream = mock_stream(vec![Ok("Thought: hmm".into())]);
        let summary = collect(stream, |_| {}).await.unwrap();
        assert!(summary.final_answer.is_none());
    }

    #[tokio::test]
    async fn collect_timeout_keeps_partial_lines() {
        let stream = mock_stream(vec![
            Ok("Thought: slow".into()),
            Err(HomeAgentError::Timeout(Duration::from_secs(80))),
        ]);
        let summary = collect(stream, |_| {}).await.unwrap();
        assert!(summary.timed_out);
        assert_eq!(summary.lines, ["Thought: slow"]);
    }

    #[tokio::test]
    async fn collect_propagates_process_error() {
        let stream = mock_stream(vec![Err(HomeAgentError::Process("exit 1".into()))]);
        assert!(collect(stream, |_| {}).await.is_err());
    }

    #[tokio::test]
    async fn run_against_a_shell_agent() {
        let opts = AgentOptions {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                r#"echo "Question: $1"; echo "Final Answer: yes""#.into(),
                "sh".into(),
            ],
            ..Default::default()
        };
        let summary = run(opts, "is it raining?", |_| {}).await.unwrap();
        assert_eq!(summary.lines[0], "Question: is it raining?");
        assert_eq!(summary.final_answer.as_deref(), Some("yes"));
    }
}

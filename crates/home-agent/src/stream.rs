use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::process::AgentProcess;
use crate::types::AgentOptions;
use crate::{HomeAgentError, Result};

// ─── LineStream ───────────────────────────────────────────────────────────

/// An async stream of log lines from one agent session.
///
/// A background task owns the [`AgentProcess`] and forwards lines until EOF
/// or the deadline. At the deadline the child is killed and a final
/// [`HomeAgentError::Timeout`] is yielded. Dropping the stream makes the task
/// kill the child on its next send.
pub struct LineStream {
    rx: mpsc::Receiver<Result<String>>,
}

impl LineStream {
    pub(crate) fn new(query: String, opts: AgentOptions) -> Self {
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut process = match AgentProcess::spawn(&query, &opts) {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let deadline = Instant::now() + opts.timeout;
            let mut clean_exit = false;
            loop {
                let next = match tokio::time::timeout_at(deadline, process.next_line()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(
                            timeout_secs = opts.timeout.as_secs(),
                            "agent timed out, killing it"
                        );
                        process.kill().await;
                        let _ = tx.send(Err(HomeAgentError::Timeout(opts.timeout))).await;
                        return;
                    }
                };
                match next {
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                    Ok(None) => {
                        clean_exit = true;
                        break;
                    }
                    Ok(Some(line)) => {
                        if tx.send(Ok(line)).await.is_err() {
                            break;
                        }
                    }
                }
            }

            if clean_exit {
                // closing stdout does not stop the clock
                match tokio::time::timeout_at(deadline, process.wait_exit_error()).await {
                    Ok(Some(exit_err)) => {
                        let _ = tx.send(Err(exit_err)).await;
                    }
                    Ok(None) => {}
                    Err(_) => {
                        tracing::warn!(
                            timeout_secs = opts.timeout.as_secs(),
                            "agent still running after closing stdout, killing it"
                        );
                        process.kill().await;
                        let _ = tx.send(Err(HomeAgentError::Timeout(opts.timeout))).await;
                        return;
                    }
                }
            }

            process.kill().await;
        });

        LineStream { rx }
    }

    /// Wrap a raw receiver. Lets `runner` tests inject line sequences.
    #[cfg(test)]
    pub(crate) fn from_channel(rx: mpsc::Receiver<Result<String>>) -> Self {
        Self { rx }
    }
}

impl Stream for LineStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn sh(script: &str) -> AgentOptions {
        AgentOptions {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "sh".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn yields_every_line_in_order() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "Thought: search").unwrap();
        writeln!(f, "\x1b[32mFinal Answer: sunny\x1b[0m").unwrap();
        let opts = AgentOptions {
            program: "cat".into(),
            args: vec![f.path().display().to_string()],
            ..Default::default()
        };
        let items: Vec<_> = LineStream::new("/dev/null".into(), opts).collect().await;
        let lines: Vec<_> = items.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(lines, ["Thought: search", "Final Answer: sunny"]);
    }

    #[tokio::test]
    async fn clean_exit_ends_the_stream() {
        let items: Vec<_> = LineStream::new("q".into(), sh("echo one; echo two"))
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn failing_agent_ends_with_error() {
        let items: Vec<_> = LineStream::new("q".into(), sh("echo partial; exit 2"))
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(matches!(items[1], Err(HomeAgentError::Process(_))));
    }

    #[tokio::test]
    async fn slow_agent_is_killed_at_the_deadline() {
        let opts = sh("echo start; sleep 5; echo never").with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        let items: Vec<_> = LineStream::new("q".into(), opts).collect().await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "start");
        assert!(matches!(items[1], Err(HomeAgentError::Timeout(_))));
    }

    #[tokio::test]
    async fn agent_that_closes_stdout_is_still_killed_at_the_deadline() {
        let opts = sh("echo start; exec 1>&-; sleep 5").with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        let items: Vec<_> = LineStream::new("q".into(), opts).collect().await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "start");
        assert!(matches!(items[1], Err(HomeAgentError::Timeout(_))));
    }

    #[tokio::test]
    async fn spawn_failure_is_yielded() {
        let opts = AgentOptions {
            program: "definitely-not-a-real-agent-binary".into(),
            args: vec![],
            ..Default::default()
        };
        let items: Vec<_> = LineStream::new("q".into(), opts).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(HomeAgentError::Io(_))));
    }
}

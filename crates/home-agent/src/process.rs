use std::process::Stdio;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::types::AgentOptions;
use crate::{HomeAgentError, Result};

// ─── AgentProcess ─────────────────────────────────────────────────────────

/// A running agent subprocess. Stdout is read line by line; stderr is
/// collected in the background and surfaced if the process fails.
pub(crate) struct AgentProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_buf: Arc<Mutex<String>>,
}

impl AgentProcess {
    pub(crate) fn spawn(query: &str, opts: &AgentOptions) -> Result<Self> {
        let mut cmd = Command::new(&opts.program);
        cmd.args(&opts.args).arg(query);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &opts.env {
            cmd.env(k, v);
        }
        Self::from_command(cmd)
    }

    fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(HomeAgentError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HomeAgentError::Process("stdout not captured".into()))?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr_buf,
        })
    }

    /// Next stdout line with colour codes removed. `Ok(None)` on EOF.
    pub(crate) async fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.next_line().await {
            Err(e) => Err(HomeAgentError::Io(e)),
            Ok(None) => Ok(None),
            Ok(Some(line)) => Ok(Some(strip_control_sequences(&line))),
        }
    }

    /// Wait for exit; an error if the status is not success.
    pub(crate) async fn wait_exit_error(&mut self) -> Option<HomeAgentError> {
        let status = match self.child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(HomeAgentError::Io(e)),
        };

        if status.success() {
            return None;
        }

        let stderr = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();

        let head = match status.code() {
            Some(code) => format!("agent exited with code {code}"),
            None => "agent terminated by signal".to_string(),
        };
        let msg = if stderr.is_empty() {
            head
        } else {
            format!("{head}\nstderr: {stderr}")
        };

        Some(HomeAgentError::Process(msg))
    }

    /// Kill the subprocess (best-effort).
    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

static ANSI_RE: OnceLock<Regex> = OnceLock::new();

/// Remove ANSI colour sequences and a trailing carriage return.
pub(crate) fn strip_control_sequences(line: &str) -> String {
    let re = ANSI_RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(line.trim_end_matches('\r'), "").into_owned()
}

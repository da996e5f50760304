use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default hard limit on one agent session.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(80);

/// How to launch the agent. The query is passed as the last argument.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub program: String,
    pub args: Vec<String>,
    /// The child is killed once this much time has passed.
    pub timeout: Duration,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            program: "python".into(),
            args: vec!["-u".into(), "./agent.py".into()],
            timeout: DEFAULT_TIMEOUT,
            cwd: None,
            env: HashMap::new(),
        }
    }
}

impl AgentOptions {
    /// Build options from an argv; `None` if `argv` is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            ..Default::default()
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What one finished session produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Cleaned log lines in the order they arrived.
    pub lines: Vec<String>,
    /// Text after the last final-answer marker, if any line carried one.
    pub final_answer: Option<String>,
    pub timed_out: bool,
}

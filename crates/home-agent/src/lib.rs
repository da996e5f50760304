//! `home-agent`: driver for the external smart agent ("Google Home").
//!
//! The agent is any program that takes a query as its last argument and
//! logs its reasoning to stdout, one line at a time. A line containing
//! `Final Answer: ` carries the answer.
//!
//! ```text
//! AgentOptions
//!     │
//!     ▼
//! AgentProcess   ← spawns `<program> <args…> <query>`, captures stdout/stderr
//!     │
//!     ▼
//! LineStream     ← futures::Stream<Item = Result<String>>, colour codes
//!     │             stripped, child killed at the deadline
//!     ▼
//! run()          ← drives a session to the end, returns a RunSummary
//! ```

pub mod error;
pub mod runner;
pub mod stream;
pub mod types;

pub(crate) mod process;

pub use error::HomeAgentError;
pub use runner::{run, FINAL_ANSWER_MARKER};
pub use stream::LineStream;
pub use types::{AgentOptions, RunSummary, DEFAULT_TIMEOUT};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, HomeAgentError>;

/// Start the agent on `query` and stream its log lines.
pub fn query(query: impl Into<String>, opts: AgentOptions) -> LineStream {
    LineStream::new(query.into(), opts)
}

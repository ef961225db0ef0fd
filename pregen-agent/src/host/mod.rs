//! Control surface of the managed server process.
//!
//! Sessions only talk to the server through [`ServerControl`]. The daemon
//! uses [`process::ProcessHost`]; tests use [`testing::RecordingHost`].

pub mod process;

#[cfg(test)]
pub mod testing;

use crate::utils::Result;
use async_trait::async_trait;

/// Operations the sessions need from the server host
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// Announce a message to everyone connected
    async fn broadcast(&self, message: &str);

    /// Issue the default stop control
    async fn stop(&self) -> Result<()>;

    /// Send an arbitrary console command
    async fn execute(&self, command: &str) -> Result<()>;

    /// Block until the server has stopped and can be started again
    async fn wait_for_start(&self) -> Result<()>;

    /// Launch the server if it is not running
    async fn start(&self) -> Result<()>;

    /// Whether the server process is currently alive
    fn is_running(&self) -> bool;

    /// Number of successful starts so far. Output lines carry the value
    /// current when their process was launched.
    fn generation(&self) -> u64;
}

/// One stdout line of the server, stamped with the launch it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLine {
    pub generation: u64,
    pub text: String,
}

impl ServerLine {
    pub fn new(generation: u64, text: impl Into<String>) -> Self {
        Self {
            generation,
            text: text.into(),
        }
    }
}

/// Strip the vanilla `[time] [thread/LEVEL]: ` prefix from a server log line
pub fn log_content(line: &str) -> &str {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    let mut rest = line;
    for _ in 0..2 {
        let Some(after) = rest.trim_start().strip_prefix('[') else {
            return line;
        };
        let Some(end) = after.find(']') else {
            return line;
        };
        rest = &after[end + 1..];
    }
    rest.strip_prefix(": ")
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(line)
}

//! Managed server child process.
//!
//! The server is launched with piped stdio. Console commands are written to
//! its stdin, every stdout line is forwarded in order to the daemon's line
//! channel, and a watch channel tracks whether the process is alive.

use super::{ServerControl, ServerLine};
use crate::config::ServerConfig;
use crate::utils::logger::SERVER_TARGET;
use crate::utils::{PregenError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Grace period after SIGTERM before the process is killed
const TERM_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
}

struct Shared {
    stdin: Mutex<Option<ChildStdin>>,
    state_tx: watch::Sender<ServerState>,
    pid: AtomicU32,
    generation: AtomicU64,
    kill_token: std::sync::Mutex<CancellationToken>,
}

/// [`ServerControl`] backed by a real child process
#[derive(Clone)]
pub struct ProcessHost {
    config: ServerConfig,
    shared: Arc<Shared>,
    lines_tx: mpsc::UnboundedSender<ServerLine>,
}

impl ProcessHost {
    /// Create a host and the receiver of the server's stdout lines
    pub fn new(config: ServerConfig) -> (Self, mpsc::UnboundedReceiver<ServerLine>) {
        let (lines_tx, lines_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        let host = Self {
            config,
            shared: Arc::new(Shared {
                stdin: Mutex::new(None),
                state_tx,
                pid: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                kill_token: std::sync::Mutex::new(CancellationToken::new()),
            }),
            lines_tx,
        };
        (host, lines_rx)
    }

    /// Stop the server for agent shutdown, escalating to SIGTERM and kill
    pub async fn shutdown(&self) {
        if !self.is_running() {
            return;
        }

        info!("Stopping server before exit");
        if let Err(e) = self.stop().await {
            warn!("Failed to send stop command: {}", e);
        }

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        if tokio::time::timeout(timeout, self.wait_for_start()).await.is_ok() {
            info!("Server stopped");
            return;
        }

        warn!("Server did not stop within {:?}, sending SIGTERM", timeout);
        self.terminate();
        if tokio::time::timeout(TERM_GRACE, self.wait_for_start()).await.is_ok() {
            return;
        }

        error!("Server ignored SIGTERM, killing it");
        if let Ok(token) = self.shared.kill_token.lock() {
            token.cancel();
        }
        let _ = tokio::time::timeout(TERM_GRACE, self.wait_for_start()).await;
    }

    #[cfg(unix)]
    fn terminate(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self.shared.pid.load(Ordering::SeqCst);
        if pid == 0 {
            return;
        }
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("Failed to signal server process {}: {}", pid, e);
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) {}

    fn spawn_output_tasks(
        &self,
        stdout: tokio::process::ChildStdout,
        stderr: tokio::process::ChildStderr,
        generation: u64,
    ) {
        let lines_tx = self.lines_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        info!(target: SERVER_TARGET, "{}", line);
                        if lines_tx.send(ServerLine::new(generation, line)).is_err() {
                            debug!("Line receiver dropped, discarding server output");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read server output: {}", e);
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: SERVER_TARGET, "{}", line);
            }
        });
    }
}

#[async_trait]
impl ServerControl for ProcessHost {
    async fn broadcast(&self, message: &str) {
        info!("[broadcast] {}", message);
        if !self.is_running() {
            return;
        }
        for line in message.lines() {
            let command = self.config.broadcast_format.replace("{message}", line);
            if let Err(e) = self.execute(&command).await {
                warn!("Failed to broadcast: {}", e);
                break;
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        self.execute(&self.config.stop_command).await
    }

    async fn execute(&self, command: &str) -> Result<()> {
        let mut stdin = self.shared.stdin.lock().await;
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| PregenError::Process("server is not running".into()))?;

        debug!("Executing server command: {}", command);
        pipe.write_all(format!("{}\n", command).as_bytes()).await?;
        pipe.flush().await?;
        Ok(())
    }

    async fn wait_for_start(&self) -> Result<()> {
        let mut state = self.shared.state_tx.subscribe();
        state
            .wait_for(|s| *s == ServerState::Stopped)
            .await
            .map_err(|_| PregenError::Process("server state channel closed".into()))?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if self.is_running() {
            debug!("Server already running, start ignored");
            return Ok(());
        }

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .current_dir(&self.config.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PregenError::Process(format!("failed to launch {}: {}", self.config.command, e))
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(PregenError::Process("server stdio was not captured".into()));
        };

        *self.shared.stdin.lock().await = Some(stdin);
        let pid = child.id().unwrap_or(0);
        self.shared.pid.store(pid, Ordering::SeqCst);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.state_tx.send_replace(ServerState::Running);
        info!("Server started (pid {}, launch {})", pid, generation);

        self.spawn_output_tasks(stdout, stderr, generation);

        let kill_token = CancellationToken::new();
        if let Ok(mut slot) = self.shared.kill_token.lock() {
            *slot = kill_token.clone();
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_token.cancelled() => {
                    if let Err(e) = child.kill().await {
                        error!("Failed to kill server process: {}", e);
                    }
                    child.wait().await
                }
            };
            match status {
                Ok(status) => info!("Server exited with {}", status),
                Err(e) => error!("Failed to wait for server process: {}", e),
            }

            *shared.stdin.lock().await = None;
            shared.pid.store(0, Ordering::SeqCst);
            shared.state_tx.send_replace(ServerState::Stopped);
        });

        Ok(())
    }

    fn is_running(&self) -> bool {
        *self.shared.state_tx.borrow() == ServerState::Running
    }

    fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_server(script: &str, path: &std::path::Path) -> ServerConfig {
        ServerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            path: path.to_path_buf(),
            stop_command: "stop".to_string(),
            broadcast_format: "say {message}".to_string(),
            shutdown_timeout_secs: 5,
            autostart: false,
        }
    }

    #[tokio::test]
    async fn test_lines_are_forwarded_in_order() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (host, mut lines) =
            ProcessHost::new(shell_server("echo one; echo two; echo three", temp_dir.path()));

        host.start().await?;
        host.wait_for_start().await?;

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(lines.recv().await.expect("line"));
        }
        assert_eq!(
            received,
            vec![
                ServerLine::new(1, "one"),
                ServerLine::new(1, "two"),
                ServerLine::new(1, "three"),
            ]
        );
        assert!(!host.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_command_reaches_stdin() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let script = r#"while read cmd; do echo "got $cmd"; [ "$cmd" = stop ] && exit 0; done"#;
        let (host, mut lines) = ProcessHost::new(shell_server(script, temp_dir.path()));

        host.start().await?;
        assert!(host.is_running());
        host.broadcast("hello").await;
        host.stop().await?;
        host.wait_for_start().await?;

        assert_eq!(lines.recv().await.map(|l| l.text).as_deref(), Some("got say hello"));
        assert_eq!(lines.recv().await.map(|l| l.text).as_deref(), Some("got stop"));
        assert!(matches!(
            host.execute("list").await,
            Err(PregenError::Process(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_each_launch_stamps_its_own_lines() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (host, mut lines) = ProcessHost::new(shell_server("echo up", temp_dir.path()));
        assert_eq!(host.generation(), 0);

        host.start().await?;
        host.wait_for_start().await?;
        host.start().await?;
        host.wait_for_start().await?;

        assert_eq!(host.generation(), 2);
        let mut received = vec![
            lines.recv().await.expect("line"),
            lines.recv().await.expect("line"),
        ];
        received.sort_by_key(|line| line.generation);
        assert_eq!(
            received,
            vec![ServerLine::new(1, "up"), ServerLine::new(2, "up")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_terminates_unresponsive_server() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut config = shell_server("exec sleep 60", temp_dir.path());
        config.shutdown_timeout_secs = 1;
        let (host, _lines) = ProcessHost::new(config);

        host.start().await?;
        host.shutdown().await;
        assert!(!host.is_running());
        Ok(())
    }
}

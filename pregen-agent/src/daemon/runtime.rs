//! Serial event loop of the agent.
//!
//! One task owns the [`Agent`] and consumes operator lines and server output
//! lines in arrival order, so a session never sees two events at once.

use crate::config::Config;
use crate::console::handler::{handle_command, Reply};
use crate::console::Command;
use crate::host::{ServerControl, ServerLine};
use crate::matcher::DimensionMatcher;
use crate::session::{SessionContext, SessionMachine};
use crate::storage::SlotStore;
use crate::utils::{PregenError, Result};
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Everything the console and the sessions operate on
pub struct Agent<H> {
    pub(crate) config: Config,
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) store: SlotStore,
    pub(crate) matcher: DimensionMatcher,
    pub(crate) sessions: SessionMachine,
    pub(crate) host: H,
}

impl<H: ServerControl> Agent<H> {
    /// `config_path` is the file `reload` re-reads, if any
    pub fn new(config: Config, config_path: Option<PathBuf>, host: H) -> Result<Self> {
        let store = SlotStore::from_config(&config)?;
        let matcher = DimensionMatcher::new(&config.keywords.generation_finished)?;
        Ok(Self {
            config,
            config_path,
            store,
            matcher,
            sessions: SessionMachine::new(),
            host,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionMachine {
        &self.sessions
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Borrow the session register alongside the context its sessions run in
    pub(crate) fn split(&mut self) -> (&mut SessionMachine, SessionContext<'_>) {
        let ctx = SessionContext {
            config: &self.config,
            store: &self.store,
            matcher: &self.matcher,
            server: &self.host,
        };
        (&mut self.sessions, ctx)
    }

    /// Parse and run one operator line. Blank lines yield `None`.
    pub async fn handle_operator_line(&mut self, line: &str) -> Option<Reply> {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(e) => return Some(Reply::Text(e.to_string())),
        };
        debug!("Console command: {:?}", command);

        match handle_command(self, command).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Command failed: {}", e);
                Some(Reply::Text(e.to_string()))
            }
        }
    }

    /// Feed one server output line to the running session
    pub async fn handle_server_line(&mut self, line: &ServerLine) {
        let (sessions, ctx) = self.split();
        sessions.dispatch_line(line, &ctx).await;
    }

    /// Re-read the configuration file and rebuild the store and matcher.
    ///
    /// The resident session survives unless `clear`. On error nothing changes.
    pub fn reload(&mut self, clear: bool) -> Result<()> {
        let config = match &self.config_path {
            Some(path) => Config::load(path)?,
            None => {
                return Err(PregenError::Config(
                    "no configuration file was given at startup".into(),
                ))
            }
        };
        let store = SlotStore::from_config(&config)?;
        let matcher = DimensionMatcher::new(&config.keywords.generation_finished)?;

        if config.server.path != self.config.server.path
            || config.server.command != self.config.server.command
        {
            warn!("Server launch settings only take effect after an agent restart");
        }

        self.config = config;
        self.store = store;
        self.matcher = matcher;
        if clear {
            self.sessions.clear();
        }
        info!("Configuration reloaded");
        Ok(())
    }
}

/// Run the event loop until `quit`, a shutdown signal or the server output
/// channel closing.
///
/// Pending operator lines are taken before server lines.
pub async fn run<H: ServerControl>(
    agent: &mut Agent<H>,
    mut operator_lines: mpsc::Receiver<String>,
    mut server_lines: mpsc::UnboundedReceiver<ServerLine>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut operator_open = true;
    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("Shutdown requested");
                break;
            }
            line = operator_lines.recv(), if operator_open => match line {
                Some(line) => match agent.handle_operator_line(&line).await {
                    Some(Reply::Text(text)) => println!("{}", text),
                    Some(Reply::Quit) => {
                        info!("Quit requested from console");
                        break;
                    }
                    None => {}
                },
                None => {
                    debug!("Console input closed");
                    operator_open = false;
                }
            },
            line = server_lines.recv() => match line {
                Some(line) => agent.handle_server_line(&line).await,
                None => {
                    warn!("Server output channel closed");
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{HostCall, RecordingHost};
    use crate::session::Session;
    use std::fs;
    use tempfile::TempDir;

    fn agent(temp_dir: &TempDir, config_path: Option<PathBuf>) -> Agent<RecordingHost> {
        let mut config = Config::default();
        config.server.path = temp_dir.path().join("server");
        config.storage.backup_path = temp_dir.path().join("pre-generated");
        config.pregen.countdown_time = 0;
        fs::create_dir_all(config.server.path.join("world")).unwrap();
        fs::write(config.server.path.join("world/level.dat"), "overworld").unwrap();
        Agent::new(config, config_path, RecordingHost::new()).unwrap()
    }

    #[tokio::test]
    async fn test_loop_runs_commands_and_lines_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent(&temp_dir, None);
        let (operator_tx, operator_rx) = mpsc::channel(8);
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        operator_tx.send("!!pregen gen 1 loop".to_string()).await.unwrap();
        operator_tx.send("confirm".to_string()).await.unwrap();
        drop(operator_tx);
        // Launch 2 is the one the session starts after confirm
        for line in [
            "Pre-generating of overworld finished, took 1min",
            "Pre-generating of the_nether finished, took 1min",
        ] {
            server_tx.send(ServerLine::new(2, line)).unwrap();
        }
        drop(server_tx);

        run(&mut agent, operator_rx, server_rx, shutdown_rx).await;

        assert!(agent.sessions().is_available());
        let slots = agent.store().list_slots(true, false).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].info.comment, "loop");
        assert_eq!(agent.host().count(&HostCall::Start), 2);
    }

    #[tokio::test]
    async fn test_output_queued_during_stop_is_not_counted() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent(&temp_dir, None);
        let (operator_tx, operator_rx) = mpsc::channel(8);
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        // The old server reports a finished dimension while it is being stopped
        agent.host().echo_on_execute(
            "uhc regen",
            "Pre-generating of overworld finished, took 1min",
            server_tx.clone(),
        );
        operator_tx.send("gen 1".to_string()).await.unwrap();
        operator_tx.send("confirm".to_string()).await.unwrap();
        drop(operator_tx);
        server_tx
            .send(ServerLine::new(2, "Pre-generating of the_nether finished, took 1min"))
            .unwrap();
        drop(server_tx);

        run(&mut agent, operator_rx, server_rx, shutdown_rx).await;

        assert!(agent.store().list_slots(true, false).unwrap().is_empty());
        assert!(matches!(
            agent.sessions().current(),
            Some(Session::Generate(g)) if g.finished_dimensions() == vec!["the_nether"]
        ));
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_loop() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent(&temp_dir, None);
        let (_operator_tx, operator_rx) = mpsc::channel::<String>(1);
        let (_server_tx, server_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        shutdown_tx.send(()).unwrap();
        run(&mut agent, operator_rx, server_rx, shutdown_rx).await;
        assert!(agent.host().calls().is_empty());
    }

    #[tokio::test]
    async fn test_reload_keeps_session_unless_cleared() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("pregen.toml");
        let mut agent = agent(&temp_dir, Some(config_path.clone()));

        let mut reloaded = agent.config().clone();
        reloaded.pregen.max_slots = 42;
        fs::write(&config_path, reloaded.to_toml().unwrap()).unwrap();

        agent.handle_operator_line("autoremove").await;
        assert_eq!(
            agent.handle_operator_line("reload").await,
            Some(Reply::Text("Configuration reloaded".into()))
        );
        assert_eq!(agent.config().pregen.max_slots, 42);
        assert!(!agent.sessions().is_available());

        agent.handle_operator_line("reload --clear").await;
        assert!(agent.sessions().is_available());
    }

    #[tokio::test]
    async fn test_reload_without_file_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent(&temp_dir, None);
        let reply = agent.handle_operator_line("reload").await;
        assert!(matches!(reply, Some(Reply::Text(t)) if t.starts_with("Configuration error")));
    }

    #[tokio::test]
    async fn test_parse_errors_are_replied() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent(&temp_dir, None);
        assert_eq!(agent.handle_operator_line("   ").await, None);
        assert!(matches!(
            agent.handle_operator_line("fly").await,
            Some(Reply::Text(t)) if t.contains("Unknown command")
        ));
    }
}

//! Maintenance sessions and the register that serializes them.
//!
//! At most one [`Session`] exists at a time. It is created pending
//! confirmation, runs once confirmed, and leaves the register when it reports
//! [`SessionOutcome::Finished`] or fails. A failing session always gets its
//! `on_error` hook run before it is cleared.

pub mod auto_remove;
pub mod generate;
pub mod load;
pub mod remove;

pub use auto_remove::AutoRemoveSession;
pub use generate::GenerateSession;
pub use load::LoadSession;
pub use remove::RemoveSession;

use crate::config::Config;
use crate::host::{ServerControl, ServerLine};
use crate::matcher::DimensionMatcher;
use crate::storage::SlotStore;
use crate::utils::{PregenError, Result};
use tracing::{debug, error, info};

/// What a session hook asks of the register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stay resident and keep receiving server lines
    Continue,
    /// Leave the register
    Finished,
}

/// Collaborators a session works with
pub struct SessionContext<'a> {
    pub config: &'a Config,
    pub store: &'a SlotStore,
    pub matcher: &'a DimensionMatcher,
    pub server: &'a dyn ServerControl,
}

/// One maintenance workflow
#[derive(Debug)]
pub enum Session {
    Generate(GenerateSession),
    Load(LoadSession),
    Remove(RemoveSession),
    AutoRemove(AutoRemoveSession),
}

impl Session {
    pub fn kind(&self) -> &'static str {
        match self {
            Session::Generate(_) => "generate",
            Session::Load(_) => "load",
            Session::Remove(_) => "remove",
            Session::AutoRemove(_) => "autoremove",
        }
    }

    /// Entry point, run once on confirmation
    pub async fn main(&mut self, ctx: &SessionContext<'_>) -> Result<SessionOutcome> {
        match self {
            Session::Generate(session) => session.main(ctx).await,
            Session::Load(session) => session.main(ctx).await,
            Session::Remove(session) => session.main(ctx).await,
            Session::AutoRemove(session) => session.main(ctx).await,
        }
    }

    /// Handle one server log line while running
    pub async fn on_event(
        &mut self,
        line: &ServerLine,
        ctx: &SessionContext<'_>,
    ) -> Result<SessionOutcome> {
        match self {
            Session::Generate(session) => session.on_event(line, ctx).await,
            Session::Load(_) | Session::Remove(_) | Session::AutoRemove(_) => {
                Ok(SessionOutcome::Continue)
            }
        }
    }

    /// Roll back after `main` or `on_event` failed and bring the server back up
    pub async fn on_error(&mut self, err: &PregenError, ctx: &SessionContext<'_>) {
        match self {
            Session::Generate(session) => session.on_error(err, ctx).await,
            Session::Load(session) => session.on_error(err, ctx).await,
            Session::Remove(session) => session.on_error(err, ctx).await,
            Session::AutoRemove(session) => session.on_error(err, ctx).await,
        }
    }
}

#[derive(Debug)]
struct ResidentSession {
    session: Session,
    running: bool,
}

/// Holder of the single current session
#[derive(Debug, Default)]
pub struct SessionMachine {
    current: Option<ResidentSession>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no session is pending or running
    pub fn is_available(&self) -> bool {
        self.current.is_none()
    }

    /// True when the resident session has been confirmed
    pub fn is_running(&self) -> bool {
        self.current.as_ref().is_some_and(|r| r.running)
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref().map(|r| &r.session)
    }

    /// Drop the resident session, if any
    pub fn clear(&mut self) {
        if self.current.take().is_some() {
            debug!("Session removed");
        } else {
            debug!("Nothing to clear");
        }
    }

    /// Place a new session pending confirmation
    pub fn submit(&mut self, session: Session) -> Result<()> {
        if !self.is_available() {
            return Err(PregenError::SessionBusy);
        }
        debug!("New {} session pending confirmation", session.kind());
        self.current = Some(ResidentSession {
            session,
            running: false,
        });
        Ok(())
    }

    /// Discard the pending session
    pub fn abort(&mut self) -> Result<Session> {
        match self.current.take() {
            None => Err(PregenError::NoSession),
            Some(resident) if resident.running => {
                self.current = Some(resident);
                Err(PregenError::SessionRunning)
            }
            Some(resident) => {
                info!("Aborted {} session", resident.session.kind());
                Ok(resident.session)
            }
        }
    }

    /// Start the pending session and run its entry point
    pub async fn confirm(&mut self, ctx: &SessionContext<'_>) -> Result<()> {
        let resident = self.current.as_mut().ok_or(PregenError::NoSession)?;
        if resident.running {
            return Err(PregenError::SessionRunning);
        }
        resident.running = true;
        info!("Running {} session", resident.session.kind());

        let result = resident.session.main(ctx).await;
        self.settle(result, ctx).await;
        Ok(())
    }

    /// Forward a server log line to the running session
    pub async fn dispatch_line(&mut self, line: &ServerLine, ctx: &SessionContext<'_>) {
        let Some(resident) = self.current.as_mut() else {
            return;
        };
        if !resident.running {
            return;
        }

        let result = resident.session.on_event(line, ctx).await;
        self.settle(result, ctx).await;
    }

    async fn settle(&mut self, result: Result<SessionOutcome>, ctx: &SessionContext<'_>) {
        match result {
            Ok(SessionOutcome::Continue) => {}
            Ok(SessionOutcome::Finished) => self.clear(),
            Err(err) => {
                if let Some(resident) = self.current.as_mut() {
                    error!(
                        "Error occurred while running {} session: {}",
                        resident.session.kind(),
                        err
                    );
                    resident.session.on_error(&err, ctx).await;
                }
                self.clear();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::SessionContext;
    use crate::config::Config;
    use crate::host::testing::RecordingHost;
    use crate::matcher::DimensionMatcher;
    use crate::storage::SlotStore;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    pub struct Fixture {
        pub temp_dir: TempDir,
        pub config: Config,
        pub store: SlotStore,
        pub matcher: DimensionMatcher,
        pub host: RecordingHost,
    }

    impl Fixture {
        pub fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let mut config = Config::default();
            config.server.path = temp_dir.path().join("server");
            config.storage.backup_path = temp_dir.path().join("pre-generated");
            config.storage.world_names = vec!["world".into(), "world_nether".into()];
            config.pregen.countdown_time = 0;

            write_tree(&config.server.path.join("world"), "live overworld");
            write_tree(&config.server.path.join("world_nether"), "live nether");

            let store = SlotStore::from_config(&config).unwrap();
            let matcher = DimensionMatcher::new(&config.keywords.generation_finished).unwrap();
            Self {
                temp_dir,
                config,
                store,
                matcher,
                host: RecordingHost::new(),
            }
        }

        pub fn ctx(&self) -> SessionContext<'_> {
            SessionContext {
                config: &self.config,
                store: &self.store,
                matcher: &self.matcher,
                server: &self.host,
            }
        }

        pub fn server_path(&self, name: &str) -> PathBuf {
            self.config.server.path.join(name)
        }
    }

    /// Create `dir` with a `level.dat` holding `content` and one region file
    pub fn write_tree(dir: &Path, content: &str) {
        fs::create_dir_all(dir.join("region")).unwrap();
        fs::write(dir.join("level.dat"), content).unwrap();
        fs::write(dir.join("region/r.0.0.mca"), format!("{content} chunks")).unwrap();
    }

    pub fn read_level(dir: &Path) -> String {
        fs::read_to_string(dir.join("level.dat")).unwrap()
    }
}

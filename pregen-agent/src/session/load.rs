use super::{SessionContext, SessionOutcome};
use crate::countdown::countdown_then_stop;
use crate::fs::{copy_path, remove_path};
use crate::storage::{SlotStore, SLOT_INFO_FILE};
use crate::utils::{PregenError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// How far a load got before it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadStage {
    Pending,
    /// The temp folder was created by this session
    TempCreated,
    /// Every live world has a copy in the temp folder
    BackedUp,
    /// Slot content is in place and the slot is marked used
    Committed,
}

/// Replace the live worlds with the content of one slot
#[derive(Debug)]
pub struct LoadSession {
    slot_name: String,
    slot_dir: PathBuf,
    temp_dir: Option<PathBuf>,
    backed_up: Vec<String>,
    moved: Vec<String>,
    stage: LoadStage,
}

impl LoadSession {
    /// Fails with [`PregenError::SlotNotFound`] unless the slot directory exists
    pub fn new(store: &SlotStore, name: &str) -> Result<Self> {
        let slot_dir = store
            .resolve_slot_path(name, false)?
            .ok_or_else(|| PregenError::SlotNotFound(name.to_string()))?;
        let slot_name = slot_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PregenError::SlotNotFound(name.to_string()))?;

        Ok(Self {
            slot_name,
            slot_dir,
            temp_dir: None,
            backed_up: Vec::new(),
            moved: Vec::new(),
            stage: LoadStage::Pending,
        })
    }

    pub fn slot_name(&self) -> &str {
        &self.slot_name
    }

    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    pub(super) async fn main(&mut self, ctx: &SessionContext<'_>) -> Result<SessionOutcome> {
        let server_path = &ctx.config.server.path;
        let temp_dir = ctx.config.restore_temp_path();
        if fs::symlink_metadata(&temp_dir).is_ok() {
            return Err(PregenError::TempFolderExists(temp_dir));
        }

        ctx.server
            .broadcast(&format!(
                "Loading slot {}, the server will restart",
                self.slot_name
            ))
            .await;
        countdown_then_stop(ctx.server, ctx.config.pregen.countdown_time, None).await?;

        fs::create_dir(&temp_dir).map_err(|e| PregenError::fs(&temp_dir, e))?;
        self.temp_dir = Some(temp_dir.clone());
        self.stage = LoadStage::TempCreated;

        for unit in &ctx.config.storage.world_names {
            let live = server_path.join(unit);
            if fs::symlink_metadata(&live).is_err() {
                debug!("World {} not found, nothing to set aside", unit);
                continue;
            }
            copy_path(&live, &temp_dir.join(unit), false)?;
            self.backed_up.push(unit.clone());
        }
        self.stage = LoadStage::BackedUp;

        for unit in &ctx.config.storage.world_names {
            remove_path(&server_path.join(unit), true)?;
        }

        let entries = fs::read_dir(&self.slot_dir).map_err(|e| PregenError::fs(&self.slot_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PregenError::fs(&self.slot_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == SLOT_INFO_FILE {
                continue;
            }
            let target = server_path.join(&name);
            if fs::symlink_metadata(&target).is_err() {
                self.moved.push(name);
            }
            copy_path(&entry.path(), &target, false)?;
        }

        ctx.store.mark_used(&self.slot_name)?;
        self.stage = LoadStage::Committed;
        info!("Slot {} loaded into {}", self.slot_name, server_path.display());

        remove_path(&temp_dir, true)?;
        self.temp_dir = None;

        ctx.server.start().await?;
        ctx.server
            .broadcast(&format!("Loaded slot {}", self.slot_name))
            .await;
        Ok(SessionOutcome::Finished)
    }

    pub(super) async fn on_error(&mut self, err: &PregenError, ctx: &SessionContext<'_>) {
        let mut keep_temp = false;
        if let Some(temp_dir) = &self.temp_dir {
            if (LoadStage::BackedUp..LoadStage::Committed).contains(&self.stage) {
                keep_temp = !self.roll_back(&ctx.config.server.path, temp_dir);
            }
            if keep_temp {
                error!(
                    "Rollback incomplete, the original worlds are kept in {}",
                    temp_dir.display()
                );
            } else if let Err(e) = remove_path(temp_dir, true) {
                warn!("Failed to remove temp folder: {}", e);
            }
        }

        if let Err(e) = ctx.server.start().await {
            error!("Failed to restart server: {}", e);
        }
        ctx.server
            .broadcast(&format!("Failed to load slot {}: {}", self.slot_name, err))
            .await;
    }

    /// Put the set-aside worlds back. Returns false if any world could not be restored.
    fn roll_back(&self, server_path: &Path, temp_dir: &Path) -> bool {
        info!("Restoring worlds from {}", temp_dir.display());
        for name in &self.moved {
            if let Err(e) = remove_path(&server_path.join(name), true) {
                warn!("Failed to remove {}: {}", name, e);
            }
        }

        let mut restored = true;
        for unit in &self.backed_up {
            let live = server_path.join(unit);
            let result = remove_path(&live, true)
                .and_then(|()| copy_path(&temp_dir.join(unit), &live, false));
            if let Err(e) = result {
                error!("Failed to restore world {}: {}", unit, e);
                restored = false;
            }
        }
        restored
    }
}

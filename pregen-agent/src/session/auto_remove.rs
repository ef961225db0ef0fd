use super::{SessionContext, SessionOutcome};
use crate::utils::{PregenError, Result};

/// Reclaim used slots and orphaned archive entries
#[derive(Debug, Default)]
pub struct AutoRemoveSession;

impl AutoRemoveSession {
    pub fn new() -> Self {
        Self
    }

    pub(super) async fn main(&mut self, ctx: &SessionContext<'_>) -> Result<SessionOutcome> {
        let removed = ctx.store.auto_remove()?;
        ctx.server
            .broadcast(&format!("Removed {} used slot(s)", removed))
            .await;
        Ok(SessionOutcome::Finished)
    }

    pub(super) async fn on_error(&mut self, err: &PregenError, ctx: &SessionContext<'_>) {
        ctx.server.broadcast(&err.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixture::Fixture;
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_reports_used_slot_count() -> Result<()> {
        let fx = Fixture::new();
        let used = fx.store.backup(&fx.config.storage.world_names, "used")?;
        fx.store.mark_used(&used.name)?;
        let fresh = fx.store.backup(&fx.config.storage.world_names, "fresh")?;
        fs::create_dir_all(fx.store.root().join("broken"))?;

        let outcome = AutoRemoveSession::new().main(&fx.ctx()).await?;

        assert_eq!(outcome, SessionOutcome::Finished);
        assert_eq!(fx.host.broadcasts(), vec!["Removed 1 used slot(s)".to_string()]);
        let remaining = fx.store.list_slots(true, false)?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, fresh.name);
        assert!(!fx.store.root().join("broken").exists());
        Ok(())
    }
}

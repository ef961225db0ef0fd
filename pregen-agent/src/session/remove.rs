use super::{SessionContext, SessionOutcome};
use crate::utils::{PregenError, Result};

/// Delete one slot
#[derive(Debug)]
pub struct RemoveSession {
    slot_name: String,
}

impl RemoveSession {
    pub fn new(slot_name: impl Into<String>) -> Self {
        Self {
            slot_name: slot_name.into(),
        }
    }

    pub fn slot_name(&self) -> &str {
        &self.slot_name
    }

    pub(super) async fn main(&mut self, ctx: &SessionContext<'_>) -> Result<SessionOutcome> {
        ctx.store.remove_slot(&self.slot_name)?;
        ctx.server
            .broadcast(&format!("Removed slot {}", self.slot_name))
            .await;
        Ok(SessionOutcome::Finished)
    }

    pub(super) async fn on_error(&mut self, err: &PregenError, ctx: &SessionContext<'_>) {
        ctx.server.broadcast(&err.to_string()).await;
    }
}

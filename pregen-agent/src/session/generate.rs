use super::{SessionContext, SessionOutcome};
use crate::countdown::countdown_then_stop;
use crate::host::{log_content, ServerLine};
use crate::utils::{PregenError, Result};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Pre-generate `remaining` slots, one per round of dimension completions
#[derive(Debug)]
pub struct GenerateSession {
    remaining: u32,
    comment: String,
    completed: BTreeMap<String, bool>,
    /// Launch whose output is matched; `None` until the first restart
    generation: Option<u64>,
}

impl GenerateSession {
    pub fn new(count: u32, comment: impl Into<String>, wait_dimensions: &[String]) -> Self {
        Self {
            remaining: count,
            comment: comment.into(),
            completed: wait_dimensions.iter().map(|d| (d.clone(), false)).collect(),
            generation: None,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Whether server lines are being matched yet
    pub fn is_accepting(&self) -> bool {
        self.generation.is_some()
    }

    /// Dimensions reported finished in the current round
    pub fn finished_dimensions(&self) -> Vec<&str> {
        self.completed
            .iter()
            .filter(|(_, done)| **done)
            .map(|(dimension, _)| dimension.as_str())
            .collect()
    }

    pub(super) async fn main(&mut self, ctx: &SessionContext<'_>) -> Result<SessionOutcome> {
        ctx.server
            .broadcast(&format!(
                "Pre-generating {} slot(s), the server will restart",
                self.remaining
            ))
            .await;
        countdown_then_stop(
            ctx.server,
            ctx.config.pregen.countdown_time,
            ctx.config.pregen.regen_command(),
        )
        .await?;
        ctx.server.start().await?;
        self.generation = Some(ctx.server.generation());
        Ok(SessionOutcome::Continue)
    }

    pub(super) async fn on_event(
        &mut self,
        line: &ServerLine,
        ctx: &SessionContext<'_>,
    ) -> Result<SessionOutcome> {
        let Some(generation) = self.generation else {
            return Ok(SessionOutcome::Continue);
        };
        if line.generation != generation {
            debug!(
                "Ignoring output of server launch {} (waiting on {})",
                line.generation, generation
            );
            return Ok(SessionOutcome::Continue);
        }

        let Some(dimension) = ctx.matcher.match_line(log_content(&line.text)) else {
            return Ok(SessionOutcome::Continue);
        };
        match self.completed.get_mut(&dimension) {
            Some(done) if !*done => {
                debug!("Dimension {} finished pre-generating", dimension);
                *done = true;
            }
            Some(_) => return Ok(SessionOutcome::Continue),
            None => {
                debug!("Ignoring finished dimension {}", dimension);
                return Ok(SessionOutcome::Continue);
            }
        }

        if !self.completed.values().all(|done| *done) {
            return Ok(SessionOutcome::Continue);
        }

        self.remaining = self.remaining.saturating_sub(1);
        ctx.server
            .broadcast(&format!(
                "Pre-generation round finished, {} left",
                self.remaining
            ))
            .await;
        countdown_then_stop(
            ctx.server,
            ctx.config.pregen.countdown_time,
            ctx.config.pregen.regen_command(),
        )
        .await?;
        let slot = ctx
            .store
            .backup(&ctx.config.storage.world_names, &self.comment)?;
        info!("Pre-generated slot {}", slot.name);
        ctx.server.start().await?;
        self.generation = Some(ctx.server.generation());
        self.completed.values_mut().for_each(|done| *done = false);

        if self.remaining == 0 {
            ctx.server.broadcast("Pre-generation complete").await;
            return Ok(SessionOutcome::Finished);
        }
        Ok(SessionOutcome::Continue)
    }

    pub(super) async fn on_error(&mut self, err: &PregenError, ctx: &SessionContext<'_>) {
        if let Err(e) = ctx.server.start().await {
            error!("Failed to restart server: {}", e);
        }
        ctx.server
            .broadcast(&format!("Pre-generation failed: {}", err))
            .await;
    }
}

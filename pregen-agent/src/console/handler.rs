//! Console command handlers.
//!
//! Each handler returns the reply shown to the operator. Errors are rendered
//! by the caller.

use super::Command;
use crate::daemon::runtime::Agent;
use crate::host::ServerControl;
use crate::session::{
    AutoRemoveSession, GenerateSession, LoadSession, RemoveSession, Session,
};
use crate::storage::Slot;
use crate::utils::{PregenError, Result};
use tracing::info;

const HELP: &str = "\
Commands (optionally prefixed with !!pregen or !!upg):
  gen [count] [comment]  pre-generate new slots
  load <slot>            load a slot into the server
  next                   load the oldest unused slot
  list                   list all slots
  info <slot>            show details of a slot
  remove <slot>          delete a slot
  autoremove             delete used slots and orphaned entries
  confirm                run the pending session
  abort                  discard the pending session
  reload [--clear]       re-read the configuration file
  status                 show the current session
  quit                   stop the server and exit";

const CONFIRM_PROMPT: &str = "Type confirm to continue or abort to cancel";

/// What the console loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

impl Reply {
    fn text(message: impl Into<String>) -> Self {
        Reply::Text(message.into())
    }
}

/// Handle a console command
pub async fn handle_command<H: ServerControl>(agent: &mut Agent<H>, command: Command) -> Result<Reply> {
    match command {
        Command::Help => Ok(Reply::text(HELP)),
        Command::Generate { count, comment } => handle_generate(agent, count, comment),
        Command::Load { slot } => {
            let slot = agent.store.get_slot(&slot)?;
            handle_load(agent, slot)
        }
        Command::Next => match agent.store.next_unused()? {
            Some(slot) => handle_load(agent, slot),
            None => Ok(Reply::text("No unused slot left")),
        },
        Command::List => handle_list(agent),
        Command::Info { slot } => handle_info(agent, &slot),
        Command::Remove { slot } => {
            let slot = agent.store.get_slot(&slot)?;
            agent
                .sessions
                .submit(Session::Remove(RemoveSession::new(slot.name.clone())))?;
            Ok(Reply::text(format!(
                "Remove slot {}? {}",
                slot.name, CONFIRM_PROMPT
            )))
        }
        Command::AutoRemove => {
            agent
                .sessions
                .submit(Session::AutoRemove(AutoRemoveSession::new()))?;
            Ok(Reply::text(format!(
                "Remove every used slot? {}",
                CONFIRM_PROMPT
            )))
        }
        Command::Confirm => {
            let (sessions, ctx) = agent.split();
            sessions.confirm(&ctx).await?;
            Ok(Reply::text("Session confirmed"))
        }
        Command::Abort => {
            let session = agent.sessions.abort()?;
            Ok(Reply::text(format!("Aborted {} session", session.kind())))
        }
        Command::Reload { clear } => {
            agent.reload(clear)?;
            Ok(Reply::text(if clear {
                "Configuration reloaded, session cleared"
            } else {
                "Configuration reloaded"
            }))
        }
        Command::Status => Ok(Reply::text(status(agent))),
        Command::Quit => Ok(Reply::Quit),
    }
}

fn handle_generate<H: ServerControl>(
    agent: &mut Agent<H>,
    count: Option<u32>,
    comment: String,
) -> Result<Reply> {
    let pregen = &agent.config.pregen;
    let count = count.unwrap_or(pregen.default_slots);
    if count == 0 {
        return Err(PregenError::InvalidArgument(
            "slot count must be at least 1".into(),
        ));
    }

    let existing = agent.store.list_slots(true, false)?.len();
    let requested = count as usize;
    if existing + requested > pregen.max_slots {
        return Err(PregenError::SlotLimit {
            requested,
            existing,
            max: pregen.max_slots,
        });
    }

    let session = GenerateSession::new(count, comment, &pregen.wait_dimensions);
    agent.sessions.submit(Session::Generate(session))?;
    info!("Generate session for {} slot(s) pending", count);
    Ok(Reply::text(format!(
        "Pre-generate {} slot(s)? The server will restart. {}",
        count, CONFIRM_PROMPT
    )))
}

fn handle_load<H: ServerControl>(agent: &mut Agent<H>, slot: Slot) -> Result<Reply> {
    let session = LoadSession::new(&agent.store, &slot.name)?;
    agent.sessions.submit(Session::Load(session))?;
    let used = if slot.info.used { " (already used)" } else { "" };
    Ok(Reply::text(format!(
        "Load slot {}{}? The server will restart. {}",
        slot.name, used, CONFIRM_PROMPT
    )))
}

fn handle_list<H: ServerControl>(agent: &Agent<H>) -> Result<Reply> {
    let slots = agent.store.list_slots(true, false)?;
    let mut lines = vec![format!(
        "Slots ({}/{}):",
        slots.len(),
        agent.config.pregen.max_slots
    )];
    for slot in &slots {
        let marker = if slot.info.used { "[used] " } else { "" };
        let mut line = format!("  {}{}", marker, slot.name);
        if !slot.info.comment.is_empty() {
            line.push_str(&format!(" - {}", slot.info.comment));
        }
        lines.push(line);
    }
    Ok(Reply::Text(lines.join("\n")))
}

fn handle_info<H: ServerControl>(agent: &Agent<H>, name: &str) -> Result<Reply> {
    let slot = agent.store.get_slot(name)?;
    let size = agent.store.slot_size(&slot.name)?;
    Ok(Reply::Text(format!(
        "Slot {}\n  used: {}\n  size: {}\n  created: {}\n  comment: {}",
        slot.name,
        slot.info.used,
        format_size(size),
        slot.info.formatted_time(),
        slot.info.comment
    )))
}

fn status<H: ServerControl>(agent: &Agent<H>) -> String {
    let server = if agent.host.is_running() {
        "running"
    } else {
        "stopped"
    };
    let session = match agent.sessions.current() {
        None => "no session".to_string(),
        Some(session) => {
            let state = if agent.sessions.is_running() {
                "running"
            } else {
                "pending confirmation"
            };
            match session {
                Session::Generate(generate) => format!(
                    "generate session {}, {} slot(s) left, finished: [{}]",
                    state,
                    generate.remaining(),
                    generate.finished_dimensions().join(", ")
                ),
                Session::Load(load) => {
                    format!("load session for {} {}", load.slot_name(), state)
                }
                Session::Remove(remove) => {
                    format!("remove session for {} {}", remove.slot_name(), state)
                }
                Session::AutoRemove(_) => format!("autoremove session {}", state),
            }
        }
    };
    format!("Server {}, {}", server, session)
}

/// Render a byte count in MB below one GiB, in GB above
pub fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let bytes = bytes as f64;
    if bytes < GIB {
        format!("{:.2} MB", bytes / MIB)
    } else {
        format!("{:.2} GB", bytes / GIB)
    }
}

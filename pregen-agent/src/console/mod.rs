//! Operator console.
//!
//! One command per line, optionally prefixed with `!!pregen` or `!!upg`:
//! - `gen [count] [comment]`, `load <slot>`, `next`, `remove <slot>` and
//!   `autoremove` place a session pending confirmation
//! - `confirm` and `abort` act on the pending session
//! - `list`, `info <slot>` and `status` are read-only
//! - `reload [--clear]` re-reads the configuration file

pub mod handler;

use thiserror::Error;

/// Accepted command prefixes
pub const PREFIXES: &[&str] = &["!!pregen", "!!upg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Generate {
        count: Option<u32>,
        comment: String,
    },
    Load {
        slot: String,
    },
    Next,
    List,
    Info {
        slot: String,
    },
    Remove {
        slot: String,
    },
    AutoRemove,
    Confirm,
    Abort,
    Reload {
        clear: bool,
    },
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command \"{0}\", type help for a list of commands")]
    Unknown(String),

    #[error("Missing argument <{0}>")]
    MissingArgument(&'static str),

    #[error("Invalid slot count \"{0}\"")]
    InvalidCount(String),

    #[error("Unexpected argument \"{0}\"")]
    Unexpected(String),
}

impl Command {
    /// Parse one console line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let mut words = line.split_whitespace().peekable();
        if words.peek().is_some_and(|w| PREFIXES.contains(w)) {
            words.next();
        }
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "help" => no_args(Command::Help, &args)?,
            "gen" | "generate" => parse_generate(&args)?,
            "load" => Command::Load {
                slot: slot_arg(&args)?,
            },
            "next" => no_args(Command::Next, &args)?,
            "list" => no_args(Command::List, &args)?,
            "info" => Command::Info {
                slot: slot_arg(&args)?,
            },
            "remove" | "del" => Command::Remove {
                slot: slot_arg(&args)?,
            },
            "autoremove" => no_args(Command::AutoRemove, &args)?,
            "confirm" => no_args(Command::Confirm, &args)?,
            "abort" => no_args(Command::Abort, &args)?,
            "reload" => match args.as_slice() {
                [] => Command::Reload { clear: false },
                ["--clear"] => Command::Reload { clear: true },
                [other, ..] => return Err(ParseError::Unexpected(other.to_string())),
            },
            "status" => no_args(Command::Status, &args)?,
            "quit" | "exit" => no_args(Command::Quit, &args)?,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn no_args(command: Command, args: &[&str]) -> Result<Command, ParseError> {
    match args.first() {
        Some(extra) => Err(ParseError::Unexpected(extra.to_string())),
        None => Ok(command),
    }
}

/// Slot names may contain spaces, so every remaining word belongs to the name
fn slot_arg(args: &[&str]) -> Result<String, ParseError> {
    if args.is_empty() {
        return Err(ParseError::MissingArgument("slot"));
    }
    Ok(args.join(" "))
}

fn parse_generate(args: &[&str]) -> Result<Command, ParseError> {
    let (count, rest) = match args.split_first() {
        Some((first, rest)) if first.parse::<i64>().is_ok() => {
            let count = first
                .parse::<u32>()
                .map_err(|_| ParseError::InvalidCount(first.to_string()))?;
            (Some(count), rest)
        }
        _ => (None, args),
    };
    Ok(Command::Generate {
        count,
        comment: rest.join(" "),
    })
}

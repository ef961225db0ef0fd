//! Pre-generation Agent Library
//!
//! Keeps an archive of pre-generated world slots for a managed game server
//! and runs the maintenance sessions that fill, load and reclaim it.

pub mod config;
pub mod console;
pub mod countdown;
pub mod daemon;
pub mod fs;
pub mod host;
pub mod matcher;
pub mod session;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::{PregenError, Result};

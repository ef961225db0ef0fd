//! Utility modules for the pre-generation agent.

pub mod errors;
pub mod logger;

pub use errors::{PregenError, Result};

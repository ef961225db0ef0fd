//! Agent daemon: the serial event loop and signal handling.

pub mod runtime;
pub mod shutdown;

pub use runtime::{run, Agent};
pub use shutdown::ShutdownCoordinator;

//! Filesystem primitives shared by the slot store and the sessions.

pub mod ops;
pub mod walker;

pub use ops::{copy_path, copy_path_filtered, remove_path, IgnoreList};

//! Command implementations.

pub mod list;
pub mod simulate;
pub mod verify;

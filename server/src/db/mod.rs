//! Database module for PostgreSQL persistence.

mod checkpoints;
mod pool;

pub use checkpoints::*;
pub use pool::*;

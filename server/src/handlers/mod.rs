//! Request handlers.

mod entry;
mod jobs;

pub use entry::*;
pub use jobs::*;

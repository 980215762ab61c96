//! Background sync jobs.

mod registry;

pub use registry::{JobDeps, JobRegistry};

//! Configuration for block updates.

pub mod options;
pub use options::{Diagnostics, QueuePolicy, UpdateOptions, DEFAULT_CACHED_SHAPE_MAX};

//! gtmat: a distributed, 2D block-partitioned dense matrix over one-sided RMA.
//!
//! A logical `nrows x ncols` matrix is split into a grid of blocks, each owned
//! by one rank of a process group. Any rank can put or accumulate an arbitrary
//! rectangle; the crate splits it into per-owner pieces, frames each piece with
//! a transfer descriptor and issues one-sided writes against the owners'
//! memory windows, either immediately or deferred into a batch epoch.

pub mod parallel;

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod update;

// Re-exports for convenience
pub use crate::config::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::matrix::*;
pub use crate::parallel::{Comm, LocalGroup, LocalTransport, RmaTransport, TransportStats};
pub use crate::update::{BatchState, DescriptorPath, StridedView};

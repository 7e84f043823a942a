//! Block-update engine.
//!
//! - [`descriptor`]: strided views and the fixed-shape descriptor cache.
//! - [`updater`]: one remote write into a block owned by a single rank.
//! - [`router`]: decomposition of an arbitrary rectangle into per-owner pieces.
//! - [`batch`]: per-destination request queues and the batch epoch controller.

pub mod batch;
pub mod descriptor;
pub mod router;
pub mod updater;

pub use batch::{BatchController, BatchState, RequestEntry, RequestQueue};
pub use descriptor::{Desc, DescriptorCache, DescriptorKind, DescriptorPair, DescriptorPath, StridedView};
pub use router::{check_source, in_bounds, route, SubBlock};
pub use updater::Updater;

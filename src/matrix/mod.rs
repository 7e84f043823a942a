//! Matrix module: block partition, the distributed matrix handle and dense views.

pub mod dense;
pub mod dist;
pub mod partition;

pub use dense::{gather_dense, local_block};
pub use dist::DistMatrix;
pub use partition::{PartitionMap, Rect};

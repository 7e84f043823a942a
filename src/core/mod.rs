//! Core element and operation types shared by every layer of gtmat.

pub mod traits;
pub use traits::{AccessMode, ElementType, Scalar, UpdateOp};

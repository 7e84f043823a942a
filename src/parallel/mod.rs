//! Process-group and one-sided transport capabilities.
//!
//! `Comm` is the process-group view (rank, size, barrier). `RmaTransport`
//! adds the one-sided operations the block-update engine issues against the
//! owners' memory windows.

use crate::core::{Scalar, UpdateOp};
use crate::error::TransportError;
use crate::update::StridedView;

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
}

/// One-sided remote memory access over a window exposed by every rank.
///
/// Writes are requests: they are only guaranteed complete once the access
/// epoch opened by `lock_shared` on the target is closed by `unlock`.
pub trait RmaTransport: Comm {
    /// Element type of the window.
    type Elem: Scalar;
    /// Committed transfer descriptor.
    type Descriptor;

    /// Commit a descriptor for `view`.
    fn build_descriptor(&mut self, view: StridedView) -> Result<Self::Descriptor, TransportError>;
    /// Release a descriptor built by `build_descriptor`.
    fn free_descriptor(&mut self, desc: Self::Descriptor);

    /// Open a shared-mode access epoch on `target`'s window.
    fn lock_shared(&mut self, target: usize) -> Result<(), TransportError>;
    /// Close the epoch on `target`, completing every write issued inside it.
    fn unlock(&mut self, target: usize) -> Result<(), TransportError>;

    /// Issue one accumulate-or-replace of `src` (laid out by `src_desc`) into
    /// `target`'s window at `target_offset` (laid out by `dst_desc`).
    fn remote_write(
        &mut self,
        src: &[Self::Elem],
        src_desc: &Self::Descriptor,
        target: usize,
        target_offset: usize,
        dst_desc: &Self::Descriptor,
        op: UpdateOp,
    ) -> Result<(), TransportError>;
}

pub mod local;
pub use local::{LocalGroup, LocalTransport, TransportStats};

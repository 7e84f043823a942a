//! In-process RMA transport.
//!
//! `LocalGroup` simulates a process group inside one address space: every
//! rank's memory window is a mutex-guarded buffer, and `LocalGroup::run`
//! executes one closure per rank on its own thread with a `LocalTransport`
//! bound to that rank. Remote writes are packed when issued and applied to
//! the target window, in issue order, when the access epoch on that target is
//! closed. Applying a whole write under the window mutex makes `Accumulate`
//! atomic per element across concurrent origins.

use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};
use std::thread;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::core::{Scalar, UpdateOp};
use crate::error::TransportError;
use crate::matrix::PartitionMap;
use crate::update::StridedView;

use super::{Comm, RmaTransport};

struct Shared<T> {
    windows: Vec<Mutex<Vec<T>>>,
    window_lens: Vec<usize>,
    barrier: Barrier,
}

/// A process group whose windows live in this process.
pub struct LocalGroup<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for LocalGroup<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T: Scalar> LocalGroup<T> {
    /// One zero-initialized window per entry of `window_lens`.
    pub fn new(window_lens: &[usize]) -> Self {
        let windows = window_lens.iter().map(|&n| Mutex::new(vec![T::zero(); n])).collect();
        Self {
            shared: Arc::new(Shared {
                windows,
                window_lens: window_lens.to_vec(),
                barrier: Barrier::new(window_lens.len().max(1)),
            }),
        }
    }

    /// One window per block of `partition`, sized for that block's local buffer.
    pub fn for_partition(partition: &PartitionMap) -> Self {
        let lens: Vec<usize> = (0..partition.num_blocks()).map(|r| partition.local_len(r)).collect();
        Self::new(&lens)
    }

    pub fn size(&self) -> usize {
        self.shared.windows.len()
    }

    /// Transport bound to `rank`.
    ///
    /// `barrier` on the returned transport only returns once every rank of the
    /// group has reached it, so it must be used from [`run`](Self::run).
    ///
    /// # Panics
    /// Panics if `rank` is not below [`size`](Self::size). Ranks passed to the
    /// returned transport's operations are checked and reported as
    /// `TransportError::RankOutOfRange` instead.
    pub fn transport(&self, rank: usize) -> LocalTransport<T> {
        assert!(rank < self.size(), "rank {rank} out of range for a group of {}", self.size());
        LocalTransport {
            rank,
            shared: Arc::clone(&self.shared),
            epochs: (0..self.size()).map(|_| None).collect(),
            next_descriptor: 0,
            stats: TransportStats::default(),
        }
    }

    fn lock_window(&self, rank: usize) -> MutexGuard<'_, Vec<T>> {
        self.shared.windows[rank].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of `rank`'s window.
    pub fn window(&self, rank: usize) -> Vec<T> {
        self.lock_window(rank).clone()
    }

    /// Mutate `rank`'s window in place, as its owner would.
    pub fn with_window_mut<R>(&self, rank: usize, f: impl FnOnce(&mut [T]) -> R) -> R {
        f(&mut self.lock_window(rank))
    }

    /// Set every element of `rank`'s window to `value`.
    pub fn fill_window(&self, rank: usize, value: T) {
        self.with_window_mut(rank, |w| w.fill(value));
    }

    /// Run `f` once per rank, each on its own thread, and collect the results in rank order.
    pub fn run<R, F>(&self, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(LocalTransport<T>) -> R + Sync,
    {
        let f = &f;
        thread::scope(|s| {
            let handles: Vec<_> = (0..self.size())
                .map(|rank| {
                    let transport = self.transport(rank);
                    s.spawn(move || f(transport))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

/// Counters kept by a `LocalTransport`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub descriptors_built: usize,
    pub descriptors_freed: usize,
    pub locks: usize,
    pub unlocks: usize,
    pub writes: usize,
    pub elements_written: usize,
}

impl TransportStats {
    /// Descriptors built and not yet freed.
    pub fn live_descriptors(&self) -> usize {
        self.descriptors_built - self.descriptors_freed
    }
}

/// Descriptor committed by a `LocalTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDescriptor {
    id: u64,
    view: StridedView,
}

impl LocalDescriptor {
    /// Commit sequence number, unique per transport.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn view(&self) -> &StridedView {
        &self.view
    }
}

struct PendingWrite<T> {
    offset: usize,
    dst: StridedView,
    data: Vec<T>,
    op: UpdateOp,
}

/// One rank's endpoint into a `LocalGroup`.
pub struct LocalTransport<T> {
    rank: usize,
    shared: Arc<Shared<T>>,
    /// Writes issued inside the open epoch on each target.
    epochs: Vec<Option<Vec<PendingWrite<T>>>>,
    next_descriptor: u64,
    stats: TransportStats,
}

impl<T: Scalar> LocalTransport<T> {
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// True while an epoch on `target` is open.
    pub fn is_locked(&self, target: usize) -> bool {
        matches!(self.epochs.get(target), Some(Some(_)))
    }

    fn check_rank(&self, rank: usize) -> Result<(), TransportError> {
        if rank < self.epochs.len() {
            Ok(())
        } else {
            Err(TransportError::RankOutOfRange { rank, size: self.epochs.len() })
        }
    }
}

fn apply_rows_serial<T: Scalar>(span: &mut [T], dst: &StridedView, data: &[T], op: UpdateOp) {
    for (row, src) in span.chunks_mut(dst.ld).zip(data.chunks(dst.cols)) {
        row.iter_mut().zip(src).for_each(|(d, &s)| op.apply(d, s));
    }
}

#[cfg(feature = "rayon")]
fn apply_rows<T: Scalar>(window: &mut [T], write: &PendingWrite<T>) {
    let PendingWrite { offset, dst, data, op } = write;
    let span = &mut window[*offset..*offset + dst.extent()];
    if dst.rows >= 4 * num_cpus::get() {
        span.par_chunks_mut(dst.ld)
            .zip(data.par_chunks(dst.cols))
            .for_each(|(row, src)| {
                row.iter_mut().zip(src).for_each(|(d, &s)| op.apply(d, s));
            });
    } else {
        apply_rows_serial(span, dst, data, *op);
    }
}

#[cfg(not(feature = "rayon"))]
fn apply_rows<T: Scalar>(window: &mut [T], write: &PendingWrite<T>) {
    let PendingWrite { offset, dst, data, op } = write;
    apply_rows_serial(&mut window[*offset..*offset + dst.extent()], dst, data, *op);
}

impl<T: Scalar> Comm for LocalTransport<T> {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.epochs.len()
    }
    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}

impl<T: Scalar> RmaTransport for LocalTransport<T> {
    type Elem = T;
    type Descriptor = LocalDescriptor;

    fn build_descriptor(&mut self, view: StridedView) -> Result<LocalDescriptor, TransportError> {
        view.validate()?;
        self.next_descriptor += 1;
        self.stats.descriptors_built += 1;
        Ok(LocalDescriptor { id: self.next_descriptor, view })
    }

    fn free_descriptor(&mut self, _desc: LocalDescriptor) {
        self.stats.descriptors_freed += 1;
    }

    fn lock_shared(&mut self, target: usize) -> Result<(), TransportError> {
        self.check_rank(target)?;
        let epoch = &mut self.epochs[target];
        if epoch.is_some() {
            return Err(TransportError::AlreadyLocked(target));
        }
        *epoch = Some(Vec::new());
        self.stats.locks += 1;
        Ok(())
    }

    fn unlock(&mut self, target: usize) -> Result<(), TransportError> {
        self.check_rank(target)?;
        let pending = self.epochs[target].take().ok_or(TransportError::NotLocked(target))?;
        self.stats.unlocks += 1;
        if pending.is_empty() {
            return Ok(());
        }
        let mut window = self.shared.windows[target].lock().unwrap_or_else(PoisonError::into_inner);
        for write in &pending {
            apply_rows(&mut window, write);
        }
        Ok(())
    }

    fn remote_write(
        &mut self,
        src: &[T],
        src_desc: &LocalDescriptor,
        target: usize,
        target_offset: usize,
        dst_desc: &LocalDescriptor,
        op: UpdateOp,
    ) -> Result<(), TransportError> {
        self.check_rank(target)?;
        let (sv, dv) = (src_desc.view, dst_desc.view);
        if (sv.rows, sv.cols) != (dv.rows, dv.cols) {
            return Err(TransportError::ShapeMismatch {
                src_rows: sv.rows,
                src_cols: sv.cols,
                dst_rows: dv.rows,
                dst_cols: dv.cols,
            });
        }
        if src.len() < sv.extent() {
            return Err(TransportError::SourceOutOfBounds { needed: sv.extent(), len: src.len() });
        }
        let window_len = self.shared.window_lens[target];
        let end = target_offset + dv.extent();
        if end > window_len {
            return Err(TransportError::TargetOutOfBounds { rank: target, end, len: window_len });
        }
        let epoch = self.epochs[target].as_mut().ok_or(TransportError::NoEpoch(target))?;

        let mut data = Vec::with_capacity(sv.len());
        for start in sv.row_offsets() {
            data.extend_from_slice(&src[start..start + sv.cols]);
        }
        epoch.push(PendingWrite { offset: target_offset, dst: dv, data, op });
        self.stats.writes += 1;
        self.stats.elements_written += sv.len();
        Ok(())
    }
}

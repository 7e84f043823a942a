//! Distributed matrix handle.
//!
//! `DistMatrix` ties together the partition map, the descriptor cache, the
//! batch controller and an RMA transport, and exposes the block-update
//! surface:
//!
//! - `put_block` / `accumulate_block`: blocking; every owner touched gets its
//!   own shared-lock epoch and the writes are complete when the call returns.
//! - `add_put_block_request` / `add_accumulate_block_request`: queue the
//!   per-owner pieces for the next `execute_batch_update`.
//! - `start_batch_update` / `execute_batch_update` / `stop_batch_update`:
//!   batch epoch control.
//!
//! Rectangles that leave the matrix or have zero area are ignored. The
//! handle is not thread-safe; every mutating call takes `&mut self`.
//!
//! # Example
//! ```rust
//! use gtmat::{DistMatrix, LocalGroup, PartitionMap, UpdateOptions};
//!
//! let partition = PartitionMap::uniform(4, 4, 1, 1).unwrap();
//! let group = LocalGroup::<f64>::for_partition(&partition);
//! let mut mat = DistMatrix::new(group.transport(0), partition, UpdateOptions::default()).unwrap();
//! mat.put_block(1, 2, 1, 2, &[1.0, 2.0, 3.0, 4.0], 2).unwrap();
//! assert_eq!(group.window(0)[5], 1.0);
//! ```

use crate::config::{Diagnostics, QueuePolicy, UpdateOptions};
use crate::core::{AccessMode, ElementType, Scalar, UpdateOp};
use crate::error::GtmError;
use crate::matrix::{PartitionMap, Rect};
use crate::parallel::RmaTransport;
use crate::update::{
    check_source, in_bounds, route, BatchController, BatchState, DescriptorCache, RequestEntry, Updater,
};

/// Handle to a block-partitioned matrix, held by one rank of the group.
///
/// `'b` is the lifetime of caller buffers referenced by queued batch requests.
pub struct DistMatrix<'b, X: RmaTransport> {
    partition: PartitionMap,
    options: UpdateOptions,
    cache: DescriptorCache<X::Descriptor>,
    batch: BatchController<'b, X::Elem>,
    transport: X,
}

impl<'b, X: RmaTransport> DistMatrix<'b, X> {
    /// Create the handle for the calling rank.
    ///
    /// The group must have exactly one rank per block of `partition`. Cached
    /// descriptors are committed through `transport` here.
    pub fn new(mut transport: X, partition: PartitionMap, options: UpdateOptions) -> Result<Self, GtmError> {
        options.validate()?;
        if transport.size() != partition.num_blocks() {
            return Err(GtmError::GroupSizeMismatch {
                expected: partition.num_blocks(),
                actual: transport.size(),
            });
        }
        let cache = DescriptorCache::build(
            &mut transport,
            options.cached_shape_max,
            partition.ld_local(),
            Self::element_type().size(),
        )?;
        let batch = BatchController::new(transport.size());
        Ok(Self { partition, options, cache, batch, transport })
    }

    /// Release the cached descriptors and hand the transport back.
    pub fn free(mut self) -> X {
        self.cache.release(&mut self.transport);
        self.transport
    }

    pub fn partition(&self) -> &PartitionMap {
        &self.partition
    }

    pub fn options(&self) -> &UpdateOptions {
        &self.options
    }

    /// Datatype tag of the elements.
    pub fn element_type() -> ElementType {
        <X::Elem as Scalar>::ELEMENT_TYPE
    }

    pub fn rank(&self) -> usize {
        self.transport.rank()
    }

    pub fn size(&self) -> usize {
        self.transport.size()
    }

    pub fn transport(&self) -> &X {
        &self.transport
    }

    pub fn batch_state(&self) -> BatchState {
        self.batch.state()
    }

    /// Number of requests queued for `dest`.
    pub fn queued(&self, dest: usize) -> usize {
        self.batch.queue(dest).len()
    }

    /// Group-wide barrier; the only way to order updates across ranks.
    pub fn sync(&self) {
        self.transport.barrier();
    }

    fn updater(&mut self) -> (Updater<'_, X>, &mut BatchController<'b, X::Elem>) {
        let updater = Updater {
            transport: &mut self.transport,
            partition: &self.partition,
            cache: &self.cache,
            diagnostics: self.options.diagnostics,
        };
        (updater, &mut self.batch)
    }

    /// Validate `rect` and `src`; `Ok(false)` means the request is ignored.
    fn accept(&self, op: UpdateOp, rect: &Rect, src: &[X::Elem], src_ld: usize) -> Result<bool, GtmError> {
        if !in_bounds(&self.partition, rect) {
            if self.options.diagnostics.contains(Diagnostics::REPORT_INVALID_RANGE) {
                tracing::warn!(
                    rank = self.rank(),
                    ?op,
                    ?rect,
                    nrows = self.partition.nrows(),
                    ncols = self.partition.ncols(),
                    "ignoring block update outside the matrix or with zero area"
                );
            }
            return Ok(false);
        }
        check_source(rect, src, src_ld)?;
        Ok(true)
    }

    fn update_blocking(&mut self, op: UpdateOp, rect: Rect, src: &[X::Elem], src_ld: usize) -> Result<(), GtmError> {
        if !self.accept(op, &rect, src, src_ld)? {
            return Ok(());
        }
        let (mut updater, _) = self.updater();
        for piece in route(updater.partition, rect, src_ld) {
            updater.transport.lock_shared(piece.dest)?;
            let result = updater.update_to_owner(piece.dest, op, piece.rect, &src[piece.src_offset..], src_ld);
            let unlocked = updater.transport.unlock(piece.dest);
            result?;
            unlocked?;
        }
        Ok(())
    }

    fn update_batch(&mut self, op: UpdateOp, rect: Rect, src: &'b [X::Elem], src_ld: usize) -> Result<(), GtmError> {
        if !self.batch.is_open() {
            match self.options.queue_policy {
                QueuePolicy::Strict => return Err(GtmError::BatchNotOpen),
                QueuePolicy::Permissive => {
                    if self.options.diagnostics.contains(Diagnostics::REPORT_QUEUE_OUTSIDE) {
                        tracing::warn!(rank = self.rank(), ?op, ?rect, "queueing block update outside a batch epoch");
                    }
                }
            }
        }
        if !self.accept(op, &rect, src, src_ld)? {
            return Ok(());
        }
        for piece in route(&self.partition, rect, src_ld) {
            self.batch.enqueue(
                piece.dest,
                RequestEntry { op, rect: piece.rect, src: &src[piece.src_offset..], src_ld },
            );
        }
        Ok(())
    }

    /// Route `rect`, read from `src` with row stride `src_ld`, to its owners.
    pub fn update_block(
        &mut self,
        op: UpdateOp,
        rect: Rect,
        src: &'b [X::Elem],
        src_ld: usize,
        mode: AccessMode,
    ) -> Result<(), GtmError> {
        match mode {
            AccessMode::Blocking => self.update_blocking(op, rect, src, src_ld),
            AccessMode::Batch => self.update_batch(op, rect, src, src_ld),
        }
    }

    /// Overwrite a block; complete on return.
    pub fn put_block(
        &mut self,
        row_start: usize,
        row_count: usize,
        col_start: usize,
        col_count: usize,
        src: &[X::Elem],
        src_ld: usize,
    ) -> Result<(), GtmError> {
        let rect = Rect::new(row_start, row_count, col_start, col_count);
        self.update_blocking(UpdateOp::Replace, rect, src, src_ld)
    }

    /// Add a block element-wise; complete on return.
    pub fn accumulate_block(
        &mut self,
        row_start: usize,
        row_count: usize,
        col_start: usize,
        col_count: usize,
        src: &[X::Elem],
        src_ld: usize,
    ) -> Result<(), GtmError> {
        let rect = Rect::new(row_start, row_count, col_start, col_count);
        self.update_blocking(UpdateOp::Accumulate, rect, src, src_ld)
    }

    /// Queue an overwrite of a block for the next batch drain.
    pub fn add_put_block_request(
        &mut self,
        row_start: usize,
        row_count: usize,
        col_start: usize,
        col_count: usize,
        src: &'b [X::Elem],
        src_ld: usize,
    ) -> Result<(), GtmError> {
        let rect = Rect::new(row_start, row_count, col_start, col_count);
        self.update_batch(UpdateOp::Replace, rect, src, src_ld)
    }

    /// Queue an element-wise add of a block for the next batch drain.
    pub fn add_accumulate_block_request(
        &mut self,
        row_start: usize,
        row_count: usize,
        col_start: usize,
        col_count: usize,
        src: &'b [X::Elem],
        src_ld: usize,
    ) -> Result<(), GtmError> {
        let rect = Rect::new(row_start, row_count, col_start, col_count);
        self.update_batch(UpdateOp::Accumulate, rect, src, src_ld)
    }

    /// Open a batch epoch; no-op if one is open.
    pub fn start_batch_update(&mut self) {
        if self.batch.start() {
            tracing::debug!(rank = self.rank(), "batch update epoch started");
        }
    }

    /// Drain every queue; no-op if no epoch is open. The epoch stays open.
    pub fn execute_batch_update(&mut self) -> Result<(), GtmError> {
        let pending = self.batch.pending();
        let rank = self.rank();
        let (mut updater, batch) = self.updater();
        if batch.execute(&mut updater)? {
            tracing::debug!(rank, pending, "batch update executed");
        }
        Ok(())
    }

    /// Close the batch epoch; no-op if none is open. Queued requests are kept
    /// until the next `start_batch_update`.
    pub fn stop_batch_update(&mut self) {
        if self.batch.stop() {
            tracing::debug!(rank = self.rank(), "batch update epoch stopped");
        }
    }
}

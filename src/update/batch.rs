//! Deferred block updates.
//!
//! Batch-mode updates are queued per destination rank and replayed by
//! [`BatchController::execute`], one shared-lock epoch per destination.
//! Queued entries borrow the caller's buffer for `'b`, so the buffer cannot be
//! freed or modified while the request may still be replayed.

use crate::core::UpdateOp;
use crate::error::GtmError;
use crate::matrix::Rect;
use crate::parallel::RmaTransport;

use super::updater::Updater;

/// One queued sub-block update.
#[derive(Debug, Clone, Copy)]
pub struct RequestEntry<'b, T> {
    pub op: UpdateOp,
    pub rect: Rect,
    /// Caller's buffer, starting at the sub-block's first cell.
    pub src: &'b [T],
    pub src_ld: usize,
}

/// Ordered requests for one destination.
#[derive(Debug)]
pub struct RequestQueue<'b, T> {
    entries: Vec<RequestEntry<'b, T>>,
}

impl<T> Default for RequestQueue<'_, T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<'b, T> RequestQueue<'b, T> {
    pub fn push(&mut self, entry: RequestEntry<'b, T>) {
        self.entries.push(entry);
    }

    /// Drop every entry, keeping the allocation.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestEntry<'b, T>> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchState {
    #[default]
    Idle,
    Open,
}

/// Batch epoch state machine and the per-destination queues it gates.
#[derive(Debug)]
pub struct BatchController<'b, T> {
    state: BatchState,
    queues: Vec<RequestQueue<'b, T>>,
}

/// Destinations in drain order: `self_rank` first, wrapping around the group.
pub fn drain_order(self_rank: usize, size: usize) -> impl Iterator<Item = usize> {
    (self_rank..self_rank + size).map(move |r| r % size)
}

impl<'b, T> BatchController<'b, T> {
    /// Idle controller with one empty queue per destination.
    pub fn new(destinations: usize) -> Self {
        Self {
            state: BatchState::Idle,
            queues: (0..destinations).map(|_| RequestQueue::default()).collect(),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == BatchState::Open
    }

    pub fn queue(&self, dest: usize) -> &RequestQueue<'b, T> {
        &self.queues[dest]
    }

    /// Total number of queued entries.
    pub fn pending(&self) -> usize {
        self.queues.iter().map(RequestQueue::len).sum()
    }

    /// Open an epoch, discarding anything queued since the last one.
    /// Returns false if an epoch was already open.
    pub fn start(&mut self) -> bool {
        if self.is_open() {
            return false;
        }
        self.queues.iter_mut().for_each(RequestQueue::reset);
        self.state = BatchState::Open;
        true
    }

    /// Close the epoch without touching the queues.
    /// Returns false if no epoch was open.
    pub fn stop(&mut self) -> bool {
        if !self.is_open() {
            return false;
        }
        self.state = BatchState::Idle;
        true
    }

    pub fn enqueue(&mut self, dest: usize, entry: RequestEntry<'b, T>) {
        self.queues[dest].push(entry);
    }

    /// Replay every queued entry if an epoch is open. Returns false, without
    /// touching the transport, if none is.
    ///
    /// Destinations are drained in [`drain_order`] starting from the transport's
    /// own rank; each non-empty queue is replayed in enqueue order inside one
    /// shared-lock epoch, then reset. On a transport error the epoch on the
    /// failing destination is closed on a best-effort basis, which completes
    /// the entries already issued, and those entries are removed from the
    /// queue. The failing entry, the rest of its queue and every later queue
    /// are kept, so a retry replays each entry at most once.
    pub fn execute<X>(&mut self, updater: &mut Updater<'_, X>) -> Result<bool, GtmError>
    where
        X: RmaTransport<Elem = T>,
    {
        if !self.is_open() {
            return Ok(false);
        }
        let size = self.queues.len();
        for dest in drain_order(updater.transport.rank(), size) {
            let queue = &mut self.queues[dest];
            if !queue.is_empty() {
                tracing::debug!(dest, requests = queue.len(), "draining batch queue");
                updater.transport.lock_shared(dest)?;
                let failed = queue.entries.iter().enumerate().find_map(|(issued, entry)| {
                    updater
                        .update_to_owner(dest, entry.op, entry.rect, entry.src, entry.src_ld)
                        .err()
                        .map(|e| (issued, e))
                });
                if let Some((issued, e)) = failed {
                    let _ = updater.transport.unlock(dest);
                    queue.entries.drain(..issued);
                    tracing::debug!(dest, issued, kept = queue.len(), "batch drain failed");
                    return Err(e.into());
                }
                updater.transport.unlock(dest)?;
            }
            queue.reset();
        }
        Ok(true)
    }
}

//! Single-destination block update.

use crate::config::Diagnostics;
use crate::core::UpdateOp;
use crate::error::TransportError;
use crate::matrix::{PartitionMap, Rect};
use crate::parallel::RmaTransport;

use super::descriptor::{DescriptorCache, DescriptorPath};

/// Issues remote writes into blocks wholly owned by one rank.
///
/// Borrows the pieces of a matrix handle it needs, so the router and the
/// batch drain can share one code path.
pub struct Updater<'a, X: RmaTransport> {
    pub transport: &'a mut X,
    pub partition: &'a PartitionMap,
    pub cache: &'a DescriptorCache<X::Descriptor>,
    pub diagnostics: Diagnostics,
}

impl<X: RmaTransport> Updater<'_, X> {
    /// Write `rect` from `src` (row stride `src_ld`) into `dest`'s window.
    ///
    /// Returns `Ok(None)` without touching the transport when `rect` is empty
    /// or not entirely inside `dest`'s region. The write is only complete once
    /// the caller closes the epoch on `dest`.
    pub fn update_to_owner(
        &mut self,
        dest: usize,
        op: UpdateOp,
        rect: Rect,
        src: &[X::Elem],
        src_ld: usize,
    ) -> Result<Option<DescriptorPath>, TransportError> {
        if dest >= self.partition.num_blocks() || rect.is_empty() {
            return Ok(None);
        }
        let region = self.partition.region_of_rank(dest);
        if !region.contains(&rect) {
            return Ok(None);
        }

        let offset = self.partition.local_offset(dest, rect.row_start, rect.col_start);
        let cache = self.cache;
        let pair = cache.select(self.transport, rect.row_count, rect.col_count, src_ld)?;
        if self.diagnostics.contains(Diagnostics::TRACE_DESCRIPTORS) {
            tracing::trace!(
                dest,
                ?op,
                rows = rect.row_count,
                cols = rect.col_count,
                src_ld,
                offset,
                path = ?pair.path,
                "remote block write"
            );
        }
        let path = pair.path;
        let result = self
            .transport
            .remote_write(src, pair.src.get(), dest, offset, pair.dst.get(), op);
        pair.release(self.transport);
        result.map(|()| Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{LocalGroup, LocalTransport};

    fn setup(max: usize) -> (PartitionMap, LocalGroup<f64>, LocalTransport<f64>, DescriptorCache<crate::parallel::local::LocalDescriptor>) {
        let p = PartitionMap::new(10, 10, vec![0, 1, 4, 6, 10], vec![0, 2, 5, 7, 10]).unwrap();
        let group = LocalGroup::for_partition(&p);
        let mut t = group.transport(0);
        let cache = DescriptorCache::build(&mut t, max, p.ld_local(), 8).unwrap();
        (p, group, t, cache)
    }

    #[test]
    fn writes_at_local_offset() {
        let (p, group, mut t, cache) = setup(2);
        let mut up = Updater { transport: &mut t, partition: &p, cache: &cache, diagnostics: Diagnostics::empty() };
        // rank 15 owns rows 6..10, cols 7..10
        up.transport.lock_shared(15).unwrap();
        let path = up
            .update_to_owner(15, UpdateOp::Replace, Rect::new(7, 2, 8, 2), &[1.0, 2.0, 3.0, 4.0], 2)
            .unwrap();
        up.transport.unlock(15).unwrap();
        assert_eq!(path, Some(DescriptorPath::CachedNoStride));
        let w = group.window(15);
        assert_eq!(&w[3..6], &[0.0, 1.0, 2.0]);
        assert_eq!(&w[6..9], &[0.0, 3.0, 4.0]);
    }

    #[test]
    fn outside_region_is_a_no_op() {
        let (p, _group, mut t, cache) = setup(2);
        let mut up = Updater { transport: &mut t, partition: &p, cache: &cache, diagnostics: Diagnostics::empty() };
        let src = [1.0; 16];
        // spans ranks 14 and 15
        assert_eq!(up.update_to_owner(15, UpdateOp::Accumulate, Rect::new(6, 1, 6, 2), &src, 2), Ok(None));
        assert_eq!(up.update_to_owner(15, UpdateOp::Accumulate, Rect::new(6, 0, 7, 2), &src, 2), Ok(None));
        assert_eq!(up.update_to_owner(99, UpdateOp::Accumulate, Rect::new(6, 1, 7, 1), &src, 1), Ok(None));
        assert_eq!(t.stats().writes, 0);
    }

    #[test]
    fn descriptor_selection_paths() {
        let (p, _group, mut t, cache) = setup(2);
        let built = t.stats().descriptors_built;
        let mut up = Updater { transport: &mut t, partition: &p, cache: &cache, diagnostics: Diagnostics::ALL };
        let src = [1.0; 64];
        up.transport.lock_shared(15).unwrap();
        let r = Rect::new(6, 2, 7, 2);
        assert_eq!(up.update_to_owner(15, UpdateOp::Accumulate, r, &src, 2), Ok(Some(DescriptorPath::CachedNoStride)));
        assert_eq!(up.update_to_owner(15, UpdateOp::Accumulate, r, &src, 3), Ok(Some(DescriptorPath::CachedShared)));
        assert_eq!(up.update_to_owner(15, UpdateOp::Accumulate, r, &src, 5), Ok(Some(DescriptorPath::EphemeralSource)));
        let big = Rect::new(6, 3, 7, 3);
        assert_eq!(up.update_to_owner(15, UpdateOp::Accumulate, big, &src, 3), Ok(Some(DescriptorPath::Ephemeral)));
        up.transport.unlock(15).unwrap();
        // one ephemeral source, then an ephemeral pair; all released
        assert_eq!(t.stats().descriptors_built - built, 3);
        assert_eq!(t.stats().live_descriptors(), cache.len());
    }
}

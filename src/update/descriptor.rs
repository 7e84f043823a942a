//! Transfer descriptors and the fixed-shape descriptor cache.
//!
//! A [`StridedView`] describes how a `rows x cols` block of elements sits in a
//! buffer with row stride `ld`. Transports commit views into their own
//! descriptor type; committing is not free, so the [`DescriptorCache`] commits
//! every small shape once, up front, and only shapes the cache cannot serve
//! get an ephemeral descriptor for the duration of one remote write.

use crate::error::TransportError;
use crate::parallel::RmaTransport;

/// Layout of a strided view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Rows follow each other without gaps: one flat run.
    Contiguous,
    /// Rows are separated by `ld - cols` elements.
    Strided,
}

/// A `rows x cols` block inside a buffer whose rows are `ld` elements apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StridedView {
    pub rows: usize,
    pub cols: usize,
    pub ld: usize,
    pub elem_size: usize,
}

impl StridedView {
    pub fn new(rows: usize, cols: usize, ld: usize, elem_size: usize) -> Self {
        Self { rows, cols, ld, elem_size }
    }

    pub fn kind(&self) -> DescriptorKind {
        if self.ld == self.cols || self.rows <= 1 {
            DescriptorKind::Contiguous
        } else {
            DescriptorKind::Strided
        }
    }

    /// Number of elements moved.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements spanned from the first to the last element, inclusive.
    #[inline]
    pub fn extent(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.rows - 1) * self.ld + self.cols
        }
    }

    /// Bytes moved.
    #[inline]
    pub fn bytes(&self) -> usize {
        self.len() * self.elem_size
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.is_empty() {
            return Err(TransportError::InvalidDescriptor(format!(
                "empty view {}x{}",
                self.rows, self.cols
            )));
        }
        if self.ld < self.cols {
            return Err(TransportError::InvalidDescriptor(format!(
                "leading dimension {} smaller than column count {}",
                self.ld, self.cols
            )));
        }
        Ok(())
    }

    /// Element offsets of the start of each row.
    pub fn row_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.rows).map(move |r| r * self.ld)
    }
}

/// Which descriptors a remote write was framed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorPath {
    /// Cached no-stride source, cached strided destination.
    CachedNoStride,
    /// Cached strided destination used for the source as well.
    CachedShared,
    /// Ephemeral source matching the caller's stride, cached destination.
    EphemeralSource,
    /// Shape above the cache ceiling: ephemeral source and destination.
    Ephemeral,
}

/// A descriptor either borrowed from the cache or built for one call.
#[derive(Debug)]
pub enum Desc<'a, D> {
    Cached(&'a D),
    Owned(D),
}

impl<D> Desc<'_, D> {
    pub fn get(&self) -> &D {
        match self {
            Desc::Cached(d) => *d,
            Desc::Owned(d) => d,
        }
    }

    fn release<X: RmaTransport<Descriptor = D>>(self, transport: &mut X) {
        if let Desc::Owned(d) = self {
            transport.free_descriptor(d);
        }
    }
}

/// Source and destination descriptors selected for one remote write.
#[derive(Debug)]
pub struct DescriptorPair<'a, D> {
    pub path: DescriptorPath,
    pub src: Desc<'a, D>,
    pub dst: Desc<'a, D>,
}

impl<D> DescriptorPair<'_, D> {
    /// Free the ephemeral halves of the pair.
    pub fn release<X: RmaTransport<Descriptor = D>>(self, transport: &mut X) {
        self.src.release(transport);
        self.dst.release(transport);
    }
}

/// Descriptors committed once for every shape up to `max_dim x max_dim`.
#[derive(Debug)]
pub struct DescriptorCache<D> {
    max_dim: usize,
    ld_local: usize,
    elem_size: usize,
    /// `(r, c, ld_local)` destination layouts, `None` where `c > ld_local`.
    strided: Vec<Option<D>>,
    /// `(r, c, c)` source layouts.
    nostride: Vec<D>,
}

impl<D> DescriptorCache<D> {
    /// Commit both variants of every cached shape through `transport`.
    pub fn build<X>(
        transport: &mut X,
        max_dim: usize,
        ld_local: usize,
        elem_size: usize,
    ) -> Result<Self, TransportError>
    where
        X: RmaTransport<Descriptor = D>,
    {
        let mut cache = Self {
            max_dim,
            ld_local,
            elem_size,
            strided: Vec::with_capacity(max_dim * max_dim),
            nostride: Vec::with_capacity(max_dim * max_dim),
        };
        for rows in 1..=max_dim {
            for cols in 1..=max_dim {
                // A block wider than the local stride never fits in one owner.
                let strided = if cols <= ld_local {
                    match transport.build_descriptor(StridedView::new(rows, cols, ld_local, elem_size)) {
                        Ok(d) => Some(d),
                        Err(e) => {
                            cache.release(transport);
                            return Err(e);
                        }
                    }
                } else {
                    None
                };
                match transport.build_descriptor(StridedView::new(rows, cols, cols, elem_size)) {
                    Ok(n) => {
                        cache.strided.push(strided);
                        cache.nostride.push(n);
                    }
                    Err(e) => {
                        if let Some(d) = strided {
                            transport.free_descriptor(d);
                        }
                        cache.release(transport);
                        return Err(e);
                    }
                }
            }
        }
        Ok(cache)
    }

    #[inline]
    pub fn max_dim(&self) -> usize {
        self.max_dim
    }

    /// Number of committed descriptors held.
    pub fn len(&self) -> usize {
        self.strided.iter().flatten().count() + self.nostride.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn index(&self, rows: usize, cols: usize) -> Option<usize> {
        let fits = (1..=self.max_dim).contains(&rows) && (1..=self.max_dim).contains(&cols);
        fits.then(|| (rows - 1) * self.max_dim + (cols - 1))
    }

    /// Cached destination descriptor for a `rows x cols` block.
    pub fn strided(&self, rows: usize, cols: usize) -> Option<&D> {
        self.index(rows, cols).and_then(|i| self.strided.get(i)?.as_ref())
    }

    /// Cached gap-free source descriptor for a `rows x cols` block.
    pub fn nostride(&self, rows: usize, cols: usize) -> Option<&D> {
        self.index(rows, cols).and_then(|i| self.nostride.get(i))
    }

    /// Pick the descriptors framing a `rows x cols` write from a source with
    /// row stride `src_ld`.
    pub fn select<X>(
        &self,
        transport: &mut X,
        rows: usize,
        cols: usize,
        src_ld: usize,
    ) -> Result<DescriptorPair<'_, D>, TransportError>
    where
        X: RmaTransport<Descriptor = D>,
    {
        if let (Some(dst), Some(ns)) = (self.strided(rows, cols), self.nostride(rows, cols)) {
            if src_ld == cols {
                return Ok(DescriptorPair {
                    path: DescriptorPath::CachedNoStride,
                    src: Desc::Cached(ns),
                    dst: Desc::Cached(dst),
                });
            }
            if src_ld == self.ld_local {
                return Ok(DescriptorPair {
                    path: DescriptorPath::CachedShared,
                    src: Desc::Cached(dst),
                    dst: Desc::Cached(dst),
                });
            }
            let src = transport.build_descriptor(StridedView::new(rows, cols, src_ld, self.elem_size))?;
            return Ok(DescriptorPair {
                path: DescriptorPath::EphemeralSource,
                src: Desc::Owned(src),
                dst: Desc::Cached(dst),
            });
        }

        let dst = transport.build_descriptor(StridedView::new(rows, cols, self.ld_local, self.elem_size))?;
        let src = match transport.build_descriptor(StridedView::new(rows, cols, src_ld, self.elem_size)) {
            Ok(src) => src,
            Err(e) => {
                transport.free_descriptor(dst);
                return Err(e);
            }
        };
        Ok(DescriptorPair {
            path: DescriptorPath::Ephemeral,
            src: Desc::Owned(src),
            dst: Desc::Owned(dst),
        })
    }

    /// Free every cached descriptor.
    pub fn release<X: RmaTransport<Descriptor = D>>(self, transport: &mut X) {
        for d in self.strided.into_iter().flatten().chain(self.nostride) {
            transport.free_descriptor(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::LocalGroup;

    #[test]
    fn view_kind_and_extent() {
        let v = StridedView::new(3, 4, 4, 8);
        assert_eq!(v.kind(), DescriptorKind::Contiguous);
        assert_eq!(v.extent(), 12);
        let v = StridedView::new(3, 4, 10, 8);
        assert_eq!(v.kind(), DescriptorKind::Strided);
        assert_eq!(v.extent(), 24);
        assert_eq!(v.bytes(), 96);
        assert_eq!(v.row_offsets().collect::<Vec<_>>(), vec![0, 10, 20]);
        assert_eq!(StridedView::new(1, 4, 10, 8).kind(), DescriptorKind::Contiguous);
        assert!(StridedView::new(2, 4, 3, 8).validate().is_err());
    }

    #[test]
    fn cache_covers_shapes_up_to_the_ceiling() {
        let group = LocalGroup::<f64>::new(&[64]);
        let mut t = group.transport(0);
        let cache = DescriptorCache::build(&mut t, 4, 3, 8).unwrap();
        // strided only where cols <= ld_local
        assert_eq!(cache.len(), 4 * 3 + 4 * 4);
        assert_eq!(t.stats().descriptors_built, cache.len());
        assert_eq!(cache.strided(2, 3).map(|d| *d.view()), Some(StridedView::new(2, 3, 3, 8)));
        assert_eq!(cache.nostride(4, 2).map(|d| *d.view()), Some(StridedView::new(4, 2, 2, 8)));
        assert!(cache.strided(2, 4).is_none());
        assert!(cache.strided(5, 1).is_none());
        assert!(cache.nostride(0, 1).is_none());
        cache.release(&mut t);
        assert_eq!(t.stats().live_descriptors(), 0);
    }

    #[test]
    fn selection_follows_source_stride() {
        let group = LocalGroup::<f64>::new(&[64]);
        let mut t = group.transport(0);
        let cache = DescriptorCache::build(&mut t, 4, 6, 8).unwrap();
        let live = t.stats().live_descriptors();

        let pair = cache.select(&mut t, 2, 3, 3).unwrap();
        assert_eq!(pair.path, DescriptorPath::CachedNoStride);
        assert_eq!(pair.src.get().view().ld, 3);
        assert_eq!(pair.dst.get().view().ld, 6);
        pair.release(&mut t);

        let pair = cache.select(&mut t, 2, 3, 6).unwrap();
        assert_eq!(pair.path, DescriptorPath::CachedShared);
        assert_eq!(pair.src.get(), pair.dst.get());
        pair.release(&mut t);

        let pair = cache.select(&mut t, 2, 3, 5).unwrap();
        assert_eq!(pair.path, DescriptorPath::EphemeralSource);
        assert_eq!(*pair.src.get().view(), StridedView::new(2, 3, 5, 8));
        assert_eq!(t.stats().live_descriptors(), live + 1);
        pair.release(&mut t);

        let pair = cache.select(&mut t, 5, 3, 3).unwrap();
        assert_eq!(pair.path, DescriptorPath::Ephemeral);
        assert_eq!(*pair.src.get().view(), StridedView::new(5, 3, 3, 8));
        assert_eq!(*pair.dst.get().view(), StridedView::new(5, 3, 6, 8));
        assert_eq!(t.stats().live_descriptors(), live + 2);
        pair.release(&mut t);

        assert_eq!(t.stats().live_descriptors(), live);
        cache.release(&mut t);
    }
}

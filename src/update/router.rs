//! Decomposition of a global rectangle into per-owner sub-blocks.

use crate::error::GtmError;
use crate::matrix::{PartitionMap, Rect};

/// The part of a requested rectangle owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubBlock {
    /// Owning rank.
    pub dest: usize,
    /// Cells written, in global coordinates.
    pub rect: Rect,
    /// Element offset of the sub-block's first cell in the caller's buffer.
    pub src_offset: usize,
}

/// True if `rect` is non-empty and inside the matrix.
///
/// Compares starts and counts separately so that corners past `usize::MAX`
/// are rejected rather than wrapped.
pub fn in_bounds(partition: &PartitionMap, rect: &Rect) -> bool {
    let fits = |start: usize, count: usize, dim: usize| start < dim && count <= dim - start;
    !rect.is_empty()
        && fits(rect.row_start, rect.row_count, partition.nrows())
        && fits(rect.col_start, rect.col_count, partition.ncols())
}

/// Check that `src` with row stride `src_ld` covers a block of `rect`'s shape.
pub fn check_source<T>(rect: &Rect, src: &[T], src_ld: usize) -> Result<(), GtmError> {
    let needed = rect
        .row_count
        .saturating_sub(1)
        .checked_mul(src_ld)
        .and_then(|n| n.checked_add(rect.col_count));
    match needed {
        Some(needed) if src_ld >= rect.col_count && src.len() >= needed => Ok(()),
        _ => Err(GtmError::InvalidSource {
            rows: rect.row_count,
            cols: rect.col_count,
            ld: src_ld,
            len: src.len(),
        }),
    }
}

/// Split `rect` (which must satisfy [`in_bounds`]) into one sub-block per owner.
///
/// Owners are visited row block by row block, column blocks inner. A
/// rectangle with a corner outside the matrix yields nothing.
///
/// # Panics
/// Panics if an owner in the range spanned by `rect`'s corners does not
/// intersect `rect`, which means the displacement tables are inconsistent.
pub fn route<'p>(
    partition: &'p PartitionMap,
    rect: Rect,
    src_ld: usize,
) -> impl Iterator<Item = SubBlock> + 'p {
    let corners = partition
        .locate(rect.row_start, rect.col_start)
        .zip(partition.locate(rect.row_end() - 1, rect.col_end() - 1));
    let ((rb0, cb0), (rb1, cb1)) = corners.unwrap_or(((1, 1), (0, 0)));

    (rb0..=rb1).flat_map(move |rb| {
        (cb0..=cb1).map(move |cb| {
            let dest = partition.owner_of(rb, cb);
            let Some(piece) = partition.region_of(rb, cb).intersect(&rect) else {
                panic!("block ({rb}, {cb}) of rank {dest} does not intersect {rect:?}: partition tables are inconsistent");
            };
            let row_dist = piece.row_start - rect.row_start;
            let col_dist = piece.col_start - rect.col_start;
            SubBlock { dest, rect: piece, src_offset: row_dist * src_ld + col_dist }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> PartitionMap {
        PartitionMap::new(10, 10, vec![0, 1, 4, 6, 10], vec![0, 2, 5, 7, 10]).unwrap()
    }

    #[test]
    fn single_owner() {
        let p = reference();
        let pieces: Vec<_> = route(&p, Rect::new(2, 2, 2, 3), 3).collect();
        assert_eq!(pieces, vec![SubBlock { dest: 5, rect: Rect::new(2, 2, 2, 3), src_offset: 0 }]);
    }

    #[test]
    fn straddles_four_owners() {
        let p = reference();
        let pieces: Vec<_> = route(&p, Rect::new(3, 2, 4, 2), 2).collect();
        assert_eq!(
            pieces,
            vec![
                SubBlock { dest: 5, rect: Rect::new(3, 1, 4, 1), src_offset: 0 },
                SubBlock { dest: 6, rect: Rect::new(3, 1, 5, 1), src_offset: 1 },
                SubBlock { dest: 9, rect: Rect::new(4, 1, 4, 1), src_offset: 2 },
                SubBlock { dest: 10, rect: Rect::new(4, 1, 5, 1), src_offset: 3 },
            ]
        );
    }

    #[test]
    fn whole_matrix_hits_every_rank_once() {
        let p = reference();
        let dests: Vec<usize> = route(&p, p.bounds(), 10).map(|s| s.dest).collect();
        assert_eq!(dests, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn bounds_and_source_checks() {
        let p = reference();
        assert!(in_bounds(&p, &Rect::new(0, 10, 0, 10)));
        assert!(!in_bounds(&p, &Rect::new(1, 10, 0, 10)));
        assert!(!in_bounds(&p, &Rect::new(0, 0, 0, 10)));
        let r = Rect::new(0, 3, 0, 4);
        assert!(check_source(&r, &[0.0; 12], 4).is_ok());
        assert!(check_source(&r, &[0.0; 14], 5).is_ok());
        assert!(check_source(&r, &[0.0; 13], 5).is_err());
        assert!(check_source(&r, &[0.0; 12], 3).is_err());
    }

    #[test]
    fn corners_past_usize_max_are_out_of_bounds() {
        let p = reference();
        assert!(!in_bounds(&p, &Rect::new(usize::MAX, 2, 0, 1)));
        assert!(!in_bounds(&p, &Rect::new(0, 1, usize::MAX, 2)));
        assert!(!in_bounds(&p, &Rect::new(9, usize::MAX, 0, 1)));
        assert!(!in_bounds(&p, &Rect::new(0, 1, 3, usize::MAX)));
        assert!(in_bounds(&p, &Rect::new(9, 1, 9, 1)));
    }

    #[test]
    fn huge_source_stride_is_rejected() {
        let r = Rect::new(0, 2, 0, 1);
        assert_eq!(
            check_source(&r, &[0.0; 4], usize::MAX),
            Err(GtmError::InvalidSource { rows: 2, cols: 1, ld: usize::MAX, len: 4 })
        );
        // a single row never multiplies by the stride
        assert!(check_source(&Rect::new(0, 1, 0, 1), &[0.0], usize::MAX).is_ok());
    }
}

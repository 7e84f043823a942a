//! 2D block partition of a distributed matrix.
//!
//! A `PartitionMap` splits an `nrows x ncols` matrix into `r_blocks x c_blocks`
//! blocks using two displacement tables. Block `(i, j)` covers rows
//! `r_displs[i]..r_displs[i + 1]` and columns `c_displs[j]..c_displs[j + 1]`
//! and is owned by rank `i * c_blocks + j`.

use crate::error::GtmError;

/// A rectangle of matrix cells in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub row_start: usize,
    pub row_count: usize,
    pub col_start: usize,
    pub col_count: usize,
}

impl Rect {
    pub fn new(row_start: usize, row_count: usize, col_start: usize, col_count: usize) -> Self {
        Self { row_start, row_count, col_start, col_count }
    }

    /// One past the last row.
    #[inline]
    pub fn row_end(&self) -> usize {
        self.row_start + self.row_count
    }

    /// One past the last column.
    #[inline]
    pub fn col_end(&self) -> usize {
        self.col_start + self.col_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.col_count == 0
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.row_count * self.col_count
    }

    /// True if `other` lies entirely inside `self`. An `other` whose far corner
    /// overflows `usize` is never contained.
    pub fn contains(&self, other: &Rect) -> bool {
        let row_end = other.row_start.checked_add(other.row_count);
        let col_end = other.col_start.checked_add(other.col_count);
        other.row_start >= self.row_start
            && other.col_start >= self.col_start
            && row_end.is_some_and(|e| e <= self.row_end())
            && col_end.is_some_and(|e| e <= self.col_end())
    }

    /// Overlap of two rectangles, `None` if they do not share a cell.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r0 = self.row_start.max(other.row_start);
        let r1 = self.row_end().min(other.row_end());
        let c0 = self.col_start.max(other.col_start);
        let c1 = self.col_end().min(other.col_end());
        if r0 < r1 && c0 < c1 {
            Some(Rect::new(r0, r1 - r0, c0, c1 - c0))
        } else {
            None
        }
    }
}

/// Immutable row/column block layout of a distributed matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    nrows: usize,
    ncols: usize,
    r_displs: Vec<usize>,
    c_displs: Vec<usize>,
    ld_local: usize,
}

fn check_displs(name: &str, displs: &[usize], dim: usize) -> Result<(), GtmError> {
    if displs.len() < 2 {
        return Err(GtmError::InvalidPartition(format!(
            "{name} displacement table needs at least 2 entries, got {}",
            displs.len()
        )));
    }
    if displs[0] != 0 {
        return Err(GtmError::InvalidPartition(format!(
            "{name} displacement table must start at 0, starts at {}",
            displs[0]
        )));
    }
    if displs[displs.len() - 1] != dim {
        return Err(GtmError::InvalidPartition(format!(
            "{name} displacement table must end at {dim}, ends at {}",
            displs[displs.len() - 1]
        )));
    }
    if let Some(i) = displs.windows(2).position(|w| w[0] >= w[1]) {
        return Err(GtmError::InvalidPartition(format!(
            "{name} displacement table not strictly increasing at index {i}: {} >= {}",
            displs[i],
            displs[i + 1]
        )));
    }
    Ok(())
}

impl PartitionMap {
    /// Build a partition from `blocks + 1` entry displacement tables.
    ///
    /// Both tables must start at 0, end at the matrix dimension and be strictly
    /// increasing. The local leading dimension is the widest column block, so
    /// every rank's buffer shares one row stride.
    pub fn new(
        nrows: usize,
        ncols: usize,
        r_displs: Vec<usize>,
        c_displs: Vec<usize>,
    ) -> Result<Self, GtmError> {
        check_displs("row", &r_displs, nrows)?;
        check_displs("column", &c_displs, ncols)?;
        let ld_local = c_displs.windows(2).map(|w| w[1] - w[0]).max().unwrap_or(0);
        Ok(Self { nrows, ncols, r_displs, c_displs, ld_local })
    }

    /// Even split of each axis; the first `dim % blocks` blocks get one extra line.
    pub fn uniform(
        nrows: usize,
        ncols: usize,
        r_blocks: usize,
        c_blocks: usize,
    ) -> Result<Self, GtmError> {
        fn displs(dim: usize, blocks: usize) -> Vec<usize> {
            let (base, rem) = (dim / blocks.max(1), dim % blocks.max(1));
            let mut out = Vec::with_capacity(blocks + 1);
            out.push(0);
            for i in 0..blocks {
                let last = out[i];
                out.push(last + base + usize::from(i < rem));
            }
            out
        }
        if r_blocks == 0 || c_blocks == 0 {
            return Err(GtmError::InvalidPartition("block counts must be positive".into()));
        }
        Self::new(nrows, ncols, displs(nrows, r_blocks), displs(ncols, c_blocks))
    }

    #[inline]
    pub fn nrows(&self) -> usize { self.nrows }
    #[inline]
    pub fn ncols(&self) -> usize { self.ncols }
    #[inline]
    pub fn r_blocks(&self) -> usize { self.r_displs.len() - 1 }
    #[inline]
    pub fn c_blocks(&self) -> usize { self.c_displs.len() - 1 }
    #[inline]
    pub fn r_displs(&self) -> &[usize] { &self.r_displs }
    #[inline]
    pub fn c_displs(&self) -> &[usize] { &self.c_displs }

    /// Row stride of every rank's local buffer.
    #[inline]
    pub fn ld_local(&self) -> usize { self.ld_local }

    /// Number of ranks the partition needs.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.r_blocks() * self.c_blocks()
    }

    /// The whole matrix as a rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, self.nrows, 0, self.ncols)
    }

    /// Rank owning block `(row_block, col_block)`.
    #[inline]
    pub fn owner_of(&self, row_block: usize, col_block: usize) -> usize {
        row_block * self.c_blocks() + col_block
    }

    /// Inverse of [`owner_of`](Self::owner_of).
    #[inline]
    pub fn block_of(&self, rank: usize) -> (usize, usize) {
        (rank / self.c_blocks(), rank % self.c_blocks())
    }

    fn find(displs: &[usize], x: usize) -> Option<usize> {
        (0..displs.len() - 1).find(|&i| displs[i] <= x && x < displs[i + 1])
    }

    /// Block containing global cell `(row, col)`, `None` outside the matrix.
    pub fn locate(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        Some((Self::find(&self.r_displs, row)?, Self::find(&self.c_displs, col)?))
    }

    /// Cells owned by block `(row_block, col_block)`.
    pub fn region_of(&self, row_block: usize, col_block: usize) -> Rect {
        let (r0, r1) = (self.r_displs[row_block], self.r_displs[row_block + 1]);
        let (c0, c1) = (self.c_displs[col_block], self.c_displs[col_block + 1]);
        Rect::new(r0, r1 - r0, c0, c1 - c0)
    }

    /// Cells owned by `rank`.
    pub fn region_of_rank(&self, rank: usize) -> Rect {
        let (rb, cb) = self.block_of(rank);
        self.region_of(rb, cb)
    }

    /// Length in elements of `rank`'s local buffer.
    pub fn local_len(&self, rank: usize) -> usize {
        self.region_of_rank(rank).row_count * self.ld_local
    }

    /// Offset inside the owner's local buffer of global cell `(row, col)`.
    pub fn local_offset(&self, rank: usize, row: usize, col: usize) -> usize {
        let region = self.region_of_rank(rank);
        (row - region.row_start) * self.ld_local + (col - region.col_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> PartitionMap {
        PartitionMap::new(10, 10, vec![0, 1, 4, 6, 10], vec![0, 2, 5, 7, 10]).unwrap()
    }

    #[test]
    fn locate_and_region() {
        let p = reference();
        assert_eq!(p.num_blocks(), 16);
        assert_eq!(p.ld_local(), 3);
        assert_eq!(p.locate(0, 0), Some((0, 0)));
        assert_eq!(p.locate(3, 5), Some((1, 2)));
        assert_eq!(p.locate(9, 9), Some((3, 3)));
        assert_eq!(p.locate(10, 0), None);
        assert_eq!(p.region_of(1, 2), Rect::new(1, 3, 5, 2));
        assert_eq!(p.owner_of(1, 2), 6);
        assert_eq!(p.block_of(6), (1, 2));
        assert_eq!(p.region_of_rank(6), Rect::new(1, 3, 5, 2));
        assert_eq!(p.local_len(15), 4 * 3);
        assert_eq!(p.local_offset(6, 2, 6), 3 + 1);
    }

    #[test]
    fn every_cell_has_one_owner() {
        let p = reference();
        for row in 0..10 {
            for col in 0..10 {
                let owners: Vec<usize> = (0..p.num_blocks())
                    .filter(|&r| p.region_of_rank(r).contains(&Rect::new(row, 1, col, 1)))
                    .collect();
                let (rb, cb) = p.locate(row, col).unwrap();
                assert_eq!(owners, vec![p.owner_of(rb, cb)]);
            }
        }
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(PartitionMap::new(10, 10, vec![1, 4, 10], vec![0, 10]).is_err());
        assert!(PartitionMap::new(10, 10, vec![0, 4, 9], vec![0, 10]).is_err());
        assert!(PartitionMap::new(10, 10, vec![0, 4, 4, 10], vec![0, 10]).is_err());
        assert!(PartitionMap::new(10, 10, vec![0, 10], vec![0]).is_err());
    }

    #[test]
    fn uniform_split() {
        let p = PartitionMap::uniform(10, 7, 3, 2).unwrap();
        assert_eq!(p.r_displs(), &[0, 4, 7, 10]);
        assert_eq!(p.c_displs(), &[0, 4, 7]);
        assert_eq!(p.ld_local(), 4);
    }

    #[test]
    fn rect_intersection() {
        let a = Rect::new(0, 4, 0, 4);
        assert_eq!(a.intersect(&Rect::new(2, 4, 3, 4)), Some(Rect::new(2, 2, 3, 1)));
        assert_eq!(a.intersect(&Rect::new(4, 1, 0, 4)), None);
    }

    #[test]
    fn overflowing_rect_is_not_contained() {
        let a = Rect::new(0, 4, 0, 4);
        assert!(a.contains(&Rect::new(1, 3, 0, 4)));
        assert!(!a.contains(&Rect::new(usize::MAX, 2, 0, 1)));
        assert!(!a.contains(&Rect::new(0, 1, 2, usize::MAX)));
    }
}

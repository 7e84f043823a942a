//! Dense views of distributed data on top of Faer.
//!
//! These helpers turn an owner's local buffer, or every owner's buffer of a
//! `LocalGroup`, into a `faer::Mat` for inspection and verification.

use faer::Mat;

use crate::core::Scalar;
use crate::matrix::PartitionMap;
use crate::parallel::LocalGroup;

/// `rank`'s block as a dense matrix, read from its local buffer `window`.
pub fn local_block<T>(partition: &PartitionMap, rank: usize, window: &[T]) -> Mat<T>
where
    T: Scalar + num_traits::Float,
{
    let region = partition.region_of_rank(rank);
    let ld = partition.ld_local();
    Mat::from_fn(region.row_count, region.col_count, |i, j| window[i * ld + j])
}

/// The whole matrix assembled from every window of `group`.
pub fn gather_dense<T>(partition: &PartitionMap, group: &LocalGroup<T>) -> Mat<T>
where
    T: Scalar + num_traits::Float,
{
    let windows: Vec<Vec<T>> = (0..partition.num_blocks()).map(|r| group.window(r)).collect();
    let ld = partition.ld_local();
    Mat::from_fn(partition.nrows(), partition.ncols(), |i, j| {
        let (rb, cb) = partition
            .locate(i, j)
            .unwrap_or_else(|| unreachable!("cell ({i}, {j}) inside the matrix has an owner"));
        let rank = partition.owner_of(rb, cb);
        let region = partition.region_of(rb, cb);
        windows[rank][(i - region.row_start) * ld + (j - region.col_start)]
    })
}

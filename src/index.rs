//! The contract both tree variants present to callers.

use crate::error::IndexResult;
use crate::geometry::{Point, Rectangle};
use crate::storage::buffer_pool::PoolStats;

/// A disk-resident index over multidimensional points.
///
/// `exhaustive_search` ignores all index structure and scans every stored
/// point; it exists as the reference oracle the structured searches are
/// tested against.
pub trait SpatialIndex {
    fn insert(&mut self, point: Point) -> IndexResult<()>;

    /// Remove one occurrence of `point`. Returns whether a point was
    /// removed.
    fn remove(&mut self, point: Point) -> IndexResult<bool>;

    /// All stored points equal to `point`.
    fn search_point(&self, point: &Point) -> IndexResult<Vec<Point>>;

    /// All stored points covered by `rect`.
    fn search_rectangle(&self, rect: &Rectangle) -> IndexResult<Vec<Point>>;

    /// Full-scan oracle for `search_point`.
    fn exhaustive_search(&self, point: &Point) -> IndexResult<Vec<Point>>;

    /// Order-independent digest of the stored point set.
    fn checksum(&self) -> IndexResult<u32>;

    /// Check structural invariants; true when the tree is sound.
    fn validate(&self) -> IndexResult<bool>;

    /// Number of stored points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of levels, counting the root.
    fn height(&self) -> u32;

    /// Flush all dirty pages and rewrite the root-handle sidecar.
    fn checkpoint(&self) -> IndexResult<()>;
}

/// Point-in-time statistics for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeStats {
    pub entries: usize,
    pub height: u32,
    pub resident_pages: usize,
    pub pool: PoolStats,
}

/// Contribution of one point to a tree checksum.
pub(crate) fn checksum_point(acc: u32, point: &Point) -> u32 {
    point
        .values
        .iter()
        .fold(acc, |acc, &coord| acc.wrapping_add(coord as i64 as u32))
}

//! # nirtree - Disk-Resident Spatial Indices
//!
//! This crate implements a family of disk-resident spatial indices over
//! multidimensional points: an R*-tree variant and a NIR-tree whose
//! internal region descriptors are isothetic (axis-aligned) polygons
//! rather than plain rectangles.
//!
//! ## Features
//!
//! - **Paged storage**: all nodes live on a fixed-size, paged backing file
//! - **Bounded memory**: a buffer pool with page-level pinning and LRU
//!   eviction keeps residency within a configurable budget
//! - **Slot allocation**: nodes of heterogeneous sizes share pages through
//!   a slot allocator with a coalescing free list
//! - **Pinned handles**: typed, scope-bound references that keep their page
//!   resident for exactly as long as they are alive
//! - **Polygon regions**: the NIR-tree keeps arbitrary axis-aligned
//!   coverage as unions of disjoint basic rectangles
//! - **Persistent**: a checkpoint flushes the pool and records the root in
//!   a metadata sidecar; reopening the backing file recovers the tree
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nirtree::{NirTree, Point, Rectangle, SpatialIndex};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tree = NirTree::open("points.db", 1 << 20)?;
//! tree.insert(Point::new([2.0, 3.0]))?;
//!
//! let hits = tree.search_rectangle(&Rectangle::new(
//!     Point::new([0.0, 0.0]),
//!     Point::new([10.0, 10.0]),
//! ))?;
//! assert_eq!(hits.len(), 1);
//! tree.checkpoint()?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod geometry;
pub mod index;
pub mod nirtree;
pub mod polygon;
pub mod rstar;
pub mod storage;

pub use constants::{DIMENSIONS, MAX_BRANCH_FACTOR, MIN_BRANCH_FACTOR, PAGE_DATA_SIZE, PAGE_SIZE};
pub use error::{IndexError, IndexResult};
pub use geometry::{Point, Rectangle};
pub use index::{SpatialIndex, TreeStats};
pub use nirtree::NirTree;
pub use polygon::{InlinePolygon, IsotheticPolygon, OptimalExpansion};
pub use rstar::RStarTree;
pub use storage::{BufferPool, NodeAllocator, NodeHandle, NodeType, PinnedHandle};

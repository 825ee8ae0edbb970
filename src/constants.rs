//! Build-time constants shared across the storage substrate and both trees.

/// Number of coordinates per point. Fixed at build time; every on-disk
/// layout in the crate depends on it.
pub const DIMENSIONS: usize = 2;

/// Size of one page, the unit of transfer between the buffer pool and the
/// backing file.
pub const PAGE_SIZE: usize = 4096;

/// Bytes reserved at the start of each on-disk page for the page header.
pub const PAGE_HEADER_SIZE: usize = 16;

/// Payload bytes available for node slots within one page.
pub const PAGE_DATA_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Alignment of every slot carved out of a page. Slot sizes are rounded up
/// to this, so any offset handed out by the allocator is suitable for the
/// widest field of a node (f64).
pub const SLOT_ALIGN: usize = 8;

/// Maximum number of basic rectangles a polygon stored inline in a branch
/// may hold. Polygons that outgrow this move to a separately allocated
/// page slot.
pub const MAX_RECTANGLE_COUNT: usize = 5;

/// Minimum number of entries in a non-root tree node.
pub const MIN_BRANCH_FACTOR: usize = 3;

/// Maximum number of entries in a tree node. Node layouts are raw
/// fixed-size arrays, so this is a build-time constant rather than a
/// constructor parameter.
pub const MAX_BRANCH_FACTOR: usize = 7;

const _: () = assert!(PAGE_SIZE <= u16::MAX as usize);
const _: () = assert!(PAGE_HEADER_SIZE % SLOT_ALIGN == 0);
const _: () = assert!(PAGE_DATA_SIZE % SLOT_ALIGN == 0);
const _: () = assert!(MIN_BRANCH_FACTOR * 2 <= MAX_BRANCH_FACTOR + 1);

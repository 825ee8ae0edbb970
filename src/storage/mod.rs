//! Paged storage substrate shared by both tree variants.
//!
//! The layering is strict: the allocator talks only to the buffer pool, and
//! the buffer pool talks only to the backing store. Tree code reaches node
//! bytes exclusively through pinned handles handed out by the allocator.

pub mod alloc;
pub mod backing;
pub mod buffer_pool;
pub mod handle;
pub mod meta;
pub mod page;

pub use alloc::{NodeAllocator, MIN_SPLIT_BYTES};
pub use backing::BackingStore;
pub use buffer_pool::{BufferPool, PoolStats};
pub use handle::{NodeHandle, NodeType, PinnedHandle, SlotData};
pub use page::{PageBuffer, PageFrame};

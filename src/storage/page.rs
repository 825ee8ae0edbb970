//! In-memory page frames and the on-disk page header.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constants::{PAGE_DATA_SIZE, PAGE_HEADER_SIZE};

/// Header written at the start of every on-disk page. The pin count is a
/// purely in-memory quantity and is not represented on disk.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DiskPageHeader {
    pub page_id: u32,
    pub dirty: u8,
    pub reserved: [u8; 11],
}

const _: () = assert!(size_of::<DiskPageHeader>() == PAGE_HEADER_SIZE);

impl DiskPageHeader {
    pub fn new(page_id: u32) -> DiskPageHeader {
        DiskPageHeader {
            page_id,
            dirty: 0,
            reserved: [0; 11],
        }
    }
}

/// Page payload buffer. The alignment guarantees that any slot offset that
/// is a multiple of [`crate::constants::SLOT_ALIGN`] is correctly aligned
/// for the node types stored in it.
#[repr(C, align(8))]
pub struct PageBuffer(pub [u8; PAGE_DATA_SIZE]);

impl PageBuffer {
    pub fn zeroed() -> Box<PageBuffer> {
        Box::new(PageBuffer([0; PAGE_DATA_SIZE]))
    }
}

/// A resident page: identity, pin count, dirty flag, and the payload bytes.
///
/// Frames are shared through `Rc`; pinned handles keep a strong reference
/// and bump the pin count, and the buffer pool refuses to evict any frame
/// whose pin count is non-zero. Payload access goes through the `RefCell`
/// so that conflicting borrows are caught at run time.
pub struct PageFrame {
    page_id: u32,
    pin_count: Cell<u32>,
    dirty: Cell<bool>,
    pub(crate) data: RefCell<Box<PageBuffer>>,
}

impl PageFrame {
    pub fn new(page_id: u32) -> PageFrame {
        PageFrame {
            page_id,
            pin_count: Cell::new(0),
            dirty: Cell::new(false),
            data: RefCell::new(PageBuffer::zeroed()),
        }
    }

    pub fn page_id(&self) -> u32 {
        self.page_id
    }

    pub fn pin(&self) {
        self.pin_count.set(self.pin_count.get() + 1);
    }

    pub fn unpin(&self) {
        let count = self.pin_count.get();
        debug_assert!(count > 0, "unpinned a frame with pin count zero");
        self.pin_count.set(count.saturating_sub(1));
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.get()
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count.get() > 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub fn clear_dirty(&self) {
        self.dirty.set(false);
    }

    pub fn payload(&self) -> Ref<'_, Box<PageBuffer>> {
        self.data.borrow()
    }

    pub fn payload_mut(&self) -> RefMut<'_, Box<PageBuffer>> {
        self.mark_dirty();
        self.data.borrow_mut()
    }
}

impl std::fmt::Debug for PageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFrame")
            .field("page_id", &self.page_id)
            .field("pin_count", &self.pin_count.get())
            .field("dirty", &self.dirty.get())
            .finish()
    }
}

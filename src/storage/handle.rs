//! Slot addressing: logical node handles and pinned, typed slot access.
//!
//! Node-to-node links are stored as [`NodeHandle`] triples, never as raw
//! pointers, because the target slot may live on an evicted page. Any
//! access to slot bytes goes through a [`PinnedHandle`], which keeps the
//! owning page resident for as long as it is alive.

use std::cell::{Ref, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constants::{PAGE_DATA_SIZE, SLOT_ALIGN};
use crate::storage::page::{PageBuffer, PageFrame};

/// Page id that marks a null handle.
pub const INVALID_PAGE: u32 = u32::MAX;

/// Discriminants stored in a handle's advisory type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NodeType {
    Untyped = 0,
    RStarLeaf = 1,
    RStarBranch = 2,
    NirLeaf = 3,
    NirBranch = 4,
    Polygon = 5,
}

impl NodeType {
    pub fn tag(self) -> u16 {
        self as u16
    }
}

/// Logical address of one allocation slot: `(page_id, offset)` plus an
/// advisory type tag. Plain data, 8 bytes, trivially copyable; this is the
/// exact layout persisted in node links and in the metadata sidecar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct NodeHandle {
    pub page_id: u32,
    pub offset: u16,
    pub node_type: u16,
}

const _: () = assert!(size_of::<NodeHandle>() == 8);

impl NodeHandle {
    pub const NULL: NodeHandle = NodeHandle {
        page_id: INVALID_PAGE,
        offset: 0,
        node_type: 0,
    };

    pub fn new(page_id: u32, offset: u16, node_type: NodeType) -> NodeHandle {
        NodeHandle {
            page_id,
            offset,
            node_type: node_type.tag(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.page_id == INVALID_PAGE
    }
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::NULL
    }
}

/// Equality is by location; the advisory type tag does not participate.
impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        if self.is_null() || other.is_null() {
            return self.is_null() && other.is_null();
        }
        self.page_id == other.page_id && self.offset == other.offset
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.is_null() {
            INVALID_PAGE.hash(state);
        } else {
            self.page_id.hash(state);
            self.offset.hash(state);
        }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "{{null}}")
        } else {
            write!(f, "{{page {}, offset {}}}", self.page_id, self.offset)
        }
    }
}

/// Marker for types that may be viewed in place inside a page slot.
///
/// The zerocopy bounds prove at compile time that the type has no padding,
/// accepts any bit pattern, and has a known layout; `Copy` allows the
/// read-copy/write-back access pattern the trees use.
pub trait SlotData: FromBytes + IntoBytes + KnownLayout + Immutable + Copy {}

impl<T: FromBytes + IntoBytes + KnownLayout + Immutable + Copy> SlotData for T {}

/// A typed, scope-bound reference to one slot that keeps its page pinned.
///
/// Construction pins the frame, cloning re-pins it, and dropping unpins it,
/// so the page cannot be evicted while any handle to it is alive. The
/// buffer pool owns the page; this handle only shares access to it.
pub struct PinnedHandle<T> {
    frame: Rc<PageFrame>,
    offset: u16,
    _marker: PhantomData<T>,
}

impl<T> PinnedHandle<T> {
    pub(crate) fn new(frame: Rc<PageFrame>, offset: u16) -> PinnedHandle<T> {
        debug_assert!(offset as usize % SLOT_ALIGN == 0);
        debug_assert!(offset as usize + size_of::<T>() <= PAGE_DATA_SIZE);
        frame.pin();
        PinnedHandle {
            frame,
            offset,
            _marker: PhantomData,
        }
    }

    pub fn page_id(&self) -> u32 {
        self.frame.page_id()
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    /// Reinterpret the slot as a different static type. The pin on the
    /// page carries over; the caller is asserting the layout change.
    pub fn cast<U>(&self) -> PinnedHandle<U> {
        PinnedHandle::new(self.frame.clone(), self.offset)
    }

    /// Run `f` over the payload bytes from this slot's offset to the end
    /// of the page. Used by variable-length slot encodings.
    pub(crate) fn with_slot_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let payload = self.frame.payload();
        f(&payload.0[self.offset as usize..])
    }

    /// Mutable variant of [`with_slot_bytes`]; marks the page dirty.
    ///
    /// [`with_slot_bytes`]: Self::with_slot_bytes
    pub(crate) fn with_slot_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut payload = self.frame.payload_mut();
        f(&mut payload.0[self.offset as usize..])
    }
}

impl<T: SlotData> PinnedHandle<T> {
    /// Immutable view of the slot. Conflicting mutable access to the same
    /// page is caught at run time by the frame's `RefCell`.
    pub fn borrow(&self) -> SlotRef<'_, T> {
        SlotRef {
            guard: self.frame.payload(),
            offset: self.offset as usize,
            _marker: PhantomData,
        }
    }

    /// Mutable view of the slot; marks the page dirty.
    pub fn borrow_mut(&self) -> SlotMut<'_, T> {
        SlotMut {
            guard: self.frame.payload_mut(),
            offset: self.offset as usize,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for PinnedHandle<T> {
    fn clone(&self) -> Self {
        PinnedHandle::new(self.frame.clone(), self.offset)
    }
}

impl<T> fmt::Debug for PinnedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedHandle")
            .field("page_id", &self.frame.page_id())
            .field("offset", &self.offset)
            .finish()
    }
}

impl<T> Drop for PinnedHandle<T> {
    fn drop(&mut self) {
        self.frame.unpin();
    }
}

/// Borrowed immutable view of a slot's typed contents.
pub struct SlotRef<'a, T> {
    guard: Ref<'a, Box<PageBuffer>>,
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T: SlotData> Deref for SlotRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the offset is SLOT_ALIGN-aligned within an align(8)
        // buffer and the slot fits in the payload (checked at handle
        // construction); T: FromBytes makes any bit pattern a valid T; the
        // Ref guard excludes mutable borrows for the lifetime of the view.
        unsafe { &*self.guard.0.as_ptr().add(self.offset).cast::<T>() }
    }
}

/// Borrowed mutable view of a slot's typed contents.
pub struct SlotMut<'a, T> {
    guard: RefMut<'a, Box<PageBuffer>>,
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T: SlotData> Deref for SlotMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: see SlotRef::deref; the RefMut guard is exclusive.
        unsafe { &*self.guard.0.as_ptr().add(self.offset).cast::<T>() }
    }
}

impl<T: SlotData> DerefMut for SlotMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see SlotRef::deref; the RefMut guard is exclusive.
        unsafe { &mut *self.guard.0.as_mut_ptr().add(self.offset).cast::<T>() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        let null = NodeHandle::NULL;
        assert!(null.is_null());
        assert_eq!(null, NodeHandle::default());
        assert_eq!(format!("{null}"), "{null}");
    }

    #[test]
    fn test_handle_equality_ignores_type() {
        let a = NodeHandle::new(3, 48, NodeType::RStarLeaf);
        let b = NodeHandle::new(3, 48, NodeType::Polygon);
        let c = NodeHandle::new(3, 96, NodeType::RStarLeaf);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, NodeHandle::NULL);
    }

    #[test]
    fn test_pin_on_construct_unpin_on_drop() {
        let frame = Rc::new(PageFrame::new(0));
        {
            let handle: PinnedHandle<u64> = PinnedHandle::new(frame.clone(), 0);
            assert_eq!(frame.pin_count(), 1);

            let copy = handle.clone();
            assert_eq!(frame.pin_count(), 2);
            drop(copy);
            assert_eq!(frame.pin_count(), 1);
        }
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_typed_slot_roundtrip() {
        let frame = Rc::new(PageFrame::new(0));
        let handle: PinnedHandle<u64> = PinnedHandle::new(frame.clone(), 16);

        *handle.borrow_mut() = 0xDEAD_BEEF;
        assert_eq!(*handle.borrow(), 0xDEAD_BEEF);
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_borrow_mut_marks_dirty_borrow_does_not() {
        let frame = Rc::new(PageFrame::new(0));
        let handle: PinnedHandle<u64> = PinnedHandle::new(frame.clone(), 0);

        let _ = *handle.borrow();
        assert!(!frame.is_dirty());
        *handle.borrow_mut() = 1;
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_cast_preserves_pin() {
        let frame = Rc::new(PageFrame::new(0));
        let handle: PinnedHandle<u64> = PinnedHandle::new(frame.clone(), 8);
        *handle.borrow_mut() = u64::MAX;

        let as_pair = handle.cast::<[u32; 2]>();
        assert_eq!(frame.pin_count(), 2);
        assert_eq!(*as_pair.borrow(), [u32::MAX, u32::MAX]);
        drop(handle);
        assert_eq!(frame.pin_count(), 1);
    }
}

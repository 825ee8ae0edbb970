//! Slot-level allocator over pages.
//!
//! Tree nodes and unbounded polygons have widely different sizes, so pages
//! are subdivided into variable-size, type-tagged slots. Allocation tries a
//! best-fit search of the free list, then bump-allocates at the tail of the
//! current page, then opens a fresh page. Freed slots coalesce with their
//! neighbours immediately, which keeps the free list short over long
//! insert/delete sequences.

use std::mem::size_of;
use std::rc::Rc;

use log::warn;

use crate::constants::{MAX_RECTANGLE_COUNT, PAGE_DATA_SIZE, SLOT_ALIGN};
use crate::error::{IndexError, IndexResult};
use crate::polygon::polygon_slot_size;
use crate::storage::buffer_pool::BufferPool;
use crate::storage::handle::{NodeHandle, NodeType, PinnedHandle, SlotData};

/// Smallest remainder worth returning to the free list when a fit is split.
/// Sized to the footprint of the smallest unbounded polygon slot, the
/// smallest allocation that outgrows an inline polygon; anything below it is
/// kept with the allocation as internal fragmentation.
pub const MIN_SPLIT_BYTES: usize = polygon_slot_size(MAX_RECTANGLE_COUNT + 1);

const _: () = assert!(MIN_SPLIT_BYTES % SLOT_ALIGN == 0);

/// Round a slot size up to the allocator's alignment.
pub const fn align_slot(size: usize) -> usize {
    (size + SLOT_ALIGN - 1) & !(SLOT_ALIGN - 1)
}

/// Freed spans, ordered by `(page_id, offset)`, with a strictly parallel
/// by-size index for best-fit lookups. The index holds positions into the
/// location-ordered list and is rebuilt after every mutation; the two
/// structures never share fields.
#[derive(Default)]
struct FreeList {
    by_location: Vec<(NodeHandle, u16)>,
    by_size: Vec<usize>,
}

impl FreeList {
    fn len(&self) -> usize {
        debug_assert_eq!(self.by_location.len(), self.by_size.len());
        self.by_location.len()
    }

    fn total_bytes(&self) -> usize {
        self.by_location.iter().map(|(_, size)| *size as usize).sum()
    }

    /// Insert a freed span, coalescing with adjacent spans on both sides.
    fn insert(&mut self, handle: NodeHandle, size: u16) {
        if handle.is_null() {
            return;
        }
        let key = (handle.page_id, handle.offset);
        let pos = self
            .by_location
            .partition_point(|(h, _)| (h.page_id, h.offset) < key);

        // Predecessor span ends exactly where the freed span begins.
        if pos > 0 {
            let (prev_handle, prev_size) = self.by_location[pos - 1];
            if prev_handle.page_id == handle.page_id
                && prev_handle.offset + prev_size == handle.offset
            {
                self.by_location[pos - 1].1 = prev_size + size;
                // The grown span may now touch its successor too.
                if pos < self.by_location.len() {
                    let (next_handle, next_size) = self.by_location[pos];
                    let (grown_handle, grown_size) = self.by_location[pos - 1];
                    if next_handle.page_id == grown_handle.page_id
                        && grown_handle.offset + grown_size == next_handle.offset
                    {
                        self.by_location[pos - 1].1 = grown_size + next_size;
                        self.by_location.remove(pos);
                    }
                }
                self.rebuild_size_index();
                return;
            }
        }

        // Freed span ends exactly where its successor begins.
        if pos < self.by_location.len() {
            let (next_handle, next_size) = self.by_location[pos];
            if next_handle.page_id == handle.page_id
                && handle.offset + size == next_handle.offset
            {
                self.by_location[pos] = (
                    NodeHandle::new(handle.page_id, handle.offset, NodeType::Untyped),
                    size + next_size,
                );
                self.rebuild_size_index();
                return;
            }
        }

        self.by_location.insert(
            pos,
            (
                NodeHandle::new(handle.page_id, handle.offset, NodeType::Untyped),
                size,
            ),
        );
        self.rebuild_size_index();
    }

    /// Remove and return the smallest span of at least `size` bytes.
    /// Ties resolve to the span earliest in location order.
    fn take_best_fit(&mut self, size: u16) -> Option<(NodeHandle, u16)> {
        let slot = self
            .by_size
            .iter()
            .copied()
            .find(|&idx| self.by_location[idx].1 >= size)?;
        let entry = self.by_location.remove(slot);
        self.rebuild_size_index();
        Some(entry)
    }

    /// True when `handle` points anywhere inside a freed span.
    fn covers(&self, handle: &NodeHandle) -> bool {
        self.by_location.iter().any(|(h, size)| {
            h.page_id == handle.page_id
                && h.offset <= handle.offset
                && handle.offset < h.offset + size
        })
    }

    fn rebuild_size_index(&mut self) {
        self.by_size = (0..self.by_location.len()).collect();
        self.by_size
            .sort_by_key(|&idx| (self.by_location[idx].1, idx));
        debug_assert!(self.invariants_hold());
    }

    /// Entries sorted and strictly separated (adjacency would have been
    /// coalesced), every span inside the payload, index strictly parallel.
    fn invariants_hold(&self) -> bool {
        if self.by_location.len() != self.by_size.len() {
            return false;
        }
        for window in self.by_location.windows(2) {
            let (a, a_size) = window[0];
            let (b, _) = window[1];
            if (a.page_id, a.offset) >= (b.page_id, b.offset) {
                return false;
            }
            if a.page_id == b.page_id && a.offset + a_size >= b.offset {
                return false;
            }
        }
        self.by_location
            .iter()
            .all(|(h, size)| h.offset as usize + *size as usize <= PAGE_DATA_SIZE)
    }
}

/// Carves nodes of heterogeneous sizes out of buffer-pool pages and hands
/// out location-typed handles for them.
pub struct NodeAllocator {
    pool: Rc<BufferPool>,
    cur_page: Option<u32>,
    space_left_in_cur_page: u16,
    free_list: FreeList,
}

impl NodeAllocator {
    pub fn new(pool: Rc<BufferPool>) -> NodeAllocator {
        NodeAllocator {
            pool,
            cur_page: None,
            space_left_in_cur_page: 0,
            free_list: FreeList::default(),
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Allocate a slot sized for `T` and tag its handle with `node_type`.
    pub fn create_node<T: SlotData>(
        &mut self,
        node_type: NodeType,
    ) -> IndexResult<(PinnedHandle<T>, NodeHandle)> {
        self.create_slot(size_of::<T>(), node_type)
    }

    /// Allocate a slot of an explicit size, for variable-capacity payloads
    /// such as unbounded polygons. The typed handle views the slot prefix
    /// as `T`.
    pub fn create_slot<T>(
        &mut self,
        size: usize,
        node_type: NodeType,
    ) -> IndexResult<(PinnedHandle<T>, NodeHandle)> {
        let size = align_slot(size);
        debug_assert!(size > 0 && size <= PAGE_DATA_SIZE);
        let size = size as u16;

        // Free-list fit first: no growth while a hole is large enough.
        if let Some((entry, entry_size)) = self.free_list.take_best_fit(size) {
            let frame = self.pool.get_page(entry.page_id)?;
            let remainder = entry_size - size;
            if remainder as usize >= MIN_SPLIT_BYTES {
                let tail =
                    NodeHandle::new(entry.page_id, entry.offset + size, NodeType::Untyped);
                self.free_list.insert(tail, remainder);
            }
            let handle = NodeHandle::new(entry.page_id, entry.offset, node_type);
            return Ok((PinnedHandle::new(frame, entry.offset), handle));
        }

        // Bump at the tail of the current page.
        if let Some(page_id) = self.cur_page {
            if self.space_left_in_cur_page >= size {
                let offset = PAGE_DATA_SIZE as u16 - self.space_left_in_cur_page;
                self.space_left_in_cur_page -= size;
                let frame = self.pool.get_page(page_id)?;
                let handle = NodeHandle::new(page_id, offset, node_type);
                return Ok((PinnedHandle::new(frame, offset), handle));
            }
        }

        // Open a fresh page; the old tail joins the free list when it is
        // still worth tracking.
        if let Some(page_id) = self.cur_page {
            if self.space_left_in_cur_page as usize >= MIN_SPLIT_BYTES {
                let offset = PAGE_DATA_SIZE as u16 - self.space_left_in_cur_page;
                self.free_list.insert(
                    NodeHandle::new(page_id, offset, NodeType::Untyped),
                    self.space_left_in_cur_page,
                );
            }
        }
        let (page_id, frame) = self.pool.allocate_page()?;
        self.cur_page = Some(page_id);
        self.space_left_in_cur_page = PAGE_DATA_SIZE as u16 - size;
        let handle = NodeHandle::new(page_id, 0, node_type);
        Ok((PinnedHandle::new(frame, 0), handle))
    }

    /// Fault in the page behind `handle` and return a pinned view of its
    /// slot.
    pub fn get_node<T: SlotData>(&self, handle: NodeHandle) -> IndexResult<PinnedHandle<T>> {
        if handle.is_null() {
            return Err(IndexError::InvalidHandle("dereferenced null handle".into()));
        }
        if !self.pool.is_known_page(handle.page_id) {
            return Err(IndexError::InvalidHandle(format!(
                "handle {handle} references an unknown page"
            )));
        }
        debug_assert!(
            !self.free_list.covers(&handle),
            "dereferenced freed slot {handle}"
        );
        let frame = self.pool.get_page(handle.page_id)?;
        Ok(PinnedHandle::new(frame, handle.offset))
    }

    /// Copy the slot contents out. The pin is held for the duration of the
    /// copy only.
    pub fn read_node<T: SlotData>(&self, handle: NodeHandle) -> IndexResult<T> {
        Ok(*self.get_node::<T>(handle)?.borrow())
    }

    /// Copy a value into the slot, marking its page dirty.
    pub fn write_node<T: SlotData>(&self, handle: NodeHandle, value: &T) -> IndexResult<()> {
        *self.get_node::<T>(handle)?.borrow_mut() = *value;
        Ok(())
    }

    /// Return a slot to the free list. Adjacent freed spans coalesce
    /// immediately.
    pub fn free(&mut self, handle: NodeHandle, size: usize) {
        if handle.is_null() {
            return;
        }
        let size = align_slot(size) as u16;
        if let Some(expected) = canonical_slot_size(handle.node_type) {
            let expected = align_slot(expected) as u16;
            if expected != size {
                debug_assert!(
                    false,
                    "freed {handle} with size {size}, canonical size is {expected}"
                );
                warn!("freed {handle} with size {size}, canonical size is {expected}");
            }
        }
        self.free_list.insert(handle, size);
    }

    pub fn free_list_len(&self) -> usize {
        self.free_list.len()
    }

    /// Total bytes parked on the free list.
    pub fn free_bytes(&self) -> usize {
        self.free_list.total_bytes()
    }

    #[cfg(test)]
    pub(crate) fn cur_page(&self) -> Option<u32> {
        self.cur_page
    }

    #[cfg(test)]
    pub(crate) fn space_left_in_cur_page(&self) -> u16 {
        self.space_left_in_cur_page
    }
}

/// Fixed slot size implied by a handle's type tag, where one exists.
/// Polygon slots declare their own capacity and have no canonical size.
fn canonical_slot_size(tag: u16) -> Option<usize> {
    match tag {
        t if t == NodeType::RStarLeaf.tag() => {
            Some(size_of::<crate::rstar::node::RStarLeafNode>())
        }
        t if t == NodeType::RStarBranch.tag() => {
            Some(size_of::<crate::rstar::node::RStarBranchNode>())
        }
        t if t == NodeType::NirLeaf.tag() => Some(size_of::<crate::nirtree::node::NirLeafNode>()),
        t if t == NodeType::NirBranch.tag() => {
            Some(size_of::<crate::nirtree::node::NirBranchNode>())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PAGE_SIZE;
    use tempfile::tempdir;

    const TEST_SLOT: usize = 48;

    fn allocator(dir: &tempfile::TempDir, pages: usize) -> (Rc<BufferPool>, NodeAllocator) {
        let pool = Rc::new(
            BufferPool::new(&dir.path().join("alloc.db"), pages * PAGE_SIZE).unwrap(),
        );
        (pool.clone(), NodeAllocator::new(pool))
    }

    #[test]
    fn test_single_allocation() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        let (pin, handle) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
        assert_eq!(handle.page_id, 0);
        assert_eq!(handle.offset, 0);
        assert_eq!(pin.page_id(), 0);
        assert_eq!(alloc.free_list_len(), 0);
    }

    #[test]
    fn test_sequential_offsets() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        for i in 0..3u16 {
            let (_, handle) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
            assert_eq!(handle.page_id, 0);
            assert_eq!(handle.offset, i * TEST_SLOT as u16);
        }
    }

    #[test]
    fn test_free_consecutive_coalesces_and_reuses() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        let mut handles = Vec::new();
        for _ in 0..3 {
            let (_, handle) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
            handles.push(handle);
        }

        for handle in handles {
            alloc.free(handle, TEST_SLOT);
            assert_eq!(alloc.free_list_len(), 1);
        }

        let (_, reused) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
        assert_eq!(reused.page_id, 0);
        assert_eq!(reused.offset, 0);
        // The 96-byte remainder is below the split threshold and is kept
        // with the allocation.
        assert_eq!(alloc.free_list_len(), 0);
    }

    #[test]
    fn test_free_with_large_remainder_splits() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        let num_nodes = MIN_SPLIT_BYTES / TEST_SLOT + 2;
        let mut handles = Vec::new();
        for _ in 0..num_nodes {
            let (_, handle) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
            handles.push(handle);
        }
        for handle in handles {
            alloc.free(handle, TEST_SLOT);
            assert_eq!(alloc.free_list_len(), 1);
        }

        let (_, reused) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
        assert_eq!(reused.page_id, 0);
        assert_eq!(reused.offset, 0);
        assert_eq!(alloc.free_list_len(), 1);
    }

    #[test]
    fn test_free_non_consecutive_spans() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        let mut handles = Vec::new();
        for _ in 0..11 {
            let (_, handle) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
            handles.push(handle);
        }

        // Three runs separated by live slots at indices 3 and 7.
        for i in 0..3 {
            alloc.free(handles[i], TEST_SLOT);
            assert_eq!(alloc.free_list_len(), 1);
        }
        for i in 4..7 {
            alloc.free(handles[i], TEST_SLOT);
            assert_eq!(alloc.free_list_len(), 2);
        }
        for i in 8..11 {
            alloc.free(handles[i], TEST_SLOT);
            assert_eq!(alloc.free_list_len(), 3);
        }

        let (_, reused) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
        assert_eq!(reused.page_id, 0);
        assert_eq!(reused.offset, 0);
        assert_eq!(alloc.free_list_len(), 2);
    }

    #[test]
    fn test_page_overflow() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        let per_page = PAGE_DATA_SIZE / TEST_SLOT;
        for i in 0..per_page {
            let (_, handle) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
            assert_eq!(handle.page_id, 0);
            assert_eq!(handle.offset, (i * TEST_SLOT) as u16);
        }

        let (_, spilled) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
        assert_eq!(spilled.page_id, 1);
        assert_eq!(spilled.offset, 0);
    }

    #[test]
    fn test_page_tail_joins_free_list_on_overflow() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        // Leave a tail at least MIN_SPLIT_BYTES long on page 0.
        let num_nodes = (PAGE_DATA_SIZE - MIN_SPLIT_BYTES) / TEST_SLOT;
        let mut handles = Vec::new();
        for _ in 0..num_nodes {
            let (_, handle) = alloc.create_slot::<u64>(TEST_SLOT, NodeType::Untyped).unwrap();
            handles.push(handle);
        }
        assert_eq!(alloc.free_list_len(), 0);

        // A page-sized slot cannot fit the tail: it opens page 1 and the
        // tail of page 0 becomes one free-list entry.
        let (_, huge) = alloc
            .create_slot::<u64>(PAGE_DATA_SIZE, NodeType::Untyped)
            .unwrap();
        assert_eq!(huge.page_id, 1);
        assert_eq!(alloc.free_list_len(), 1);

        for (i, handle) in handles.iter().enumerate() {
            alloc.free(*handle, TEST_SLOT);
            // The last free joins the freed run back up with the page
            // tail, collapsing the two spans into one.
            if i + 1 < num_nodes {
                assert_eq!(alloc.free_list_len(), 2);
            } else {
                assert_eq!(alloc.free_list_len(), 1);
            }
        }
        alloc.free(huge, PAGE_DATA_SIZE);
    }

    #[test]
    fn test_get_node_roundtrip() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        let (pin, handle) = alloc.create_node::<u64>(NodeType::Untyped).unwrap();
        *pin.borrow_mut() = 4242;
        drop(pin);

        let fetched = alloc.get_node::<u64>(handle).unwrap();
        assert_eq!(*fetched.borrow(), 4242);
    }

    #[test]
    fn test_get_node_null_fails() {
        let dir = tempdir().unwrap();
        let (_, alloc) = allocator(&dir, 10);
        match alloc.get_node::<u64>(NodeHandle::NULL) {
            Err(IndexError::InvalidHandle(_)) => {}
            other => panic!("expected invalid handle, got {other:?}"),
        }
    }

    #[test]
    fn test_get_node_unknown_page_fails() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);
        alloc.create_node::<u64>(NodeType::Untyped).unwrap();

        let bogus = NodeHandle::new(7, 0, NodeType::Untyped);
        match alloc.get_node::<u64>(bogus) {
            Err(IndexError::InvalidHandle(_)) => {}
            other => panic!("expected invalid handle, got {other:?}"),
        }
    }

    #[test]
    fn test_data_survives_page_out() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 1);

        let per_page = PAGE_DATA_SIZE / size_of::<u64>();
        let mut handles = Vec::new();
        for i in 0..per_page {
            let (pin, handle) = alloc.create_node::<u64>(NodeType::Untyped).unwrap();
            assert_eq!(handle.page_id, 0);
            assert_eq!(handle.offset as usize, i * size_of::<u64>());
            *pin.borrow_mut() = i as u64;
            handles.push(handle);
        }

        // The next allocation opens page 1, forcing page 0 out of the
        // single-frame pool.
        alloc.create_node::<u64>(NodeType::Untyped).unwrap();

        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(alloc.read_node::<u64>(*handle).unwrap(), i as u64);
        }
    }

    #[test]
    fn test_pinned_handle_scope_controls_pin_count() {
        let dir = tempdir().unwrap();
        let (pool, mut alloc) = allocator(&dir, 2);

        let first_handle;
        {
            let (pin_a, handle) = alloc.create_node::<u64>(NodeType::Untyped).unwrap();
            first_handle = handle;
            let page0 = pool.get_page(0).unwrap();
            assert_eq!(page0.pin_count(), 1);

            let (_pin_b, _) = alloc.create_node::<u64>(NodeType::Untyped).unwrap();
            assert_eq!(page0.pin_count(), 2);
            drop(pin_a);
            assert_eq!(page0.pin_count(), 1);
        }
        assert_eq!(pool.get_page(0).unwrap().pin_count(), 0);

        // Fill the rest of page 0, then allocate onto page 1 while a pin
        // on page 0 is live.
        let per_page = PAGE_DATA_SIZE / size_of::<u64>();
        for _ in 0..(per_page - 2) {
            alloc.create_node::<u64>(NodeType::Untyped).unwrap();
        }
        let mut held = alloc.get_node::<u64>(first_handle).unwrap();
        assert_eq!(*held.borrow(), 0);
        let page0 = pool.get_page(0).unwrap();
        assert_eq!(page0.pin_count(), 1);

        let (pin_new, _) = alloc.create_node::<u64>(NodeType::Untyped).unwrap();
        let page1 = pool.get_page(1).unwrap();
        assert_eq!(page0.pin_count(), 1);
        assert_eq!(page1.pin_count(), 1);

        // Rebinding the held handle unpins page 0 and re-pins page 1.
        held = pin_new.clone();
        assert_eq!(page0.pin_count(), 0);
        assert_eq!(page1.pin_count(), 2);
        drop(pin_new);
        assert_eq!(page1.pin_count(), 1);
        drop(held);
        assert_eq!(page1.pin_count(), 0);
    }

    #[test]
    fn test_perfect_fit_reuse_stays_on_first_page() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 2);

        for _ in 0..(PAGE_DATA_SIZE / size_of::<u64>() + 1) {
            let (_, handle) = alloc.create_node::<u64>(NodeType::Untyped).unwrap();
            assert_eq!(
                alloc.space_left_in_cur_page(),
                (PAGE_DATA_SIZE - size_of::<u64>()) as u16
            );
            alloc.free(handle, size_of::<u64>());
        }
        assert_eq!(alloc.cur_page(), Some(0));
    }

    #[test]
    fn test_committed_bytes_balance() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        // Interleaved allocate/free returning to the starting state: the
        // free list carries back exactly what was freed.
        let mut live = Vec::new();
        for _ in 0..6 {
            let (_, h) = alloc.create_slot::<u64>(64, NodeType::Untyped).unwrap();
            live.push(h);
        }
        let baseline = alloc.free_bytes();
        for h in live.drain(..) {
            alloc.free(h, 64);
        }
        assert_eq!(alloc.free_bytes(), baseline + 6 * 64);
    }

    #[test]
    fn test_allocation_disjoint_from_free_entries() {
        let dir = tempdir().unwrap();
        let (_, mut alloc) = allocator(&dir, 10);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (_, h) = alloc.create_slot::<u64>(96, NodeType::Untyped).unwrap();
            handles.push(h);
        }
        // Free alternating slots so spans cannot coalesce.
        for h in handles.iter().step_by(2) {
            alloc.free(*h, 96);
        }
        assert_eq!(alloc.free_list_len(), 4);

        // A fresh allocation of the same size lands exactly on a freed
        // span and never overlaps a live one.
        let (_, reused) = alloc.create_slot::<u64>(96, NodeType::Untyped).unwrap();
        assert!(handles.iter().step_by(2).any(|h| *h == reused));
        assert_eq!(alloc.free_list_len(), 3);
    }
}

//! Bounded pool of in-memory page frames over a backing store.
//!
//! The pool keeps at most `capacity` frames resident. A miss loads the page
//! from disk into a fresh frame, evicting the least recently used unpinned
//! frame when full; a dirty evictee is flushed first. Frames with a
//! non-zero pin count are never evicted — when every resident frame is
//! pinned, a miss fails with [`IndexError::PoolExhausted`] and the caller
//! must surface it.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use log::debug;

use crate::constants::PAGE_SIZE;
use crate::error::{IndexError, IndexResult};
use crate::storage::backing::BackingStore;
use crate::storage::page::PageFrame;

/// Counters accumulated over the life of the pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writebacks: u64,
}

pub struct BufferPool {
    store: BackingStore,
    /// Resident frames keyed by page id.
    frames: RefCell<HashMap<u32, Rc<PageFrame>>>,
    /// LRU order: front is the eviction candidate, back is most recent.
    lru: RefCell<VecDeque<u32>>,
    capacity: usize,
    /// Next fresh page id handed out by `allocate_page`.
    next_page_id: Cell<u32>,
    /// Pages known to exist on disk; reads below this mark fault from the
    /// store, reads at or above it start from a zeroed frame.
    on_disk_pages: Cell<u32>,
    hits: Cell<u64>,
    misses: Cell<u64>,
    evictions: Cell<u64>,
    writebacks: Cell<u64>,
}

impl BufferPool {
    /// Open the backing file and size the pool from the memory budget.
    pub fn new(path: &Path, memory_budget: usize) -> IndexResult<BufferPool> {
        let store = BackingStore::open(path)?;
        let capacity = (memory_budget / PAGE_SIZE).max(1);
        let preexisting = store.preexisting_page_count();

        Ok(BufferPool {
            store,
            frames: RefCell::new(HashMap::with_capacity(capacity)),
            lru: RefCell::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_page_id: Cell::new(preexisting),
            on_disk_pages: Cell::new(preexisting),
            hits: Cell::new(0),
            misses: Cell::new(0),
            evictions: Cell::new(0),
            writebacks: Cell::new(0),
        })
    }

    /// Number of pages present in the backing file when it was opened.
    pub fn get_preexisting_page_count(&self) -> u32 {
        self.store.preexisting_page_count()
    }

    pub fn get_backing_file_name(&self) -> &Path {
        self.store.path()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn resident_page_count(&self) -> usize {
        self.frames.borrow().len()
    }

    /// True when `page_id` was handed out by this pool or already existed
    /// on disk.
    pub fn is_known_page(&self, page_id: u32) -> bool {
        page_id < self.next_page_id.get().max(self.on_disk_pages.get())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
            evictions: self.evictions.get(),
            writebacks: self.writebacks.get(),
        }
    }

    /// Return a resident frame for `page_id`, faulting it in on a miss.
    pub fn get_page(&self, page_id: u32) -> IndexResult<Rc<PageFrame>> {
        if let Some(frame) = self.frames.borrow().get(&page_id).cloned() {
            self.touch(page_id);
            self.hits.set(self.hits.get() + 1);
            return Ok(frame);
        }

        self.misses.set(self.misses.get() + 1);
        self.make_room()?;

        let frame = Rc::new(PageFrame::new(page_id));
        if page_id < self.on_disk_pages.get() {
            let mut payload = frame.data.borrow_mut();
            self.store.read_page(page_id, &mut payload)?;
        }
        self.frames.borrow_mut().insert(page_id, frame.clone());
        self.lru.borrow_mut().push_back(page_id);
        Ok(frame)
    }

    /// Hand out a fresh page id together with its zeroed, dirty frame.
    pub fn allocate_page(&self) -> IndexResult<(u32, Rc<PageFrame>)> {
        self.make_room()?;
        let page_id = self.next_page_id.get();
        self.next_page_id.set(page_id + 1);

        let frame = Rc::new(PageFrame::new(page_id));
        frame.mark_dirty();
        self.frames.borrow_mut().insert(page_id, frame.clone());
        self.lru.borrow_mut().push_back(page_id);
        Ok((page_id, frame))
    }

    /// Flush every dirty resident frame to the backing store.
    pub fn writeback_all_pages(&self) -> IndexResult<()> {
        let mut ids: Vec<u32> = self.frames.borrow().keys().copied().collect();
        ids.sort_unstable();
        for page_id in ids {
            let frame = match self.frames.borrow().get(&page_id) {
                Some(frame) => frame.clone(),
                None => continue,
            };
            if frame.is_dirty() {
                self.flush_frame(&frame)?;
            }
        }
        self.store.sync()?;
        Ok(())
    }

    fn flush_frame(&self, frame: &PageFrame) -> IndexResult<()> {
        let page_id = frame.page_id();
        debug!("writing back page {page_id}");
        self.store.write_page(page_id, &frame.payload())?;
        frame.clear_dirty();
        self.writebacks.set(self.writebacks.get() + 1);
        if page_id >= self.on_disk_pages.get() {
            self.on_disk_pages.set(page_id + 1);
        }
        Ok(())
    }

    /// Evict unpinned frames until a free slot exists. Fails when every
    /// resident frame is pinned.
    fn make_room(&self) -> IndexResult<()> {
        while self.frames.borrow().len() >= self.capacity {
            let victim = {
                let lru = self.lru.borrow();
                let frames = self.frames.borrow();
                lru.iter()
                    .copied()
                    .find(|id| frames.get(id).map_or(false, |f| !f.is_pinned()))
            };
            let victim = victim.ok_or(IndexError::PoolExhausted)?;

            let frame = self
                .frames
                .borrow_mut()
                .remove(&victim)
                .expect("victim chosen from resident set");
            self.lru.borrow_mut().retain(|id| *id != victim);
            if frame.is_dirty() {
                self.flush_frame(&frame)?;
            }
            debug!("evicted page {victim}");
            self.evictions.set(self.evictions.get() + 1);
        }
        Ok(())
    }

    fn touch(&self, page_id: u32) {
        let mut lru = self.lru.borrow_mut();
        lru.retain(|id| *id != page_id);
        lru.push_back(page_id);
    }
}

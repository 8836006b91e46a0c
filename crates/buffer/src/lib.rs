//! Buffer pool manager for page-level caching and I/O.
//!
//! The buffer pool sits between the disk store and the tree layer,
//! providing:
//! - a fixed set of in-memory frames with clock-sweep victim selection
//! - lazy loading and eviction with automatic dirty page write-back
//! - a page table mapping resident page IDs to frames
//!
//! # Example
//!
//! ```no_run
//! use buffer::{BufferPool, BufferPoolManager};
//! use storage::DiskStore;
//!
//! let disk = DiskStore::open("/tmp/index.heap").unwrap();
//! let mut manager = BufferPoolManager::new(disk, BufferPool::new(100));
//!
//! // Allocate a new page and populate it.
//! let (page_id, buffer) = manager.create_page().unwrap();
//! buffer.data[0] = 42;
//!
//! // Fetch it back and flush everything to disk.
//! let buffer = manager.fetch_page(page_id).unwrap();
//! assert_eq!(buffer.data[0], 42);
//! manager.flush().unwrap();
//! ```
//!
//! A handle returned by [`BufferPoolManager::fetch_page`] or
//! [`BufferPoolManager::create_page`] is a `&mut` borrow of the frame, so it
//! cannot outlive the next manager call; eviction can never invalidate a
//! live handle.


use common::{IndexResult, PageId};
use hashbrown::HashMap;
use storage::{DiskStore, PAGE_SIZE};

/// A cached page: its ID, its block content, and whether the content has
/// diverged from disk.
#[derive(Debug)]
pub struct Buffer {
    pub page_id: PageId,
    pub data: Vec<u8>,
    pub is_dirty: bool,
}

/// One slot of the pool. `usage_count` is a decaying reference frequency:
/// bumped on every table hit, decremented by the sweep.
#[derive(Debug, Default)]
struct Frame {
    usage_count: u32,
    buffer: Option<Buffer>,
}

/// Fixed array of frames with a clock-sweep cursor.
#[derive(Debug)]
pub struct BufferPool {
    frames: Vec<Frame>,
    next_victim_id: usize,
}

impl BufferPool {
    /// Create a pool of `pool_size` empty frames.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self {
            frames: (0..pool_size).map(|_| Frame::default()).collect(),
            next_victim_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Clock sweep with a single decrement step: return the first frame whose
    /// `usage_count` is 0, leaving the cursor on it for the caller to
    /// overwrite; decrement and advance otherwise. Terminates because every
    /// full pass strictly decreases the remaining counts.
    fn evict(&mut self) -> usize {
        loop {
            let frame = &mut self.frames[self.next_victim_id];
            if frame.usage_count == 0 {
                return self.next_victim_id;
            }
            frame.usage_count -= 1;
            self.next_victim_id = (self.next_victim_id + 1) % self.frames.len();
        }
    }
}

/// Page-ID to frame indirection over a [`DiskStore`] and a [`BufferPool`].
///
/// Owns both exclusively. Dirty pages reach disk on eviction or on
/// [`flush`](Self::flush); nothing is written eagerly.
#[derive(Debug)]
pub struct BufferPoolManager {
    disk: DiskStore,
    pool: BufferPool,
    page_table: HashMap<PageId, usize>,
}

impl BufferPoolManager {
    pub fn new(disk: DiskStore, pool: BufferPool) -> Self {
        Self {
            disk,
            pool,
            page_table: HashMap::new(),
        }
    }

    /// Fetch a page, reading it from disk on a cache miss.
    ///
    /// A hit bumps the frame's usage count; a miss evicts a victim frame
    /// (writing it back if dirty) and installs a clean buffer in its place.
    pub fn fetch_page(&mut self, page_id: PageId) -> IndexResult<&mut Buffer> {
        if let Some(&idx) = self.page_table.get(&page_id) {
            let frame = &mut self.pool.frames[idx];
            frame.usage_count += 1;
            return Ok(frame.buffer.as_mut().expect("resident frame holds a buffer"));
        }

        let idx = self.pool.evict();
        let evicted = self.write_back(idx)?;
        let data = self.disk.read_page(page_id)?;

        let frame = &mut self.pool.frames[idx];
        frame.buffer = Some(Buffer {
            page_id,
            data,
            is_dirty: false,
        });
        frame.usage_count = 1;

        if let Some(old) = evicted {
            self.page_table.remove(&old);
        }
        self.page_table.insert(page_id, idx);

        Ok(self.pool.frames[idx]
            .buffer
            .as_mut()
            .expect("frame was just installed"))
    }

    /// Allocate a fresh page and install a zeroed buffer for it.
    ///
    /// The new buffer starts dirty so the page is persisted even if the
    /// caller never touches it.
    pub fn create_page(&mut self) -> IndexResult<(PageId, &mut Buffer)> {
        let idx = self.pool.evict();
        let evicted = self.write_back(idx)?;
        let page_id = self.disk.allocate_page();

        let frame = &mut self.pool.frames[idx];
        frame.buffer = Some(Buffer {
            page_id,
            data: vec![0u8; PAGE_SIZE],
            is_dirty: true,
        });
        frame.usage_count = 1;

        if let Some(old) = evicted {
            self.page_table.remove(&old);
        }
        self.page_table.insert(page_id, idx);

        let buffer = self.pool.frames[idx]
            .buffer
            .as_mut()
            .expect("frame was just installed");
        Ok((page_id, buffer))
    }

    /// Write every resident dirty page to disk and mark it clean.
    pub fn flush(&mut self) -> IndexResult<()> {
        for (&page_id, &idx) in self.page_table.iter() {
            if let Some(buffer) = self.pool.frames[idx].buffer.as_mut()
                && buffer.is_dirty
            {
                self.disk.write_page(page_id, &buffer.data)?;
                buffer.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Surrender the wrapped store and pool, e.g. to rebuild a manager over
    /// the same heap file.
    pub fn into_parts(self) -> (DiskStore, BufferPool) {
        (self.disk, self.pool)
    }

    /// Write the frame's buffer back to disk if dirty. Returns the page ID
    /// the frame held, if any, so the caller can drop its table entry.
    fn write_back(&mut self, idx: usize) -> IndexResult<Option<PageId>> {
        match &self.pool.frames[idx].buffer {
            Some(buffer) if buffer.is_dirty => {
                self.disk.write_page(buffer.page_id, &buffer.data)?;
                Ok(Some(buffer.page_id))
            }
            Some(buffer) => Ok(Some(buffer.page_id)),
            None => Ok(None),
        }
    }
}

//! Disk-backed B+tree index over fixed-width binary keys and values.
//!
//! The tree stores its nodes in 4096-byte pages cached by a
//! [`BufferPoolManager`] and supports insertion and membership tests.
//! Keys are ordered by unsigned byte comparison. Tree identity (root page,
//! key and value widths) is not persisted; a caller reopening an existing
//! heap file supplies it out-of-band.
//!
//! # Example
//!
//! ```no_run
//! use btree::BTree;
//! use common::Config;
//!
//! let config = Config::builder()
//!     .heap_path("/tmp/index.heap".into())
//!     .key_size(16)
//!     .value_size(8)
//!     .build();
//!
//! let mut tree = BTree::open(&config).unwrap();
//! assert!(tree.add(&[1u8; 16], &[7u8; 8]).unwrap());
//! assert!(tree.contains(&[1u8; 16]).unwrap());
//! tree.flush().unwrap();
//! ```

mod node;

pub use node::{is_leaf, InnerNode, LeafNode};

use buffer::{BufferPool, BufferPoolManager};
use common::{Config, IndexError, IndexResult, PageId};
use storage::DiskStore;

/// A split that bubbled up from a child: the freshly allocated left sibling
/// and the separator key the parent must route on. Keys `<= key` live under
/// `page_id`.
struct SplitEntry {
    page_id: PageId,
    key: Vec<u8>,
}

/// A persistent B+tree mapping fixed-width keys to fixed-width values.
///
/// Duplicate keys are rejected; there is no deletion. The tree owns its
/// buffer pool manager exclusively, so all operations take `&mut self`.
#[derive(Debug)]
pub struct BTree {
    manager: BufferPoolManager,
    root_page_id: PageId,
    key_size: usize,
    value_size: usize,
}

impl BTree {
    /// Create a fresh tree: allocates one empty leaf and records it as the
    /// root.
    pub fn create(
        mut manager: BufferPoolManager,
        key_size: usize,
        value_size: usize,
    ) -> IndexResult<Self> {
        validate_widths(key_size, value_size)?;
        let (root_page_id, buffer) = manager.create_page()?;
        buffer.data = LeafNode::empty(key_size, value_size).emit();

        Ok(Self {
            manager,
            root_page_id,
            key_size,
            value_size,
        })
    }

    /// Adopt an existing tree rooted at `root_page_id`. The widths must
    /// match the ones the tree was built with; they are not stored on disk.
    pub fn with_root(
        manager: BufferPoolManager,
        key_size: usize,
        value_size: usize,
        root_page_id: PageId,
    ) -> IndexResult<Self> {
        validate_widths(key_size, value_size)?;
        Ok(Self {
            manager,
            root_page_id,
            key_size,
            value_size,
        })
    }

    /// Wire up a disk store, buffer pool, and manager from `config`, then
    /// create a tree or adopt the configured root.
    pub fn open(config: &Config) -> IndexResult<Self> {
        let disk = DiskStore::open(&config.heap_path)?;
        let manager = BufferPoolManager::new(disk, BufferPool::new(config.pool_size));
        match config.root_page_id {
            Some(root) => {
                Self::with_root(manager, config.key_size, config.value_size, PageId(root))
            }
            None => Self::create(manager, config.key_size, config.value_size),
        }
    }

    /// The current root page. Callers must retain this across restarts to
    /// reopen the tree.
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Membership test for `key`.
    pub fn contains(&mut self, key: &[u8]) -> IndexResult<bool> {
        self.check_key(key)?;

        let mut page_id = self.root_page_id;
        loop {
            let buffer = self.manager.fetch_page(page_id)?;
            if is_leaf(&buffer.data) {
                let leaf = LeafNode::parse(&buffer.data, self.key_size, self.value_size);
                let index = leaf.keys.partition_point(|k| k.as_slice() < key);
                return Ok(index < leaf.keys.len() && leaf.keys[index] == key);
            }
            let inner = InnerNode::parse(&buffer.data, self.key_size);
            let index = inner.keys.partition_point(|k| k.as_slice() < key);
            page_id = inner.children[index];
        }
    }

    /// Insert `key -> value`. Returns `false` without modifying the tree if
    /// the key is already present.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> IndexResult<bool> {
        self.check_key(key)?;
        self.check_value(value)?;
        if self.contains(key)? {
            return Ok(false);
        }

        if let Some(split) = self.add_rec(self.root_page_id, key, value)? {
            self.grow_root(split)?;
        }
        Ok(true)
    }

    /// Write every buffered dirty page to disk.
    pub fn flush(&mut self) -> IndexResult<()> {
        self.manager.flush()
    }

    /// Surrender the buffer pool manager, e.g. to reopen the tree later via
    /// [`BTree::with_root`].
    pub fn into_manager(self) -> BufferPoolManager {
        self.manager
    }

    /// Recursive descent for insertion. Returns the split entry the caller
    /// must record if the page at `page_id` overflowed.
    fn add_rec(
        &mut self,
        page_id: PageId,
        key: &[u8],
        value: &[u8],
    ) -> IndexResult<Option<SplitEntry>> {
        let buffer = self.manager.fetch_page(page_id)?;

        if is_leaf(&buffer.data) {
            let mut leaf = LeafNode::parse(&buffer.data, self.key_size, self.value_size);
            let index = leaf.keys.partition_point(|k| k.as_slice() < key);
            leaf.keys.insert(index, key.to_vec());
            leaf.values.insert(index, value.to_vec());
            self.write_leaf(page_id, &leaf)?;
            return self.split_leaf(leaf, page_id);
        }

        let mut inner = InnerNode::parse(&buffer.data, self.key_size);
        let index = inner.keys.partition_point(|k| k.as_slice() < key);
        let child = inner.children[index];

        if let Some(entry) = self.add_rec(child, key, value)? {
            inner.keys.insert(index, entry.key);
            inner.children.insert(index, entry.page_id);
            self.write_inner(page_id, &inner)?;
            return self.split_inner(inner, page_id);
        }
        Ok(None)
    }

    /// Split a leaf that has reached capacity. The lower half of its cells
    /// moves into a new left sibling, which is spliced into the leaf chain;
    /// the separator is the sibling's (still present) last key.
    fn split_leaf(&mut self, mut leaf: LeafNode, page_id: PageId) -> IndexResult<Option<SplitEntry>> {
        if leaf.keys.len() != leaf.max_key_count() {
            return Ok(None);
        }

        let mid = leaf.max_key_count() / 2;
        let (new_page_id, _) = self.manager.create_page()?;

        let mut lower = LeafNode::empty(self.key_size, self.value_size);
        lower.keys = leaf.keys.drain(..mid).collect();
        lower.values = leaf.values.drain(..mid).collect();

        if let Some(prev_id) = leaf.prev_page_id {
            let buffer = self.manager.fetch_page(prev_id)?;
            let mut prev = LeafNode::parse(&buffer.data, self.key_size, self.value_size);
            prev.next_page_id = Some(new_page_id);
            buffer.data = prev.emit();
            buffer.is_dirty = true;
            lower.prev_page_id = Some(prev_id);
        }
        lower.next_page_id = Some(page_id);
        leaf.prev_page_id = Some(new_page_id);

        let key = lower
            .keys
            .last()
            .cloned()
            .ok_or_else(|| IndexError::Tree("split produced an empty lower leaf".into()))?;

        self.write_leaf(page_id, &leaf)?;
        self.write_leaf(new_page_id, &lower)?;

        Ok(Some(SplitEntry {
            page_id: new_page_id,
            key,
        }))
    }

    /// Split an inner node that has reached capacity. The lower half of its
    /// keys and children moves into a new left sibling; the separator is
    /// removed from the sibling and handed to the parent, so both halves
    /// keep one more child than keys.
    fn split_inner(
        &mut self,
        mut inner: InnerNode,
        page_id: PageId,
    ) -> IndexResult<Option<SplitEntry>> {
        if inner.keys.len() != inner.max_key_count() {
            return Ok(None);
        }

        let mid = inner.max_key_count() / 2;
        let (new_page_id, _) = self.manager.create_page()?;

        let mut lower = InnerNode::empty(self.key_size);
        lower.keys = inner.keys.drain(..mid).collect();
        lower.children = inner.children.drain(..mid).collect();

        let key = lower
            .keys
            .pop()
            .ok_or_else(|| IndexError::Tree("split produced an empty lower node".into()))?;

        self.write_inner(page_id, &inner)?;
        self.write_inner(new_page_id, &lower)?;

        Ok(Some(SplitEntry {
            page_id: new_page_id,
            key,
        }))
    }

    /// A root split allocates a fresh inner root routing between the new
    /// left sibling and the old root.
    fn grow_root(&mut self, split: SplitEntry) -> IndexResult<()> {
        let mut root = InnerNode::empty(self.key_size);
        root.keys.push(split.key);
        root.children.push(split.page_id);
        root.children.push(self.root_page_id);

        let (new_root_id, buffer) = self.manager.create_page()?;
        buffer.data = root.emit();
        self.root_page_id = new_root_id;
        Ok(())
    }

    fn write_leaf(&mut self, page_id: PageId, leaf: &LeafNode) -> IndexResult<()> {
        let buffer = self.manager.fetch_page(page_id)?;
        buffer.data = leaf.emit();
        buffer.is_dirty = true;
        Ok(())
    }

    fn write_inner(&mut self, page_id: PageId, inner: &InnerNode) -> IndexResult<()> {
        let buffer = self.manager.fetch_page(page_id)?;
        buffer.data = inner.emit();
        buffer.is_dirty = true;
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> IndexResult<()> {
        if key.len() != self.key_size {
            return Err(IndexError::KeySize {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> IndexResult<()> {
        if value.len() != self.value_size {
            return Err(IndexError::ValueSize {
                expected: self.value_size,
                actual: value.len(),
            });
        }
        Ok(())
    }
}

/// Splits move the lower half of a node into a new sibling, so both node
/// kinds must fit at least two cells per page.
fn validate_widths(key_size: usize, value_size: usize) -> IndexResult<()> {
    if key_size == 0 {
        return Err(IndexError::Tree("key_size must be nonzero".into()));
    }
    let leaf_capacity = LeafNode::empty(key_size, value_size).max_key_count();
    if leaf_capacity < 2 {
        return Err(IndexError::Tree(format!(
            "key_size {key_size} + value_size {value_size} leaves room for {leaf_capacity} \
             cells per leaf, need at least 2"
        )));
    }
    let inner_capacity = InnerNode::empty(key_size).max_key_count();
    if inner_capacity < 2 {
        return Err(IndexError::Tree(format!(
            "key_size {key_size} leaves room for {inner_capacity} cells per inner node, \
             need at least 2"
        )));
    }
    Ok(())
}

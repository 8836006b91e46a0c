//! On-disk byte layouts for the two node kinds.
//!
//! A block is interpreted as a leaf or an inner node depending on bit 0 of
//! its flags byte. Parsing materializes an owned view; emission produces a
//! fresh zeroed block with every field written back in place. All multi-byte
//! integers are big-endian.

use byteorder::{BigEndian, ByteOrder};
use common::PageId;
use storage::PAGE_SIZE;

const LEAF_BIT: u8 = 0b0000_0001;
const PREV_BIT: u8 = 0b0000_0010;
const NEXT_BIT: u8 = 0b0000_0100;

/// Sibling and child references are 4-byte big-endian on disk.
const PAGE_ID_SIZE: usize = 4;

/// Node-kind discriminator for a raw block.
pub fn is_leaf(page: &[u8]) -> bool {
    (page[0] & LEAF_BIT) == LEAF_BIT
}

/// Leaf block layout:
///
/// ```text
/// 0            1              5              9           13
/// +------------+--------------+--------------+-----------+----------------+
/// | flags      | prev page id | next page id | key count | cells…         |
/// +------------+--------------+--------------+-----------+----------------+
/// ```
///
/// Each cell is `key || value`; cells are concatenated without padding and
/// sorted ascending by unsigned byte comparison of the key. Leaves form a
/// doubly-linked list in key order; the prev/next fields are valid only when
/// the matching flag bit is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    key_size: usize,
    value_size: usize,
    pub prev_page_id: Option<PageId>,
    pub next_page_id: Option<PageId>,
    pub keys: Vec<Vec<u8>>,
    pub values: Vec<Vec<u8>>,
}

impl LeafNode {
    const PREV_BEGIN: usize = 1;
    const NEXT_BEGIN: usize = 5;
    const KEY_COUNT_BEGIN: usize = 9;
    pub const CELL_BEGIN: usize = 13;

    pub fn empty(key_size: usize, value_size: usize) -> Self {
        Self {
            key_size,
            value_size,
            prev_page_id: None,
            next_page_id: None,
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Materialize a view from a leaf block. Reads exactly `key_count`
    /// cells; trailing bytes are ignored.
    pub fn parse(page: &[u8], key_size: usize, value_size: usize) -> Self {
        debug_assert!(is_leaf(page));
        let flags = page[0];

        let prev_page_id = if flags & PREV_BIT != 0 {
            Some(read_page_id(page, Self::PREV_BEGIN))
        } else {
            None
        };
        let next_page_id = if flags & NEXT_BIT != 0 {
            Some(read_page_id(page, Self::NEXT_BEGIN))
        } else {
            None
        };

        let key_count = BigEndian::read_u32(&page[Self::KEY_COUNT_BEGIN..]) as usize;
        let mut keys = Vec::with_capacity(key_count);
        let mut values = Vec::with_capacity(key_count);
        let mut begin = Self::CELL_BEGIN;
        for _ in 0..key_count {
            keys.push(page[begin..begin + key_size].to_vec());
            values.push(page[begin + key_size..begin + key_size + value_size].to_vec());
            begin += key_size + value_size;
        }

        Self {
            key_size,
            value_size,
            prev_page_id,
            next_page_id,
            keys,
            values,
        }
    }

    /// Serialize into a fresh zeroed block. The flags byte is ORed in last.
    pub fn emit(&self) -> Vec<u8> {
        let mut page = vec![0u8; PAGE_SIZE];
        let mut flags = LEAF_BIT;

        if let Some(prev) = self.prev_page_id {
            write_page_id(&mut page, Self::PREV_BEGIN, prev);
            flags |= PREV_BIT;
        }
        if let Some(next) = self.next_page_id {
            write_page_id(&mut page, Self::NEXT_BEGIN, next);
            flags |= NEXT_BIT;
        }
        BigEndian::write_u32(&mut page[Self::KEY_COUNT_BEGIN..], self.keys.len() as u32);

        let mut begin = Self::CELL_BEGIN;
        for (key, value) in self.keys.iter().zip(self.values.iter()) {
            page[begin..begin + self.key_size].copy_from_slice(key);
            page[begin + self.key_size..begin + self.key_size + self.value_size]
                .copy_from_slice(value);
            begin += self.key_size + self.value_size;
        }

        page[0] |= flags;
        page
    }

    pub fn max_key_count(&self) -> usize {
        (PAGE_SIZE - Self::CELL_BEGIN) / (self.key_size + self.value_size)
    }
}

/// Inner block layout:
///
/// ```text
/// 0            1           5
/// +------------+-----------+---------------------------------------+
/// | flags      | key count | child[0], key[0], child[1], key[1], … |
/// +------------+-----------+---------------------------------------+
/// ```
///
/// An inner node holds `k` keys and `k + 1` children: `child[i]` sits at the
/// start of cell `i`, so `child[k]` occupies the child slot of the cell one
/// past the last key. For key `K[i]`, every key under `child[i]` compares
/// `<= K[i]` and every key under `child[i + 1]` compares `> K[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerNode {
    key_size: usize,
    pub keys: Vec<Vec<u8>>,
    pub children: Vec<PageId>,
}

impl InnerNode {
    const KEY_COUNT_BEGIN: usize = 1;
    pub const CELL_BEGIN: usize = 5;

    pub fn empty(key_size: usize) -> Self {
        Self {
            key_size,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Materialize a view from an inner block: `key_count` keys and
    /// `key_count + 1` children. Trailing bytes are ignored.
    pub fn parse(page: &[u8], key_size: usize) -> Self {
        debug_assert!(!is_leaf(page));
        let key_count = BigEndian::read_u32(&page[Self::KEY_COUNT_BEGIN..]) as usize;
        let stride = PAGE_ID_SIZE + key_size;

        let mut keys = Vec::with_capacity(key_count);
        let mut begin = Self::CELL_BEGIN + PAGE_ID_SIZE;
        for _ in 0..key_count {
            keys.push(page[begin..begin + key_size].to_vec());
            begin += stride;
        }

        let mut children = Vec::with_capacity(key_count + 1);
        let mut begin = Self::CELL_BEGIN;
        for _ in 0..key_count + 1 {
            children.push(read_page_id(page, begin));
            begin += stride;
        }

        Self {
            key_size,
            keys,
            children,
        }
    }

    /// Serialize into a fresh zeroed block, interleaving children and keys
    /// at their cell strides.
    pub fn emit(&self) -> Vec<u8> {
        let mut page = vec![0u8; PAGE_SIZE];
        let stride = PAGE_ID_SIZE + self.key_size;

        BigEndian::write_u32(&mut page[Self::KEY_COUNT_BEGIN..], self.keys.len() as u32);

        let mut begin = Self::CELL_BEGIN + PAGE_ID_SIZE;
        for key in &self.keys {
            page[begin..begin + self.key_size].copy_from_slice(key);
            begin += stride;
        }

        let mut begin = Self::CELL_BEGIN;
        for &child in &self.children {
            write_page_id(&mut page, begin, child);
            begin += stride;
        }

        page
    }

    pub fn max_key_count(&self) -> usize {
        (PAGE_SIZE - Self::CELL_BEGIN - PAGE_ID_SIZE) / (PAGE_ID_SIZE + self.key_size)
    }
}

fn read_page_id(page: &[u8], begin: usize) -> PageId {
    PageId(u64::from(BigEndian::read_u32(&page[begin..])))
}

fn write_page_id(page: &mut [u8], begin: usize, page_id: PageId) {
    BigEndian::write_u32(&mut page[begin..], page_id.0 as u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn be(i: u32, width: usize) -> Vec<u8> {
        let mut buf = vec![0u8; width];
        let raw = i.to_be_bytes();
        buf[width - raw.len()..].copy_from_slice(&raw);
        buf
    }

    #[test]
    fn empty_leaf_has_no_links_and_no_keys() {
        let leaf = LeafNode::empty(4, 4);
        assert_eq!(leaf.prev_page_id, None);
        assert_eq!(leaf.next_page_id, None);
        assert!(leaf.keys.is_empty());
        assert!(leaf.values.is_empty());

        let parsed = LeafNode::parse(&leaf.emit(), 4, 4);
        assert_eq!(parsed, leaf);
    }

    #[test]
    fn full_leaf_round_trips() {
        let mut leaf = LeafNode::empty(4, 4);
        for i in 0..leaf.max_key_count() as u32 {
            leaf.keys.push(be(2 * i, 4));
            leaf.values.push(be(i, 4));
        }
        leaf.prev_page_id = Some(PageId(2));
        leaf.next_page_id = Some(PageId(1));

        let parsed = LeafNode::parse(&leaf.emit(), 4, 4);
        assert_eq!(parsed, leaf);
    }

    #[test]
    fn leaf_capacity_matches_layout() {
        let leaf = LeafNode::empty(4, 4);
        assert_eq!(leaf.max_key_count(), (PAGE_SIZE - 13) / 8);

        let wide = LeafNode::empty(500, 100);
        assert_eq!(wide.max_key_count(), 6);
    }

    #[test]
    fn full_inner_round_trips() {
        let mut inner = InnerNode::empty(4);
        let max = inner.max_key_count() as u32;
        for i in 0..max {
            inner.keys.push(be(i, 4));
        }
        for i in 0..max + 1 {
            inner.children.push(PageId(u64::from(i)));
        }

        let parsed = InnerNode::parse(&inner.emit(), 4);
        assert_eq!(parsed, inner);
    }

    #[test]
    fn single_key_inner_round_trips() {
        // The shape of a freshly promoted root: one key, two children.
        let mut inner = InnerNode::empty(500);
        inner.keys.push(be(7, 500));
        inner.children.push(PageId(3));
        inner.children.push(PageId(1));

        let parsed = InnerNode::parse(&inner.emit(), 500);
        assert_eq!(parsed, inner);
    }

    #[test]
    fn inner_capacity_matches_layout() {
        let inner = InnerNode::empty(4);
        assert_eq!(inner.max_key_count(), (PAGE_SIZE - 5 - 4) / 8);

        let wide = InnerNode::empty(500);
        assert_eq!(wide.max_key_count(), 8);
    }

    #[test]
    fn flags_byte_discriminates_node_kinds() {
        let leaf = LeafNode::empty(8, 8).emit();
        assert!(is_leaf(&leaf));

        let mut inner = InnerNode::empty(8);
        inner.children.push(PageId(0));
        assert!(!is_leaf(&inner.emit()));
    }

    #[test]
    fn parse_ignores_trailing_bytes() {
        let mut leaf = LeafNode::empty(8, 8);
        leaf.keys.push(be(1, 8));
        leaf.values.push(be(10, 8));

        let mut page = leaf.emit();
        let used = LeafNode::CELL_BEGIN + 16;
        for byte in &mut page[used..] {
            *byte = 0xFF;
        }
        assert_eq!(LeafNode::parse(&page, 8, 8), leaf);
    }

    #[test]
    fn sibling_links_set_flag_bits() {
        let mut leaf = LeafNode::empty(8, 8);
        leaf.next_page_id = Some(PageId(9));
        let page = leaf.emit();

        assert_eq!(page[0] & PREV_BIT, 0);
        assert_ne!(page[0] & NEXT_BIT, 0);
        assert_eq!(LeafNode::parse(&page, 8, 8).next_page_id, Some(PageId(9)));
    }
}


use std::{io, path::PathBuf};
use thiserror::Error;

/// Logical identifier for a 4096-byte block in the heap file.
/// Examples:
/// - `let root = PageId(0);`
/// - `let leaf = PageId(42);`
/// - `let sibling = PageId(9001);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u64);

/// Canonical error type shared across index subsystems.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("buffer: {0}")]
    Buffer(String),
    #[error("tree: {0}")]
    Tree(String),
    #[error("key must be {expected} bytes, got {actual}")]
    KeySize { expected: usize, actual: usize },
    #[error("value must be {expected} bytes, got {actual}")]
    ValueSize { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries an `IndexError`.
pub type IndexResult<T> = Result<T, IndexError>;

/// Runtime configuration for opening an index.
///
/// Tree identity (root page, key and value widths) is not stored in the heap
/// file, so a caller reopening an existing tree must carry `root_page_id`
/// out-of-band and pass it back here.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .heap_path(PathBuf::from("./index.heap"))
///     .pool_size(128)
///     .key_size(16)
///     .value_size(8)
///     .build();
/// assert!(config.root_page_id.is_none());
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Path of the single heap file backing the index.
    pub heap_path: PathBuf,
    /// Number of pages the buffer pool keeps resident.
    #[builder(default = 256)]
    pub pool_size: usize,
    /// Fixed key width in bytes.
    pub key_size: usize,
    /// Fixed value width in bytes.
    pub value_size: usize,
    /// Root page of an existing tree; `None` creates a fresh one.
    pub root_page_id: Option<u64>,
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, IndexError, IndexResult, PageId};
}

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use common::{IndexError, IndexResult, PageId};

/// Fixed size of every block: the unit of disk I/O and cache residency.
pub const PAGE_SIZE: usize = 4096;

/// Block store over a single flat heap file.
///
/// Block `i` occupies bytes `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`. There is
/// no file header and no magic number; the file is nothing but blocks.
/// Page IDs are handed out monotonically and never reused.
#[derive(Debug)]
pub struct DiskStore {
    heap_file: File,
    next_page_id: u64,
}

impl DiskStore {
    /// Open a heap file, creating a zero-length one if absent.
    ///
    /// `next_page_id` is derived from the file length; a trailing partial
    /// block is tolerated and logically ignored.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let heap_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = heap_file.metadata()?.len();
        Ok(Self {
            heap_file,
            next_page_id: file_len / PAGE_SIZE as u64,
        })
    }

    /// Hand out the next page ID. Does not touch the file; the block comes
    /// into existence on first write.
    pub fn allocate_page(&mut self) -> PageId {
        let page_id = PageId(self.next_page_id);
        self.next_page_id += 1;
        page_id
    }

    /// Number of pages allocated so far (also the next ID to be handed out).
    pub fn num_pages(&self) -> u64 {
        self.next_page_id
    }

    /// Write one full block at its fixed offset, extending the file with
    /// zero-filled holes if the write lands past the current end.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> IndexResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(IndexError::Storage(format!(
                "page {} write must be {} bytes, got {}",
                page_id.0,
                PAGE_SIZE,
                data.len()
            )));
        }
        self.heap_file
            .seek(SeekFrom::Start(page_id.0 * PAGE_SIZE as u64))?;
        self.heap_file.write_all(data)?;
        Ok(())
    }

    /// Read one full block. An allocated-but-never-written page (or the
    /// zero-filled tail of a short file) reads as an all-zero block.
    pub fn read_page(&mut self, page_id: PageId) -> IndexResult<Vec<u8>> {
        self.heap_file
            .seek(SeekFrom::Start(page_id.0 * PAGE_SIZE as u64))?;

        let mut data = vec![0u8; PAGE_SIZE];
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = self.heap_file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests;

use super::*;
use tempfile::tempdir;

fn page_of(text: &str) -> Vec<u8> {
    let mut data = vec![0u8; PAGE_SIZE];
    data[..text.len()].copy_from_slice(text.as_bytes());
    data
}

#[test]
fn allocate_hands_out_sequential_ids() {
    let dir = tempdir().unwrap();
    let mut disk = DiskStore::open(dir.path().join("index.heap")).unwrap();

    assert_eq!(disk.allocate_page(), PageId(0));
    assert_eq!(disk.allocate_page(), PageId(1));
    assert_eq!(disk.allocate_page(), PageId(2));
    assert_eq!(disk.num_pages(), 3);
}

#[test]
fn write_and_read_round_trip() {
    let dir = tempdir().unwrap();
    let mut disk = DiskStore::open(dir.path().join("index.heap")).unwrap();

    let hello_id = disk.allocate_page();
    disk.write_page(hello_id, &page_of("hello")).unwrap();

    let world_id = disk.allocate_page();
    disk.write_page(world_id, &page_of("world")).unwrap();

    assert_eq!(disk.read_page(hello_id).unwrap(), page_of("hello"));
    assert_eq!(disk.read_page(world_id).unwrap(), page_of("world"));
}

#[test]
fn never_written_page_reads_as_zeros() {
    let dir = tempdir().unwrap();
    let mut disk = DiskStore::open(dir.path().join("index.heap")).unwrap();

    let id = disk.allocate_page();
    assert_eq!(disk.read_page(id).unwrap(), vec![0u8; PAGE_SIZE]);
}

#[test]
fn write_past_end_leaves_zero_filled_holes() {
    let dir = tempdir().unwrap();
    let mut disk = DiskStore::open(dir.path().join("index.heap")).unwrap();

    let _skipped = disk.allocate_page();
    let far = disk.allocate_page();
    disk.write_page(far, &page_of("far")).unwrap();

    assert_eq!(disk.read_page(PageId(0)).unwrap(), vec![0u8; PAGE_SIZE]);
    assert_eq!(disk.read_page(far).unwrap(), page_of("far"));
}

#[test]
fn reopen_derives_next_page_id_from_file_length() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.heap");

    {
        let mut disk = DiskStore::open(&path).unwrap();
        for _ in 0..3 {
            let id = disk.allocate_page();
            disk.write_page(id, &page_of("x")).unwrap();
        }
    }

    let mut disk = DiskStore::open(&path).unwrap();
    assert_eq!(disk.num_pages(), 3);
    assert_eq!(disk.allocate_page(), PageId(3));
}

#[test]
fn trailing_partial_block_is_ignored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.heap");

    {
        let mut disk = DiskStore::open(&path).unwrap();
        let id = disk.allocate_page();
        disk.write_page(id, &page_of("whole")).unwrap();
    }
    // Grow the file by half a block.
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAB; PAGE_SIZE / 2]).unwrap();
    }

    let mut disk = DiskStore::open(&path).unwrap();
    assert_eq!(disk.num_pages(), 1);
    assert_eq!(disk.allocate_page(), PageId(1));
}

#[test]
fn short_write_is_rejected() {
    let dir = tempdir().unwrap();
    let mut disk = DiskStore::open(dir.path().join("index.heap")).unwrap();

    let id = disk.allocate_page();
    let err = disk.write_page(id, &[0u8; 16]).unwrap_err();
    assert!(matches!(err, IndexError::Storage(_)));
}

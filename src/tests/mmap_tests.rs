/*
 * Memory-Mapped File Tests
 *
 * Mapping validation, demand loading of file pages, dirty write-back
 * on munmap, idempotence, and teardown at exit.
 */

use alloc::sync::Arc;

use super::{boot_kernel, thread_stub};
use crate::fs::file::File;
use crate::memory::address_space::AddressSpace;
use crate::memory::mmap::{self, MmapError};
use crate::memory::{PAGE_SIZE, uaccess};
use crate::scheduler::{self, ThreadId};

const MAP_ADDR: u64 = 0x1000_0000;

fn spawn_process(name: &str) -> (ThreadId, Arc<AddressSpace>) {
    let tid = scheduler::spawn(thread_stub, name, 31);
    let space = Arc::new(AddressSpace::new());
    scheduler::attach_space(tid, space.clone());
    scheduler::yield_now();
    assert_eq!(scheduler::current_thread(), tid);
    (tid, space)
}

/// Create a file of `len` bytes and open it in the current process.
fn open_file(space: &Arc<AddressSpace>, len: u32) -> (u32, Arc<File>) {
    let inode = crate::fs::inode::create(len).unwrap();
    let file = File::open(inode);
    let fd = space.files.lock().open(file.clone());
    (fd, file)
}

#[test]
fn mmap_validates_its_arguments() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("mapper");
    let (fd, _file) = open_file(&space, 100);

    assert_eq!(mmap::mmap(0, MAP_ADDR), Err(MmapError::ConsoleFd));
    assert_eq!(mmap::mmap(1, MAP_ADDR), Err(MmapError::ConsoleFd));
    assert_eq!(mmap::mmap(99, MAP_ADDR), Err(MmapError::BadFd));
    assert_eq!(mmap::mmap(fd, 0), Err(MmapError::BadAddress));
    assert_eq!(mmap::mmap(fd, MAP_ADDR + 7), Err(MmapError::BadAddress));

    let (empty_fd, _empty) = open_file(&space, 0);
    assert_eq!(mmap::mmap(empty_fd, MAP_ADDR), Err(MmapError::EmptyFile));
}

#[test]
fn mmap_rejects_overlapping_ranges() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("mapper");

    let (fd_a, _a) = open_file(&space, 2 * PAGE_SIZE as u32);
    let (fd_b, _b) = open_file(&space, PAGE_SIZE as u32);

    mmap::mmap(fd_a, MAP_ADDR).unwrap();
    // Second page of the first mapping collides.
    assert_eq!(
        mmap::mmap(fd_b, MAP_ADDR + PAGE_SIZE as u64),
        Err(MmapError::Overlap)
    );
    // Below the data segment top is also rejected.
    space.set_data_top(0x2000_0000);
    assert_eq!(mmap::mmap(fd_b, 0x1800_0000), Err(MmapError::Overlap));
    // Disjoint and above: fine.
    assert!(mmap::mmap(fd_b, 0x3000_0000).is_ok());
}

#[test]
fn mapids_are_monotonic_per_process() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("mapper");
    let (fd_a, _a) = open_file(&space, 100);
    let (fd_b, _b) = open_file(&space, 100);

    let first = mmap::mmap(fd_a, MAP_ADDR).unwrap();
    let second = mmap::mmap(fd_b, MAP_ADDR + 0x10000).unwrap();
    assert_eq!(second, first + 1);
}

#[test]
fn mapped_pages_load_file_content_on_demand() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("reader");

    let (fd, file) = open_file(&space, 2 * PAGE_SIZE as u32);
    file.write_at(b"front", 0);
    file.write_at(b"back", PAGE_SIZE as u32);

    mmap::mmap(fd, MAP_ADDR).unwrap();
    // One supplemental entry per page, nothing resident yet.
    assert_eq!(space.spt.lock().len(), 2);
    assert_eq!(space.pagedir.lock().mapped_count(), 0);

    let mut buf = [0u8; 5];
    uaccess::user_read(MAP_ADDR, &mut buf).unwrap();
    assert_eq!(&buf, b"front");
    let mut buf = [0u8; 4];
    uaccess::user_read(MAP_ADDR + PAGE_SIZE as u64, &mut buf).unwrap();
    assert_eq!(&buf, b"back");

    // File pages keep their entries while resident (they re-evict to
    // the file, not to swap).
    assert_eq!(space.spt.lock().len(), 2);
    assert_eq!(space.pagedir.lock().mapped_count(), 2);
}

#[test]
fn munmap_writes_dirty_pages_back() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("writer");

    let (fd, _file) = open_file(&space, 2 * PAGE_SIZE as u32);
    let mapid = mmap::mmap(fd, MAP_ADDR).unwrap();

    uaccess::user_write(MAP_ADDR, b"X").unwrap();
    uaccess::user_write(MAP_ADDR + PAGE_SIZE as u64, b"Y").unwrap();

    mmap::munmap(mapid);
    assert_eq!(space.spt.lock().len(), 0);
    assert_eq!(space.pagedir.lock().mapped_count(), 0);

    // Reopen the file: the mapped writes are in it.
    let reopened = space.files.lock().get(fd).unwrap();
    let mut front = [0u8; 1];
    reopened.read_at(&mut front, 0);
    assert_eq!(&front, b"X");
    let mut back = [0u8; 1];
    reopened.read_at(&mut back, PAGE_SIZE as u32);
    assert_eq!(&back, b"Y");
}

#[test]
fn clean_mapped_pages_are_not_written_back() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("clean");

    let (fd, file) = open_file(&space, PAGE_SIZE as u32);
    file.write_at(b"pristine", 0);

    let mapid = mmap::mmap(fd, MAP_ADDR).unwrap();
    let mut buf = [0u8; 8];
    uaccess::user_read(MAP_ADDR, &mut buf).unwrap();
    assert_eq!(&buf, b"pristine");
    mmap::munmap(mapid);

    let mut back = [0u8; 8];
    file.read_at(&mut back, 0);
    assert_eq!(&back, b"pristine");
}

#[test]
fn munmap_is_idempotent() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("twice");

    let (fd, _file) = open_file(&space, 100);
    let mapid = mmap::mmap(fd, MAP_ADDR).unwrap();
    uaccess::user_write(MAP_ADDR, b"Z").unwrap();

    mmap::munmap(mapid);
    assert!(space.mmaps.lock().is_empty());

    // Second call on the consumed mapid returns without effect.
    mmap::munmap(mapid);
    assert!(space.mmaps.lock().is_empty());
}

#[test]
fn mapping_survives_closing_the_descriptor() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("closer");

    let (fd, _file) = open_file(&space, PAGE_SIZE as u32);
    let mapid = mmap::mmap(fd, MAP_ADDR).unwrap();

    // The mapping reopened the file, so closing the fd does not break
    // the pages.
    assert!(space.files.lock().close(fd));
    uaccess::user_write(MAP_ADDR, b"still here").unwrap();
    mmap::munmap(mapid);
}

#[test]
fn exit_unmaps_surviving_mappings() {
    let _k = boot_kernel(8);
    let (_tid, space) = spawn_process("leaver");

    let (fd, file) = open_file(&space, PAGE_SIZE as u32);
    mmap::mmap(fd, MAP_ADDR).unwrap();
    uaccess::user_write(MAP_ADDR, b"W").unwrap();

    scheduler::exit_current(0);

    assert!(space.mmaps.lock().is_empty());
    let mut out = [0u8; 1];
    file.read_at(&mut out, 0);
    assert_eq!(&out, b"W");
}

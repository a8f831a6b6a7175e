/*
 * User Address Space
 *
 * Per-process VM container: the page directory, the supplemental page
 * table, the mapped-file table, the open-file table, and the page-fault
 * semaphore that serializes fault handling against eviction of this
 * space's frames.
 *
 * The space is shared as an `Arc`: the frame table holds a reference
 * for every resident frame, so an eviction that races with the owner's
 * exit still has a live table to write its capture into.
 */

use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::fs::file::OpenFileTable;
use crate::memory::PHYS_BASE;
use crate::memory::mmap::MappedFileTable;
use crate::memory::page::SupplementalTable;
use crate::memory::pagedir::PageDir;
use crate::scheduler::sync::Semaphore;

pub struct AddressSpace {
    /// Installed virtual-to-frame mappings with dirty/accessed bits.
    pub pagedir: Mutex<PageDir>,
    /// Where each not-resident page lives.
    pub spt: Mutex<SupplementalTable>,
    /// Active memory-mapped files.
    pub mmaps: Mutex<MappedFileTable>,
    /// Open file descriptors (fds 0 and 1 are the console).
    pub files: Mutex<OpenFileTable>,
    /// Gates fault handling against eviction of this space's frames.
    pub sema_pf: Semaphore,

    /// Saved user stack pointer, consulted by the stack-growth
    /// heuristic in the fault handler.
    user_sp: AtomicU64,
    /// Top of the code/data segment; mappings below it are rejected.
    data_top: AtomicU64,
}

impl AddressSpace {
    pub fn new() -> Self {
        AddressSpace {
            pagedir: Mutex::new(PageDir::new()),
            spt: Mutex::new(SupplementalTable::new()),
            mmaps: Mutex::new(MappedFileTable::new()),
            files: Mutex::new(OpenFileTable::new()),
            sema_pf: Semaphore::new(1),
            user_sp: AtomicU64::new(PHYS_BASE),
            data_top: AtomicU64::new(0),
        }
    }

    pub fn user_sp(&self) -> u64 {
        self.user_sp.load(Ordering::SeqCst)
    }

    /// Record the user stack pointer at trap entry.
    pub fn set_user_sp(&self, sp: u64) {
        self.user_sp.store(sp, Ordering::SeqCst);
    }

    pub fn data_top(&self) -> u64 {
        self.data_top.load(Ordering::SeqCst)
    }

    /// Record the highest code/data segment address after load.
    pub fn set_data_top(&self, addr: u64) {
        self.data_top.store(addr, Ordering::SeqCst);
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

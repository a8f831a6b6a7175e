/*
 * Supplemental Page Table
 *
 * Per-process record of where each virtual page lives when it is not
 * resident. The page-fault handler consults it to load a page; the
 * frame table's eviction path extends it when an anonymous page moves
 * to swap.
 *
 * Entry kinds and their lifecycle:
 *
 *   Exec (read-only)  load from file, keep the entry   (rediscard on evict)
 *   Exec (writable)   load from file, DESTROY entry    (re-captured as Swap)
 *   File (mmap)       load from file, keep the entry   (dirty writes back)
 *   Swap              load from slot, DESTROY entry, free the slot
 *
 * A page has at most one entry per owner; together with the frame table
 * this gives the resident-xor-recorded invariant the fault handler
 * depends on.
 */

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::fs::file::File;
use crate::memory::swap::SwapSlot;
use crate::memory::{PAGE_SIZE, fault, frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Page of the executable image.
    Exec,
    /// Page of a memory-mapped file.
    File,
    /// Anonymous page stashed in a swap slot.
    Swap,
}

/// Where the bytes of a non-resident page live.
#[derive(Clone)]
pub enum PageLocation {
    File(Arc<File>),
    Swap(SwapSlot),
}

/// One supplemental entry.
#[derive(Clone)]
pub struct PageEntry {
    /// Base of the virtual page this entry describes.
    pub upage: u64,
    pub writable: bool,
    pub kind: PageKind,
    pub location: PageLocation,
    /// Offset within the backing file.
    pub ofs: u32,
    /// Bytes to read from the file; the rest of the page is zeros.
    pub read_bytes: u32,
    pub zero_bytes: u32,
}

/// Per-process supplemental page table.
pub struct SupplementalTable {
    entries: Vec<PageEntry>,
}

impl SupplementalTable {
    pub const fn new() -> Self {
        SupplementalTable {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, upage: u64) -> Option<&PageEntry> {
        self.entries.iter().find(|e| e.upage == upage)
    }

    pub fn push(&mut self, entry: PageEntry) {
        debug_assert!(
            self.find(entry.upage).is_none(),
            "duplicate supplemental entry for page {:#x}",
            entry.upage
        );
        self.entries.push(entry);
    }

    pub fn remove(&mut self, upage: u64) -> Option<PageEntry> {
        let pos = self.entries.iter().position(|e| e.upage == upage)?;
        Some(self.entries.remove(pos))
    }

    /// Record an evicted anonymous frame as a swap-backed page. Called
    /// by the eviction path with the victim owner's table locked.
    pub fn capture_frame(&mut self, upage: u64, writable: bool, slot: SwapSlot) {
        self.push(PageEntry {
            upage,
            writable,
            kind: PageKind::Swap,
            location: PageLocation::Swap(slot),
            ofs: 0,
            read_bytes: 0,
            zero_bytes: PAGE_SIZE as u32,
        });
    }

    /// Drain the table on process exit. Swap entries give their slots
    /// back; everything else is dropped.
    pub fn destroy(&mut self) {
        for entry in self.entries.drain(..) {
            if let PageLocation::Swap(slot) = entry.location {
                crate::memory::swap::free_slot(slot);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageEntry> {
        self.entries.iter()
    }
}

impl Default for SupplementalTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the page described by `entry` into a frame and map it in the
/// current thread's address space.
///
/// `entry` is a snapshot taken under the table lock; the lock is not
/// held across frame allocation (the eviction path acquires table locks
/// of its own). On success the consumed entry kinds (writable Exec,
/// Swap) are removed from the table.
pub fn load_page(
    space: &Arc<crate::memory::address_space::AddressSpace>,
    entry: &PageEntry,
) -> Result<(), fault::Fault> {
    let frame_id = frame::get_frame(entry.upage, entry.writable).map_err(|_| fault::kill_current())?;

    match (&entry.kind, &entry.location) {
        (PageKind::Exec | PageKind::File, PageLocation::File(file)) => {
            // The frame arrives zeroed, so only read_bytes need filling.
            if entry.zero_bytes != PAGE_SIZE as u32 {
                let mut buf = alloc::vec![0u8; entry.read_bytes as usize];
                let read = file.read_at(&mut buf, entry.ofs);
                if read != entry.read_bytes {
                    frame::remove(frame_id);
                    return Err(fault::kill_current());
                }
                frame::write_into(frame_id, 0, &buf);
            }
        }
        (PageKind::Swap, PageLocation::Swap(slot)) => {
            let mut buf = alloc::vec![0u8; PAGE_SIZE];
            if crate::memory::swap::read_swap(&mut buf, *slot).is_err() {
                frame::remove(frame_id);
                return Err(fault::kill_current());
            }
            frame::write_into(frame_id, 0, &buf);
        }
        _ => {
            // Kind/location mismatch means the table was corrupted.
            frame::remove(frame_id);
            panic!("supplemental entry kind does not match its location");
        }
    }

    if !space
        .pagedir
        .lock()
        .install(entry.upage, frame_id, entry.writable)
    {
        frame::remove(frame_id);
        return Err(fault::kill_current());
    }

    // Writable exec pages live on only as their in-memory image (the
    // stack image replaces them); swap entries are consumed with their
    // slot. Read-only exec and file pages persist for re-eviction.
    let consumed = matches!(entry.kind, PageKind::Swap)
        || (matches!(entry.kind, PageKind::Exec) && entry.writable);
    if consumed {
        space.spt.lock().remove(entry.upage);
    }

    frame::set_evictable(frame_id, true);
    Ok(())
}

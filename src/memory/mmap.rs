/*
 * Memory-Mapped Files
 *
 * mmap places a file's pages into a process's address space as
 * demand-loaded, writable supplemental entries; munmap writes dirty
 * resident pages back to the file and dissolves the mapping. The file
 * is reopened at map time so the mapping survives the user closing the
 * original descriptor.
 */

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use crate::fs::file::File;
use crate::memory::address_space::AddressSpace;
use crate::memory::page::{PageEntry, PageKind, PageLocation};
use crate::memory::{PAGE_SIZE, PHYS_BASE, fault, frame, page_round_up};
use crate::scheduler;

/// Mapping identifier, monotonic per process.
pub type Mapid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapError {
    /// fd 0 and 1 are the console and cannot be mapped.
    ConsoleFd,
    /// No open file behind the descriptor.
    BadFd,
    /// Zero-length file.
    EmptyFile,
    /// Address zero, unaligned, or outside user space.
    BadAddress,
    /// Range collides with an existing mapping or the data segment.
    Overlap,
}

/// One active mapping.
pub struct MappedFile {
    pub mapid: Mapid,
    pub file: Arc<File>,
    /// First mapped virtual address.
    pub addr: u64,
    /// Length of the mapping in bytes (the file length at map time).
    pub size: u32,
}

/// Per-process table of active mappings.
pub struct MappedFileTable {
    mappings: Vec<MappedFile>,
    next_mapid: Mapid,
}

impl MappedFileTable {
    pub const fn new() -> Self {
        MappedFileTable {
            mappings: Vec::new(),
            next_mapid: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    fn overlaps(&self, start: u64, end: u64) -> bool {
        self.mappings.iter().any(|m| {
            let m_start = m.addr;
            let m_end = m.addr + m.size as u64;
            start < m_end && end > m_start
        })
    }
}

/// Map the file behind `fd` at `addr` in the current address space.
pub fn mmap(fd: u32, addr: u64) -> Result<Mapid, MmapError> {
    let space = scheduler::current_space().ok_or(MmapError::BadFd)?;

    if fd == 0 || fd == 1 {
        return Err(MmapError::ConsoleFd);
    }
    let file = space.files.lock().get(fd).ok_or(MmapError::BadFd)?;

    let file_len = file.length();
    if file_len == 0 {
        return Err(MmapError::EmptyFile);
    }
    if addr == 0 || addr % PAGE_SIZE as u64 != 0 {
        return Err(MmapError::BadAddress);
    }

    let last_addr = page_round_up(addr + file_len as u64);
    if last_addr > PHYS_BASE {
        return Err(MmapError::BadAddress);
    }
    if addr < space.data_top() {
        return Err(MmapError::Overlap);
    }

    let mut mmaps = space.mmaps.lock();
    if mmaps.overlaps(addr, last_addr) {
        return Err(MmapError::Overlap);
    }

    // Independent handle: the mapping must survive close(fd).
    let mapped = file.reopen();

    let mut remaining = file_len;
    let mut upage = addr;
    let mut page_index = 0u32;
    let mut spt = space.spt.lock();
    while remaining > 0 {
        let read_bytes = remaining.min(PAGE_SIZE as u32);
        spt.push(PageEntry {
            upage,
            writable: true,
            kind: PageKind::File,
            location: PageLocation::File(mapped.clone()),
            ofs: page_index * PAGE_SIZE as u32,
            read_bytes,
            zero_bytes: PAGE_SIZE as u32 - read_bytes,
        });
        remaining -= read_bytes;
        upage += PAGE_SIZE as u64;
        page_index += 1;
    }
    drop(spt);

    let mapid = mmaps.next_mapid;
    mmaps.next_mapid += 1;
    mmaps.mappings.push(MappedFile {
        mapid,
        file: mapped,
        addr,
        size: file_len,
    });

    log::debug!("mmap fd {fd} at {addr:#x}, {file_len} bytes, mapid {mapid}");
    Ok(mapid)
}

/// Unmap `mapid`: write dirty resident pages back, release frames and
/// supplemental entries, close the mapping's file handle. Idempotent;
/// a consumed mapid is ignored.
pub fn munmap(mapid: Mapid) {
    let Some(space) = scheduler::current_space() else {
        return;
    };

    let mapping = {
        let mut mmaps = space.mmaps.lock();
        let pos = mmaps.mappings.iter().position(|m| m.mapid == mapid);
        match pos {
            Some(pos) => mmaps.mappings.remove(pos),
            None => return,
        }
    };
    unmap_mapping(&space, &mapping);
}

/// Tear down every surviving mapping. Called on process exit.
pub fn destroy_all(space: &Arc<AddressSpace>) {
    loop {
        let mapping = {
            let mut mmaps = space.mmaps.lock();
            match mmaps.mappings.pop() {
                Some(mapping) => mapping,
                None => break,
            }
        };
        unmap_mapping(space, &mapping);
    }
}

/// Shared teardown walk: per page, write back if resident and dirty,
/// unmap, free the frame and the supplemental entry.
fn unmap_mapping(space: &Arc<AddressSpace>, mapping: &MappedFile) {
    let mut remaining = mapping.size;
    let mut upage = mapping.addr;

    while remaining > 0 {
        let entry = space.spt.lock().find(upage).cloned();
        let Some(entry) = entry else {
            // Every page of a live mapping has its entry; losing one is
            // table corruption.
            panic!("mapped page {upage:#x} has no supplemental entry");
        };
        let write_bytes = entry.read_bytes;

        let resident = space.pagedir.lock().lookup(upage);
        if let Some(pte) = resident {
            if space.pagedir.lock().is_dirty(upage) {
                let mut buf = vec![0u8; write_bytes as usize];
                if !frame::read_from(pte.frame, 0, &mut buf) {
                    panic!("resident mapped page lost its frame");
                }
                let written = mapping.file.write_at(&buf, entry.ofs);
                if written != write_bytes {
                    fault::kill_current();
                    return;
                }
            }
            space.pagedir.lock().clear(upage);
            frame::remove(pte.frame);
        }
        space.spt.lock().remove(upage);

        remaining -= write_bytes;
        upage += PAGE_SIZE as u64;
    }

    mapping.file.close();
    log::debug!("unmapped mapid {} at {:#x}", mapping.mapid, mapping.addr);
}

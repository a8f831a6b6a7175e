/*
 * User Memory Access
 *
 * Byte-range access to the current process's user memory, the way the
 * syscall layer touches user buffers. Each page is translated through
 * the page directory; a missing translation raises a page fault and
 * retries, and the accessed/dirty bits are updated the way the paging
 * hardware would on a real reference.
 *
 * References at or above PHYS_BASE, writes through read-only mappings,
 * and unresolvable faults kill the thread with status -1.
 */

use crate::memory::fault::{self, Fault};
use crate::memory::{PHYS_BASE, frame, page_offset, page_round_down};
use crate::scheduler;

/// Copy `bytes` into user memory at `addr`.
pub fn user_write(addr: u64, bytes: &[u8]) -> Result<(), Fault> {
    access(addr, bytes.len(), true, |upage_off, range, frame_id| {
        frame::write_into(frame_id, upage_off, &bytes[range])
    })
}

/// Copy user memory at `addr` into `buf`.
pub fn user_read(addr: u64, buf: &mut [u8]) -> Result<(), Fault> {
    access(addr, buf.len(), false, |upage_off, range, frame_id| {
        frame::read_from(frame_id, upage_off, &mut buf[range])
    })
}

/// Walk the pages covering `[addr, addr + len)`, faulting them in as
/// needed, and hand each resident chunk to `copy`.
fn access(
    addr: u64,
    len: usize,
    write: bool,
    mut copy: impl FnMut(usize, core::ops::Range<usize>, frame::FrameId) -> bool,
) -> Result<(), Fault> {
    if len == 0 {
        return Ok(());
    }
    let Some(end) = addr.checked_add(len as u64) else {
        return Err(fault::kill_current());
    };
    if end > PHYS_BASE {
        return Err(fault::kill_current());
    }

    let mut cursor = addr;

    while cursor < end {
        let upage = page_round_down(cursor);
        let in_page = page_offset(cursor);
        let chunk = ((end - cursor) as usize).min(crate::memory::PAGE_SIZE - in_page);
        let range = (cursor - addr) as usize..(cursor - addr) as usize + chunk;

        let frame_id = translate(upage, cursor, write)?;
        if !copy(in_page, range, frame_id) {
            // The frame was evicted between translation and the copy;
            // fault it back in and retry this chunk.
            continue;
        }

        cursor += chunk as u64;
    }
    Ok(())
}

/// Resolve `upage` to a frame, faulting it in when absent. Updates the
/// accessed bit, and the dirty bit for writes, the way the MMU does.
fn translate(upage: u64, fault_addr: u64, write: bool) -> Result<frame::FrameId, Fault> {
    loop {
        let space = match scheduler::current_space() {
            Some(space) => space,
            None => return Err(fault::kill_current()),
        };

        let pte = space.pagedir.lock().lookup(upage);
        match pte {
            Some(pte) => {
                if write && !pte.flags.contains(crate::memory::pagedir::PteFlags::WRITABLE) {
                    return Err(fault::kill_current());
                }
                let mut pagedir = space.pagedir.lock();
                pagedir.set_accessed(upage, true);
                if write {
                    pagedir.set_dirty(upage, true);
                }
                return Ok(pte.frame);
            }
            None => {
                fault::handle_fault(fault_addr, write, true)?;
            }
        }
    }
}

/*
 * Frame Table
 *
 * Global table of user-pool frames. This is the only allocation entry
 * point for user pages: when the pool has room a zeroed frame is handed
 * out directly, and when it is exhausted a victim is evicted through
 * the enhanced second chance algorithm.
 *
 * EVICTION:
 * ========
 *
 * Starting at the clock cursor (bootstrapped to the least recently
 * accessed frame), each evictable frame is examined: an accessed frame
 * gets its accessed bit cleared and a second chance; an unaccessed one
 * becomes the victim. Non-evictable frames are skipped untouched. A
 * frame is non-evictable from the moment it is chosen until its new
 * owner finishes installing it.
 *
 * Where the victim's bytes go depends on the owner's supplemental
 * table: a file-backed page is written back to its file when dirty and
 * discarded otherwise; an anonymous page moves to a fresh swap slot,
 * recorded in the owner's table. Either way the owner's page-fault
 * semaphore is held around the unmap/write-back pair so the owner
 * cannot fault the same page mid-flight.
 *
 * Frames keep an Arc of their owner's address space, so an eviction
 * racing with owner exit still has a live table to write into; exit
 * leaves such in-flight (non-evictable) frames to be freed when the
 * eviction completes.
 */

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use crate::arena::{Arena, RawHandle};
use crate::interrupt;
use crate::memory::PAGE_SIZE;
use crate::memory::address_space::AddressSpace;
use crate::memory::page::{PageKind, PageLocation};
use crate::memory::swap::{self, SwapError};
use crate::scheduler::{self, ThreadId};

/// Frame identifier: generation-counted handle into the frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub(crate) RawHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Pool exhausted and no frame is evictable.
    OutOfMemory,
    /// The current thread has no user address space.
    NoAddressSpace,
}

/// One physical frame of the user pool.
pub struct Frame {
    pub owner: ThreadId,
    pub space: Arc<AddressSpace>,
    /// User virtual page this frame backs.
    pub upage: u64,
    pub writable: bool,
    /// False while the frame is being installed or evicted.
    pub evictable: bool,
    /// Tick of the last recorded access, for the cursor bootstrap.
    pub last_access: u64,
    data: Box<[u8]>,
}

struct FrameTable {
    frames: Arena<Frame>,
    /// Insertion-ordered frame list the clock hand sweeps.
    order: Vec<FrameId>,
    /// Clock cursor: position in `order`, None before bootstrap.
    cursor: Option<usize>,
    /// Size of the user pool in frames.
    capacity: usize,
}

static FRAME_TABLE: Mutex<Option<FrameTable>> = Mutex::new(None);

/// Initialize the frame table over a pool of `capacity` frames.
pub fn init(capacity: usize) {
    log::info!("frame table: user pool of {} frames", capacity);
    *FRAME_TABLE.lock() = Some(FrameTable {
        frames: Arena::new(),
        order: Vec::new(),
        cursor: None,
        capacity,
    });
}

/// Allocate a frame for `upage` in the current thread's address space.
///
/// Returns with the frame zeroed, owned by the caller and
/// `evictable == false`; the caller flips it evictable once the page
/// directory mapping is installed.
pub fn get_frame(upage: u64, writable: bool) -> Result<FrameId, FrameError> {
    let now = crate::utils::timer::now_ticks();
    let current = scheduler::current_thread();
    let space = scheduler::current_space().ok_or(FrameError::NoAddressSpace)?;

    loop {
        let mut guard = FRAME_TABLE.lock();
        let table = guard.as_mut().expect("frame table not initialized");

        // Room in the user pool: hand out a fresh zeroed frame.
        if table.frames.len() < table.capacity {
            let frame = Frame {
                owner: current,
                space: space.clone(),
                upage,
                writable,
                evictable: false,
                last_access: now,
                data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
            };
            let id = FrameId(table.frames.insert(frame));
            table.order.push(id);
            return Ok(id);
        }

        // Pool exhausted: evict.
        let victim = choose_victim(table).ok_or(FrameError::OutOfMemory)?;
        let (v_owner, v_space, v_upage, v_writable, v_data) = {
            let f = table.frames.get(victim.0).expect("victim frame vanished");
            (f.owner, f.space.clone(), f.upage, f.writable, f.data.clone())
        };

        // The owner's page-fault semaphore sits above the frame-table
        // lock in the lock order, so the table lock is released before
        // the semaphore is taken. The victim's non-evictable mark keeps
        // the clock hand off it while the table is unlocked.
        drop(guard);

        let entry = v_space.spt.lock().find(v_upage).cloned();

        // Hold the owner's page-fault semaphore across the unmap and
        // the write-back. Skipped when the victim is our own frame: the
        // fault path that brought us here already holds it.
        let gate = v_owner != current;
        if gate {
            v_space.sema_pf.down();
        }

        match entry {
            Some(entry) => {
                // File-backed page: write back when dirty, else rediscard.
                debug_assert!(
                    !matches!(entry.kind, PageKind::Swap),
                    "resident page recorded as swapped"
                );
                let dirty = interrupt::without_interrupts(|| {
                    let mut pagedir = v_space.pagedir.lock();
                    let dirty = pagedir.is_dirty(v_upage);
                    pagedir.clear(v_upage);
                    dirty
                });
                if dirty && v_writable {
                    if let PageLocation::File(file) = &entry.location {
                        let written =
                            file.write_at(&v_data[..entry.read_bytes as usize], entry.ofs);
                        if written != entry.read_bytes {
                            panic!(
                                "eviction write-back wrote {written} of {} bytes",
                                entry.read_bytes
                            );
                        }
                    }
                }
            }
            None => {
                // Anonymous page: stash in swap and record the slot in
                // the owner's supplemental table.
                v_space.pagedir.lock().clear(v_upage);
                let slot = match swap::write_swap(&v_data) {
                    Ok(slot) => slot,
                    Err(SwapError::Full) => panic!("swap partition overflows"),
                    Err(SwapError::Io) => panic!("swap partition I/O failure"),
                };
                v_space.spt.lock().capture_frame(v_upage, v_writable, slot);
            }
        }

        if gate {
            v_space.sema_pf.up();
        }

        // Re-acquire the table and re-validate the victim. The frame
        // was marked non-evictable, so the clock hand skipped it, and
        // owner teardown leaves non-evictable frames alone; if the
        // handle still fails to resolve, the frame is gone and the
        // allocation starts over.
        let mut guard = FRAME_TABLE.lock();
        let table = guard.as_mut().expect("frame table not initialized");
        if table.frames.get(victim.0).is_none() {
            continue;
        }

        // Reassign the frame to the caller under a fresh handle, so
        // stale references to the evicted mapping stop resolving. The
        // arena reuses the slot just freed, keeping the clock position
        // intact.
        let mut frame = table.frames.remove(victim.0).expect("victim frame vanished");
        debug_assert!(!frame.evictable);
        frame.data.fill(0);
        frame.owner = current;
        frame.space = space.clone();
        frame.upage = upage;
        frame.writable = writable;
        frame.last_access = now;
        let id = FrameId(table.frames.insert(frame));
        if let Some(slot) = table.order.iter_mut().find(|f| **f == victim) {
            *slot = id;
        }

        log::debug!("evicted a frame for page {upage:#x}");
        return Ok(id);
    }
}

/// Enhanced second chance over the insertion-ordered list. Marks the
/// chosen frame non-evictable and advances the cursor past it. Returns
/// None when no frame is evictable at all.
fn choose_victim(table: &mut FrameTable) -> Option<FrameId> {
    if table.order.is_empty() {
        return None;
    }
    let any_evictable = table
        .order
        .iter()
        .any(|id| table.frames.get(id.0).map(|f| f.evictable).unwrap_or(false));
    if !any_evictable {
        return None;
    }

    let mut pos = match table.cursor {
        Some(pos) if pos < table.order.len() => pos,
        _ => least_recently_accessed(table),
    };

    loop {
        let id = table.order[pos];
        let next = (pos + 1) % table.order.len();
        let frame = table.frames.get(id.0).expect("frame list out of sync");
        if frame.evictable {
            let mut pagedir = frame.space.pagedir.lock();
            if pagedir.is_accessed(frame.upage) {
                // Second chance: clear the bit and move on.
                pagedir.set_accessed(frame.upage, false);
            } else {
                drop(pagedir);
                table
                    .frames
                    .get_mut(id.0)
                    .expect("frame list out of sync")
                    .evictable = false;
                table.cursor = Some(next);
                return Some(id);
            }
        }
        pos = next;
    }
}

/// Position of the least-recently-accessed frame, ties broken by list
/// order. Bootstraps the clock cursor.
fn least_recently_accessed(table: &FrameTable) -> usize {
    let mut best = 0;
    let mut best_tick = u64::MAX;
    for (pos, id) in table.order.iter().enumerate() {
        if let Some(frame) = table.frames.get(id.0) {
            if frame.last_access < best_tick {
                best_tick = frame.last_access;
                best = pos;
            }
        }
    }
    best
}

/// Mark a frame eligible (or not) for eviction.
pub fn set_evictable(id: FrameId, evictable: bool) {
    let mut guard = FRAME_TABLE.lock();
    if let Some(table) = guard.as_mut() {
        if let Some(frame) = table.frames.get_mut(id.0) {
            frame.evictable = evictable;
        }
    }
}

/// Free one frame.
pub fn remove(id: FrameId) {
    let mut guard = FRAME_TABLE.lock();
    if let Some(table) = guard.as_mut() {
        remove_locked(table, id);
    }
}

fn remove_locked(table: &mut FrameTable, id: FrameId) {
    if table.frames.remove(id.0).is_none() {
        return;
    }
    if let Some(pos) = table.order.iter().position(|&f| f == id) {
        table.order.remove(pos);
        table.cursor = match table.cursor {
            _ if table.order.is_empty() => None,
            Some(cursor) if pos < cursor => Some(cursor - 1),
            Some(cursor) if cursor >= table.order.len() => Some(0),
            other => other,
        };
    }
}

/// Free every evictable frame owned by `tid`. Non-evictable frames are
/// mid-eviction under another thread and are left for that operation
/// to finish with.
pub fn remove_frames_of(tid: ThreadId) {
    let mut guard = FRAME_TABLE.lock();
    let Some(table) = guard.as_mut() else {
        return;
    };
    let owned: Vec<FrameId> = table
        .frames
        .iter()
        .filter(|(_, f)| f.owner == tid && f.evictable)
        .map(|(h, _)| FrameId(h))
        .collect();
    for id in owned {
        remove_locked(table, id);
    }
}

/// Clear the accessed bit of every resident page, aging the whole pool
/// one step for the clock hand.
pub fn update_accessed_bits() {
    let guard = FRAME_TABLE.lock();
    if let Some(table) = guard.as_ref() {
        for (_, frame) in table.frames.iter() {
            frame.space.pagedir.lock().set_accessed(frame.upage, false);
        }
    }
}

/// Copy `bytes` into a frame at `offset`. Returns false if the handle
/// is stale (the frame was evicted or freed).
pub fn write_into(id: FrameId, offset: usize, bytes: &[u8]) -> bool {
    let now = crate::utils::timer::now_ticks();
    let mut guard = FRAME_TABLE.lock();
    let Some(table) = guard.as_mut() else {
        return false;
    };
    match table.frames.get_mut(id.0) {
        Some(frame) => {
            frame.data[offset..offset + bytes.len()].copy_from_slice(bytes);
            frame.last_access = now;
            true
        }
        None => false,
    }
}

/// Copy out of a frame at `offset`. Returns false if the handle is
/// stale.
pub fn read_from(id: FrameId, offset: usize, buf: &mut [u8]) -> bool {
    let now = crate::utils::timer::now_ticks();
    let mut guard = FRAME_TABLE.lock();
    let Some(table) = guard.as_mut() else {
        return false;
    };
    match table.frames.get_mut(id.0) {
        Some(frame) => {
            buf.copy_from_slice(&frame.data[offset..offset + buf.len()]);
            frame.last_access = now;
            true
        }
        None => false,
    }
}

/// Owner of a frame, for diagnostics.
pub fn owner_of(id: FrameId) -> Option<ThreadId> {
    let guard = FRAME_TABLE.lock();
    guard.as_ref()?.frames.get(id.0).map(|f| f.owner)
}

/// (frames in use, pool capacity).
pub fn stats() -> (usize, usize) {
    let guard = FRAME_TABLE.lock();
    match guard.as_ref() {
        Some(table) => (table.frames.len(), table.capacity),
        None => (0, 0),
    }
}

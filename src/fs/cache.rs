/*
 * Buffered Block Cache
 *
 * Fixed 64-entry cache of disk sectors, keyed by (inode, sector-aligned
 * byte offset). Every file-content read and write goes through here.
 *
 * POLICIES:
 * ========
 *
 * - CLOCK REPLACEMENT: a cursor sweeps the entry list; an eligible
 *   entry (no accessors, evictable) that was accessed gets the bit
 *   cleared and a second chance, an unaccessed one is the victim.
 * - WRITE-BEHIND: dirty entries are written back in bulk every
 *   BFC_TICK_FREQ timer ticks, on file close (per inode), and at
 *   shutdown. Evicting a dirty victim writes it back first.
 * - READ-AHEAD: after a successful read, the next sector of the same
 *   file is pulled into the cache if it exists.
 *
 * LOCKING:
 * =======
 *
 * The cache-wide lock serializes every lookup and every mutation of
 * the entry list (including victim reassignment); the per-entry lock
 * serializes the data and flag bytes. An accessor count pins an entry
 * against eviction and bulk flushes while a copy is in flight. The
 * read-ahead path runs after all locks from the primary access are
 * released, so neither lock is ever taken recursively.
 */

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use lazy_static::lazy_static;
use spin::Mutex;

use crate::devices::block::SECTOR_SIZE;
use crate::fs::inode::{Inode, InodeId};

/// Number of cache entries.
pub const BUF_CACHE_SIZE: usize = 64;

/// Timer ticks between write-behind sweeps.
pub const BFC_TICK_FREQ: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// Sector translation failed: offset past the end of the file.
    PastEof,
    /// The disk rejected a transfer.
    Io,
}

struct BfcState {
    inode: Arc<Inode>,
    /// Sector-aligned byte offset within the file.
    offset: u32,
    data: [u8; SECTOR_SIZE],
    dirty: bool,
    accessed: bool,
}

struct BfcEntry {
    /// Threads mid-copy on this entry; nonzero pins it.
    accessors: AtomicU32,
    evictable: AtomicBool,
    state: Mutex<BfcState>,
}

struct BufferCache {
    entries: Vec<Arc<BfcEntry>>,
    /// Clock hand position.
    cursor: usize,
}

lazy_static! {
    static ref BUFFER_CACHE: Mutex<BufferCache> = Mutex::new(BufferCache {
        entries: Vec::with_capacity(BUF_CACHE_SIZE),
        cursor: 0,
    });
}

/// Ticks since the last write-behind sweep.
static BFC_TICK: AtomicU64 = AtomicU64::new(0);

/// Reset the cache to empty. Part of filesystem bring-up.
pub fn init() {
    let mut cache = BUFFER_CACHE.lock();
    cache.entries.clear();
    cache.cursor = 0;
    BFC_TICK.store(0, Ordering::SeqCst);
    log::info!("buffer cache: {} entries of {} bytes", BUF_CACHE_SIZE, SECTOR_SIZE);
}

/// Read up to one sector's worth of file content at `offset` into
/// `buf`. The caller chunks larger transfers.
pub fn read(inode: &Arc<Inode>, offset: u32, buf: &mut [u8]) -> Result<u32, CacheError> {
    let sector_ofs = offset as usize % SECTOR_SIZE;
    assert!(sector_ofs + buf.len() <= SECTOR_SIZE);
    let aligned = offset - sector_ofs as u32;

    let entry = match lookup(inode.id(), aligned) {
        Some(entry) => entry,
        None => fetch(inode, aligned)?,
    };

    entry.accessors.fetch_add(1, Ordering::SeqCst);
    {
        let mut state = entry.state.lock();
        buf.copy_from_slice(&state.data[sector_ofs..sector_ofs + buf.len()]);
        state.accessed = true;
    }
    entry.accessors.fetch_sub(1, Ordering::SeqCst);

    // Read-ahead: warm the next sector of the file. All locks from the
    // primary access are released by now.
    let next = aligned + SECTOR_SIZE as u32;
    if next < inode.length() && lookup(inode.id(), next).is_none() {
        let _ = fetch(inode, next);
    }

    Ok(buf.len() as u32)
}

/// Write up to one sector's worth of file content at `offset`.
pub fn write(inode: &Arc<Inode>, offset: u32, buf: &[u8]) -> Result<u32, CacheError> {
    let sector_ofs = offset as usize % SECTOR_SIZE;
    assert!(sector_ofs + buf.len() <= SECTOR_SIZE);
    let aligned = offset - sector_ofs as u32;

    let entry = match lookup(inode.id(), aligned) {
        Some(entry) => entry,
        None => fetch(inode, aligned)?,
    };

    entry.accessors.fetch_add(1, Ordering::SeqCst);
    {
        let mut state = entry.state.lock();
        state.data[sector_ofs..sector_ofs + buf.len()].copy_from_slice(buf);
        state.dirty = true;
        state.accessed = true;
    }
    entry.accessors.fetch_sub(1, Ordering::SeqCst);

    Ok(buf.len() as u32)
}

/// Find the entry for (inode, aligned offset), if cached.
fn lookup(inode: InodeId, aligned: u32) -> Option<Arc<BfcEntry>> {
    let cache = BUFFER_CACHE.lock();
    for entry in &cache.entries {
        let state = entry.state.lock();
        if state.inode.id() == inode && state.offset == aligned {
            drop(state);
            return Some(entry.clone());
        }
    }
    None
}

/// Bring (inode, aligned offset) into the cache, allocating a new entry
/// while fewer than BUF_CACHE_SIZE exist and evicting a clock victim
/// otherwise.
fn fetch(inode: &Arc<Inode>, aligned: u32) -> Result<Arc<BfcEntry>, CacheError> {
    let sector = inode.byte_to_sector(aligned).ok_or(CacheError::PastEof)?;
    let device = crate::fs::inode::device();

    let mut cache = BUFFER_CACHE.lock();

    // A racing fetch may have brought the sector in after our miss.
    for entry in &cache.entries {
        let state = entry.state.lock();
        if state.inode.id() == inode.id() && state.offset == aligned {
            drop(state);
            return Ok(entry.clone());
        }
    }

    let mut data = [0u8; SECTOR_SIZE];
    device
        .read_sector(sector, &mut data)
        .map_err(|_| CacheError::Io)?;

    if cache.entries.len() < BUF_CACHE_SIZE {
        let entry = Arc::new(BfcEntry {
            accessors: AtomicU32::new(0),
            evictable: AtomicBool::new(true),
            state: Mutex::new(BfcState {
                inode: inode.clone(),
                offset: aligned,
                data,
                dirty: false,
                accessed: false,
            }),
        });
        cache.entries.push(entry.clone());
        return Ok(entry);
    }

    let victim = select_victim(&mut cache);
    {
        let mut state = victim.state.lock();
        if state.dirty {
            // Write the victim back before its identity changes.
            let old_sector = state
                .inode
                .byte_to_sector(state.offset)
                .expect("cached sector no longer translates");
            device
                .write_sector(old_sector, &state.data)
                .map_err(|_| CacheError::Io)?;
        }
        state.inode = inode.clone();
        state.offset = aligned;
        state.data = data;
        state.dirty = false;
        state.accessed = false;
    }
    Ok(victim)
}

/// Clock sweep: eligible entries have no accessors and are evictable;
/// an accessed eligible entry loses the bit and survives one round.
fn select_victim(cache: &mut BufferCache) -> Arc<BfcEntry> {
    loop {
        let pos = cache.cursor;
        cache.cursor = (cache.cursor + 1) % cache.entries.len();

        let entry = &cache.entries[pos];
        if entry.accessors.load(Ordering::SeqCst) == 0 && entry.evictable.load(Ordering::SeqCst) {
            let mut state = entry.state.lock();
            if state.accessed {
                state.accessed = false;
            } else {
                drop(state);
                return entry.clone();
            }
        }
    }
}

/// Write one entry back to disk if dirty.
fn write_behind(entry: &BfcEntry) {
    let device = crate::fs::inode::device();
    let mut state = entry.state.lock();
    state.accessed = false;
    if !state.dirty {
        return;
    }
    let sector = state
        .inode
        .byte_to_sector(state.offset)
        .expect("cached sector no longer translates");
    if device.write_sector(sector, &state.data).is_err() {
        log::error!("write-behind failed for sector {sector}");
        return;
    }
    state.dirty = false;
}

/// Write every dirty entry back to disk. Pinned entries (accessor in
/// flight) are skipped; their writer flushes them on a later sweep.
pub fn flush_all() {
    let cache = BUFFER_CACHE.lock();
    for entry in &cache.entries {
        if entry.accessors.load(Ordering::SeqCst) > 0 {
            continue;
        }
        write_behind(entry);
    }
}

/// Write back every dirty entry belonging to one inode. Used on file
/// close and rename.
pub fn flush_inode(inode: InodeId) {
    let cache = BUFFER_CACHE.lock();
    for entry in &cache.entries {
        if entry.accessors.load(Ordering::SeqCst) > 0 {
            continue;
        }
        let is_target = {
            let state = entry.state.lock();
            state.inode.id() == inode && state.dirty
        };
        if is_target {
            write_behind(entry);
        }
    }
}

/// Flush everything and release the cache storage. After the flush no
/// dirty entry may remain; only then is the storage freed.
pub fn shutdown() {
    flush_all();
    let mut cache = BUFFER_CACHE.lock();
    debug_assert!(
        cache
            .entries
            .iter()
            .all(|entry| !entry.state.lock().dirty),
        "dirty entry survived the shutdown flush"
    );
    cache.entries.clear();
    cache.cursor = 0;
}

/// Timer-tick hook: every BFC_TICK_FREQ ticks, run a write-behind
/// sweep. The counter is only touched here, in interrupt context with
/// interrupts off.
pub fn on_tick(_token: &crate::interrupt::InterruptToken) {
    let ticks = BFC_TICK.fetch_add(1, Ordering::SeqCst) + 1;
    if ticks >= BFC_TICK_FREQ {
        BFC_TICK.store(0, Ordering::SeqCst);
        flush_all();
    }
}

/// Number of live cache entries.
pub fn entry_count() -> usize {
    BUFFER_CACHE.lock().entries.len()
}

/// Number of dirty entries, for diagnostics.
pub fn dirty_count() -> usize {
    let cache = BUFFER_CACHE.lock();
    cache
        .entries
        .iter()
        .filter(|entry| entry.state.lock().dirty)
        .count()
}

/// Test hook: pin the entry for (inode, aligned offset) as if a copy
/// were in flight. Returns false if the sector is not cached.
#[cfg(test)]
pub fn pin_entry(inode: InodeId, aligned: u32) -> bool {
    match lookup(inode, aligned) {
        Some(entry) => {
            entry.accessors.fetch_add(1, Ordering::SeqCst);
            true
        }
        None => false,
    }
}

/// Test hook: release a pin taken with `pin_entry`.
#[cfg(test)]
pub fn unpin_entry(inode: InodeId, aligned: u32) -> bool {
    match lookup(inode, aligned) {
        Some(entry) => {
            entry.accessors.fetch_sub(1, Ordering::SeqCst);
            true
        }
        None => false,
    }
}

/// Test hook: is the sector resident in the cache?
#[cfg(test)]
pub fn is_cached(inode: InodeId, aligned: u32) -> bool {
    lookup(inode, aligned).is_some()
}

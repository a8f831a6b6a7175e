/*
 * Swap Area
 *
 * Page-sized slot allocator over a raw disk partition. A slot covers
 * PAGE_SIZE / SECTOR_SIZE contiguous sectors. There is no on-disk
 * header: slot liveness exists only in memory (in supplemental page
 * entries), so swap contents are ephemeral across reboots.
 *
 * Allocation prefers the ordered free list; otherwise the high-water
 * mark `cnt` grows by one slot. Freeing the slot at the tip shrinks
 * `cnt` back and drains any free-list entries that the shrink exposes
 * at the new tip, keeping the allocated region dense.
 */

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::devices::block::{BlockDevice, SECTOR_SIZE, SectorIdx};
use crate::memory::PAGE_SIZE;

/// Sectors per swap slot.
pub const SECTORS_PER_SLOT: SectorIdx = (PAGE_SIZE / SECTOR_SIZE) as SectorIdx;

/// A page-sized region of the swap partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSlot {
    pub start: SectorIdx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    /// No free slot and the partition is exhausted.
    Full,
    /// The device rejected a sector transfer.
    Io,
}

struct SwapArea {
    partition: Arc<dyn BlockDevice>,
    /// Total sectors usable for slots.
    capacity: SectorIdx,
    /// High-water mark of allocated slots, in sectors.
    cnt: SectorIdx,
    /// Free slots below the high-water mark, ascending by start sector.
    free_swap: Vec<SwapSlot>,
}

/// One mutex protects the free list and `cnt`.
static SWAP: Mutex<Option<SwapArea>> = Mutex::new(None);

/// Initialize the swap area over `partition`.
pub fn init(partition: Arc<dyn BlockDevice>) {
    let capacity = partition.sector_count() - partition.sector_count() % SECTORS_PER_SLOT;
    log::info!(
        "swap area: {} sectors, {} page slots",
        capacity,
        capacity / SECTORS_PER_SLOT
    );
    *SWAP.lock() = Some(SwapArea {
        partition,
        capacity,
        cnt: 0,
        free_swap: Vec::new(),
    });
}

/// Write one page into a free swap slot and return the slot.
pub fn write_swap(page: &[u8]) -> Result<SwapSlot, SwapError> {
    assert_eq!(page.len(), PAGE_SIZE);

    let mut guard = SWAP.lock();
    let swap = guard.as_mut().expect("swap area not initialized");

    let (slot, fresh) = if !swap.free_swap.is_empty() {
        (swap.free_swap.remove(0), false)
    } else if swap.cnt < swap.capacity {
        (SwapSlot { start: swap.cnt }, true)
    } else {
        return Err(SwapError::Full);
    };

    let mut sector_buf = [0u8; SECTOR_SIZE];
    for i in 0..SECTORS_PER_SLOT {
        let offset = i as usize * SECTOR_SIZE;
        sector_buf.copy_from_slice(&page[offset..offset + SECTOR_SIZE]);
        swap.partition
            .write_sector(slot.start + i, &sector_buf)
            .map_err(|_| SwapError::Io)?;
    }

    // A fresh slot only counts once the write has succeeded.
    if fresh {
        swap.cnt += SECTORS_PER_SLOT;
    }

    log::debug!("swapped page out to sectors {}..{}", slot.start, slot.start + SECTORS_PER_SLOT);
    Ok(slot)
}

/// Read a slot back into `page` and release the slot.
pub fn read_swap(page: &mut [u8], slot: SwapSlot) -> Result<(), SwapError> {
    assert_eq!(page.len(), PAGE_SIZE);

    {
        let guard = SWAP.lock();
        let swap = guard.as_ref().expect("swap area not initialized");
        let mut sector_buf = [0u8; SECTOR_SIZE];
        for i in 0..SECTORS_PER_SLOT {
            swap.partition
                .read_sector(slot.start + i, &mut sector_buf)
                .map_err(|_| SwapError::Io)?;
            let offset = i as usize * SECTOR_SIZE;
            page[offset..offset + SECTOR_SIZE].copy_from_slice(&sector_buf);
        }
    }

    free_slot(slot);
    Ok(())
}

/// Return a slot to the allocator.
///
/// Freeing the slot at the tip of the allocated region shrinks `cnt`
/// and then drains trailing free-list entries that sit at the new tip.
/// Any other slot enters the free list in start-sector order.
pub fn free_slot(slot: SwapSlot) {
    let mut guard = SWAP.lock();
    let swap = guard.as_mut().expect("swap area not initialized");

    if slot.start + SECTORS_PER_SLOT == swap.cnt {
        swap.cnt -= SECTORS_PER_SLOT;
        while let Some(last) = swap.free_swap.last() {
            if last.start + SECTORS_PER_SLOT == swap.cnt {
                swap.free_swap.pop();
                swap.cnt -= SECTORS_PER_SLOT;
            } else {
                break;
            }
        }
    } else {
        let pos = swap
            .free_swap
            .iter()
            .position(|s| s.start > slot.start)
            .unwrap_or(swap.free_swap.len());
        swap.free_swap.insert(pos, slot);
    }
}

/// High-water mark in sectors, for diagnostics.
pub fn allocated_sectors() -> SectorIdx {
    SWAP.lock().as_ref().map(|s| s.cnt).unwrap_or(0)
}

/// Free-list length, for diagnostics.
pub fn free_slot_count() -> usize {
    SWAP.lock().as_ref().map(|s| s.free_swap.len()).unwrap_or(0)
}

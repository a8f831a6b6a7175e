/*
 * Page Directory Model
 *
 * The mapping from user virtual pages to frames, with the writable,
 * accessed and dirty bits the paging hardware maintains. On a real
 * machine this state lives in the page tables the MMU walks; the core
 * consumes it through exactly this contract (install, clear, lookup,
 * bit queries), and the user-access helpers update the bits the way
 * the hardware would.
 */

use alloc::collections::BTreeMap;
use bitflags::bitflags;

use crate::memory::frame::FrameId;

bitflags! {
    /// Per-mapping flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        const WRITABLE = 1 << 0;
        const ACCESSED = 1 << 1;
        const DIRTY    = 1 << 2;
    }
}

/// One installed mapping.
#[derive(Debug, Clone, Copy)]
pub struct Pte {
    pub frame: FrameId,
    pub flags: PteFlags,
}

/// Per-process page directory.
pub struct PageDir {
    entries: BTreeMap<u64, Pte>,
}

impl PageDir {
    pub const fn new() -> Self {
        PageDir {
            entries: BTreeMap::new(),
        }
    }

    /// Map `upage` to `frame`. Fails (returns false) if the page is
    /// already mapped.
    pub fn install(&mut self, upage: u64, frame: FrameId, writable: bool) -> bool {
        debug_assert_eq!(upage, crate::memory::page_round_down(upage));
        if self.entries.contains_key(&upage) {
            return false;
        }
        let mut flags = PteFlags::empty();
        if writable {
            flags |= PteFlags::WRITABLE;
        }
        self.entries.insert(upage, Pte { frame, flags });
        true
    }

    /// Unmap `upage`, returning the frame it pointed at.
    pub fn clear(&mut self, upage: u64) -> Option<FrameId> {
        self.entries.remove(&upage).map(|pte| pte.frame)
    }

    pub fn lookup(&self, upage: u64) -> Option<Pte> {
        self.entries.get(&upage).copied()
    }

    /// Frame mapped at `upage`, if present.
    pub fn get_frame(&self, upage: u64) -> Option<FrameId> {
        self.entries.get(&upage).map(|pte| pte.frame)
    }

    pub fn is_writable(&self, upage: u64) -> bool {
        self.flag(upage, PteFlags::WRITABLE)
    }

    pub fn is_accessed(&self, upage: u64) -> bool {
        self.flag(upage, PteFlags::ACCESSED)
    }

    pub fn is_dirty(&self, upage: u64) -> bool {
        self.flag(upage, PteFlags::DIRTY)
    }

    pub fn set_accessed(&mut self, upage: u64, accessed: bool) {
        self.set_flag(upage, PteFlags::ACCESSED, accessed);
    }

    pub fn set_dirty(&mut self, upage: u64, dirty: bool) {
        self.set_flag(upage, PteFlags::DIRTY, dirty);
    }

    /// Installed mappings in ascending page order.
    pub fn mapped_pages(&self) -> impl Iterator<Item = (u64, Pte)> + '_ {
        self.entries.iter().map(|(&upage, &pte)| (upage, pte))
    }

    pub fn mapped_count(&self) -> usize {
        self.entries.len()
    }

    fn flag(&self, upage: u64, flag: PteFlags) -> bool {
        self.entries
            .get(&upage)
            .map(|pte| pte.flags.contains(flag))
            .unwrap_or(false)
    }

    fn set_flag(&mut self, upage: u64, flag: PteFlags, value: bool) {
        if let Some(pte) = self.entries.get_mut(&upage) {
            pte.flags.set(flag, value);
        }
    }
}

impl Default for PageDir {
    fn default() -> Self {
        Self::new()
    }
}

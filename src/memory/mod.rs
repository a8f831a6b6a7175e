/*
 * Virtual Memory Subsystem
 *
 * Demand paging for user processes:
 *
 * - `frame`: the global frame table over the user page pool, with
 *   eviction (enhanced second chance) when the pool runs dry.
 * - `page`: per-process supplemental page tables recording where each
 *   not-resident virtual page lives (executable, mapped file, or swap).
 * - `swap`: page-sized slot allocator over the swap partition.
 * - `fault`: the page-fault handler tying the three together.
 * - `mmap`: memory-mapped files and their write-back.
 * - `pagedir`: the page-directory model (install/clear, dirty and
 *   accessed bits) the MMU contract is written against.
 * - `uaccess`: user memory access helpers for the syscall layer.
 */

pub mod address_space;
pub mod fault;
pub mod frame;
pub mod mmap;
pub mod page;
pub mod pagedir;
pub mod swap;
pub mod uaccess;

/// Size of a virtual page and of a physical frame, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// User virtual addresses live below this boundary.
pub const PHYS_BASE: u64 = 0xC000_0000;

/// Round an address down to its page base.
pub fn page_round_down(addr: u64) -> u64 {
    addr & !(PAGE_SIZE as u64 - 1)
}

/// Round an address up to the next page boundary.
pub fn page_round_up(addr: u64) -> u64 {
    page_round_down(addr + PAGE_SIZE as u64 - 1)
}

/// Offset of an address within its page.
pub fn page_offset(addr: u64) -> usize {
    (addr & (PAGE_SIZE as u64 - 1)) as usize
}

/// Is `addr` a user virtual address?
pub fn is_user_vaddr(addr: u64) -> bool {
    addr < PHYS_BASE
}

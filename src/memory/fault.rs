/*
 * Page Fault Handler
 *
 * Entry point the trap layer calls for a faulting user memory
 * reference. Dispatch:
 *
 * 1. Kernel-mode faults on user pointers, and any reference at or above
 *    PHYS_BASE, kill the thread.
 * 2. A supplemental entry for the faulting page routes to the loader
 *    for its kind (executable, mapped file, swap).
 * 3. No entry, but the address looks like legal stack growth (within
 *    32 bytes below the saved user stack pointer, inside the stack
 *    region), synthesizes an anonymous writable page.
 * 4. Anything else kills the thread with status -1.
 *
 * The handler holds the thread's page-fault semaphore across the
 * lookup and load, pairing with the eviction side so a page cannot be
 * evicted out from under its own fault-in.
 */

use crate::memory::{PHYS_BASE, frame, page, page_round_down};
use crate::scheduler;

/// Size of the user stack region below PHYS_BASE.
pub const STACK_LIMIT: u64 = 8 * 1024 * 1024;

/// Window below the stack pointer that still counts as stack growth
/// (x86 PUSHA touches esp - 32).
const STACK_SLOP: u64 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The faulting thread was killed with status -1.
    Killed,
}

/// Kill the current thread the way the kernel kills a misbehaving user
/// process: exit status -1, mappings torn down by the exit path.
pub fn kill_current() -> Fault {
    log::debug!("killing {} on a bad memory access", scheduler::current_thread());
    scheduler::exit_current(-1);
    Fault::Killed
}

/// Handle a fault at `fault_addr`. `write` is the access type; `user`
/// is false for faults taken in kernel mode (a syscall dereferencing a
/// user pointer).
pub fn handle_fault(fault_addr: u64, write: bool, user: bool) -> Result<(), Fault> {
    if fault_addr >= PHYS_BASE {
        return Err(kill_current());
    }
    let Some(space) = scheduler::current_space() else {
        // Kernel thread touching user space: a kernel bug, not a user
        // error.
        panic!("page fault at {fault_addr:#x} without a user address space");
    };
    if !user {
        // Kernel-mode fault on an unmapped user pointer: the syscall
        // layer failed to validate. Kill rather than guess.
        return Err(kill_current());
    }

    let upage = page_round_down(fault_addr);

    space.sema_pf.down();
    let result = fault_in(&space, upage, fault_addr, write);
    space.sema_pf.up();
    result
}

fn fault_in(
    space: &alloc::sync::Arc<crate::memory::address_space::AddressSpace>,
    upage: u64,
    fault_addr: u64,
    write: bool,
) -> Result<(), Fault> {
    let entry = space.spt.lock().find(upage).cloned();

    if let Some(entry) = entry {
        if write && !entry.writable {
            return Err(kill_current());
        }
        return page::load_page(space, &entry);
    }

    if is_stack_growth(space, fault_addr) {
        return grow_stack(space, upage);
    }

    Err(kill_current())
}

/// Does `fault_addr` look like a legal stack access? It must sit inside
/// the stack region and at or above `user_sp - 32`.
fn is_stack_growth(space: &crate::memory::address_space::AddressSpace, fault_addr: u64) -> bool {
    fault_addr < PHYS_BASE
        && fault_addr >= PHYS_BASE - STACK_LIMIT
        && fault_addr >= space.user_sp().saturating_sub(STACK_SLOP)
}

/// Map a fresh anonymous zeroed page at `upage`.
fn grow_stack(
    space: &alloc::sync::Arc<crate::memory::address_space::AddressSpace>,
    upage: u64,
) -> Result<(), Fault> {
    let frame_id = frame::get_frame(upage, true).map_err(|_| kill_current())?;
    if !space.pagedir.lock().install(upage, frame_id, true) {
        frame::remove(frame_id);
        return Err(kill_current());
    }
    frame::set_evictable(frame_id, true);
    Ok(())
}

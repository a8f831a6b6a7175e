/*
 * Minos Kernel Core
 *
 * This crate implements the core services of the Minos teaching kernel:
 *
 * 1. THREADS: a preemptive, priority-scheduled thread runtime with a
 *    two-array (active/expired) run queue, timed sleep, and counting
 *    semaphores / mutexes built on top of it.
 * 2. VIRTUAL MEMORY: demand paging with a global frame table, per-process
 *    supplemental page tables, a swap partition, and memory-mapped files.
 * 3. DISK CACHE: a fixed-size, sector-keyed buffer cache with clock
 *    replacement, write-behind and read-ahead, mediating all file I/O.
 *
 * The surrounding kernel (boot code, the architecture layer that performs
 * the actual register-level context switch, the MMU, the disk driver and
 * the on-disk filesystem) talks to this crate through narrow seams:
 * `devices::block::BlockDevice`, the page-directory model in
 * `memory::pagedir`, and the inode contract in `fs::inode`. Everything on
 * this side of those seams is complete and self-contained.
 *
 * Initialization is staged, bottom-up: timer, scheduler, frame table,
 * swap, filesystem, buffer cache. `init()` must run before any thread is
 * created; teardown is process-wide only.
 */

#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

extern crate alloc;

use alloc::sync::Arc;

pub mod arena;
pub mod devices;
pub mod fs;
pub mod interrupt;
pub mod memory;
pub mod scheduler;
pub mod utils;

#[cfg(test)]
mod tests;

use devices::block::BlockDevice;

/// Sized resources handed to `init()` by the boot layer.
pub struct KernelConfig {
    /// Number of frames in the user page pool.
    pub user_pool_frames: usize,
    /// Raw partition backing the swap area.
    pub swap_device: Arc<dyn BlockDevice>,
    /// Disk holding the filesystem.
    pub fs_device: Arc<dyn BlockDevice>,
}

/// Bring up the kernel core.
///
/// Order matters: the scheduler must exist before the VM subsystems so
/// that their locks can name a current thread, and the filesystem must
/// exist before the buffer cache can translate sectors.
pub fn init(config: KernelConfig) {
    utils::timer::init();
    scheduler::init();
    memory::frame::init(config.user_pool_frames);
    memory::swap::init(config.swap_device);
    fs::inode::init(config.fs_device);
    fs::cache::init();

    log::info!("minos core initialized");
}

/// Orderly shutdown: flush the buffer cache to disk and release it.
///
/// After this returns no dirty cache entry remains (the write-behind
/// invariant that `fs::cache::shutdown` enforces before freeing storage).
pub fn shutdown() {
    fs::cache::shutdown();
    log::info!("minos core shut down");
}

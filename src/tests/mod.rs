/*
 * Test Suite for the Minos Kernel Core
 *
 * Host-run tests driving the kernel through its public API. The kernel
 * state is process-global, so every test boots a fresh kernel behind a
 * single lock; `boot_kernel` hands back a fixture holding that lock
 * plus the RamDisks, letting tests inspect raw sectors.
 *
 * The test acts as the CPU: it calls the operations a running thread
 * would and drives `on_timer_interrupt()` by hand, so scheduling
 * decisions, eviction traffic and cache behavior are all deterministic
 * and observable.
 */

mod alarm_tests;
mod mmap_tests;
mod sched_tests;
mod swap_tests;

use alloc::sync::Arc;
use spin::Mutex;

use crate::devices::block::RamDisk;
use crate::{KernelConfig, utils};

/// Serializes tests against the global kernel state.
static TEST_LOCK: Mutex<()> = Mutex::new(());

pub struct KernelFixture {
    _guard: spin::MutexGuard<'static, ()>,
    pub swap_disk: Arc<RamDisk>,
    pub fs_disk: Arc<RamDisk>,
}

fn test_sink(line: &str) {
    eprintln!("{line}");
}

/// Boot a fresh kernel with a user pool of `user_frames` frames and
/// 1024-sector swap and filesystem disks.
pub fn boot_kernel(user_frames: usize) -> KernelFixture {
    let guard = TEST_LOCK.lock();

    utils::logger::init(test_sink);
    crate::interrupt::enable();

    let swap_disk = Arc::new(RamDisk::new(1024));
    let fs_disk = Arc::new(RamDisk::new(1024));
    crate::init(KernelConfig {
        user_pool_frames: user_frames,
        swap_device: swap_disk.clone(),
        fs_device: fs_disk.clone(),
    });

    KernelFixture {
        _guard: guard,
        swap_disk,
        fs_disk,
    }
}

/// Advance the timer by `ticks` interrupts.
pub fn run_ticks(ticks: u64) {
    for _ in 0..ticks {
        utils::timer::on_timer_interrupt();
    }
}

/// Entry point for spawned test threads; the core never runs it.
pub fn thread_stub() {}

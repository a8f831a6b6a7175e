/*
 * System Timer
 *
 * Global tick counter and the interrupt-side plumbing. The timer
 * hardware (PIT, 100Hz) belongs to the architecture layer; it calls
 * `on_timer_interrupt()` once per interrupt, and this module fans the
 * tick out in a fixed order:
 *
 * 1. advance the tick counter,
 * 2. wake expired sleepers (alarm queue),
 * 3. charge the running thread's timeslice (may preempt),
 * 4. bump the buffer cache's write-behind counter.
 *
 * The same clock stamps frame accesses for the eviction cursor
 * bootstrap, standing in for the RTC.
 */

use core::sync::atomic::{AtomicU64, Ordering};

use crate::interrupt;

/// Timer interrupts per second.
pub const TIMER_FREQ: u64 = 100;

/// Ticks since boot.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Reset the clock. Part of kernel bring-up.
pub fn init() {
    TICKS.store(0, Ordering::SeqCst);
}

/// Ticks elapsed since boot.
pub fn now_ticks() -> u64 {
    TICKS.load(Ordering::SeqCst)
}

/// Ticks elapsed since `since`.
pub fn elapsed(since: u64) -> u64 {
    now_ticks().saturating_sub(since)
}

/// Timer-interrupt entry point. Called exactly once per tick, from
/// interrupt context.
pub fn on_timer_interrupt() {
    let _guard = interrupt::disable();
    let token = interrupt::InterruptToken::new_for_isr();

    let now = TICKS.fetch_add(1, Ordering::SeqCst) + 1;

    crate::scheduler::alarm::on_tick(&token, now);
    crate::scheduler::tick_current(&token);
    crate::fs::cache::on_tick(&token);
}

/// Block the calling thread for `ticks` timer ticks.
pub fn sleep_ticks(ticks: u64) {
    crate::scheduler::alarm::sleep_current(ticks);
}

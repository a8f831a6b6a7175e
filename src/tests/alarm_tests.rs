/*
 * Alarm Tests
 *
 * Timed blocking: sleepers leave the CPU entirely and wake in
 * non-decreasing wake-tick order regardless of the order they went to
 * sleep.
 */

use super::{boot_kernel, run_ticks, thread_stub};
use crate::scheduler::{self, ThreadState, alarm};
use crate::utils::timer;

/// Spawn a thread and make it the running thread.
fn spawn_and_dispatch(name: &str, priority: u8) -> scheduler::ThreadId {
    let tid = scheduler::spawn(thread_stub, name, priority);
    scheduler::yield_now();
    assert_eq!(scheduler::current_thread(), tid);
    tid
}

#[test]
fn sleeping_thread_blocks_until_its_tick() {
    let _k = boot_kernel(8);

    let a = spawn_and_dispatch("sleeper", 31);
    timer::sleep_ticks(10);
    assert_eq!(scheduler::state_of(a), Some(ThreadState::Blocked));
    assert_eq!(alarm::sleeper_count(), 1);

    run_ticks(9);
    assert_eq!(scheduler::state_of(a), Some(ThreadState::Blocked));

    run_ticks(1);
    assert_ne!(scheduler::state_of(a), Some(ThreadState::Blocked));
    assert_eq!(alarm::sleeper_count(), 0);
}

#[test]
fn sleepers_wake_in_wake_tick_order() {
    let _k = boot_kernel(8);

    // Three threads go to sleep for 50, 10 and 30 ticks, in that
    // order. Wake order must be the second, then the third, then the
    // first.
    let a = spawn_and_dispatch("sleep-50", 31);
    timer::sleep_ticks(50);
    let b = spawn_and_dispatch("sleep-10", 31);
    timer::sleep_ticks(10);
    let c = spawn_and_dispatch("sleep-30", 31);
    timer::sleep_ticks(30);

    assert_eq!(alarm::sleeper_count(), 3);

    run_ticks(10);
    assert_ne!(scheduler::state_of(b), Some(ThreadState::Blocked));
    assert_eq!(scheduler::state_of(c), Some(ThreadState::Blocked));
    assert_eq!(scheduler::state_of(a), Some(ThreadState::Blocked));
    assert_eq!(alarm::sleeper_count(), 2);

    run_ticks(20);
    assert_ne!(scheduler::state_of(c), Some(ThreadState::Blocked));
    assert_eq!(scheduler::state_of(a), Some(ThreadState::Blocked));
    assert_eq!(alarm::sleeper_count(), 1);

    run_ticks(20);
    assert_ne!(scheduler::state_of(a), Some(ThreadState::Blocked));
    assert_eq!(alarm::sleeper_count(), 0);
}

#[test]
fn sleep_zero_just_yields() {
    let _k = boot_kernel(8);

    let a = spawn_and_dispatch("a", 31);
    let b = scheduler::spawn(thread_stub, "b", 31);

    timer::sleep_ticks(0);
    assert_eq!(alarm::sleeper_count(), 0);
    assert_eq!(scheduler::current_thread(), b);
    assert_eq!(scheduler::state_of(a), Some(ThreadState::Ready));
}

#[test]
fn waking_sleeper_preempts_a_lower_priority_thread() {
    let _k = boot_kernel(8);

    let high = spawn_and_dispatch("high", 40);
    timer::sleep_ticks(5);

    let low = spawn_and_dispatch("low", 10);
    assert_eq!(scheduler::current_thread(), low);

    // The tick that wakes `high` preempts `low` on interrupt return.
    run_ticks(5);
    assert_eq!(scheduler::current_thread(), high);
    assert_eq!(scheduler::state_of(low), Some(ThreadState::Ready));
}

#[test]
fn ticks_advance_the_clock() {
    let _k = boot_kernel(8);
    let start = timer::now_ticks();
    run_ticks(7);
    assert_eq!(timer::elapsed(start), 7);
}

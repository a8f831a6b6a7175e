/*
 * Alarm Clock
 *
 * Timed blocking of threads on tick events. A sleeping thread sits in a
 * global list ordered by wake tick; the timer interrupt walks the head
 * of the list and unblocks every entry whose wake tick has passed, so
 * per-tick work is bounded by the number of threads actually waking.
 */

use alloc::vec::Vec;
use spin::Mutex;

use super::ThreadId;
use crate::interrupt;
use crate::interrupt::InterruptToken;

struct Sleeper {
    tid: ThreadId,
    wake_tick: u64,
}

/// Sleep list, ascending by wake tick.
static SLEEP_LIST: Mutex<Vec<Sleeper>> = Mutex::new(Vec::new());

/// Reset the sleep list. Part of scheduler bring-up.
pub fn init() {
    SLEEP_LIST.lock().clear();
}

/// Block the running thread for `ticks` timer ticks.
///
/// Sleeping for zero ticks degenerates to a yield. The insert and the
/// block are one critical section: a tick arriving between them could
/// otherwise wake the thread before it blocked.
pub fn sleep_current(ticks: u64) {
    if ticks == 0 {
        super::yield_now();
        return;
    }

    let wake_tick = crate::utils::timer::now_ticks() + ticks;
    let tid = super::current_thread();

    interrupt::without_interrupts(|| {
        {
            let mut list = SLEEP_LIST.lock();
            let pos = list
                .iter()
                .position(|s| s.wake_tick > wake_tick)
                .unwrap_or(list.len());
            list.insert(pos, Sleeper { tid, wake_tick });
        }
        super::block_current();
    });
}

/// Wake every sleeper whose wake tick is at or before `now`. Runs in
/// interrupt context; wakeups come out in non-decreasing wake-tick
/// order because the list is sorted.
pub fn on_tick(_token: &InterruptToken, now: u64) {
    loop {
        let tid = {
            let mut list = SLEEP_LIST.lock();
            match list.first() {
                Some(head) if head.wake_tick <= now => list.remove(0).tid,
                _ => return,
            }
        };
        super::unblock(tid);
    }
}

/// Number of threads currently sleeping.
pub fn sleeper_count() -> usize {
    SLEEP_LIST.lock().len()
}

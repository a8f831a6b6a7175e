/*
 * Priority Scheduler
 *
 * This module implements the scheduling mechanism for the Minos kernel:
 * the thread table, the two-array priority run queue, and the state
 * transitions behind spawn / block / unblock / yield / exit.
 *
 * SCHEDULING MODEL:
 * ================
 *
 * Single CPU, preemptive. A thread of priority p runs before any Ready
 * thread of lower priority. Within a priority level threads run FIFO.
 * Each thread's timeslice is priority + 5 ticks; when the timer charges
 * the slice down to zero the thread is moved to the *expired* array with
 * a freshly recomputed slice, so every ready thread at a level runs at
 * least once per array swap.
 *
 * MECHANISM VS DISPATCH:
 * =====================
 *
 * This module decides; the architecture layer switches. Every operation
 * here leaves the thread table, the run queue and the current-thread
 * handle in their post-transition state, and the arch layer performs the
 * register-level switch for the thread named by `current_thread()`. The
 * split mirrors the policy/mechanism separation the rest of the kernel
 * is written against.
 *
 * Operations that modify the run queue, the sleep list or a thread's
 * state run with interrupts off. The timer tick runs in interrupt
 * context: it may unblock sleepers and preempt, but never blocks.
 *
 * Dying threads are reaped lazily by whichever thread is scheduled next,
 * so a thread never frees the stack it is standing on.
 */

use alloc::sync::Arc;
use alloc::vec::Vec;

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::Mutex;

pub mod alarm;
pub mod runqueue;
pub mod sync;
pub mod thread;

pub use runqueue::{PRI_DEFAULT, PRI_MAX, PRI_MIN};
pub use thread::{Thread, ThreadId, ThreadState, ThreadStats};

use crate::interrupt;
use crate::memory::address_space::AddressSpace;
use runqueue::RunQueue;

/// Maximum number of live threads.
pub const MAX_THREADS: usize = 64;

/// Global scheduler instance.
static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);

/// Currently running thread (packed ThreadId, atomic for IRQ safety).
static CURRENT_THREAD: AtomicU64 = AtomicU64::new(u64::MAX);

/// Scheduler enabled flag.
static SCHEDULER_ENABLED: AtomicBool = AtomicBool::new(false);

struct Scheduler {
    threads: crate::arena::Arena<Thread>,
    run_queue: RunQueue,
    idle: ThreadId,
    context_switches: u64,
}

impl Scheduler {
    fn thread(&self, tid: ThreadId) -> Option<&Thread> {
        self.threads.get(tid.0)
    }

    fn thread_mut(&mut self, tid: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(tid.0)
    }
}

fn current_raw() -> ThreadId {
    ThreadId::unpack(CURRENT_THREAD.load(Ordering::SeqCst))
}

/// Initialize the scheduler and install the idle thread as the running
/// thread. Must run before any other scheduler call.
pub fn init() {
    let mut sched = Scheduler {
        threads: crate::arena::Arena::new(),
        run_queue: RunQueue::new(),
        idle: ThreadId::ERROR,
        context_switches: 0,
    };

    let mut idle = Thread::new("idle", PRI_MIN, idle_thread_main);
    idle.state = ThreadState::Running;
    let id = ThreadId(sched.threads.insert(idle));
    sched.thread_mut(id).expect("idle thread just inserted").id = id;
    sched.idle = id;

    CURRENT_THREAD.store(id.pack(), Ordering::SeqCst);
    *SCHEDULER.lock() = Some(sched);
    alarm::init();
    SCHEDULER_ENABLED.store(true, Ordering::SeqCst);

    log::info!("scheduler initialized, idle thread is {}", id);
}

/// The idle thread runs when both priority arrays are empty. The
/// dispatch layer parks the CPU here between interrupts.
fn idle_thread_main() {}

/// Create a thread and make it runnable.
///
/// The thread is allocated Blocked, then unblocked, per the lifecycle:
/// unblocking inserts it into the active array and preempts the caller
/// if the new thread has the higher priority. Returns
/// `ThreadId::ERROR` if the thread table is full.
pub fn spawn(entry: fn(), name: &str, priority: u8) -> ThreadId {
    debug_assert!(priority <= PRI_MAX);

    let tid = interrupt::without_interrupts(|| {
        let mut guard = SCHEDULER.lock();
        let sched = guard.as_mut().expect("scheduler not initialized");

        if sched.threads.len() >= MAX_THREADS {
            log::error!("thread table full, cannot spawn '{}'", name);
            return ThreadId::ERROR;
        }

        let parent = current_raw();
        let mut thread = Thread::new(name, priority.min(PRI_MAX), entry);
        thread.parent = Some(parent);
        let id = ThreadId(sched.threads.insert(thread));
        sched.thread_mut(id).expect("thread just inserted").id = id;
        if let Some(p) = sched.thread_mut(parent) {
            p.children.push(id);
        }
        id
    });

    if tid == ThreadId::ERROR {
        return tid;
    }

    log::debug!("created thread '{}' with id {}", name, tid);
    unblock(tid);
    tid
}

/// Transition a Blocked thread to Ready.
///
/// Inserts the thread into the active array. If it outranks the caller
/// (and the caller is not the idle thread), the caller yields so the
/// higher-priority thread runs immediately. Called from interrupt
/// context the yield is suppressed; the tick handler preempts on return
/// instead.
pub fn unblock(tid: ThreadId) {
    let should_yield = interrupt::without_interrupts(|| {
        let mut guard = SCHEDULER.lock();
        let sched = guard.as_mut().expect("scheduler not initialized");

        let idle = sched.idle;
        let current = current_raw();
        let current_priority = sched.thread(current).map(|t| t.priority);

        let Some(thread) = sched.thread_mut(tid) else {
            return false;
        };
        assert!(
            thread.state == ThreadState::Blocked,
            "unblock of a thread that is not blocked"
        );
        thread.state = ThreadState::Ready;
        let priority = thread.priority;
        sched.run_queue.insert_active(tid, priority);

        match current_priority {
            Some(cp) => priority > cp && current != idle,
            None => false,
        }
    });

    if should_yield && interrupt::are_enabled() && SCHEDULER_ENABLED.load(Ordering::SeqCst) {
        yield_now();
    }
}

/// Block the running thread. The caller must hold the interrupts-off
/// discipline and must have arranged a wakeup.
pub fn block_current() {
    assert!(
        !interrupt::are_enabled(),
        "block_current requires interrupts disabled"
    );

    let mut guard = SCHEDULER.lock();
    let sched = guard.as_mut().expect("scheduler not initialized");
    let current = current_raw();
    assert!(current != sched.idle, "idle thread cannot block");

    if let Some(thread) = sched.thread_mut(current) {
        thread.state = ThreadState::Blocked;
    }
    reschedule(sched);
}

/// Voluntarily give up the CPU. The caller re-enters the *active* array
/// at the back of its priority queue, keeping its recomputed place in
/// the current rotation.
pub fn yield_now() {
    if !SCHEDULER_ENABLED.load(Ordering::SeqCst) {
        return;
    }

    interrupt::without_interrupts(|| {
        let mut guard = SCHEDULER.lock();
        let sched = guard.as_mut().expect("scheduler not initialized");
        let current = current_raw();

        if current != sched.idle {
            if let Some(thread) = sched.thread_mut(current) {
                if thread.state == ThreadState::Running {
                    thread.state = ThreadState::Ready;
                    let priority = thread.priority;
                    sched.run_queue.insert_active(current, priority);
                }
            }
        }
        reschedule(sched);
    });
}

/// Terminate the running thread with `status`.
///
/// The user address space is torn down in the dying thread's own
/// context (mappings written back, supplemental entries and swap slots
/// freed, frames returned, files closed); the thread structure itself
/// is freed by the successor.
pub fn exit_current(status: i32) {
    let current = current_thread();

    if let Some(space) = current_space() {
        crate::memory::mmap::destroy_all(&space);
        space.spt.lock().destroy();
        crate::memory::frame::remove_frames_of(current);
        space.files.lock().close_all();
    }

    interrupt::without_interrupts(|| {
        let mut guard = SCHEDULER.lock();
        let sched = guard.as_mut().expect("scheduler not initialized");
        assert!(current != sched.idle, "idle thread cannot exit");

        if let Some(thread) = sched.thread_mut(current) {
            thread.exit_status = status;
            thread.state = ThreadState::Dying;
            thread.space = None;
        }
        reschedule(sched);
    });
}

/// Timer-tick charge against the running thread. Runs in interrupt
/// context.
///
/// Charges one tick; on timeslice expiry the thread's slice is
/// recomputed and it is moved to the *expired* array. A running thread
/// is also preempted (into the active array, slice intact) when the
/// tick woke a higher-priority sleeper.
pub fn tick_current(_token: &crate::interrupt::InterruptToken) {
    if !SCHEDULER_ENABLED.load(Ordering::SeqCst) {
        return;
    }

    let mut guard = SCHEDULER.lock();
    let Some(sched) = guard.as_mut() else {
        return;
    };
    let current = current_raw();

    if current == sched.idle {
        if !sched.run_queue.is_empty() {
            reschedule(sched);
        }
        return;
    }

    let (expired, priority) = {
        let Some(thread) = sched.thread_mut(current) else {
            return;
        };
        thread.cpu_ticks += 1;
        thread.ticks_since_yield += 1;

        if thread.ticks_since_yield >= thread.timeslice {
            // Expired: recompute the slice before the thread enters
            // the expired array.
            thread.recompute_timeslice();
            thread.ticks_since_yield = 0;
            thread.state = ThreadState::Ready;
            (true, thread.priority)
        } else {
            (false, thread.priority)
        }
    };

    if expired {
        sched.run_queue.insert_expired(current, priority);
        reschedule(sched);
    } else if sched.run_queue.highest_active() > Some(priority) {
        // The tick woke someone who outranks us: preempt on interrupt
        // return, slice intact.
        if let Some(thread) = sched.thread_mut(current) {
            thread.state = ThreadState::Ready;
        }
        sched.run_queue.insert_active(current, priority);
        reschedule(sched);
    }
}

/// Pick the next thread and make it current.
///
/// Idle runs only when both arrays are empty; an empty active array is
/// swapped with the expired one first. The previous thread, if Dying,
/// is reaped here, on the successor's stack.
fn reschedule(sched: &mut Scheduler) {
    debug_assert!(
        !interrupt::are_enabled(),
        "reschedule requires interrupts disabled"
    );
    let prev = current_raw();

    if prev == sched.idle {
        if let Some(idle) = sched.thread_mut(prev) {
            idle.state = ThreadState::Ready;
        }
    }
    debug_assert!(
        sched
            .thread(prev)
            .map(|t| t.state != ThreadState::Running)
            .unwrap_or(true),
        "reschedule with the previous thread still Running"
    );

    let next = sched.run_queue.pop_next().unwrap_or(sched.idle);
    if let Some(thread) = sched.thread_mut(next) {
        thread.state = ThreadState::Running;
        thread.ticks_since_yield = 0;
    }
    CURRENT_THREAD.store(next.pack(), Ordering::SeqCst);
    if next != prev {
        sched.context_switches += 1;
    }

    if next != prev {
        if let Some(ThreadState::Dying) = sched.thread(prev).map(|t| t.state) {
            reap(sched, prev);
        }
    }
}

/// Free a Dying thread's structure. Its children keep their handles;
/// generation validation makes the stale references inert.
fn reap(sched: &mut Scheduler, tid: ThreadId) {
    if let Some(thread) = sched.threads.remove(tid.0) {
        log::debug!(
            "reaped thread '{}' (exit status {})",
            thread.name.as_str(),
            thread.exit_status
        );
    }
}

/// Id of the running thread.
pub fn current_thread() -> ThreadId {
    current_raw()
}

/// Id of the idle thread.
pub fn idle_thread() -> ThreadId {
    let guard = SCHEDULER.lock();
    guard.as_ref().expect("scheduler not initialized").idle
}

/// Set the running thread's priority. Lowering it below the best ready
/// thread yields immediately.
pub fn set_priority(new_priority: u8) {
    let new_priority = new_priority.min(PRI_MAX);
    let should_yield = interrupt::without_interrupts(|| {
        let mut guard = SCHEDULER.lock();
        let sched = guard.as_mut().expect("scheduler not initialized");
        let current = current_raw();
        if let Some(thread) = sched.thread_mut(current) {
            thread.priority = new_priority;
        }
        sched.run_queue.highest_active() > Some(new_priority)
    });

    if should_yield {
        yield_now();
    }
}

/// The running thread's priority.
pub fn get_priority() -> u8 {
    priority_of(current_raw()).unwrap_or(PRI_MIN)
}

pub fn priority_of(tid: ThreadId) -> Option<u8> {
    let guard = SCHEDULER.lock();
    guard.as_ref()?.thread(tid).map(|t| t.priority)
}

pub fn state_of(tid: ThreadId) -> Option<ThreadState> {
    let guard = SCHEDULER.lock();
    guard.as_ref()?.thread(tid).map(|t| t.state)
}

/// The running thread's address space, if it has one.
pub fn current_space() -> Option<Arc<AddressSpace>> {
    space_of(current_raw())
}

pub fn space_of(tid: ThreadId) -> Option<Arc<AddressSpace>> {
    let guard = SCHEDULER.lock();
    guard.as_ref()?.thread(tid).and_then(|t| t.space.clone())
}

/// Attach a user address space to a thread. Called by the loader layer
/// before the thread first touches user memory.
pub fn attach_space(tid: ThreadId, space: Arc<AddressSpace>) {
    let mut guard = SCHEDULER.lock();
    if let Some(sched) = guard.as_mut() {
        if let Some(thread) = sched.thread_mut(tid) {
            thread.space = Some(space);
        }
    }
}

/// Equality lookup over the running thread's children.
pub fn find_child(tid: ThreadId) -> Option<ThreadId> {
    let guard = SCHEDULER.lock();
    guard
        .as_ref()?
        .thread(current_raw())
        .and_then(|t| t.find_child(tid))
}

/// Run a closure against a thread's entry in the table.
pub fn with_thread<R>(tid: ThreadId, f: impl FnOnce(&Thread) -> R) -> Option<R> {
    let guard = SCHEDULER.lock();
    guard.as_ref()?.thread(tid).map(f)
}

/// Number of array swaps the run queue has performed.
pub fn runqueue_swaps() -> u64 {
    let guard = SCHEDULER.lock();
    guard
        .as_ref()
        .map(|s| s.run_queue.swap_count())
        .unwrap_or(0)
}

/// Priorities with queued threads in (active, expired), for diagnostics.
pub fn runqueue_depths() -> (usize, usize) {
    let guard = SCHEDULER.lock();
    match guard.as_ref() {
        Some(s) => (s.run_queue.active().len(), s.run_queue.expired().len()),
        None => (0, 0),
    }
}

/// Snapshot of every live thread.
pub fn thread_stats() -> Vec<ThreadStats> {
    let guard = SCHEDULER.lock();
    let Some(sched) = guard.as_ref() else {
        return Vec::new();
    };

    let mut stats = Vec::new();
    for (_, thread) in sched.threads.iter() {
        stats.push(ThreadStats {
            id: thread.id,
            name: alloc::string::String::from(thread.name.as_str()),
            state: thread.state,
            priority: thread.priority,
            cpu_ticks: thread.cpu_ticks,
        });
    }
    stats
}

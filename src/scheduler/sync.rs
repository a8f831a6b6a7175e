/*
 * Semaphores and Kernel Mutexes
 *
 * Counting semaphore and the mutex built from it, layered on scheduler
 * block/unblock. These are the thread-level primitives; short critical
 * sections over kernel data use spin locks directly.
 *
 * Discipline: `up` is legal anywhere, including interrupt context.
 * `down` and `acquire` may block and are therefore thread-context only.
 * A waiter is chosen by highest priority, ties broken by wait order.
 * There is no priority donation.
 */

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use super::ThreadId;
use crate::interrupt;

struct Waiter {
    tid: ThreadId,
    seq: u64,
}

struct SemaInner {
    value: u32,
    waiters: Vec<Waiter>,
    next_seq: u64,
}

/// Counting semaphore.
pub struct Semaphore {
    inner: Mutex<SemaInner>,
}

impl Semaphore {
    pub const fn new(value: u32) -> Self {
        Semaphore {
            inner: Mutex::new(SemaInner {
                value,
                waiters: Vec::new(),
                next_seq: 0,
            }),
        }
    }

    /// Decrement the count, blocking until it is positive.
    ///
    /// When the count is zero the caller joins the wait list and blocks;
    /// a later `up` hands its increment straight to the chosen waiter,
    /// so the woken thread owns the count without re-racing for it.
    pub fn down(&self) {
        assert!(
            interrupt::are_enabled(),
            "semaphore down from interrupt context"
        );

        interrupt::without_interrupts(|| {
            let mut inner = self.inner.lock();
            if inner.value > 0 {
                inner.value -= 1;
                return;
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.waiters.push(Waiter {
                tid: super::current_thread(),
                seq,
            });
            drop(inner);
            super::block_current();
        });
    }

    /// Decrement the count if it is positive, without blocking.
    pub fn try_down(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        }
    }

    /// Increment the count and wake the best waiter, if any.
    pub fn up(&self) {
        let woken = {
            let mut inner = self.inner.lock();
            match take_best_waiter(&mut inner.waiters) {
                Some(tid) => Some(tid),
                None => {
                    inner.value += 1;
                    None
                }
            }
        };
        if let Some(tid) = woken {
            super::unblock(tid);
        }
    }

    /// Current count, for diagnostics.
    pub fn value(&self) -> u32 {
        self.inner.lock().value
    }

    /// Number of threads waiting.
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

/// Pop the highest-priority waiter; among equals, the one that has
/// waited longest.
fn take_best_waiter(waiters: &mut Vec<Waiter>) -> Option<ThreadId> {
    let mut best: Option<(usize, u8, u64)> = None;
    for (i, w) in waiters.iter().enumerate() {
        let priority = super::priority_of(w.tid).unwrap_or(super::PRI_MIN);
        let better = match best {
            None => true,
            Some((_, bp, bs)) => priority > bp || (priority == bp && w.seq < bs),
        };
        if better {
            best = Some((i, priority, w.seq));
        }
    }
    best.map(|(i, _, _)| waiters.remove(i).tid)
}

const MUTEX_UNOWNED: u64 = u64::MAX;

/// Mutual exclusion: a binary semaphore plus owner identity.
pub struct KMutex {
    sema: Semaphore,
    owner: AtomicU64,
}

impl KMutex {
    pub const fn new() -> Self {
        KMutex {
            sema: Semaphore::new(1),
            owner: AtomicU64::new(MUTEX_UNOWNED),
        }
    }

    /// Acquire the mutex, blocking while another thread holds it. Not
    /// recursive.
    pub fn acquire(&self) {
        let current = super::current_thread();
        assert!(
            !self.held_by_current(),
            "recursive acquire of a kernel mutex"
        );
        self.sema.down();
        self.owner.store(current.pack(), Ordering::SeqCst);
    }

    pub fn try_acquire(&self) -> bool {
        if self.sema.try_down() {
            self.owner
                .store(super::current_thread().pack(), Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Release the mutex. The caller must be the owner.
    pub fn release(&self) {
        assert!(
            self.held_by_current(),
            "release of a kernel mutex by a non-owner"
        );
        self.owner.store(MUTEX_UNOWNED, Ordering::SeqCst);
        self.sema.up();
    }

    pub fn held_by_current(&self) -> bool {
        self.owner.load(Ordering::SeqCst) == super::current_thread().pack()
    }
}

impl Default for KMutex {
    fn default() -> Self {
        Self::new()
    }
}

/*
 * Priority-Array Run Queue
 *
 * Two priority arrays, `active` and `expired`. Each array holds one FIFO
 * queue per priority level plus a 64-bit bitmap of non-empty levels, so
 * "highest ready priority" is a single leading-zeros scan.
 *
 * Threads whose timeslice expires go to `expired`; voluntary yields and
 * wakeups go to `active`. When `active` drains, the two arrays swap in
 * O(1) by flipping an index. Every thread in `expired` therefore runs at
 * least once per swap cycle, which bounds starvation within a priority
 * level.
 */

use alloc::collections::VecDeque;

use super::thread::ThreadId;

/// Lowest priority.
pub const PRI_MIN: u8 = 0;
/// Default priority.
pub const PRI_DEFAULT: u8 = 31;
/// Highest priority.
pub const PRI_MAX: u8 = 63;

const PRI_COUNT: usize = PRI_MAX as usize + 1;

/// One priority array: 64 FIFO queues and a bitmap of non-empty levels.
pub struct PriorityArray {
    queues: [VecDeque<ThreadId>; PRI_COUNT],
    bitmap: u64,
    len: usize,
}

impl PriorityArray {
    fn new() -> Self {
        PriorityArray {
            queues: core::array::from_fn(|_| VecDeque::new()),
            bitmap: 0,
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Append `tid` to the FIFO queue for `priority`.
    pub fn insert(&mut self, tid: ThreadId, priority: u8) {
        debug_assert!(priority <= PRI_MAX);
        self.queues[priority as usize].push_back(tid);
        self.bitmap |= 1u64 << priority;
        self.len += 1;
    }

    /// Highest non-empty priority level, if any.
    pub fn highest_priority(&self) -> Option<u8> {
        if self.bitmap == 0 {
            None
        } else {
            Some(63 - self.bitmap.leading_zeros() as u8)
        }
    }

    /// Pop the front of the highest-priority non-empty queue.
    pub fn pop_highest(&mut self) -> Option<ThreadId> {
        let priority = self.highest_priority()?;
        let queue = &mut self.queues[priority as usize];
        let tid = queue.pop_front();
        debug_assert!(tid.is_some(), "bitmap bit set for an empty queue");
        if queue.is_empty() {
            self.bitmap &= !(1u64 << priority);
        }
        if tid.is_some() {
            self.len -= 1;
        }
        tid
    }

    /// Remove a specific thread from its priority queue. Returns whether
    /// it was present. Used when a queued thread changes priority or dies.
    pub fn remove(&mut self, tid: ThreadId, priority: u8) -> bool {
        let queue = &mut self.queues[priority as usize];
        let before = queue.len();
        queue.retain(|&t| t != tid);
        let removed = queue.len() < before;
        if removed {
            self.len -= before - queue.len();
            if queue.is_empty() {
                self.bitmap &= !(1u64 << priority);
            }
        }
        removed
    }

    /// Front-to-back snapshot of one priority level, for diagnostics.
    pub fn queue_at(&self, priority: u8) -> impl Iterator<Item = ThreadId> + '_ {
        self.queues[priority as usize].iter().copied()
    }
}

/// The paired arrays. `active` and `expired` are indices into `arrays`
/// so the swap is a flip, not a move.
pub struct RunQueue {
    arrays: [PriorityArray; 2],
    active: usize,
    swaps: u64,
}

impl RunQueue {
    pub fn new() -> Self {
        RunQueue {
            arrays: [PriorityArray::new(), PriorityArray::new()],
            active: 0,
            swaps: 0,
        }
    }

    pub fn active(&self) -> &PriorityArray {
        &self.arrays[self.active]
    }

    pub fn expired(&self) -> &PriorityArray {
        &self.arrays[1 - self.active]
    }

    pub fn is_empty(&self) -> bool {
        self.arrays[0].is_empty() && self.arrays[1].is_empty()
    }

    /// Number of array swaps performed so far.
    pub fn swap_count(&self) -> u64 {
        self.swaps
    }

    /// Insert a ready thread into the active array.
    pub fn insert_active(&mut self, tid: ThreadId, priority: u8) {
        self.arrays[self.active].insert(tid, priority);
    }

    /// Insert a thread whose timeslice expired into the expired array.
    /// The caller must have recomputed the thread's timeslice first.
    pub fn insert_expired(&mut self, tid: ThreadId, priority: u8) {
        self.arrays[1 - self.active].insert(tid, priority);
    }

    /// Highest priority among threads in the active array.
    pub fn highest_active(&self) -> Option<u8> {
        self.arrays[self.active].highest_priority()
    }

    /// Pop the next thread to run. Swaps the arrays first if the active
    /// one is empty; returns `None` only when both are.
    pub fn pop_next(&mut self) -> Option<ThreadId> {
        if self.is_empty() {
            return None;
        }
        if self.arrays[self.active].is_empty() {
            self.swap();
        }
        self.arrays[self.active].pop_highest()
    }

    /// Remove a thread from whichever array holds it.
    pub fn remove(&mut self, tid: ThreadId, priority: u8) -> bool {
        self.arrays[0].remove(tid, priority) || self.arrays[1].remove(tid, priority)
    }

    fn swap(&mut self) {
        debug_assert!(self.arrays[self.active].is_empty());
        self.active = 1 - self.active;
        self.swaps += 1;
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

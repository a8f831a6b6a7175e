/*
 * Thread Management
 *
 * This module defines the Thread structure and related types for the
 * priority scheduler.
 *
 * A thread is created Blocked, unblocked into Ready, dispatched to
 * Running, and leaves through Dying; the thread that is scheduled next
 * reaps a Dying predecessor. Each thread carries its static priority,
 * the timeslice derived from it (priority + 5 ticks), and, for user
 * threads, the address space holding its page directory, supplemental
 * page table, mapped files and open files.
 */

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::arena::RawHandle;
use crate::memory::address_space::AddressSpace;

/// Thread identifier: a generation-counted handle into the thread table.
/// A reaped thread's id stops resolving instead of aliasing its slot's
/// next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub(crate) RawHandle);

impl ThreadId {
    /// Sentinel returned when thread allocation fails.
    pub const ERROR: ThreadId = ThreadId(RawHandle::DANGLING);

    pub(crate) fn pack(self) -> u64 {
        self.0.pack()
    }

    pub(crate) fn unpack(raw: u64) -> Self {
        ThreadId(RawHandle::unpack(raw))
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0.index())
    }
}

/// Thread state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Maximum length of a thread name.
pub const THREAD_NAME_LEN: usize = 16;

/// Thread structure.
///
/// The architecture layer owns the saved register context; this side
/// owns identity, scheduling state and the user address space.
pub struct Thread {
    pub id: ThreadId,
    pub name: heapless::String<THREAD_NAME_LEN>,
    pub state: ThreadState,

    /// Static priority, 0..=63. Higher runs first.
    pub priority: u8,
    /// Ticks this thread may run before preemption; priority + 5.
    pub timeslice: u32,
    /// Ticks consumed since the thread was last dispatched.
    pub ticks_since_yield: u32,
    /// Total ticks charged to this thread.
    pub cpu_ticks: u64,

    /// Entry point, run by the dispatch layer on first switch-in.
    pub entry: fn(),

    /// User address space; None for pure kernel threads.
    pub space: Option<Arc<AddressSpace>>,

    pub parent: Option<ThreadId>,
    pub children: Vec<ThreadId>,
    pub exit_status: i32,
}

impl Thread {
    pub fn new(name: &str, priority: u8, entry: fn()) -> Self {
        let mut short_name = heapless::String::new();
        for c in name.chars() {
            if short_name.push(c).is_err() {
                break;
            }
        }
        Thread {
            id: ThreadId::ERROR, // patched by the scheduler on insert
            name: short_name,
            state: ThreadState::Blocked,
            priority,
            timeslice: priority as u32 + 5,
            ticks_since_yield: 0,
            cpu_ticks: 0,
            entry,
            space: None,
            parent: None,
            children: Vec::new(),
            exit_status: 0,
        }
    }

    /// Recompute the timeslice from the priority. Called on the path
    /// that moves an expired thread into the expired array, so a thread
    /// never re-enters rotation with a stale slice.
    pub fn recompute_timeslice(&mut self) {
        self.timeslice = self.priority as u32 + 5;
    }

    /// Equality lookup over the child list.
    pub fn find_child(&self, tid: ThreadId) -> Option<ThreadId> {
        self.children.iter().copied().find(|&c| c == tid)
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name.as_str())
            .field("state", &self.state)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Per-thread snapshot for diagnostics.
#[derive(Debug, Clone)]
pub struct ThreadStats {
    pub id: ThreadId,
    pub name: alloc::string::String,
    pub state: ThreadState,
    pub priority: u8,
    pub cpu_ticks: u64,
}

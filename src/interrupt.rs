/*
 * Interrupt Discipline
 *
 * This module models the CPU interrupt flag for the kernel core. The
 * architecture layer owns the real flag; the core only needs its
 * discipline: operations that modify the ready/sleep lists and thread
 * states run with interrupts off, and code running in interrupt context
 * may wake threads but never block.
 *
 * Two pieces express that discipline in the type system:
 *
 * - `IntrGuard`: a scoped disable. `disable()` saves the previous level
 *   and restores it on drop, on every exit path.
 * - `InterruptToken`: a capability handed only to interrupt-context entry
 *   points (the timer tick). APIs that are legal from interrupt context
 *   take `&InterruptToken`; APIs that may block assert the flag instead.
 */

use core::sync::atomic::{AtomicBool, Ordering};

/// Modelled interrupt-enable flag. True outside interrupt handlers and
/// scoped disables.
static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Are interrupts currently enabled?
pub fn are_enabled() -> bool {
    INTERRUPTS_ENABLED.load(Ordering::SeqCst)
}

/// Enable interrupts unconditionally.
pub fn enable() {
    INTERRUPTS_ENABLED.store(true, Ordering::SeqCst);
}

/// Disable interrupts, returning a guard that restores the previous
/// level when dropped.
pub fn disable() -> IntrGuard {
    let was_enabled = INTERRUPTS_ENABLED.swap(false, Ordering::SeqCst);
    IntrGuard { was_enabled }
}

/// Run a closure with interrupts disabled, restoring the previous level
/// afterwards.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let _guard = disable();
    f()
}

/// Scoped interrupt-disable. Holds the level that was in force before
/// `disable()` and restores it on drop.
pub struct IntrGuard {
    was_enabled: bool,
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        INTERRUPTS_ENABLED.store(self.was_enabled, Ordering::SeqCst);
    }
}

/// Capability proving the holder runs in interrupt context.
///
/// Only the timer-interrupt entry point constructs one. Functions taking
/// `&InterruptToken` must not allocate unboundedly or block; they may
/// unblock threads and request preemption.
pub struct InterruptToken(());

impl InterruptToken {
    /// Construct the token. Restricted to the crate's interrupt entry
    /// points; everything else receives it by reference.
    pub(crate) fn new_for_isr() -> Self {
        InterruptToken(())
    }
}

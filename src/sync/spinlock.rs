//! The single coarse lock that guards the whole process table, every
//! MLFQ queue, and every field read that races with a state transition.
//!
//! Because this crate resolves "the calling CPU" via an explicit index
//! rather than a hardware register read (see `proc::cpu`), `lock()` takes
//! that index instead of consulting a global `mycpu()`.

use crate::proc::cpu::{pop_off, push_off};
use core::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct Spinlock {
    locked: AtomicBool,
}
impl Spinlock {
    pub const fn new() -> Spinlock {
        Spinlock {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquire the lock without producing a guard. Callers that need the
    /// sleep/wakeup discipline (dropping the lock across a context switch
    /// and reacquiring it afterwards) go through this rather than the RAII
    /// guard, which cannot span a `sched()` call.
    ///
    /// # Safety
    /// Caller must pair this with exactly one `unlock()` and must not call
    /// it again from the same CPU before unlocking: unlike the RAII guard,
    /// which panics on recursive acquisition, this one spins forever on
    /// self-deadlock, matching a plain `acquire()`/`release()` pair rather
    /// than a guarded lock.
    pub unsafe fn lock_unguarded(&self, cpu_id: usize) {
        push_off(cpu_id);
        while self.locked.swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }

    pub fn lock(&self, cpu_id: usize) -> SpinlockGuard<'_> {
        unsafe {
            self.lock_unguarded(cpu_id);
        }
        SpinlockGuard {
            lock: self,
            cpu_id,
        }
    }

    /// # Safety
    /// Caller must currently hold the lock (via a matching `lock_unguarded`).
    pub unsafe fn unlock(&self, cpu_id: usize) {
        self.locked.store(false, Ordering::Release);
        pop_off(cpu_id);
    }

    /// Non-blocking query used by `sched()`'s invariant check.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

pub struct SpinlockGuard<'l> {
    lock: &'l Spinlock,
    cpu_id: usize,
}
impl<'l> SpinlockGuard<'l> {
    pub fn cpu_id(&self) -> usize {
        self.cpu_id
    }
}
impl<'l> Drop for SpinlockGuard<'l> {
    fn drop(&mut self) {
        unsafe { self.lock.unlock(self.cpu_id) }
    }
}

//! The process table and the operations that mutate it: `alloc`, `fork`,
//! `exit`, `wait`/`waitx`, `kill`, `set_priority`, `sleep`/`wakeup`, and
//! `sched`/`yield_`.
//!
//! One array, one lock, guarding every field of every slot: `Result`-
//! returning methods on a table type guarded by a single `Spinlock`,
//! generalized here to run any of the four scheduling policies.

use super::context::Context;
use super::cpu::cpu;
use super::state::{Chan, Proc, ProcState};
use crate::collab::Collaborators;
use crate::param::NPROC;
use crate::sync::spinlock::Spinlock;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, AtomicU64, Ordering};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcError {
    /// No UNUSED slot was available (`allocproc` returning 0).
    TableFull,
    /// A collaborator (address space or kernel stack) failed to allocate.
    AllocFailed,
    /// `wait`/`waitx` found no children at all, live or dead.
    NoChildren,
    /// The calling process was killed while blocked in `wait`/`waitx`.
    Killed,
    /// `set_priority` was given a value outside `[MIN_PRIORITY, MAX_PRIORITY]`.
    PriorityOutOfRange,
    /// `kill`/`set_priority` named a pid with no matching live process.
    UnknownPid,
}

/// The result of a successful `wait`/`waitx`: the reaped child's pid plus,
/// for `waitx`, its wait time and run time in ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reaped {
    pub pid: i32,
    pub wtime: u64,
    pub rtime: u64,
}

/// The fixed-size process table plus its single coarse lock.
///
/// Every field of every `Proc` is read or written only while `lock` is
/// held: one lock for the whole table, rather than a lock per process,
/// so that multi-field invariants (reparenting, MLFQ admission) never
/// need a second lock acquired in the middle of an update.
pub struct ProcTable {
    lock: Spinlock,
    slots: UnsafeCell<[Proc; NPROC]>,
    /// Guarded by the same lock as `slots`; MLFQ has no lock of its own.
    mlfq: UnsafeCell<crate::mlfq::Mlfq>,
    next_pid: AtomicI32,
    ticks: AtomicU64,
}
unsafe impl Sync for ProcTable {}

impl ProcTable {
    pub const fn new() -> ProcTable {
        const INIT: Proc = Proc::new();
        ProcTable {
            lock: Spinlock::new(),
            slots: UnsafeCell::new([INIT; NPROC]),
            mlfq: UnsafeCell::new(crate::mlfq::Mlfq::new()),
            next_pid: AtomicI32::new(1),
            ticks: AtomicU64::new(0),
        }
    }

    /// # Safety
    /// Caller must hold `self.lock` (directly or via a guard) for the
    /// duration the returned reference is used.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_mut(&self, i: usize) -> &mut Proc {
        &mut (*self.slots.get())[i]
    }

    /// Acquire the table lock. Exposed so `sched.rs`'s per-CPU loop can
    /// take it once and hold it across both process-table and MLFQ
    /// access, matching `proc.c`'s `scheduler()` holding `ptable.lock`
    /// for the whole selection-and-dispatch span.
    pub fn lock(&self, cpu_id: usize) -> crate::sync::spinlock::SpinlockGuard<'_> {
        self.lock.lock(cpu_id)
    }

    /// # Safety
    /// Caller must hold `self.lock`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot(&self, i: usize) -> &mut Proc {
        self.slot_mut(i)
    }

    /// # Safety
    /// Caller must hold `self.lock`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn mlfq_mut(&self) -> &mut crate::mlfq::Mlfq {
        &mut *self.mlfq.get()
    }

    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Advances the tick counter by one. Called from the timer-interrupt
    /// collaborator once per tick; accrues `rtime`/`iotime` for whichever
    /// process is current on each CPU, matching `trap.c`'s per-tick
    /// bookkeeping in the original.
    pub fn tick(&self, cpu_id: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let _guard = self.lock.lock(cpu_id);
        unsafe {
            if let Some(p) = cpu(cpu_id).proc.as_mut() {
                p.rtime += 1;
                #[cfg(feature = "mlfq")]
                {
                    if let Some(q) = p.cur_queue {
                        p.ticks[q] += 1;
                    }
                }
            }
            for p in (*self.slots.get()).iter_mut() {
                if p.state == ProcState::Sleeping {
                    p.iotime += 1;
                }
            }
        }
    }

    /// `allocproc`: find an `Unused` slot, stamp it `Embryo` with fresh
    /// bookkeeping, and have the collaborator allocate its kernel stack.
    /// Address space setup is left to the caller (`userinit`'s direct
    /// setup, or `fork`'s copy of the parent's), not done here.
    pub fn alloc(&self, collab: &dyn Collaborators, cpu_id: usize, name: &[u8]) -> Result<usize, ProcError> {
        let index;
        {
            let _guard = self.lock.lock(cpu_id);
            let found = unsafe {
                (*self.slots.get())
                    .iter()
                    .position(|p| p.state == ProcState::Unused)
            };
            let Some(i) = found else {
                return Err(ProcError::TableFull);
            };
            let now = self.now();
            let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
            let p = unsafe { self.slot_mut(i) };
            *p = Proc::new();
            p.state = ProcState::Embryo;
            p.pid = pid;
            p.ctime = now;
            let n = name.len().min(p.name.len());
            p.name[..n].copy_from_slice(&name[..n]);
            #[cfg(feature = "mlfq")]
            {
                p.cur_queue = Some(0);
            }
            index = i;
        }

        let Some(kstack) = collab.kstack_alloc() else {
            let _guard = self.lock.lock(cpu_id);
            let p = unsafe { self.slot_mut(index) };
            *p = Proc::new();
            return Err(ProcError::AllocFailed);
        };

        let _guard = self.lock.lock(cpu_id);
        let p = unsafe { self.slot_mut(index) };
        p.kstack = Some(kstack);
        log::debug!("alloc: pid {} in slot {}", p.pid, index);
        Ok(index)
    }

    /// Allocate the first process in the table, with no parent of its own,
    /// set up its address space directly (unlike `fork`, there's no parent
    /// address space or file table to copy from), and mark it `Runnable`.
    /// Returns the slot index, which the caller must remember as the
    /// reparenting target for `exit`.
    pub fn userinit(&self, collab: &dyn Collaborators, cpu_id: usize) -> Result<usize, ProcError> {
        let index = self.alloc(collab, cpu_id, b"initproc")?;

        let Ok(address_space) = collab.address_space_setup() else {
            let _guard = self.lock.lock(cpu_id);
            let p = unsafe { self.slot_mut(index) };
            if let Some(stack) = p.kstack.take() {
                collab.kstack_free(stack);
            }
            *p = Proc::new();
            return Err(ProcError::AllocFailed);
        };

        let _guard = self.lock.lock(cpu_id);
        let p = unsafe { self.slot_mut(index) };
        p.address_space = Some(address_space);
        p.parent = None;
        p.state = ProcState::Runnable;
        #[cfg(feature = "mlfq")]
        {
            unsafe { self.mlfq_mut() }
                .push_back(0, index)
                .expect("userinit: mlfq level 0 overflow");
        }
        log::info!("userinit: pid {} in slot {}", p.pid, index);
        Ok(index)
    }

    fn index_of_pid(&self, pid: i32) -> Option<usize> {
        unsafe { (*self.slots.get()).iter().position(|p| p.pid == pid) }
    }

    /// `fork`: duplicate `parent`'s address space, open files, and cwd
    /// into a freshly allocated child, leaving it `Runnable`.
    pub fn fork(&self, collab: &dyn Collaborators, cpu_id: usize, parent_pid: i32) -> Result<i32, ProcError> {
        let child_index = {
            let parent_index = self.index_of_pid(parent_pid).ok_or(ProcError::UnknownPid)?;
            let name = unsafe { self.slot_mut(parent_index).name };
            self.alloc(collab, cpu_id, &name)?
        };

        let parent_index = self.index_of_pid(parent_pid).ok_or(ProcError::UnknownPid)?;
        let (parent_space, parent_sz) = {
            let _guard = self.lock.lock(cpu_id);
            let parent = unsafe { self.slot_mut(parent_index) };
            (parent.address_space, parent.sz)
        };
        let Some(parent_space) = parent_space else {
            let _guard = self.lock.lock(cpu_id);
            let child = unsafe { self.slot_mut(child_index) };
            if let Some(stack) = child.kstack.take() {
                collab.kstack_free(stack);
            }
            *child = Proc::new();
            return Err(ProcError::AllocFailed);
        };
        let Ok(child_space) = collab.address_space_copy(parent_space, parent_sz) else {
            let _guard = self.lock.lock(cpu_id);
            let child = unsafe { self.slot_mut(child_index) };
            if let Some(stack) = child.kstack.take() {
                collab.kstack_free(stack);
            }
            *child = Proc::new();
            return Err(ProcError::AllocFailed);
        };

        let child_pid;
        {
            let _guard = self.lock.lock(cpu_id);
            let (ofile, cwd) = {
                let parent = unsafe { self.slot_mut(parent_index) };
                (parent.ofile, parent.cwd)
            };
            let child = unsafe { self.slot_mut(child_index) };
            child.address_space = Some(child_space);
            child.sz = parent_sz;
            child.parent = Some(parent_index);
            for (slot, f) in child.ofile.iter_mut().zip(ofile.iter()) {
                *slot = f.map(|f| collab.file_dup(f));
            }
            child.cwd = cwd.map(|c| collab.inode_dup(c));
            child.state = ProcState::Runnable;
            child_pid = child.pid;
            log::debug!("fork: pid {} -> child pid {}", parent_pid, child_pid);
            #[cfg(feature = "mlfq")]
            {
                // `alloc` already stamped `cur_queue = Some(0)`; admit the
                // child into that level's ready queue now that it's
                // actually `Runnable`, or the selector would never see it.
                unsafe { self.mlfq_mut() }
                    .push_back(0, child_index)
                    .expect("fork: mlfq level 0 overflow");
            }
        }
        Ok(child_pid)
    }

    /// `exit`: close the calling process's files, reparent its children to
    /// `init_index`, wake anyone waiting on it, and mark it `Zombie`. The
    /// caller is responsible for calling `sched()` immediately afterwards;
    /// unlike `proc.c`'s `exit`, this function returns rather than being
    /// `-> !`, since the actual "never comes back" property is a property
    /// of the caller's control flow, not of this table mutation.
    pub fn exit(&self, collab: &dyn Collaborators, cpu_id: usize, pid: i32, status: i32, init_index: usize) -> Result<(), ProcError> {
        let index = self.index_of_pid(pid).ok_or(ProcError::UnknownPid)?;
        let now = self.now();

        let ofile = {
            let _guard = self.lock.lock(cpu_id);
            unsafe { self.slot_mut(index) }.ofile
        };
        for f in ofile.into_iter().flatten() {
            collab.file_close(f);
        }
        let cwd = {
            let _guard = self.lock.lock(cpu_id);
            unsafe { self.slot_mut(index) }.cwd.take()
        };
        if let Some(cwd) = cwd {
            collab.inode_put(cwd);
        }

        let _guard = self.lock.lock(cpu_id);
        let parent = unsafe { self.slot_mut(index) }.parent;
        if let Some(parent_index) = parent {
            self.wakeup_locked(parent_index as Chan);
        }
        for i in 0..NPROC {
            if i == index {
                continue;
            }
            let p = unsafe { self.slot_mut(i) };
            if p.parent == Some(index) {
                p.parent = Some(init_index);
                if p.state == ProcState::Zombie {
                    self.wakeup_locked(init_index as Chan);
                }
            }
        }
        #[cfg(feature = "mlfq")]
        self.mlfq_remove(index);
        let p = unsafe { self.slot_mut(index) };
        p.state = ProcState::Zombie;
        p.exit_status = status;
        p.etime = Some(now);
        log::info!("exit: pid {} status {}", pid, status);
        Ok(())
    }

    /// `exit` followed immediately by `sched`, matching `proc.c`'s `exit`
    /// being `-> !`: on real hardware this never returns, since the
    /// exiting process's kernel stack is only ever resumed by a context
    /// switch, and nothing switches back into a `Zombie`. It does return
    /// under `FakeCollaborators`, whose `context_switch` is a no-op, which
    /// is what lets tests drive `exit` without a second kernel thread.
    pub fn exit_and_sched(
        &self,
        collab: &dyn Collaborators,
        cpu_id: usize,
        pid: i32,
        status: i32,
        init_index: usize,
    ) -> Result<(), ProcError> {
        self.exit(collab, cpu_id, pid, status, init_index)?;
        let index = self.index_of_pid(pid).expect("exit_and_sched: pid vanished before reschedule");
        unsafe { self.lock.lock_unguarded(cpu_id) };
        self.sched(collab, cpu_id, index);
        unsafe { self.lock.unlock(cpu_id) };
        Ok(())
    }

    fn reap(&self, collab: &dyn Collaborators, index: usize) -> Reaped {
        let p = unsafe { self.slot_mut(index) };
        let now = p.etime.unwrap_or(0);
        let wtime = p.wtime(now);
        let rtime = p.rtime;
        let pid = p.pid;
        if let Some(space) = p.address_space.take() {
            collab.address_space_free(space, p.sz);
        }
        if let Some(stack) = p.kstack.take() {
            collab.kstack_free(stack);
        }
        *p = Proc::new();
        Reaped { pid, wtime, rtime }
    }

    /// Shared `wait`/`waitx` loop body (`proc.c`'s `wait`/`waitx`, which
    /// are identical except for what gets returned). Blocks by calling
    /// `sleep_on` until a zombie child shows up or there are none left.
    fn wait_impl(&self, collab: &dyn Collaborators, cpu_id: usize, pid: i32) -> Result<Reaped, ProcError> {
        let self_index = self.index_of_pid(pid).ok_or(ProcError::UnknownPid)?;
        loop {
            let mut zombie = None;
            let mut have_kids = false;
            {
                let _guard = self.lock.lock(cpu_id);
                for i in 0..NPROC {
                    let p = unsafe { self.slot_mut(i) };
                    if p.parent != Some(self_index) {
                        continue;
                    }
                    have_kids = true;
                    if p.state == ProcState::Zombie {
                        zombie = Some(i);
                        break;
                    }
                }
            }
            if let Some(i) = zombie {
                let _guard = self.lock.lock(cpu_id);
                return Ok(self.reap(collab, i));
            }
            let killed = {
                let _guard = self.lock.lock(cpu_id);
                unsafe { self.slot_mut(self_index) }.killed
            };
            if !have_kids || killed {
                return Err(if have_kids { ProcError::Killed } else { ProcError::NoChildren });
            }
            self.sleep(collab, cpu_id, self_index as Chan, pid);
        }
    }

    pub fn wait(&self, collab: &dyn Collaborators, cpu_id: usize, pid: i32) -> Result<i32, ProcError> {
        self.wait_impl(collab, cpu_id, pid).map(|r| r.pid)
    }

    pub fn waitx(&self, collab: &dyn Collaborators, cpu_id: usize, pid: i32) -> Result<Reaped, ProcError> {
        self.wait_impl(collab, cpu_id, pid)
    }

    /// `kill`: mark the target killed, and if it was sleeping wake it so
    /// it can notice. An MLFQ target is also re-enqueued, matching
    /// `kill`'s `#ifdef MLFQ pushback` branch.
    pub fn kill(&self, cpu_id: usize, pid: i32) -> Result<(), ProcError> {
        let _guard = self.lock.lock(cpu_id);
        let index = self.index_of_pid(pid).ok_or(ProcError::UnknownPid)?;
        let p = unsafe { self.slot_mut(index) };
        p.killed = true;
        if p.state == ProcState::Sleeping {
            p.state = ProcState::Runnable;
            p.reset_ticks = self.now();
            self.mlfq_pushback(index);
        }
        Ok(())
    }

    /// `set_priority`: only meaningful under PBS/MLFQ-style priority
    /// scheduling, but kept available under every policy since `proc.c`
    /// does too; returns the previous priority.
    pub fn set_priority(&self, cpu_id: usize, pid: i32, new_priority: i32) -> Result<i32, ProcError> {
        use crate::param::{MAX_PRIORITY, MIN_PRIORITY};
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&new_priority) {
            return Err(ProcError::PriorityOutOfRange);
        }
        let _guard = self.lock.lock(cpu_id);
        let index = self.index_of_pid(pid).ok_or(ProcError::UnknownPid)?;
        let p = unsafe { self.slot_mut(index) };
        let old = p.priority;
        p.priority = new_priority;
        Ok(old)
    }

    /// A snapshot row per live process, for the `getps` syscall.
    ///
    /// Under MLFQ, `wtime` is `now - reset_ticks` rather than the
    /// `wait`/`waitx` formula: `reset_ticks` is stamped on every dispatch,
    /// wakeup, and aging promotion, so this reports time since the
    /// process's last scheduling event rather than its whole lifetime
    /// wait, which is what the MLFQ aging sweep actually needs to reason
    /// about starvation.
    pub fn snapshot(&self, cpu_id: usize, out: &mut [Option<super::state::ProcSnapshot>]) {
        let _guard = self.lock.lock(cpu_id);
        let now = self.now();
        for (slot, i) in out.iter_mut().zip(0..NPROC) {
            let p = unsafe { self.slot_mut(i) };
            *slot = if p.pid > 0 {
                #[cfg(feature = "mlfq")]
                let wtime = now.saturating_sub(p.reset_ticks);
                #[cfg(not(feature = "mlfq"))]
                let wtime = p.wtime(now);
                Some(super::state::ProcSnapshot {
                    pid: p.pid,
                    priority: p.priority,
                    state: p.state,
                    rtime: p.rtime,
                    wtime,
                    n_run: p.n_run,
                    cur_queue: p.cur_queue,
                    ticks: p.ticks,
                })
            } else {
                None
            };
        }
    }

    /// Atomically drop `lk` and block the calling process on `chan`.
    /// Mirrors `proc.c`'s `sleep`: since this crate has only the one
    /// table lock, the "lock != ptable.lock" branch never applies, so
    /// this is the simpler always-already-held-the-table-lock case.
    pub fn sleep(&self, collab: &dyn Collaborators, cpu_id: usize, chan: Chan, pid: i32) {
        unsafe { self.lock.lock_unguarded(cpu_id) };
        let index = self.index_of_pid(pid).expect("sleep: pid vanished");
        {
            let p = unsafe { self.slot_mut(index) };
            p.chan = Some(chan);
            p.state = ProcState::Sleeping;
            #[cfg(feature = "mlfq")]
            {
                if let Some(q) = p.cur_queue {
                    self.mlfq_remove_from(q, index);
                }
            }
        }
        self.sched(collab, cpu_id, index);
        unsafe { self.slot_mut(index) }.chan = None;
        unsafe { self.lock.unlock(cpu_id) };
    }

    /// Caller must already hold the table lock. The MLFQ re-enqueue
    /// happens in the same pass that flips the state, using the woken
    /// process's own `cur_queue` — not a second pass filtered on `chan`
    /// having already been cleared, since `chan` stays set until the
    /// process is actually redispatched and its own `sleep()` call
    /// returns.
    fn wakeup_locked(&self, chan: Chan) {
        for i in 0..NPROC {
            let p = unsafe { self.slot_mut(i) };
            if p.state == ProcState::Sleeping && p.chan == Some(chan) {
                p.state = ProcState::Runnable;
                #[cfg(feature = "mlfq")]
                {
                    p.reset_ticks = self.now();
                    if let Some(q) = p.cur_queue {
                        self.mlfq_ready_push(q, i).expect("wakeup: mlfq overflow");
                    }
                }
            }
        }
    }

    pub fn wakeup(&self, cpu_id: usize, chan: Chan) {
        let _guard = self.lock.lock(cpu_id);
        self.wakeup_locked(chan);
    }

    /// `yield`: give up the CPU for one round, staying `Runnable`.
    pub fn yield_(&self, collab: &dyn Collaborators, cpu_id: usize, pid: i32) {
        unsafe { self.lock.lock_unguarded(cpu_id) };
        let index = self.index_of_pid(pid).expect("yield_: pid vanished");
        unsafe { self.slot_mut(index) }.state = ProcState::Runnable;
        self.sched(collab, cpu_id, index);
        unsafe { self.lock.unlock(cpu_id) };
    }

    /// `sched`: hand control back to this CPU's scheduler loop. Caller
    /// must already hold the table lock and must have already changed
    /// `index`'s state away from `Running`, matching `proc.c`'s
    /// `sched()` invariant checks.
    fn sched(&self, collab: &dyn Collaborators, cpu_id: usize, index: usize) {
        debug_assert!(self.lock.is_locked());
        debug_assert_ne!(unsafe { self.slot_mut(index) }.state, ProcState::Running);
        let ctx: *mut Context = unsafe { &mut self.slot_mut(index).context };
        unsafe {
            cpu(cpu_id).proc = core::ptr::null_mut();
            collab.context_switch(ctx, cpu_id);
        }
    }

    /// Drop `index` out of whichever MLFQ level it's currently sitting in.
    /// Caller must hold the table lock.
    #[cfg_attr(not(feature = "mlfq"), allow(dead_code))]
    fn mlfq_remove(&self, index: usize) {
        #[cfg(feature = "mlfq")]
        unsafe {
            self.mlfq_mut().remove_anywhere(index);
        }
        #[cfg(not(feature = "mlfq"))]
        let _ = index;
    }

    #[cfg_attr(not(feature = "mlfq"), allow(dead_code))]
    fn mlfq_remove_from(&self, level: usize, index: usize) {
        #[cfg(feature = "mlfq")]
        unsafe {
            self.mlfq_mut().remove_at(level, index);
        }
        #[cfg(not(feature = "mlfq"))]
        let _ = (level, index);
    }

    /// Re-enqueue `index` at its current `cur_queue` level (e.g. from
    /// `kill` waking a sleeper). Caller must hold the table lock.
    #[cfg_attr(not(feature = "mlfq"), allow(dead_code))]
    fn mlfq_pushback(&self, index: usize) {
        #[cfg(feature = "mlfq")]
        unsafe {
            let level = self.slot_mut(index).cur_queue.unwrap_or(0);
            self.mlfq_mut().push_back(level, index).expect("kill: mlfq overflow");
        }
        #[cfg(not(feature = "mlfq"))]
        let _ = index;
    }

    #[cfg_attr(not(feature = "mlfq"), allow(dead_code))]
    fn mlfq_ready_push(&self, level: usize, index: usize) -> Result<(), crate::mlfq::MlfqError> {
        #[cfg(feature = "mlfq")]
        unsafe {
            return self.mlfq_mut().push_back(level, index);
        }
        #[cfg(not(feature = "mlfq"))]
        {
            let _ = (level, index);
            Ok(())
        }
    }
}
impl Default for ProcTable {
    fn default() -> Self {
        ProcTable::new()
    }
}

pub static PTABLE: ProcTable = ProcTable::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::fake::FakeCollaborators;
    use crate::param::{MAX_PRIORITY, MIN_PRIORITY, NPROC};

    fn runnable(table: &ProcTable, collab: &FakeCollaborators, name: &[u8]) -> (i32, usize) {
        let index = table.alloc(collab, 0, name).unwrap();
        let address_space = collab.address_space_setup().unwrap();
        let _guard = table.lock(0);
        let p = unsafe { table.slot(index) };
        p.address_space = Some(address_space);
        p.state = ProcState::Runnable;
        (p.pid, index)
    }

    #[test]
    fn alloc_assigns_increasing_pids_and_stamps_ctime() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        table.tick(0);
        let (pid_a, idx_a) = runnable(&table, &collab, b"a");
        let (pid_b, _idx_b) = runnable(&table, &collab, b"b");
        assert!(pid_b > pid_a);
        let _guard = table.lock(0);
        assert_eq!(unsafe { table.slot(idx_a) }.ctime, 1);
    }

    #[test]
    fn alloc_fails_cleanly_when_table_is_full() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        for _ in 0..NPROC {
            table.alloc(&collab, 0, b"p").unwrap();
        }
        assert_eq!(table.alloc(&collab, 0, b"overflow"), Err(ProcError::TableFull));
    }

    #[test]
    fn fork_inherits_name_and_starts_runnable() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (parent_pid, _) = runnable(&table, &collab, b"parent");
        let child_pid = table.fork(&collab, 0, parent_pid).unwrap();
        let _guard = table.lock(0);
        let child_index = (0..NPROC).find(|&i| unsafe { table.slot(i) }.pid == child_pid).unwrap();
        let child = unsafe { table.slot(child_index) };
        assert_eq!(child.state, ProcState::Runnable);
        assert_eq!(&child.name[..6], b"parent");
    }

    #[cfg(feature = "mlfq")]
    #[test]
    fn fork_admits_child_into_mlfq_level_zero() {
        // Regression: `alloc` stamps `cur_queue = Some(0)` on every new
        // slot under MLFQ, but that alone doesn't make the child visible
        // to `select_mlfq` — it still has to land in the level-0 ready
        // queue, or a forked child would sit `Runnable` forever without
        // ever being dispatched.
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (parent_pid, _) = runnable(&table, &collab, b"parent");
        let child_pid = table.fork(&collab, 0, parent_pid).unwrap();
        let _guard = table.lock(0);
        let child_index = (0..NPROC).find(|&i| unsafe { table.slot(i) }.pid == child_pid).unwrap();
        assert!(unsafe { table.mlfq_mut() }.contains(0, child_index));
    }

    #[test]
    fn exit_then_wait_reaps_the_child_and_frees_its_resources() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (parent_pid, parent_index) = runnable(&table, &collab, b"parent");
        let child_pid = table.fork(&collab, 0, parent_pid).unwrap();
        let child_index = {
            let _guard = table.lock(0);
            (0..NPROC).find(|&i| unsafe { table.slot(i) }.pid == child_pid).unwrap()
        };
        let (child_space, child_stack) = {
            let _guard = table.lock(0);
            let c = unsafe { table.slot(child_index) };
            (c.address_space.unwrap(), c.kstack.unwrap())
        };

        table.exit(&collab, 0, child_pid, 7, parent_index).unwrap();
        let reaped = table.wait(&collab, 0, parent_pid).unwrap();
        assert_eq!(reaped, child_pid);
        assert!(collab.address_space_was_freed(child_space));
        assert!(collab.kstack_was_freed(child_stack));

        let _guard = table.lock(0);
        assert_eq!(unsafe { table.slot(child_index) }.state, ProcState::Unused);
        assert_eq!(unsafe { table.slot(child_index) }.pid, 0);
    }

    #[test]
    fn wait_with_no_children_fails() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (pid, _) = runnable(&table, &collab, b"lonely");
        assert_eq!(table.wait(&collab, 0, pid), Err(ProcError::NoChildren));
    }

    #[test]
    fn alloc_does_not_set_up_an_address_space() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let index = table.alloc(&collab, 0, b"p").unwrap();
        let _guard = table.lock(0);
        let p = unsafe { table.slot(index) };
        assert!(p.address_space.is_none());
        assert!(p.kstack.is_some());
    }

    #[test]
    fn userinit_sets_up_its_own_address_space_and_is_runnable() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let index = table.userinit(&collab, 0).unwrap();
        let _guard = table.lock(0);
        let p = unsafe { table.slot(index) };
        assert!(p.address_space.is_some());
        assert_eq!(p.state, ProcState::Runnable);
        assert_eq!(p.parent, None);
    }

    #[test]
    fn userinit_frees_the_kstack_when_address_space_setup_fails() {
        let table = ProcTable::new();
        let mut collab = FakeCollaborators::new();
        collab.fail_address_space = true;
        assert_eq!(table.userinit(&collab, 0), Err(ProcError::AllocFailed));
        let mut freed_any = false;
        for handle in 0..8 {
            if collab.kstack_was_freed(crate::collab::KernelStack(handle)) {
                freed_any = true;
            }
        }
        assert!(freed_any, "userinit's kstack was never freed on address-space failure");
        let _guard = table.lock(0);
        for i in 0..NPROC {
            assert_eq!(unsafe { table.slot(i) }.state, ProcState::Unused);
        }
    }

    #[test]
    fn fork_frees_the_childs_kstack_when_parent_has_no_address_space() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        // A parent that was never actually initialized (no address space
        // installed yet) — `fork` must not leak the child it already
        // allocated while bailing out.
        let parent_index = table.alloc(&collab, 0, b"parent").unwrap();
        let parent_pid = {
            let _guard = table.lock(0);
            let p = unsafe { table.slot(parent_index) };
            p.state = ProcState::Runnable;
            p.pid
        };
        assert_eq!(table.fork(&collab, 0, parent_pid), Err(ProcError::AllocFailed));
        let _guard = table.lock(0);
        let mut child_freed = false;
        for i in 0..NPROC {
            if i == parent_index {
                continue;
            }
            assert_eq!(unsafe { table.slot(i) }.state, ProcState::Unused);
        }
        for handle in 0..8 {
            if collab.kstack_was_freed(crate::collab::KernelStack(handle)) {
                child_freed = true;
            }
        }
        assert!(child_freed, "child's kstack was never freed");
    }

    #[test]
    fn waitx_arithmetic_matches_wtime_formula() {
        // `wtime = etime - ctime - rtime - iotime`: a child that spends
        // 10 ticks waiting for the CPU then 20 ticks actually running
        // accumulates rtime 20 over an elapsed 30 ticks, so wtime works
        // out to 10 — the time it wasn't running or blocked on I/O.
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (parent_pid, parent_index) = runnable(&table, &collab, b"parent");
        let child_pid = table.fork(&collab, 0, parent_pid).unwrap();
        let child_index = {
            let _guard = table.lock(0);
            (0..NPROC).find(|&i| unsafe { table.slot(i) }.pid == child_pid).unwrap()
        };

        for _ in 0..30 {
            table.tick(0);
        }
        {
            let _guard = table.lock(0);
            unsafe { table.slot(child_index) }.rtime = 20;
        }

        table.exit(&collab, 0, child_pid, 0, parent_index).unwrap();
        let reaped = table.waitx(&collab, 0, parent_pid).unwrap();
        assert_eq!(reaped.pid, child_pid);
        assert_eq!(reaped.rtime, 20);
        assert_eq!(reaped.wtime, 10);
    }

    #[test]
    fn kill_while_sleeping_makes_it_runnable_and_then_reapable() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (parent_pid, parent_index) = runnable(&table, &collab, b"parent");
        let child_pid = table.fork(&collab, 0, parent_pid).unwrap();
        let child_index = {
            let _guard = table.lock(0);
            (0..NPROC).find(|&i| unsafe { table.slot(i) }.pid == child_pid).unwrap()
        };
        {
            let _guard = table.lock(0);
            let c = unsafe { table.slot(child_index) };
            c.state = ProcState::Sleeping;
            c.chan = Some(42);
        }

        table.kill(0, child_pid).unwrap();
        {
            let _guard = table.lock(0);
            let c = unsafe { table.slot(child_index) };
            assert_eq!(c.state, ProcState::Runnable);
            assert!(c.killed);
        }

        table.exit(&collab, 0, child_pid, 0, parent_index).unwrap();
        assert_eq!(table.wait(&collab, 0, parent_pid), Ok(child_pid));
    }

    #[test]
    fn kill_unknown_pid_fails() {
        let table = ProcTable::new();
        assert_eq!(table.kill(0, 99999), Err(ProcError::UnknownPid));
    }

    #[test]
    fn set_priority_validates_range_and_returns_old_value() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (pid, _) = runnable(&table, &collab, b"p");
        assert_eq!(
            table.set_priority(0, pid, MIN_PRIORITY - 1),
            Err(ProcError::PriorityOutOfRange)
        );
        assert_eq!(
            table.set_priority(0, pid, MAX_PRIORITY + 1),
            Err(ProcError::PriorityOutOfRange)
        );
        let old = table.set_priority(0, pid, 20).unwrap();
        assert_eq!(old, crate::param::DEFAULT_PRIORITY);
        let older = table.set_priority(0, pid, 5).unwrap();
        assert_eq!(older, 20);
    }

    #[test]
    fn wakeup_clears_every_sleeper_on_the_channel() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (_pid_a, idx_a) = runnable(&table, &collab, b"a");
        let (_pid_b, idx_b) = runnable(&table, &collab, b"b");
        {
            let _guard = table.lock(0);
            for idx in [idx_a, idx_b] {
                let p = unsafe { table.slot(idx) };
                p.state = ProcState::Sleeping;
                p.chan = Some(7);
            }
        }
        table.wakeup(0, 7);
        let _guard = table.lock(0);
        for idx in [idx_a, idx_b] {
            let p = unsafe { table.slot(idx) };
            assert_eq!(p.state, ProcState::Runnable);
            assert_eq!(p.chan, None);
        }
    }

    #[cfg(feature = "mlfq")]
    #[test]
    fn wakeup_reenqueues_mlfq_sleeper_into_its_level() {
        // Regression: a naive port that filters the re-enqueue pass on
        // `chan.is_none()` never fires, since `chan` isn't cleared until
        // the woken process is actually redispatched and its own
        // `sleep()` returns — the process would go `Runnable` but vanish
        // from every MLFQ level, starving it forever.
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (_pid, index) = runnable(&table, &collab, b"p");
        {
            let _guard = table.lock(0);
            let p = unsafe { table.slot(index) };
            p.state = ProcState::Sleeping;
            p.chan = Some(99);
            p.cur_queue = Some(2);
            unsafe { table.mlfq_mut() }.remove_anywhere(index);
        }
        table.wakeup(0, 99);
        let _guard = table.lock(0);
        assert_eq!(unsafe { table.slot(index) }.state, ProcState::Runnable);
        assert!(unsafe { table.mlfq_mut() }.contains(2, index));
    }

    #[cfg(feature = "mlfq")]
    #[test]
    fn snapshot_wtime_under_mlfq_uses_reset_ticks_not_lifetime_formula() {
        // Under MLFQ, `getps`'s `wtime` is `now - reset_ticks`, not the
        // `wait`/`waitx` lifetime formula — it's time since the last
        // scheduling event (dispatch/wakeup/aging), which is what the
        // aging sweep actually reasons about.
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let (pid, index) = runnable(&table, &collab, b"p");
        for _ in 0..5 {
            table.tick(0);
        }
        {
            let _guard = table.lock(0);
            unsafe { table.slot(index) }.reset_ticks = table.now() - 3;
        }
        let mut rows = [None; 1];
        table.snapshot(0, &mut rows);
        let row = rows[0].unwrap();
        assert_eq!(row.pid, pid);
        assert_eq!(row.wtime, 3);
    }
}

//! The per-CPU scheduler loop and its four selectable policies: round
//! robin, first-come-first-served, priority-based, and multi-level
//! feedback queue, chosen once at build time by a Cargo feature
//! (`param.rs` enforces exactly one is enabled).
//!
//! The real scheduler loop never returns and runs every process to
//! completion of its quantum inline, handing the table lock across the
//! context switch as a baton. That coroutine hand-off is exactly what
//! the `context_switch` collaborator abstracts over, so this module
//! exposes the same loop as repeated calls to [`schedule_once`], which
//! performs one selection-dispatch-return cycle and is what host tests
//! drive directly against a table of their own rather than the
//! process-wide [`PTABLE`](crate::proc::table::PTABLE) singleton, so
//! tests don't contend over shared global state.

use crate::collab::Collaborators;
use crate::param::{AGE, MAXQUEUE, NPROC};
use crate::proc::cpu::cpu;
use crate::proc::state::ProcState;
use crate::proc::table::ProcTable;

/// Runs one round of the scheduler loop on `cpu_id` against `table`: pick
/// the next runnable process under the compiled-in policy, dispatch it
/// via the collaborators, and perform whatever bookkeeping is due once it
/// gives the CPU back. Returns the pid dispatched, or `None` if nothing
/// was runnable this round.
pub fn schedule_once(table: &ProcTable, collab: &dyn Collaborators, cpu_id: usize) -> Option<i32> {
    #[cfg(feature = "mlfq")]
    age(table, cpu_id);

    let selection = {
        let _guard = table.lock(cpu_id);
        select(table)
    };
    let (index, level) = selection?;

    let (pid, address_space) = {
        let _guard = table.lock(cpu_id);
        let now = table.now();
        let p = unsafe { table.slot(index) };
        p.n_run += 1;
        p.state = ProcState::Running;
        p.reset_ticks = now;
        log::trace!("dispatch: pid {} policy {}", p.pid, POLICY_NAME);
        (p.pid, p.address_space.expect("dispatch: no address space"))
    };

    unsafe {
        cpu(cpu_id).proc = table.slot(index) as *mut _;
        collab.address_space_install(address_space);
        let ctx: *mut crate::proc::context::Context = &mut table.slot(index).context;
        collab.context_switch(ctx, cpu_id);
    }
    collab.address_space_install_kernel();
    unsafe {
        cpu(cpu_id).proc = core::ptr::null_mut();
    }

    #[cfg(feature = "mlfq")]
    {
        let _guard = table.lock(cpu_id);
        requeue_after_dispatch(table, index, level);
    }
    #[cfg(not(feature = "mlfq"))]
    let _ = level;

    Some(pid)
}

/// Real boot code's entry point: runs [`schedule_once`] forever against
/// the process-wide table. Never exercised by host tests.
pub fn run(table: &ProcTable, collab: &dyn Collaborators, cpu_id: usize) -> ! {
    loop {
        schedule_once(table, collab, cpu_id);
    }
}

#[cfg(feature = "rr")]
const POLICY_NAME: &str = "rr";
#[cfg(feature = "fcfs")]
const POLICY_NAME: &str = "fcfs";
#[cfg(feature = "pbs")]
const POLICY_NAME: &str = "pbs";
#[cfg(feature = "mlfq")]
const POLICY_NAME: &str = "mlfq";

/// Picks the next process to dispatch. Caller must hold the table lock.
/// Returns the chosen slot index, plus (under MLFQ) the level it was
/// popped from, so the post-dispatch requeue knows where it came from.
fn select(table: &ProcTable) -> Option<(usize, usize)> {
    #[cfg(feature = "rr")]
    {
        select_rr(table).map(|i| (i, 0))
    }
    #[cfg(feature = "fcfs")]
    {
        select_fcfs(table).map(|i| (i, 0))
    }
    #[cfg(feature = "pbs")]
    {
        select_pbs(table).map(|i| (i, 0))
    }
    #[cfg(feature = "mlfq")]
    {
        select_mlfq(table)
    }
}

/// `scheduler()`'s `#ifdef RR` branch: first `Runnable` slot in table
/// order. Because selection always starts the scan at slot 0 rather than
/// remembering where the last process was found, fairness comes from
/// state transitions (a dispatched process becomes ineligible until it's
/// rescheduled), exactly as in the original.
#[cfg(feature = "rr")]
fn select_rr(table: &ProcTable) -> Option<usize> {
    (0..NPROC).find(|&i| unsafe { table.slot(i) }.state == ProcState::Runnable)
}

/// `scheduler()`'s `#ifdef FCFS` branch: the runnable process with the
/// smallest `ctime`, ties broken by table order (first found wins,
/// matching the original's `firstComeProc->ctime > p->ctime` comparison
/// which never replaces on equal `ctime`).
#[cfg(feature = "fcfs")]
fn select_fcfs(table: &ProcTable) -> Option<usize> {
    let mut best: Option<usize> = None;
    for i in 0..NPROC {
        let p = unsafe { table.slot(i) };
        if p.state != ProcState::Runnable {
            continue;
        }
        best = Some(match best {
            None => i,
            Some(b) => {
                if p.ctime < unsafe { table.slot(b) }.ctime {
                    i
                } else {
                    b
                }
            }
        });
    }
    best
}

/// `scheduler()`'s `#ifdef PBS` branch: the runnable process with the
/// smallest `priority` (lower is more favorable), ties broken by fewer
/// `n_run`. Compares against the current best candidate's `priority`
/// field directly rather than mixing pointer and integer comparisons.
#[cfg(feature = "pbs")]
fn select_pbs(table: &ProcTable) -> Option<usize> {
    let mut best: Option<usize> = None;
    for i in 0..NPROC {
        let p = unsafe { table.slot(i) };
        if p.state != ProcState::Runnable {
            continue;
        }
        best = Some(match best {
            None => i,
            Some(b) => {
                let bp = unsafe { table.slot(b) };
                // Strict `<` on both comparisons: a full tie (same
                // priority, same n_run) must keep `b`, the lower slot
                // found first, since ties break by smallest n_run, then
                // slot order.
                if p.priority < bp.priority || (p.priority == bp.priority && p.n_run < bp.n_run) {
                    i
                } else {
                    b
                }
            }
        });
    }
    best
}

/// `scheduler()`'s `#ifdef MLFQ` branch: the process at the front of the
/// highest-priority non-empty level, skipping (and dropping) any stale
/// front entries whose process is no longer `Runnable`.
#[cfg(feature = "mlfq")]
fn select_mlfq(table: &ProcTable) -> Option<(usize, usize)> {
    let mlfq = unsafe { table.mlfq_mut() };
    for level in 0..MAXQUEUE {
        while let Some(index) = mlfq.pop_front(level) {
            if unsafe { table.slot(index) }.state == ProcState::Runnable {
                return Some((index, level));
            }
            // Stale entry (its process moved on while still queued); drop
            // and keep looking at the front of this same level.
        }
    }
    None
}

/// Decide whether the just-dispatched process goes back to the same
/// level or is demoted, based on the state it came back in. Caller must
/// hold the table lock.
#[cfg(feature = "mlfq")]
fn requeue_after_dispatch(table: &ProcTable, index: usize, level: usize) {
    let now = table.now();
    let p = unsafe { table.slot(index) };
    match p.state {
        ProcState::Sleeping => {
            let mlfq = unsafe { table.mlfq_mut() };
            mlfq.push_back(level, index).expect("requeue: mlfq overflow");
        }
        ProcState::Runnable => {
            let quantum = 1u64 << level;
            if p.ticks[level] >= quantum {
                let new_level = (level + 1).min(MAXQUEUE - 1);
                p.cur_queue = Some(new_level);
                p.ticks[new_level] = 0;
                p.reset_ticks = now;
                log::debug!("mlfq: pid {} demoted {} -> {}", p.pid, level, new_level);
                let mlfq = unsafe { table.mlfq_mut() };
                mlfq.push_back(new_level, index).expect("requeue: mlfq overflow");
            } else {
                let mlfq = unsafe { table.mlfq_mut() };
                mlfq.push_back(level, index).expect("requeue: mlfq overflow");
            }
        }
        // Exited or killed mid-dispatch: nothing left to requeue.
        _ => {}
    }
}

/// Promotes any runnable, queued process that has gone unscheduled for
/// more than `AGE` ticks, to prevent starvation at low levels.
#[cfg(feature = "mlfq")]
fn age(table: &ProcTable, cpu_id: usize) {
    let _guard = table.lock(cpu_id);
    let now = table.now();
    for index in 0..NPROC {
        let p = unsafe { table.slot(index) };
        if p.state != ProcState::Runnable {
            continue;
        }
        let Some(level) = p.cur_queue else {
            continue;
        };
        if now.saturating_sub(p.reset_ticks) <= AGE {
            continue;
        }
        let mlfq = unsafe { table.mlfq_mut() };
        if !mlfq.remove_at(level, index) {
            continue;
        }
        let new_level = level.saturating_sub(1);
        p.cur_queue = Some(new_level);
        p.ticks[new_level] = 0;
        p.reset_ticks = now;
        log::debug!("mlfq: pid {} aged {} -> {}", p.pid, level, new_level);
        mlfq.push_back(new_level, index).expect("ageproc: mlfq overflow");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::fake::FakeCollaborators;

    fn alloc_runnable(table: &ProcTable, collab: &FakeCollaborators, cpu_id: usize) -> i32 {
        let index = table.alloc(collab, cpu_id, b"test").unwrap();
        let address_space = collab.address_space_setup().unwrap();
        let _guard = table.lock(cpu_id);
        let p = unsafe { table.slot(index) };
        p.address_space = Some(address_space);
        p.state = ProcState::Runnable;
        #[cfg(feature = "mlfq")]
        {
            let _ = unsafe { table.mlfq_mut() }.push_back(0, index);
        }
        p.pid
    }

    #[cfg(feature = "rr")]
    #[test]
    fn rr_picks_in_table_order() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let a = alloc_runnable(&table, &collab, 0);
        let _b = alloc_runnable(&table, &collab, 0);
        assert_eq!(schedule_once(&table, &collab, 0), Some(a));
    }

    #[cfg(feature = "fcfs")]
    #[test]
    fn fcfs_picks_earliest_ctime() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let first = alloc_runnable(&table, &collab, 0);
        table.tick(0);
        let _second = alloc_runnable(&table, &collab, 0);
        assert_eq!(schedule_once(&table, &collab, 0), Some(first));
    }

    #[cfg(feature = "pbs")]
    #[test]
    fn pbs_prefers_lower_priority_value() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let low_pid = alloc_runnable(&table, &collab, 0);
        let _high_pid = alloc_runnable(&table, &collab, 0);
        table.set_priority(0, low_pid, 10).unwrap();
        assert_eq!(schedule_once(&table, &collab, 0), Some(low_pid));
    }

    #[cfg(feature = "pbs")]
    #[test]
    fn pbs_breaks_a_full_tie_by_slot_order() {
        // Regression: a non-strict `n_run <= bp.n_run` comparison lets a
        // later slot displace an equally-ranked earlier one, losing the
        // slot-order tie-break that applies when priority and `n_run`
        // both match.
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let first = alloc_runnable(&table, &collab, 0);
        let _second = alloc_runnable(&table, &collab, 0);
        assert_eq!(schedule_once(&table, &collab, 0), Some(first));
    }

    #[cfg(feature = "mlfq")]
    #[test]
    fn mlfq_demotes_after_quantum_exhausted() {
        let table = ProcTable::new();
        let collab = FakeCollaborators::new();
        let pid = alloc_runnable(&table, &collab, 0);
        assert_eq!(schedule_once(&table, &collab, 0), Some(pid));
        {
            let _guard = table.lock(0);
            let index = (0..NPROC).find(|&i| unsafe { table.slot(i) }.pid == pid).unwrap();
            let p = unsafe { table.slot(index) };
            p.ticks[0] = 1;
            p.state = ProcState::Runnable;
            let _ = unsafe { table.mlfq_mut() }.push_back(0, index);
        }
        schedule_once(&table, &collab, 0);
        let _guard = table.lock(0);
        let index = (0..NPROC).find(|&i| unsafe { table.slot(i) }.pid == pid).unwrap();
        assert_eq!(unsafe { table.slot(index) }.cur_queue, Some(1));
    }
}

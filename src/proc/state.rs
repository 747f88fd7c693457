//! The per-process record and its state enum.

use super::context::Context;
use crate::collab::{AddressSpace, FileHandle, InodeHandle, KernelStack};
use crate::param::{DEFAULT_PRIORITY, MAXQUEUE, NOFILE};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ProcState {
    #[default]
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}
impl ProcState {
    pub fn name(&self) -> &'static str {
        match self {
            ProcState::Unused => "UNUSED",
            ProcState::Embryo => "EMBRYO",
            ProcState::Sleeping => "SLEEPING",
            ProcState::Runnable => "RUNNABLE",
            ProcState::Running => "RUNNING",
            ProcState::Zombie => "ZOMBIE",
        }
    }
}

/// A wakeup channel. Opaque identity token: any pointer-sized integer
/// works as long as sleepers and wakers agree on the value.
pub type Chan = usize;

/// Per-process state.
///
/// Every field here is read or written only while the table lock
/// (`proc::table::ProcTable::lock`) is held, except where a comment notes
/// otherwise (the `// p->lock must be held` convention).
pub struct Proc {
    /// Unique positive id; 0 when the slot is free.
    pub pid: i32,
    pub state: ProcState,
    /// Index of this process's parent in the table, or `None` if it has
    /// none yet (only true for `initproc`). Reparented to `initproc` on
    /// parent exit. Modeled as a table index rather than a pointer, since
    /// slots outlive any single process and indices stay valid across
    /// reuse.
    pub parent: Option<usize>,
    /// Non-null (`Some`) iff `state == Sleeping`.
    pub chan: Option<Chan>,
    /// Pending-kill flag. Once set, never cleared until the slot recycles.
    pub killed: bool,
    /// Exit status passed to `exit()`, surfaced to a plain `wait()`.
    pub exit_status: i32,

    /// Tick of creation. Set at allocation, never changes.
    pub ctime: u64,
    /// Tick of exit, or `None` while alive.
    pub etime: Option<u64>,
    /// Accumulated ticks spent `Running`.
    pub rtime: u64,
    /// Accumulated ticks spent `Sleeping`.
    pub iotime: u64,

    /// Integer in `[MIN_PRIORITY, MAX_PRIORITY]`; lower is more favorable.
    pub priority: i32,
    /// Count of times dispatched.
    pub n_run: u64,
    /// Last tick at which a scheduling-related reset occurred (MLFQ: last
    /// dispatch or aging promotion; used to compute MLFQ `wtime`).
    pub reset_ticks: u64,
    /// MLFQ level in `[0, MAXQUEUE)`, or `None` outside MLFQ / not queued.
    pub cur_queue: Option<usize>,
    /// Ticks consumed at each MLFQ level.
    pub ticks: [u64; MAXQUEUE],

    /// Kernel stack handle, `None` once reaped or before allocation.
    pub kstack: Option<KernelStack>,
    /// User address space, `None` once reaped or before allocation.
    pub address_space: Option<AddressSpace>,
    /// Size of process memory in bytes.
    pub sz: u64,
    /// Context `context_switch` resumes into to run this process.
    pub context: Context,

    /// Open files, indexed by file descriptor.
    pub ofile: [Option<FileHandle>; NOFILE],
    /// Current working directory.
    pub cwd: Option<InodeHandle>,

    /// Process name, for debugging (`getps`/`procdump`).
    pub name: [u8; 16],
}
impl Proc {
    pub const fn new() -> Proc {
        Proc {
            pid: 0,
            state: ProcState::Unused,
            parent: None,
            chan: None,
            killed: false,
            exit_status: 0,
            ctime: 0,
            etime: None,
            rtime: 0,
            iotime: 0,
            priority: DEFAULT_PRIORITY,
            n_run: 0,
            reset_ticks: 0,
            cur_queue: None,
            ticks: [0; MAXQUEUE],
            kstack: None,
            address_space: None,
            sz: 0,
            context: Context::new(),
            ofile: [None; NOFILE],
            cwd: None,
            name: [0; 16],
        }
    }

    /// `etime − ctime − rtime − iotime`, clamped to non-negative, with
    /// `now` substituted for `etime` while the process hasn't exited.
    /// Matches `proc.c`'s `wait`/`waitx`/`getps` arithmetic exactly.
    pub fn wtime(&self, now: u64) -> u64 {
        let end = self.etime.unwrap_or(now);
        end.saturating_sub(self.ctime)
            .saturating_sub(self.rtime)
            .saturating_sub(self.iotime)
    }
}
impl Default for Proc {
    fn default() -> Self {
        Proc::new()
    }
}

/// A point-in-time copy of the fields `getps` reports, decoupled from the
/// live `Proc` so callers can read it after the table lock is released.
#[derive(Copy, Clone, Debug)]
pub struct ProcSnapshot {
    pub pid: i32,
    pub priority: i32,
    pub state: ProcState,
    pub rtime: u64,
    pub wtime: u64,
    pub n_run: u64,
    pub cur_queue: Option<usize>,
    pub ticks: [u64; MAXQUEUE],
}

//! Syscall shims: thin adapters from already-decoded arguments to the
//! core's `Result`-returning process-table operations, translating
//! failures to the `-1`-style ABI.
//!
//! Shaped as `argint`/`argaddr` extraction feeding `#[no_mangle] unsafe
//! extern "C" fn sys_*` entry points. Extracting the syscall number and
//! its arguments from the trap frame is part of trap dispatch, which
//! lives elsewhere; this module only declares the handful of contracts
//! it needs from that layer (`argint`/`argaddr`/`cpuid`/`copyout`) and
//! otherwise calls only into `proc::table::PTABLE`.

use crate::collab;
use crate::param::NPROC;
use crate::proc::cpu::cpu;
use crate::proc::state::ProcSnapshot;
use crate::proc::table::ProcError;
use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicUsize, Ordering};

extern "C" {
    /// Fetch the n-th 32-bit syscall argument of the process currently
    /// trapped into the kernel. Owned by the trap-dispatch collaborator.
    fn argint(n: i32, ip: *mut i32);
    /// Fetch the n-th syscall argument as a raw address/word.
    fn argaddr(n: i32, ip: *mut u64);
    /// Copy `len` bytes from `src` into the current process's address
    /// space at `dest_addr`. Owned by the virtual-memory collaborator.
    fn copyout(dest_addr: u64, src: *const u8, len: u64) -> i32;
    /// Index of the CPU executing the current trap.
    fn cpuid() -> usize;
}

/// Slot index of `initproc`, recorded once at boot. Used as `exit`'s
/// reparenting target for abandoned children.
static INIT_INDEX: AtomicUsize = AtomicUsize::new(usize::MAX);

/// Records `initproc`'s slot index. Call once, right after
/// `ProcTable::userinit` runs during boot and before any process can
/// reach `exit`.
pub fn set_init_index(index: usize) {
    INIT_INDEX.store(index, Ordering::Relaxed);
}

fn init_index() -> usize {
    let i = INIT_INDEX.load(Ordering::Relaxed);
    debug_assert_ne!(i, usize::MAX, "exit reached before userinit recorded its slot");
    i
}

/// The pid of the process currently running on `cpu_id`.
unsafe fn current_pid(cpu_id: usize) -> i32 {
    (*cpu(cpu_id).proc).pid
}

/// Every user-facing `ProcError` maps to `-1`; the ABI draws no
/// distinction between them.
fn err_to_abi(_e: ProcError) -> i64 {
    -1
}

#[no_mangle]
pub unsafe extern "C" fn sys_fork() -> u64 {
    let cpu_id = cpuid();
    let pid = current_pid(cpu_id);
    match crate::proc::table::PTABLE.fork(collab::instance(), cpu_id, pid) {
        Ok(child_pid) => child_pid as i64 as u64,
        Err(e) => err_to_abi(e) as u64,
    }
}

#[no_mangle]
pub unsafe extern "C" fn sys_exit() -> u64 {
    let cpu_id = cpuid();
    let pid = current_pid(cpu_id);
    let mut status = 0i32;
    argint(0, addr_of_mut!(status));
    match crate::proc::table::PTABLE.exit_and_sched(collab::instance(), cpu_id, pid, status, init_index()) {
        Ok(()) => 0,
        Err(e) => err_to_abi(e) as u64,
    }
}

#[no_mangle]
pub unsafe extern "C" fn sys_wait() -> u64 {
    let cpu_id = cpuid();
    let pid = current_pid(cpu_id);
    match crate::proc::table::PTABLE.wait(collab::instance(), cpu_id, pid) {
        Ok(child_pid) => child_pid as i64 as u64,
        Err(e) => err_to_abi(e) as u64,
    }
}

/// `waitx`: like `wait`, but also copies the derived wait/run times out to
/// the two user pointers named by arguments 0 and 1.
#[no_mangle]
pub unsafe extern "C" fn sys_waitx() -> u64 {
    let cpu_id = cpuid();
    let pid = current_pid(cpu_id);
    match crate::proc::table::PTABLE.waitx(collab::instance(), cpu_id, pid) {
        Ok(reaped) => {
            let mut wtime_addr = 0u64;
            let mut rtime_addr = 0u64;
            argaddr(0, addr_of_mut!(wtime_addr));
            argaddr(1, addr_of_mut!(rtime_addr));
            let wtime_bytes = reaped.wtime.to_ne_bytes();
            let rtime_bytes = reaped.rtime.to_ne_bytes();
            copyout(wtime_addr, wtime_bytes.as_ptr(), wtime_bytes.len() as u64);
            copyout(rtime_addr, rtime_bytes.as_ptr(), rtime_bytes.len() as u64);
            reaped.pid as i64 as u64
        }
        Err(e) => err_to_abi(e) as u64,
    }
}

#[no_mangle]
pub unsafe extern "C" fn sys_kill() -> u64 {
    let cpu_id = cpuid();
    let mut pid = 0i32;
    argint(0, addr_of_mut!(pid));
    match crate::proc::table::PTABLE.kill(cpu_id, pid) {
        Ok(()) => 0,
        Err(e) => err_to_abi(e) as u64,
    }
}

/// `set_priority(new, pid)`: swap in the priority, returning the old one.
/// Under PBS, a caller that just made itself numerically worse yields
/// immediately.
#[no_mangle]
pub unsafe extern "C" fn sys_set_priority() -> u64 {
    let cpu_id = cpuid();
    let mut new_priority = 0i32;
    let mut pid = 0i32;
    argint(0, addr_of_mut!(new_priority));
    argint(1, addr_of_mut!(pid));
    match crate::proc::table::PTABLE.set_priority(cpu_id, pid, new_priority) {
        Ok(old) => {
            #[cfg(feature = "pbs")]
            {
                if new_priority > old {
                    let caller = current_pid(cpu_id);
                    crate::proc::table::PTABLE.yield_(collab::instance(), cpu_id, caller);
                }
            }
            old as i64 as u64
        }
        Err(e) => err_to_abi(e) as u64,
    }
}

/// `getps`: report every non-free slot's scheduling metrics. Always
/// returns `0`; it prints the table as a side effect rather than
/// signaling failure through its return value.
#[no_mangle]
pub unsafe extern "C" fn sys_getps() -> u64 {
    let cpu_id = cpuid();
    let mut rows: [Option<ProcSnapshot>; NPROC] = [None; NPROC];
    crate::proc::table::PTABLE.snapshot(cpu_id, &mut rows);
    crate::logging::reportln!("PID  PRIO  STATE     RTIME  WTIME  NRUN  Q   TICKS");
    for row in rows.iter().flatten() {
        crate::logging::reportln!(
            "{:<4} {:<5} {:<9} {:<6} {:<6} {:<5} {:<3} {:?}",
            row.pid,
            row.priority,
            row.state.name(),
            row.rtime,
            row.wtime,
            row.n_run,
            row.cur_queue.map(|q| q as i32).unwrap_or(-1),
            row.ticks,
        );
    }
    0
}

//! Build-time kernel parameters.
//!
//! Kept as plain `const`s rather than a runtime config file, matching how
//! every kernel in the retrieval pack sizes its process table and queues.

/// Maximum number of processes.
pub const NPROC: usize = 64;
/// Maximum number of CPUs.
pub const NCPU: usize = 8;
/// Maximum number of open files per process.
pub const NOFILE: usize = 16;
/// Maximum file path size.
pub const MAXPATH: usize = 128;

/// Number of MLFQ priority levels.
pub const MAXQUEUE: usize = 5;
/// Capacity of each MLFQ level's ring buffer.
pub const NUMQUEUE: usize = NPROC;
/// Ticks a process may go unscheduled at its level before `ageproc` promotes it.
pub const AGE: u64 = 30;

/// Default priority assigned to a newly allocated process. Lower is more favorable.
pub const DEFAULT_PRIORITY: i32 = 60;
/// Inclusive bounds accepted by `set_priority`.
pub const MIN_PRIORITY: i32 = 0;
pub const MAX_PRIORITY: i32 = 100;

#[cfg(not(any(feature = "rr", feature = "fcfs", feature = "pbs", feature = "mlfq")))]
compile_error!("exactly one of the `rr`, `fcfs`, `pbs`, `mlfq` features must be enabled");

#[cfg(any(
    all(feature = "rr", feature = "fcfs"),
    all(feature = "rr", feature = "pbs"),
    all(feature = "rr", feature = "mlfq"),
    all(feature = "fcfs", feature = "pbs"),
    all(feature = "fcfs", feature = "mlfq"),
    all(feature = "pbs", feature = "mlfq"),
))]
compile_error!("only one of the `rr`, `fcfs`, `pbs`, `mlfq` features may be enabled at a time");

//! Multi-policy CPU scheduler core for a teaching xv6-style kernel:
//! round-robin, first-come-first-served, priority-based, and multi-level
//! feedback queue, selected at build time by exactly one of the `rr`,
//! `fcfs`, `pbs`, `mlfq` Cargo features (`param.rs`).
//!
//! `#![no_std]` except under `cfg(test)`, matching how `no_std` crates
//! typically stay host-testable: the test binary links `std`, the real
//! staticlib target doesn't.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![allow(clippy::missing_safety_doc)]

#[cfg(test)]
extern crate std;

#[cfg(not(test))]
extern "C" {
    /// The console the surrounding C kernel writes through; used only by
    /// the panic handler below, which can't assume the `log`/`collab`
    /// machinery is in a sane state while unwinding a kernel panic.
    fn panic(panic_message: *const core::ffi::c_char) -> !;
}

#[cfg(not(test))]
#[panic_handler]
unsafe fn panic_wrapper(_panic_info: &core::panic::PanicInfo) -> ! {
    panic(
        core::ffi::CStr::from_bytes_with_nul(b"panic from rust\0")
            .unwrap_or_default()
            .as_ptr(),
    )
}

pub mod collab;
pub mod logging;
pub mod mlfq;
pub mod param;
pub mod proc;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod sysproc;

/// Boots the scheduler core: installs the real collaborators, allocates
/// `initproc`, and records its slot as the reparenting target for
/// orphaned children. Call once, from the single CPU that runs kernel
/// init before any other hart starts its scheduler loop.
///
/// # Safety
/// Must run exactly once, before [`collab::instance`] or
/// [`sysproc::set_init_index`]'s recorded index are read from any other
/// CPU.
pub unsafe fn init(collaborators: &'static dyn collab::Collaborators) {
    collab::set_instance(collaborators);
    let init_index = proc::table::PTABLE
        .userinit(collaborators, 0)
        .unwrap_or_else(|_| panic!("init: failed to allocate initproc"));
    sysproc::set_init_index(init_index);
}

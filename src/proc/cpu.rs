use super::context::Context;
use super::state::Proc;
use crate::param::NCPU;
use core::ptr::null_mut;

/// Per-CPU state.
///
/// `cpuid()` is not read from a hardware register here: the scheduler
/// loop takes its CPU index as an explicit argument (supplied by the
/// boot collaborator that starts one loop per hart), which keeps this
/// module free of architecture-specific asm and host-testable.
#[repr(C)]
pub struct Cpu {
    /// The process running on this CPU, or null.
    pub proc: *mut Proc,
    /// `context_switch` resumes here to enter the scheduler loop.
    pub context: Context,
    /// Depth of `push_off()` nesting.
    pub interrupt_disable_layers: i32,
    /// Were interrupts enabled before the outermost `push_off()`?
    pub previous_interrupts_enabled: bool,
    /// Host-testable stand-in for the real interrupt-enable flag; real
    /// hardware targets would instead read/write a CPU status register.
    pub interrupts_enabled: bool,
}
impl Cpu {
    pub const fn new() -> Cpu {
        Cpu {
            proc: null_mut(),
            context: Context::new(),
            interrupt_disable_layers: 0,
            previous_interrupts_enabled: true,
            interrupts_enabled: true,
        }
    }
}
impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

const CPU_INIT: Cpu = Cpu::new();
static mut CPUS: [Cpu; NCPU] = [CPU_INIT; NCPU];

/// Returns this CPU's state. The caller vouches for `id` being the index of
/// the hart currently executing (interrupts must be off, to avoid a race
/// with being rescheduled to a different CPU mid-lookup).
///
/// # Safety
/// Caller must not hold another `&mut Cpu` to the same `id` concurrently.
pub unsafe fn cpu(id: usize) -> &'static mut Cpu {
    &mut CPUS[id]
}

/// Disable interrupts on this CPU, matching `push_off`/`pop_off` nesting
/// semantics: it takes as many `pop_off`s to re-enable interrupts as there
/// were `push_off`s.
pub unsafe fn push_off(id: usize) {
    let c = cpu(id);
    let was_enabled = c.interrupts_enabled;
    c.interrupts_enabled = false;
    if c.interrupt_disable_layers == 0 {
        c.previous_interrupts_enabled = was_enabled;
    }
    c.interrupt_disable_layers += 1;
}

pub unsafe fn pop_off(id: usize) {
    let c = cpu(id);
    if c.interrupt_disable_layers < 1 {
        panic!("pop_off: unbalanced with push_off");
    }
    c.interrupt_disable_layers -= 1;
    if c.interrupt_disable_layers == 0 && c.previous_interrupts_enabled {
        c.interrupts_enabled = true;
    }
}

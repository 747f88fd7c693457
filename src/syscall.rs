//! The syscall number table for this core's scheduler-facing calls:
//! `TryFrom<usize>`/`From<Syscall>` dispatch shape, trimmed to the
//! scheduler's own calls (`Fork`, `Exit`, `Wait`, `Waitx`, `Kill`,
//! `SetPriority`, `Getps`).
//!
//! [`dispatch`] doesn't read the syscall number or arguments out of the
//! current process's trap frame itself; that extraction is trap dispatch,
//! which lives elsewhere. The caller (the trap handler) is expected to
//! pull `a7` and pass it in, then write this function's return value back
//! into the trap frame's `a0`.

use crate::sysproc;

pub enum Syscall {
    Fork,
    Exit,
    Wait,
    Kill,
    Waitx,
    Getps,
    SetPriority,
}
impl Syscall {
    /// # Safety
    /// Must run on the CPU actually executing the trap, with the
    /// trap-dispatch collaborator having already made `argint`/`argaddr`
    /// valid for the current process's trap frame.
    pub unsafe fn call(&self) -> u64 {
        match self {
            Syscall::Fork => sysproc::sys_fork(),
            Syscall::Exit => sysproc::sys_exit(),
            Syscall::Wait => sysproc::sys_wait(),
            Syscall::Kill => sysproc::sys_kill(),
            Syscall::Waitx => sysproc::sys_waitx(),
            Syscall::Getps => sysproc::sys_getps(),
            Syscall::SetPriority => sysproc::sys_set_priority(),
        }
    }
}
impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> core::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::Fork),
            2 => Ok(Syscall::Exit),
            3 => Ok(Syscall::Wait),
            6 => Ok(Syscall::Kill),
            7 => Ok(Syscall::Waitx),
            8 => Ok(Syscall::Getps),
            9 => Ok(Syscall::SetPriority),
            _ => Err(()),
        }
    }
}
impl From<Syscall> for usize {
    fn from(syscall: Syscall) -> usize {
        match syscall {
            Syscall::Fork => 1,
            Syscall::Exit => 2,
            Syscall::Wait => 3,
            Syscall::Kill => 6,
            Syscall::Waitx => 7,
            Syscall::Getps => 8,
            Syscall::SetPriority => 9,
        }
    }
}

/// Dispatches syscall number `num`. Returns the value to place in the
/// trap frame's return register. Unknown numbers log a warning and
/// return `-1`.
///
/// # Safety
/// See [`Syscall::call`].
pub unsafe fn dispatch(num: usize) -> u64 {
    match Syscall::try_from(num) {
        Ok(syscall) => syscall.call(),
        Err(_) => {
            log::warn!("unknown syscall {}", num);
            -1i64 as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_usize() {
        for num in [1usize, 2, 3, 6, 7, 8, 9] {
            let syscall = Syscall::try_from(num).unwrap();
            assert_eq!(usize::from(syscall), num);
        }
    }

    #[test]
    fn rejects_unknown_numbers() {
        assert!(Syscall::try_from(0).is_err());
        assert!(Syscall::try_from(4).is_err());
        assert!(Syscall::try_from(100).is_err());
    }
}

//! Contracts for the collaborators this crate treats as out of scope:
//! address-space management, the kernel stack allocator, the context
//! switch primitive, and the file/inode layer touched during fork/exit.
//!
//! A real kernel declares these piecemeal as `extern "C"` functions over
//! opaque C types (`proc_pagetable`, `uvmalloc`, `swtch`, `filedup`,
//! `idup`, `iput`, ...) scattered across its process management code.
//! This module collapses them into one trait at a single seam, rather
//! than scattering `extern "C"` declarations through the scheduler core.
//!
//! The scheduler core never calls a collaborator method directly; it goes
//! through `&dyn Collaborators` so that `FakeCollaborators` (below) can
//! stand in during host tests.

use core::fmt;

/// Opaque handle to a process's address space. The core never inspects
/// its contents; it only asks the collaborator to construct, copy,
/// install, or free one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddressSpace(pub usize);

/// Opaque handle to an allocated kernel stack.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KernelStack(pub usize);

/// Opaque handle to an open file, duplicated across `fork` and closed on `exit`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileHandle(pub usize);

/// Opaque handle to an inode, duplicated for `cwd` across `fork`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InodeHandle(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CollabError;
impl fmt::Display for CollabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collaborator operation failed")
    }
}

/// The remaining collaborators, grouped behind one trait.
pub trait Collaborators {
    /// Save the caller's context into `from` and resume the per-CPU
    /// scheduler loop's context, returning only once some future
    /// `context_switch` call resumes `from` again. Mirrors a real
    /// `extern "C" fn swtch(old: *mut Context, new: *mut Context)`; kept
    /// as one trait method rather than a bare function pointer so
    /// `FakeCollaborators` can stand in for it on the host, where there is
    /// no second kernel thread to actually resume.
    ///
    /// # Safety
    /// `from` must point at a `Context` embedded in the process currently
    /// executing on `cpu_id`, and the caller must hold the table lock.
    unsafe fn context_switch(&self, from: *mut crate::proc::context::Context, cpu_id: usize);

    /// Build a fresh address space for a newly allocated process.
    fn address_space_setup(&self) -> Result<AddressSpace, CollabError>;
    /// Duplicate `src` (of `size` bytes) for a forked child.
    fn address_space_copy(&self, src: AddressSpace, size: u64) -> Result<AddressSpace, CollabError>;
    /// Install `a` as the currently active address space.
    fn address_space_install(&self, a: AddressSpace);
    /// Install the kernel's own address space (used once the dispatched
    /// process returns control to the scheduler).
    fn address_space_install_kernel(&self);
    /// Free `a` and the physical memory it refers to.
    fn address_space_free(&self, a: AddressSpace, size: u64);

    /// Allocate a kernel stack for a newly allocated process.
    fn kstack_alloc(&self) -> Option<KernelStack>;
    fn kstack_free(&self, stack: KernelStack);

    fn file_dup(&self, file: FileHandle) -> FileHandle;
    fn file_close(&self, file: FileHandle);
    fn inode_dup(&self, inode: InodeHandle) -> InodeHandle;
    fn inode_put(&self, inode: InodeHandle);
}

static mut INSTANCE: Option<&'static dyn Collaborators> = None;

/// Installs the real collaborators implementation. Call once at boot,
/// before any CPU starts its scheduler loop or a user process can trap
/// into a syscall shim.
///
/// # Safety
/// Must not run concurrently with any other CPU that might call
/// [`instance`].
pub unsafe fn set_instance(collab: &'static dyn Collaborators) {
    INSTANCE = Some(collab);
}

/// Returns the installed collaborators.
///
/// # Panics
/// If [`set_instance`] hasn't run yet. Every syscall shim needs this by
/// the time user processes are scheduled.
pub fn instance() -> &'static dyn Collaborators {
    unsafe { INSTANCE.expect("collaborators not installed: call collab::set_instance at boot") }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use arrayvec::ArrayVec;
    use core::cell::RefCell;
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory stand-in for the real VM/stack/file collaborators, used
    /// only by `#[cfg(test)]` unit tests. Bounded `ArrayVec`s record which
    /// handles were freed, so tests can assert `reap` actually released
    /// everything it allocated rather than leaking.
    pub struct FakeCollaborators {
        next_handle: AtomicUsize,
        pub fail_address_space: bool,
        pub fail_kstack: bool,
        freed_address_spaces: RefCell<ArrayVec<usize, 128>>,
        freed_kstacks: RefCell<ArrayVec<usize, 128>>,
    }
    impl FakeCollaborators {
        pub fn new() -> FakeCollaborators {
            FakeCollaborators {
                next_handle: AtomicUsize::new(1),
                fail_address_space: false,
                fail_kstack: false,
                freed_address_spaces: RefCell::new(ArrayVec::new()),
                freed_kstacks: RefCell::new(ArrayVec::new()),
            }
        }
        fn next(&self) -> usize {
            self.next_handle.fetch_add(1, Ordering::Relaxed)
        }
        pub fn address_space_was_freed(&self, a: AddressSpace) -> bool {
            self.freed_address_spaces.borrow().contains(&a.0)
        }
        pub fn kstack_was_freed(&self, k: KernelStack) -> bool {
            self.freed_kstacks.borrow().contains(&k.0)
        }
    }
    impl Default for FakeCollaborators {
        fn default() -> Self {
            Self::new()
        }
    }
    impl Collaborators for FakeCollaborators {
        /// There is no second kernel thread on the host to resume, so the
        /// fake just returns immediately; tests observe the state change
        /// `sched()` makes before calling this, not an actual resumption.
        unsafe fn context_switch(&self, _from: *mut crate::proc::context::Context, _cpu_id: usize) {}

        fn address_space_setup(&self) -> Result<AddressSpace, CollabError> {
            if self.fail_address_space {
                return Err(CollabError);
            }
            Ok(AddressSpace(self.next()))
        }
        fn address_space_copy(&self, _src: AddressSpace, _size: u64) -> Result<AddressSpace, CollabError> {
            if self.fail_address_space {
                return Err(CollabError);
            }
            Ok(AddressSpace(self.next()))
        }
        fn address_space_install(&self, _a: AddressSpace) {}
        fn address_space_install_kernel(&self) {}
        fn address_space_free(&self, a: AddressSpace, _size: u64) {
            let _ = self.freed_address_spaces.borrow_mut().try_push(a.0);
        }

        fn kstack_alloc(&self) -> Option<KernelStack> {
            if self.fail_kstack {
                None
            } else {
                Some(KernelStack(self.next()))
            }
        }
        fn kstack_free(&self, stack: KernelStack) {
            let _ = self.freed_kstacks.borrow_mut().try_push(stack.0);
        }

        fn file_dup(&self, file: FileHandle) -> FileHandle {
            file
        }
        fn file_close(&self, _file: FileHandle) {}
        fn inode_dup(&self, inode: InodeHandle) -> InodeHandle {
            inode
        }
        fn inode_put(&self, _inode: InodeHandle) {}
    }
}

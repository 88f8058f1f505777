//! The per-process descriptor.

use crate::{
    pgfault::FaultError,
    syscall::{Kernel, UpcallEntry},
};
use abyss::{KernelError, addressing::Va, memlayout::PFTEMP, syscall::EnvId, trap::UTrapframe};

/// A user-level page fault handler.
pub type PgfaultHandler<K> = fn(&mut Process<K>, &UTrapframe) -> Result<(), FaultError>;

/// Fault handling state of one process.
///
/// Set up once by [`Process::set_pgfault_handler`] and only touched from the
/// process's single thread of control afterwards.
pub struct FaultContext<K> {
    pub(crate) handler: Option<PgfaultHandler<K>>,
    pub(crate) entry: Option<UpcallEntry>,
    pub(crate) xstack: Option<Va>,
    pub(crate) scratch: Va,
}

impl<K> FaultContext<K> {
    const fn new() -> Self {
        Self {
            handler: None,
            entry: None,
            xstack: None,
            scratch: PFTEMP,
        }
    }

    /// Whether a handler has been installed.
    pub fn is_installed(&self) -> bool {
        self.handler.is_some()
    }

    /// Base of the exception stack page, once allocated.
    pub fn exception_stack(&self) -> Option<Va> {
        self.xstack
    }

    /// The upcall entry registered with the kernel, once installed.
    pub fn entry(&self) -> Option<UpcallEntry> {
        self.entry
    }

    /// Slot where a copy is staged during fault handling.
    pub fn scratch(&self) -> Va {
        self.scratch
    }
}

impl<K> Clone for FaultContext<K> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler,
            entry: self.entry,
            xstack: self.xstack,
            scratch: self.scratch,
        }
    }
}

/// A user process.
///
/// Holds the kernel interface, the cached identity of the process (`thisenv`)
/// and its fault handling state.
pub struct Process<K> {
    pub(crate) kernel: K,
    pub(crate) thisenv: EnvId,
    pub(crate) fault: FaultContext<K>,
}

impl<K: Kernel> Process<K> {
    /// Start a process on top of `kernel`, recording its identity.
    pub fn new(kernel: K) -> Self {
        let thisenv = kernel.sys_getenvid();
        Self {
            kernel,
            thisenv,
            fault: FaultContext::new(),
        }
    }

    /// Destroy the calling environment.
    pub fn exit(self) -> Result<(), KernelError> {
        self.kernel.sys_env_destroy(EnvId::CURRENT)
    }
}

impl<K> Process<K> {
    /// The kernel interface.
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// The identity this process believes it has.
    pub fn thisenv(&self) -> EnvId {
        self.thisenv
    }

    /// Fault handling state.
    pub fn fault_context(&self) -> &FaultContext<K> {
        &self.fault
    }

    /// Swap the kernel interface, keeping everything else.
    ///
    /// A child created by fork starts as an image of its parent; this is how
    /// that image is attached to the child's own kernel interface.
    pub fn with_kernel(self, kernel: K) -> Self {
        Self { kernel, ..self }
    }
}

impl<K: Clone> Clone for Process<K> {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel.clone(),
            thisenv: self.thisenv,
            fault: self.fault.clone(),
        }
    }
}

//! User-level page fault handling.
//!
//! ## Installation
//!
//! [`Process::set_pgfault_handler`] allocates the exception stack, one page
//! right below [`UXSTACKTOP`], and registers the assembly upcall trampoline
//! with the kernel. The kernel then redirects every page fault of the
//! process to the trampoline, running on the exception stack with a
//! [`UTrapframe`] describing the fault. The trampoline calls
//! [`Process::upcall`], which runs the installed handler.
//!
//! Only the first installation talks to the kernel. Later calls just swap
//! the handler.
//!
//! ## Copy-on-write
//!
//! [`pgfault`] is the handler fork installs. It accepts only writes to pages
//! that carry [`PTE_COW`]; any other fault is a bug somewhere else and is
//! reported as a [`FaultError`], which tears the process down.
//!
//! [`UXSTACKTOP`]: abyss::memlayout::UXSTACKTOP

use crate::{
    cow::{PTE_COW, SharePerm},
    process::{PgfaultHandler, Process},
    syscall::Kernel,
    vpt::{UserMemory, Vpt},
};
use abyss::{
    KernelError,
    addressing::{PAGE_SIZE, Va},
    memlayout::UXSTACK,
    mmu::{PFErrorCode, Pte, PteFlags},
    syscall::EnvId,
    trap::UTrapframe,
};

/// Why a page fault could not be handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultError {
    /// The fault was not caused by a write.
    NotWrite {
        /// Faulting address.
        va: Va,
        /// Error code of the fault.
        err: PFErrorCode,
    },
    /// The faulting page is not a copy-on-write page.
    NotCow {
        /// Faulting address.
        va: Va,
        /// Mapping of the faulting page, if any.
        pte: Option<Pte>,
    },
    /// A fault arrived before any handler was installed.
    NoHandler,
    /// A system call failed while resolving the fault.
    Kernel(KernelError),
}

impl From<KernelError> for FaultError {
    fn from(e: KernelError) -> Self {
        FaultError::Kernel(e)
    }
}

impl core::fmt::Display for FaultError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FaultError::NotWrite { va, err } => {
                write!(f, "faulting access at {va} is not a write ({:#x})", err.bits())
            }
            FaultError::NotCow { va, pte: Some(pte) } => {
                write!(f, "write to {va} which is not copy-on-write ({:#x})", pte.flags().bits())
            }
            FaultError::NotCow { va, pte: None } => write!(f, "write to unmapped {va}"),
            FaultError::NoHandler => write!(f, "no page fault handler installed"),
            FaultError::Kernel(e) => write!(f, "{e}"),
        }
    }
}

impl<K: Kernel> Process<K> {
    /// Install `handler` as the page fault handler of this process.
    ///
    /// The first call allocates the exception stack and registers the
    /// upcall with the kernel. A failure leaves the process without a
    /// handler and must abort it.
    pub fn set_pgfault_handler(&mut self, handler: PgfaultHandler<K>) -> Result<(), KernelError> {
        if self.fault.handler.is_none() {
            let entry = self.kernel.upcall_entry();
            self.kernel
                .sys_page_alloc(EnvId::CURRENT, UXSTACK, PteFlags::P | PteFlags::U | PteFlags::W)?;
            self.kernel.sys_env_set_pgfault_upcall(EnvId::CURRENT, entry)?;
            self.fault.xstack = Some(UXSTACK);
            self.fault.entry = Some(entry);
        }
        self.fault.handler = Some(handler);
        Ok(())
    }

    /// Run the installed handler for the fault described by `utf`.
    ///
    /// Called by the upcall trampoline on the exception stack.
    pub fn upcall(&mut self, utf: &UTrapframe) -> Result<(), FaultError> {
        let handler = self.fault.handler.ok_or(FaultError::NoHandler)?;
        handler(self, utf)
    }
}

/// Resolve a write fault on a copy-on-write page.
///
/// The page is copied into a fresh frame staged at the scratch slot, the
/// copy replaces the shared mapping with full write permission, and the
/// scratch slot is unmapped again.
///
/// # Errors
/// - [`FaultError::NotWrite`] if the fault was not a write.
/// - [`FaultError::NotCow`] if the page is not marked [`PTE_COW`].
/// - [`FaultError::Kernel`] if any primitive fails.
pub fn pgfault<K>(process: &mut Process<K>, utf: &UTrapframe) -> Result<(), FaultError>
where
    K: Kernel + Vpt + UserMemory,
{
    let va = utf.fault_va;
    if !utf.err.contains(PFErrorCode::WRITE_ACCESS) {
        return Err(FaultError::NotWrite { va, err: utf.err });
    }
    let pte = process.kernel.walk(va);
    if !pte.is_some_and(|pte| pte.flags().contains(PTE_COW)) {
        return Err(FaultError::NotCow { va, pte });
    }

    let page = va.page_down();
    let scratch = process.fault.scratch;
    let perm = SharePerm::private().flags();
    let k = &process.kernel;
    k.sys_page_alloc(EnvId::CURRENT, scratch, perm)?;
    k.memmove(scratch, page, PAGE_SIZE)?;
    k.sys_page_map(EnvId::CURRENT, scratch, EnvId::CURRENT, page, perm)?;
    k.sys_page_unmap(EnvId::CURRENT, scratch)?;
    Ok(())
}

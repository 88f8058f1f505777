//! # Fork
//!
//! [`Process::fork`] runs in the parent and goes through these states:
//!
//! ```text
//! start -> handler installed -> child created -> pages duplicated
//!       -> exception stack allocated -> upcall registered -> runnable
//! ```
//!
//! The child only becomes runnable at the very end. If anything fails after
//! the child exists, the child is destroyed before the error is returned, so
//! a half-built address space is never scheduled.
//!
//! Every present page in `[UTEXT, USTACKTOP)` goes through
//! [`Process::duppage`]. The exception stack lies above `USTACKTOP` and is
//! never shared; the child gets a fresh one.

use crate::{
    cow::{SharePerm, SharingMode},
    pgfault::pgfault,
    process::Process,
    syscall::{ForkResult, Kernel},
    vpt::{UserMemory, Vpt},
};
use abyss::{
    KernelError,
    addressing::{PAGE_SIZE, PTSIZE, Va},
    memlayout::{USTACKTOP, UTEXT, UXSTACK},
    mmu::PteFlags,
    syscall::{EnvId, EnvStatus},
};

impl<K> Process<K>
where
    K: Kernel + Vpt + UserMemory,
{
    /// Duplicate virtual page `vpn` of this process into `child`.
    ///
    /// Read-only pages are mapped into the child with the same permission.
    /// Writable and copy-on-write pages are mapped copy-on-write into the
    /// child and then remapped copy-on-write in this process too, so neither
    /// side keeps a writable alias of the shared frame.
    ///
    /// # Returns
    /// - `Ok(SharingMode)`: the mode both sides now share the page in.
    /// - `Err(KernelError::InvalidArgument)`: `vpn` is not mapped here.
    /// - `Err(KernelError)`: a mapping primitive failed.
    pub fn duppage(&self, child: EnvId, vpn: usize) -> Result<SharingMode, KernelError> {
        let va = Va::from_vpn(vpn);
        let flags = self
            .kernel
            .walk(va)
            .ok_or(KernelError::InvalidArgument)?
            .flags();
        let mode = SharingMode::for_duplication(flags);
        let perm = SharePerm::for_mode(mode, flags).flags();

        self.kernel
            .sys_page_map(EnvId::CURRENT, va, child, va, perm)?;
        if mode == SharingMode::SharedCow {
            self.kernel
                .sys_page_map(EnvId::CURRENT, va, EnvId::CURRENT, va, perm)?;
        }
        Ok(mode)
    }

    /// Create a child process with a copy-on-write image of this one.
    ///
    /// # Returns
    /// - `Ok(ForkResult::Parent(id))` in the parent.
    /// - `Ok(ForkResult::Child)` in the child, after `thisenv` is fixed up.
    /// - `Err(KernelError)` if the child could not be created or populated.
    ///   No runnable child exists in that case.
    pub fn fork(&mut self) -> Result<ForkResult, KernelError> {
        self.set_pgfault_handler(pgfault)?;

        let child = match self.kernel.sys_exofork()? {
            ForkResult::Child => {
                self.thisenv = self.kernel.sys_getenvid();
                return Ok(ForkResult::Child);
            }
            ForkResult::Parent(child) => child,
        };

        if let Err(e) = self.populate(child) {
            warning!("[{}] fork: cannot populate {}: {}", self.thisenv, child, e);
            if let Err(e) = self.kernel.sys_env_destroy(child) {
                warning!("[{}] fork: cannot destroy {}: {}", self.thisenv, child, e);
            }
            return Err(e);
        }
        debug!("[{}] fork: {} is runnable", self.thisenv, child);
        Ok(ForkResult::Parent(child))
    }

    /// Shared-memory fork. Not supported.
    pub fn sfork(&mut self) -> Result<ForkResult, KernelError> {
        Err(KernelError::NotSupportedOperation)
    }

    fn populate(&self, child: EnvId) -> Result<(), KernelError> {
        let mut va = UTEXT;
        while va < USTACKTOP {
            if !self.kernel.uvpd(va.pdx()).is_present() {
                // Skip the whole 4MB region covered by the absent table.
                va = Va::from_vpn((va.pdx() + 1) * (PTSIZE / PAGE_SIZE));
                continue;
            }
            if self.kernel.uvpt(va.vpn()).is_present() {
                self.duppage(child, va.vpn())?;
            }
            va = va + PAGE_SIZE;
        }

        self.kernel
            .sys_page_alloc(child, UXSTACK, PteFlags::P | PteFlags::U | PteFlags::W)?;
        let entry = self.fault.entry.unwrap_or_else(|| self.kernel.upcall_entry());
        self.kernel.sys_env_set_pgfault_upcall(child, entry)?;
        self.kernel.sys_env_set_status(child, EnvStatus::Runnable)
    }
}

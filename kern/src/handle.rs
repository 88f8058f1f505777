//! The user-side view of one environment.

use crate::machine::{Access, Machine};
use abyss::{
    KernelError,
    addressing::Va,
    mmu::{Pde, Pte},
    syscall::{EnvId, SyscallAbi},
};
use ulib::{
    syscall::{Syscall, UpcallEntry},
    vpt::{UserMemory, Vpt},
};

/// Where the upcall trampoline sits in every user image.
pub const UPCALL_ENTRY: UpcallEntry = UpcallEntry(0x0080_0040);

/// Code running inside environment `id`.
///
/// Implements the library's kernel interface: system calls are dispatched as
/// `id`, the page table mirror shows `id`'s address space, and memory
/// accesses use `id`'s page table with user privilege.
#[derive(Clone)]
pub struct EnvHandle {
    machine: Machine,
    id: EnvId,
}

impl EnvHandle {
    pub(crate) fn new(machine: Machine, id: EnvId) -> Self {
        Self { machine, id }
    }

    /// The environment this handle runs as.
    pub fn id(&self) -> EnvId {
        self.id
    }

    /// The machine underneath.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }
}

impl core::fmt::Debug for EnvHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "EnvHandle({})", self.id)
    }
}

impl Syscall for EnvHandle {
    fn syscall(&self, abi: SyscallAbi) -> isize {
        self.machine.dispatch(self.id, abi)
    }

    fn upcall_entry(&self) -> UpcallEntry {
        UPCALL_ENTRY
    }
}

impl Vpt for EnvHandle {
    fn uvpd(&self, pdx: usize) -> Pde {
        self.machine.pde(self.id, pdx)
    }

    fn uvpt(&self, vpn: usize) -> Pte {
        self.machine.pte(self.id, vpn)
    }
}

impl UserMemory for EnvHandle {
    fn memmove(&self, dst: Va, src: Va, len: usize) -> Result<(), KernelError> {
        let mut buf = vec![0; len];
        self.read(src, &mut buf)?;
        self.machine
            .user_write(self.id, dst, &buf)
            .map_err(|_| KernelError::BadAddress)
    }

    fn read(&self, va: Va, buf: &mut [u8]) -> Result<(), KernelError> {
        self.machine
            .user_read(self.id, va, buf)
            .map_err(|_: Access| KernelError::BadAddress)
    }
}

//! System call interface.
//!
//! [`Syscall`] is the raw trap into the kernel: a number and five register
//! arguments in, one signed word out. [`Kernel`] layers typed wrappers over
//! it for every primitive, converting negative results into
//! [`KernelError`].

use abyss::{
    KernelError,
    addressing::Va,
    mmu::PteFlags,
    syscall::{EnvId, EnvStatus, SyscallAbi, SyscallNumber},
};

/// Entry point registered as an environment's page fault upcall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpcallEntry(pub usize);

/// Result of [`Kernel::sys_exofork`].
///
/// The creation primitive returns twice: once in the parent, with the id of
/// the new environment, and once in the child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkResult {
    /// Running in the parent; carries the child's id.
    Parent(EnvId),
    /// Running in the child.
    Child,
}

/// A way to trap into the kernel.
pub trait Syscall {
    /// Issue a system call and return the raw result.
    fn syscall(&self, abi: SyscallAbi) -> isize;

    /// Address of the assembly trampoline that enters the page fault upcall.
    fn upcall_entry(&self) -> UpcallEntry;
}

/// Convert a raw system call result.
///
/// Negative values that are not a known error code become
/// [`KernelError::Unspecified`].
#[inline]
pub fn decode(ret: isize) -> Result<usize, KernelError> {
    if ret < 0 {
        Err(KernelError::try_from(ret).unwrap_or(KernelError::Unspecified))
    } else {
        Ok(ret as usize)
    }
}

fn call<S: Syscall + ?Sized>(s: &S, no: SyscallNumber, args: [usize; 5]) -> Result<usize, KernelError> {
    decode(s.syscall(SyscallAbi::new(no, args)))
}

/// Typed system calls.
///
/// Every [`Syscall`] implementor gets these for free.
pub trait Kernel: Syscall {
    /// Print `len` bytes at `va` of the caller's memory to the console.
    fn sys_cputs(&self, va: Va, len: usize) -> Result<(), KernelError> {
        call(self, SyscallNumber::Cputs, [va.into_usize(), len, 0, 0, 0]).map(|_| ())
    }

    /// Read a character from the console, or `0` if none is waiting.
    fn sys_cgetc(&self) -> u8 {
        call(self, SyscallNumber::Cgetc, [0; 5]).map_or(0, |c| c as u8)
    }

    /// Id of the calling environment.
    fn sys_getenvid(&self) -> EnvId {
        call(self, SyscallNumber::Getenvid, [0; 5]).map_or(EnvId::CURRENT, EnvId::from_usize)
    }

    /// Destroy `env`, which must be the caller or one of its children.
    fn sys_env_destroy(&self, env: EnvId) -> Result<(), KernelError> {
        call(self, SyscallNumber::EnvDestroy, [env.into_usize(), 0, 0, 0, 0]).map(|_| ())
    }

    /// Give up the processor.
    fn sys_yield(&self) {
        let _ = call(self, SyscallNumber::Yield, [0; 5]);
    }

    /// Allocate a zeroed page and map it at `va` in `env` with `perm`.
    ///
    /// A page already mapped at `va` is unmapped first.
    fn sys_page_alloc(&self, env: EnvId, va: Va, perm: PteFlags) -> Result<(), KernelError> {
        call(
            self,
            SyscallNumber::PageAlloc,
            [env.into_usize(), va.into_usize(), perm.bits() as usize, 0, 0],
        )
        .map(|_| ())
    }

    /// Map the page at `src_va` in `src` at `dst_va` in `dst` with `perm`.
    fn sys_page_map(
        &self,
        src: EnvId,
        src_va: Va,
        dst: EnvId,
        dst_va: Va,
        perm: PteFlags,
    ) -> Result<(), KernelError> {
        call(
            self,
            SyscallNumber::PageMap,
            [
                src.into_usize(),
                src_va.into_usize(),
                dst.into_usize(),
                dst_va.into_usize(),
                perm.bits() as usize,
            ],
        )
        .map(|_| ())
    }

    /// Unmap the page at `va` in `env`. Unmapping nothing succeeds.
    fn sys_page_unmap(&self, env: EnvId, va: Va) -> Result<(), KernelError> {
        call(self, SyscallNumber::PageUnmap, [env.into_usize(), va.into_usize(), 0, 0, 0])
            .map(|_| ())
    }

    /// Create a blank, not-runnable child environment.
    fn sys_exofork(&self) -> Result<ForkResult, KernelError> {
        match call(self, SyscallNumber::Exofork, [0; 5])? {
            0 => Ok(ForkResult::Child),
            id => Ok(ForkResult::Parent(EnvId::from_usize(id))),
        }
    }

    /// Set the run state of `env`.
    fn sys_env_set_status(&self, env: EnvId, status: EnvStatus) -> Result<(), KernelError> {
        call(
            self,
            SyscallNumber::EnvSetStatus,
            [env.into_usize(), status as u32 as usize, 0, 0, 0],
        )
        .map(|_| ())
    }

    /// Register the page fault upcall of `env`.
    fn sys_env_set_pgfault_upcall(&self, env: EnvId, entry: UpcallEntry) -> Result<(), KernelError> {
        call(
            self,
            SyscallNumber::EnvSetPgfaultUpcall,
            [env.into_usize(), entry.0, 0, 0, 0],
        )
        .map(|_| ())
    }
}

impl<T: Syscall + ?Sized> Kernel for T {}

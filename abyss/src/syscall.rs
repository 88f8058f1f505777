//! System call numbers and environment identifiers.

use num_enum::TryFromPrimitive;

/// Log2 of the maximum number of live environments.
pub const LOG2NENV: usize = 10;

/// Maximum number of live environments.
pub const NENV: usize = 1 << LOG2NENV;

/// Shift of the generation part of an [`EnvId`].
pub const ENVGENSHIFT: usize = 12;

/// System call numbers.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum SyscallNumber {
    /// Print a string to the console.
    Cputs = 0,
    /// Read a character from the console without blocking.
    Cgetc = 1,
    /// Return the caller's environment id.
    Getenvid = 2,
    /// Destroy an environment.
    EnvDestroy = 3,
    /// Allocate a zeroed page and map it.
    PageAlloc = 4,
    /// Map a page of one environment into another.
    PageMap = 5,
    /// Unmap a page.
    PageUnmap = 6,
    /// Create a blank child environment.
    Exofork = 7,
    /// Change the run state of an environment.
    EnvSetStatus = 8,
    /// Register the page fault upcall of an environment.
    EnvSetPgfaultUpcall = 9,
    /// Give up the processor.
    Yield = 10,
}

/// Arguments of a system call as they cross the user/kernel boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyscallAbi {
    /// The system call number.
    pub sysno: usize,
    /// First argument.
    pub arg1: usize,
    /// Second argument.
    pub arg2: usize,
    /// Third argument.
    pub arg3: usize,
    /// Fourth argument.
    pub arg4: usize,
    /// Fifth argument.
    pub arg5: usize,
}

impl SyscallAbi {
    /// Pack a system call.
    pub const fn new(no: SyscallNumber, args: [usize; 5]) -> Self {
        Self {
            sysno: no as usize,
            arg1: args[0],
            arg2: args[1],
            arg3: args[2],
            arg4: args[3],
            arg5: args[4],
        }
    }
}

/// Run state of an environment.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum EnvStatus {
    /// The slot is unused.
    Free = 0,
    /// Destroyed, waiting to be reaped.
    Dying = 1,
    /// Waiting to be scheduled.
    Runnable = 2,
    /// Currently running.
    Running = 3,
    /// Alive but not schedulable.
    NotRunnable = 4,
}

/// An environment identifier.
///
/// The low [`LOG2NENV`] bits select the slot in the environment table; the
/// bits above [`ENVGENSHIFT`] hold a generation counter, so an id is not
/// reused as soon as its slot is. The value `0` always names the caller.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnvId(pub i32);

impl EnvId {
    /// Names the calling environment.
    pub const CURRENT: Self = Self(0);

    /// Index of the environment in the environment table.
    #[inline]
    pub const fn envx(self) -> usize {
        self.0 as usize & (NENV - 1)
    }

    /// Raw value passed through system call registers.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0 as u32 as usize
    }

    /// Interpret a system call register as an id.
    #[inline]
    pub const fn from_usize(raw: usize) -> Self {
        Self(raw as u32 as i32)
    }
}

impl core::fmt::Debug for EnvId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "EnvId({:08x})", self.0)
    }
}

impl core::fmt::Display for EnvId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

//! User trap frame.

use crate::{addressing::Va, mmu::PFErrorCode};

/// General purpose registers as saved by `pushal`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct PushRegs {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub oesp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

/// The frame the kernel pushes onto the user exception stack before
/// entering the page fault upcall.
///
/// The upcall returns to the faulting instruction by restoring these
/// registers and popping `esp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UTrapframe {
    /// The faulting virtual address (`cr2`).
    pub fault_va: Va,
    /// The error code pushed by the processor.
    pub err: PFErrorCode,
    /// Saved general purpose registers.
    pub regs: PushRegs,
    /// Faulting instruction pointer.
    pub eip: u32,
    /// Saved flags.
    pub eflags: u32,
    /// Stack pointer at the time of the fault.
    pub esp: u32,
}

impl UTrapframe {
    /// A frame for a fault at `fault_va` with `err`, all registers zeroed.
    pub const fn new(fault_va: Va, err: PFErrorCode) -> Self {
        Self {
            fault_va,
            err,
            regs: PushRegs {
                edi: 0,
                esi: 0,
                ebp: 0,
                oesp: 0,
                ebx: 0,
                edx: 0,
                ecx: 0,
                eax: 0,
            },
            eip: 0,
            eflags: 0,
            esp: 0,
        }
    }
}

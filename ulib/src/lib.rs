//! # User-level copy-on-write fork
//!
//! The exokernel underneath this library only exports mechanism: it can
//! create a blank environment, allocate, map and unmap pages in an
//! environment it controls, register a page fault upcall and flip an
//! environment's run state. Everything a Unix `fork` means is built here, in
//! user space, out of those primitives.
//!
//! ## Protocol
//!
//! A page shared between parent and child is mapped read-only in both, with
//! the software-only [`PTE_COW`] bit set. The first write to such a page
//! faults; the kernel redirects the fault to the user's upcall, which runs
//! [`pgfault`] on the dedicated exception stack. The handler copies the page
//! into a fresh frame staged at [`PFTEMP`], maps the copy writable at the
//! faulting address, and returns to retry the write.
//!
//! ```text
//!     parent                         child
//!   [ W ] ----- duppage ------->  [ COW ]
//!   [COW] <---- self remap           |
//!     |                              | write
//!     |                            fault -> pgfault -> [ W ] (private)
//! ```
//!
//! [`Process::fork`] walks every present page between [`UTEXT`] and
//! [`USTACKTOP`] through [`Process::duppage`], gives the child a private
//! exception stack, registers the upcall and only then marks the child
//! runnable.
//!
//! ## Backends
//!
//! The library talks to the kernel only through three traits:
//! [`Syscall`], [`Vpt`] and [`UserMemory`]. On bare metal they are
//! implemented by the `native` module; elsewhere any environment model can
//! provide them.
//!
//! [`PTE_COW`]: cow::PTE_COW
//! [`pgfault`]: pgfault::pgfault
//! [`PFTEMP`]: abyss::memlayout::PFTEMP
//! [`UTEXT`]: abyss::memlayout::UTEXT
//! [`USTACKTOP`]: abyss::memlayout::USTACKTOP
//! [`Syscall`]: syscall::Syscall
//! [`Vpt`]: vpt::Vpt
//! [`UserMemory`]: vpt::UserMemory

#![no_std]
#![deny(missing_docs)]

#[macro_use]
extern crate abyss;

pub mod cow;
pub mod fork;
pub mod pgfault;
pub mod process;
pub mod syscall;
pub mod vpt;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod native;

pub use abyss::{KernelError, addressing, memlayout, mmu};
pub use process::Process;

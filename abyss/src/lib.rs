//! # Abyss
//!
//! Definitions shared by the exokernel and the user-level library linked into
//! every environment.
//!
//! Nothing in this crate carries policy. It fixes the *vocabulary* both sides
//! agree on:
//!
//! - [`addressing`]: 32-bit virtual and physical address types.
//! - [`mmu`]: the two-level page table entry format and the page fault error
//!   code.
//! - [`memlayout`]: where things live in every user address space.
//! - [`trap`]: the frame the kernel pushes on the user exception stack.
//! - [`syscall`]: system call numbers and environment identifiers.
//! - [`error`]: the error codes returned by the kernel.
//! - [`kprint`]: console printing and leveled logging macros.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

pub mod addressing;
pub mod error;
pub mod kprint;
pub mod memlayout;
pub mod mmu;
pub mod syscall;
pub mod trap;

pub use error::{KernelError, TryFromError};

/// Silences [`info!`], [`warning!`] and [`debug!`] when set.
pub static QUITE: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

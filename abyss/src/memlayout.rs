//! User address space layout.
//!
//! ```text
//!    4 Gig -------->  +------------------------------+
//!                     :         kernel only          :
//!    ULIM     ------> +------------------------------+ 0xef800000
//!                     |  Cur. Page Table (User R-)   | R-/R-  PTSIZE
//!    UVPT      ---->  +------------------------------+ 0xef400000
//!                     :    RO kernel structures      :
//!    UTOP, UXSTACKTOP +------------------------------+ 0xeec00000
//!                     |     User Exception Stack     | RW/RW  PGSIZE
//!                     +------------------------------+ 0xeebff000
//!                     |       Empty Memory (*)       | --/--  PGSIZE
//!    USTACKTOP  --->  +------------------------------+ 0xeebfe000
//!                     |      Normal User Stack       | RW/RW  PGSIZE
//!                     +------------------------------+ 0xeebfd000
//!                     .                              .
//!                     |    Program Data & Heap       |
//!    UTEXT -------->  +------------------------------+ 0x00800000
//!    PFTEMP ------->  |       Empty Memory (*)       |
//!                     |                              |
//!    UTEMP -------->  +------------------------------+ 0x00400000
//!                     |       Empty Memory (*)       |
//!    0 ------------>  +------------------------------+
//! ```

use crate::addressing::{PAGE_SIZE, PTSIZE, Va};

/// Where user programs generally begin.
pub const UTEXT: Va = Va::from_u32(0x0080_0000);

/// Used for temporary page mappings.
pub const UTEMP: Va = Va::from_u32(0x0040_0000);

/// Scratch slot used by the user-level page fault handler to stage a copy.
pub const PFTEMP: Va = Va::from_u32(UTEMP.into_usize() as u32 + PTSIZE as u32 - PAGE_SIZE as u32);

/// Top of one-page user exception stack.
pub const UXSTACKTOP: Va = Va::from_u32(0xeec0_0000);

/// Top of normal user stack.
///
/// One unmapped guard page separates it from the exception stack.
pub const USTACKTOP: Va = Va::from_u32(0xeec0_0000 - 2 * PAGE_SIZE as u32);

/// Everything below here is user-manageable.
pub const UTOP: Va = UXSTACKTOP;

/// Read-only mirror of the current page tables.
pub const UVPT: Va = Va::from_u32(0xef40_0000);

/// Read-only mirror of the current page directory.
pub const UVPD: Va = Va::from_u32(0xef40_0000 + (0xef40_0000 >> 10));

/// Top of user-visible read-only kernel structures.
pub const ULIM: Va = Va::from_u32(0xef80_0000);

/// Base of the user exception stack page.
pub const UXSTACK: Va = Va::from_u32(0xeec0_0000 - PAGE_SIZE as u32);

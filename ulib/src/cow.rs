//! Sharing modes and the copy-on-write permission convention.
//!
//! The hardware knows nothing about copy-on-write. [`PTE_COW`] is one of the
//! page table bits reserved for software, and every fault handler in the
//! system agrees to read it the same way: the page is shared, must not be
//! written in place, and gets privately copied on the first write.
//!
//! The one rule that keeps processes from corrupting each other:
//!
//! > A frame mapped writable-or-COW in more than one process carries
//! > [`PTE_COW`] and never [`PteFlags::W`] in every one of those mappings.
//!
//! [`SharePerm`] cannot hold `W` and [`PTE_COW`] together, so a permission
//! produced here is always on the right side of that rule.

use abyss::mmu::PteFlags;

/// Marks a copy-on-write page.
pub const PTE_COW: PteFlags = PteFlags::AVAIL_2;

/// How a page is, or will be, shared between environments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharingMode {
    /// Writable and owned by one environment.
    Private,
    /// Read-only; safe to share as is.
    SharedReadOnly,
    /// Shared until the first write privatizes it.
    SharedCow,
}

impl SharingMode {
    /// Classify an existing mapping.
    pub fn of(flags: PteFlags) -> Self {
        if flags.contains(PTE_COW) {
            SharingMode::SharedCow
        } else if flags.contains(PteFlags::W) {
            SharingMode::Private
        } else {
            SharingMode::SharedReadOnly
        }
    }

    /// Mode a mapping with `flags` takes when duplicated into a child.
    ///
    /// Anything writable or already copy-on-write becomes copy-on-write;
    /// everything else is shared read-only.
    pub fn for_duplication(flags: PteFlags) -> Self {
        if flags.intersects(PteFlags::W | PTE_COW) {
            SharingMode::SharedCow
        } else {
            SharingMode::SharedReadOnly
        }
    }
}

/// A mapping permission that respects the copy-on-write convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharePerm(PteFlags);

impl SharePerm {
    /// Validate `flags` as a permission for the mapping system calls.
    ///
    /// Bits outside [`PteFlags::SYSCALL`] are dropped.
    ///
    /// # Returns
    /// - `None` if `flags` carries both [`PteFlags::W`] and [`PTE_COW`].
    pub fn new(flags: PteFlags) -> Option<Self> {
        if flags.contains(PteFlags::W | PTE_COW) {
            None
        } else {
            Some(Self(flags & PteFlags::SYSCALL))
        }
    }

    /// A private, writable user page.
    pub fn private() -> Self {
        Self(PteFlags::P | PteFlags::U | PteFlags::W)
    }

    /// Permission to install for `mode`, derived from a page's current
    /// `flags`.
    pub fn for_mode(mode: SharingMode, flags: PteFlags) -> Self {
        let base = flags & PteFlags::SYSCALL;
        match mode {
            SharingMode::Private => Self((base - PTE_COW) | PteFlags::P | PteFlags::U | PteFlags::W),
            SharingMode::SharedReadOnly => Self(base - PteFlags::W - PTE_COW),
            SharingMode::SharedCow => Self((base - PteFlags::W) | PTE_COW),
        }
    }

    /// The raw flags.
    pub fn flags(self) -> PteFlags {
        self.0
    }

    /// The sharing mode this permission installs.
    pub fn mode(self) -> SharingMode {
        SharingMode::of(self.0)
    }
}

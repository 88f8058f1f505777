//! Two-level page table entries and page fault error codes.
//!
//! Both levels share one entry format: the upper 20 bits hold a page-aligned
//! physical address and the lower 12 bits hold [`PteFlags`]. Three of those
//! bits ([`PteFlags::AVAIL_0`] to [`PteFlags::AVAIL_2`]) are ignored by the
//! hardware and left to software. User programs may set them through the
//! mapping system calls, which is what makes user-level protocols such as
//! copy-on-write possible.

use crate::addressing::Pa;

bitflags::bitflags! {
    /// Flags for page directory and page table entries.
    pub struct PteFlags: u32 {
        /// Present; must be 1 to map a 4-KByte page.
        const P = 1 << 0;
        /// Read/write; if 0, writes may not be allowed to the page.
        const W = 1 << 1;
        /// User/supervisor; if 0, user-mode accesses are not allowed.
        const U = 1 << 2;
        /// Page-level write-through.
        const PWT = 1 << 3;
        /// Page-level cache disable.
        const PCD = 1 << 4;
        /// Accessed; set by hardware on any access.
        const A = 1 << 5;
        /// Dirty; set by hardware on a write.
        const D = 1 << 6;
        /// Page size; maps a 4-MByte page when set in a directory entry.
        const PS = 1 << 7;
        /// Global; the translation survives an address space switch.
        const G = 1 << 8;
        /// Available for software use.
        const AVAIL_0 = 1 << 9;
        /// Available for software use.
        const AVAIL_1 = 1 << 10;
        /// Available for software use.
        const AVAIL_2 = 1 << 11;
    }
}

impl PteFlags {
    /// All bits available for software use.
    pub const AVAIL: Self = Self::from_bits_truncate(
        Self::AVAIL_0.bits() | Self::AVAIL_1.bits() | Self::AVAIL_2.bits(),
    );

    /// Only these bits may be passed to the page mapping system calls.
    pub const SYSCALL: Self = Self::from_bits_truncate(
        Self::AVAIL.bits() | Self::P.bits() | Self::W.bits() | Self::U.bits(),
    );
}

const ADDR_MASK: u32 = !0xfff;

/// Page Table Entry (PTE).
///
/// Maps one 4-KByte page. The raw value is public so that entries can be
/// read out of the page table mirror verbatim.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Pte(pub u32);

impl Pte {
    /// An entry that maps nothing.
    pub const EMPTY: Self = Self(0);

    /// Build an entry mapping `pa` with `flags`.
    ///
    /// The low bits of `pa` are discarded.
    #[inline]
    pub const fn new(pa: Pa, flags: PteFlags) -> Self {
        Self((pa.into_usize() as u32 & ADDR_MASK) | flags.bits())
    }

    /// Get the physical address pointed to by this entry.
    ///
    /// # Returns
    /// - `Some(Pa)` if the page is present.
    /// - `None` if the page is not present (i.e., the "P" flag is not set).
    #[inline]
    pub const fn pa(&self) -> Option<Pa> {
        if self.is_present() {
            Some(Pa::from_u32(self.0 & ADDR_MASK))
        } else {
            None
        }
    }

    /// Get the flags associated with this page table entry.
    #[inline]
    pub const fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Whether the "P" flag is set.
    #[inline]
    pub const fn is_present(&self) -> bool {
        self.0 & PteFlags::P.bits() != 0
    }
}

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pte({:08x}, {:?})", self.0 & ADDR_MASK, self.flags())
    }
}

/// Page Directory Entry (PDE).
///
/// Points to a page table, or maps a 4-MByte page when [`PteFlags::PS`] is
/// set.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Pde(pub u32);

impl Pde {
    /// An entry that maps nothing.
    pub const EMPTY: Self = Self(0);

    /// Build an entry pointing at the page table at `pa`.
    #[inline]
    pub const fn new(pa: Pa, flags: PteFlags) -> Self {
        Self((pa.into_usize() as u32 & ADDR_MASK) | flags.bits())
    }

    /// Physical address of the page table, if present.
    #[inline]
    pub const fn pa(&self) -> Option<Pa> {
        if self.is_present() {
            Some(Pa::from_u32(self.0 & ADDR_MASK))
        } else {
            None
        }
    }

    /// Get the flags associated with this entry.
    #[inline]
    pub const fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Whether the "P" flag is set.
    #[inline]
    pub const fn is_present(&self) -> bool {
        self.0 & PteFlags::P.bits() != 0
    }
}

impl core::fmt::Debug for Pde {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pde({:08x}, {:?})", self.0 & ADDR_MASK, self.flags())
    }
}

bitflags::bitflags! {
    /// Page fault error code pushed by the processor.
    pub struct PFErrorCode: u32 {
        /// Fault caused by a protection violation; clear for a not-present
        /// page.
        const PRESENT = 1 << 0;
        /// Fault caused by a write; clear for a read.
        const WRITE_ACCESS = 1 << 1;
        /// Fault taken in user mode.
        const USER = 1 << 2;
    }
}

//! Physical and Virtual Memory Addressing Schemes.
//!
//! The machine uses 32-bit two-level paging. A virtual address is split into
//! three fields:
//!
//! ```text
//! +--------10------+-------10-------+---------12----------+
//! | Page Directory |   Page Table   | Offset within Page  |
//! |      Index     |      Index     |                     |
//! +----------------+----------------+---------------------+
//!  \--- pdx(va) --/ \--- ptx(va) --/
//!  \----------- vpn(va) -----------/
//! ```
//!
//! [`Va`] and [`Pa`] wrap the raw numbers so that virtual and physical
//! addresses cannot be mixed up, and offer the arithmetic needed to walk
//! pages.
//!
//! ## Example Usage:
//!
//! ```
//! use abyss::addressing::{Va, PAGE_SIZE};
//!
//! let va = Va::new(0x0080_0123).unwrap();
//! assert_eq!(va.page_down().into_usize(), 0x0080_0000);
//! assert_eq!(va.offset(), 0x123);
//! assert_eq!((va.page_down() + PAGE_SIZE).vpn(), va.vpn() + 1);
//! ```

/// The size of a single page in memory, in bytes.
pub const PAGE_SIZE: usize = 0x1000;

/// The shift amount to get the page index from a given address.
pub const PAGE_SHIFT: usize = 12; // 12 bits (log2 of 4 KB)

/// A mask for extracting the offset within a page from a given address.
pub const PAGE_MASK: usize = 0xfff;

/// The shift amount to get the page directory index from a given address.
pub const PDX_SHIFT: usize = 22;

/// Number of entries in a page directory.
pub const NPDENTRIES: usize = 1024;

/// Number of entries in a page table.
pub const NPTENTRIES: usize = 1024;

/// Bytes mapped by one page directory entry.
pub const PTSIZE: usize = PAGE_SIZE * NPTENTRIES;

/// Represents a physical address.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Pa(usize);

impl Pa {
    /// The physical address `0`.
    pub const ZERO: Self = Self(0);

    /// Creates a new physical address if the address fits in 32 bits.
    ///
    /// # Returns
    /// - `Some(Pa)` if the address is valid.
    /// - `None` if the address is outside the valid range.
    #[inline]
    pub const fn new(addr: usize) -> Option<Self> {
        if addr <= u32::MAX as usize {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// Creates a physical address from a 32-bit value.
    #[inline]
    pub const fn from_u32(addr: u32) -> Self {
        Self(addr as usize)
    }

    /// Cast into usize.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }

    /// Align down the address to the nearest page boundary.
    #[inline]
    pub const fn page_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Physical page number of this address.
    #[inline]
    pub const fn ppn(self) -> usize {
        self.0 >> PAGE_SHIFT
    }
}

impl core::ops::Add<usize> for Pa {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl core::fmt::Debug for Pa {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pa(0x{:08x})", self.0)
    }
}

/// Represents a virtual address.
///
/// A [`Va`] always fits in 32 bits. Use [`Va::new`] to validate an arbitrary
/// number, or [`Va::from_u32`] when the value is known to be in range.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Va(usize);

impl Va {
    /// The virtual address `0`.
    pub const ZERO: Self = Self(0);

    /// Creates a new virtual address if the address fits in 32 bits.
    ///
    /// # Arguments
    /// - `addr`: A `usize` representing the virtual address.
    ///
    /// # Returns
    /// - `Some(Va)` if the address is valid.
    /// - `None` if the address is outside the 32-bit address space.
    #[inline]
    pub const fn new(addr: usize) -> Option<Self> {
        if addr <= u32::MAX as usize {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// Creates a virtual address from a 32-bit value.
    #[inline]
    pub const fn from_u32(addr: u32) -> Self {
        Self(addr as usize)
    }

    /// Address of the first byte of virtual page number `vpn`.
    ///
    /// Page numbers beyond the 32-bit address space wrap.
    #[inline]
    pub const fn from_vpn(vpn: usize) -> Self {
        Self((vpn << PAGE_SHIFT) & u32::MAX as usize)
    }

    /// Cast into usize.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }

    /// Align down the address to the nearest page boundary.
    #[inline]
    pub const fn page_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Align up the address to the nearest page boundary.
    ///
    /// Returns `None` when rounding up leaves the address space.
    #[inline]
    pub const fn page_up(self) -> Option<Self> {
        match self.0.checked_add(PAGE_MASK) {
            Some(addr) => Self::new(addr & !PAGE_MASK),
            None => None,
        }
    }

    /// Adds `rhs` bytes to the address.
    ///
    /// Returns `None` when the result leaves the 32-bit address space, even
    /// where `usize` itself is 32 bits wide.
    #[inline]
    pub const fn checked_add(self, rhs: usize) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(addr) => Self::new(addr),
            None => None,
        }
    }

    /// Offset of the address within its page.
    #[inline]
    pub const fn offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Whether the address is on a page boundary.
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.offset() == 0
    }

    /// Virtual page number.
    #[inline]
    pub const fn vpn(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Page directory index.
    #[inline]
    pub const fn pdx(self) -> usize {
        (self.0 >> PDX_SHIFT) & (NPDENTRIES - 1)
    }

    /// Page table index.
    #[inline]
    pub const fn ptx(self) -> usize {
        (self.0 >> PAGE_SHIFT) & (NPTENTRIES - 1)
    }
}

impl core::ops::Add<usize> for Va {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl core::ops::Sub<usize> for Va {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl core::ops::Sub<Va> for Va {
    type Output = usize;

    fn sub(self, rhs: Va) -> Self::Output {
        self.0 - rhs.0
    }
}

impl core::fmt::Debug for Va {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Va(0x{:08x})", self.0)
    }
}

impl core::fmt::Display for Va {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

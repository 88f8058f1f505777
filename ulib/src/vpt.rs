//! Read-only views of the caller's own address space.
//!
//! The kernel maps the current page directory at [`UVPD`] and every page
//! table at [`UVPT`], both read-only for user code. Through them a process
//! inspects its own mappings without a system call per query.
//!
//! [`UVPD`]: abyss::memlayout::UVPD
//! [`UVPT`]: abyss::memlayout::UVPT

use abyss::{
    KernelError,
    addressing::Va,
    mmu::{Pde, Pte},
};

/// The page table mirror.
pub trait Vpt {
    /// The page directory entry with index `pdx`.
    fn uvpd(&self, pdx: usize) -> Pde;

    /// The page table entry for virtual page number `vpn`.
    ///
    /// Only meaningful when the covering directory entry is present.
    fn uvpt(&self, vpn: usize) -> Pte;

    /// Look up the mapping of `va`.
    ///
    /// Consults the directory first, so an absent page table is never read.
    ///
    /// # Returns
    /// - `Some(Pte)` if `va` is mapped.
    /// - `None` otherwise.
    fn walk(&self, va: Va) -> Option<Pte> {
        if !self.uvpd(va.pdx()).is_present() {
            return None;
        }
        let pte = self.uvpt(va.vpn());
        pte.is_present().then_some(pte)
    }
}

/// Plain loads and stores on the caller's memory.
///
/// These go through the caller's own page table with user privilege, so
/// they fail with [`KernelError::BadAddress`] where the hardware would fault.
pub trait UserMemory {
    /// Copy `len` bytes from `src` to `dst`. The ranges may overlap.
    fn memmove(&self, dst: Va, src: Va, len: usize) -> Result<(), KernelError>;

    /// Fill `buf` with the bytes starting at `va`.
    fn read(&self, va: Va, buf: &mut [u8]) -> Result<(), KernelError>;
}

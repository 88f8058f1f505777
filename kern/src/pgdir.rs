//! Two-level address spaces.

use crate::mm::{FramePool, Page};
use abyss::{
    KernelError,
    addressing::{NPTENTRIES, Va},
    mmu::{Pde, Pte, PteFlags},
};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
struct Mapping {
    page: Page,
    flags: PteFlags,
}

struct PageTable {
    frame: Page,
    entries: Vec<Option<Mapping>>,
}

/// The address space of one environment.
///
/// The directory and each page table occupy a frame of their own, so they
/// are charged to the frame pool like any user page.
pub struct AddressSpace {
    _dir: Page,
    tables: BTreeMap<usize, PageTable>,
}

impl AddressSpace {
    /// An empty address space.
    ///
    /// # Errors
    /// - [`KernelError::NoMemory`] if no frame is left for the directory.
    pub fn new(pool: &FramePool) -> Result<Self, KernelError> {
        Ok(Self {
            _dir: pool.alloc().ok_or(KernelError::NoMemory)?,
            tables: BTreeMap::new(),
        })
    }

    /// The directory entry with index `pdx`.
    pub fn pde(&self, pdx: usize) -> Pde {
        self.tables.get(&pdx).map_or(Pde::EMPTY, |table| {
            Pde::new(table.frame.pa(), PteFlags::P | PteFlags::W | PteFlags::U)
        })
    }

    /// The page table entry for virtual page number `vpn`.
    pub fn pte(&self, vpn: usize) -> Pte {
        self.mapping(Va::from_vpn(vpn))
            .map_or(Pte::EMPTY, |m| Pte::new(m.page.pa(), m.flags))
    }

    fn mapping(&self, va: Va) -> Option<&Mapping> {
        self.tables.get(&va.pdx())?.entries[va.ptx()].as_ref()
    }

    /// The page mapped at `va` and its flags.
    pub fn lookup(&self, va: Va) -> Option<(&Page, PteFlags)> {
        self.mapping(va).map(|m| (&m.page, m.flags))
    }

    /// Map `page` at `va` with `flags`, replacing any existing mapping.
    ///
    /// # Errors
    /// - [`KernelError::NoMemory`] if a page table is needed and no frame is
    ///   left for it.
    pub fn insert(
        &mut self,
        pool: &FramePool,
        va: Va,
        page: Page,
        flags: PteFlags,
    ) -> Result<(), KernelError> {
        let table = match self.tables.entry(va.pdx()) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => e.insert(PageTable {
                frame: pool.alloc().ok_or(KernelError::NoMemory)?,
                entries: vec![None; NPTENTRIES],
            }),
        };
        table.entries[va.ptx()] = Some(Mapping {
            page,
            flags: flags | PteFlags::P,
        });
        Ok(())
    }

    /// Remove the mapping at `va`, returning the page it held.
    pub fn remove(&mut self, va: Va) -> Option<Page> {
        self.tables
            .get_mut(&va.pdx())?
            .entries[va.ptx()]
            .take()
            .map(|m| m.page)
    }

    /// Every mapping, in address order.
    pub fn mappings(&self) -> impl Iterator<Item = (Va, Pte)> + '_ {
        self.tables.iter().flat_map(|(pdx, table)| {
            table.entries.iter().enumerate().filter_map(move |(ptx, m)| {
                m.as_ref().map(|m| {
                    (
                        Va::from_vpn(pdx * NPTENTRIES + ptx),
                        Pte::new(m.page.pa(), m.flags),
                    )
                })
            })
        })
    }
}

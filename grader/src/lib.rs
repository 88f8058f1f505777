//! Scenario tests for user-level copy-on-write fork.
//!
//! Every test boots a fresh [`Machine`], spawns one environment and drives
//! the fork library inside it.

use abyss::{
    addressing::{PAGE_SIZE, Va},
    mmu::PteFlags,
    syscall::EnvId,
};
use kern::{EnvHandle, Machine, MachineBuilder, cpu};
use ulib::{Process, syscall::Kernel};

#[cfg(test)]
mod duppage;
#[cfg(test)]
mod monitor;
#[cfg(test)]
mod pgfault;
#[cfg(test)]
mod pte;

/// A user page used throughout the tests.
pub const V: Va = Va::from_u32(0x0080_0000);

/// Boot a quiet machine with one running process.
pub fn boot() -> (Machine, Process<EnvHandle>) {
    boot_with(MachineBuilder::new())
}

/// Boot `builder` with one running process.
pub fn boot_with(builder: MachineBuilder) -> (Machine, Process<EnvHandle>) {
    let machine = builder.quiet(true).build();
    let process = Process::new(machine.spawn().expect("cannot spawn the first environment"));
    (machine, process)
}

/// Map a fresh page at `va` holding `contents`, then leave it with `perm`.
pub fn map_page(process: &mut Process<EnvHandle>, va: Va, perm: PteFlags, contents: &[u8]) {
    let k = process.kernel().clone();
    k.sys_page_alloc(EnvId::CURRENT, va, PteFlags::P | PteFlags::U | PteFlags::W)
        .expect("page_alloc");
    cpu::store(process, va, contents).expect("initial store");
    if perm != PteFlags::P | PteFlags::U | PteFlags::W {
        k.sys_page_map(EnvId::CURRENT, va, EnvId::CURRENT, va, perm)
            .expect("page_map");
    }
}

/// The whole page at `va`, as the process sees it.
pub fn read_page(process: &mut Process<EnvHandle>, va: Va) -> Vec<u8> {
    let mut buf = vec![0; PAGE_SIZE];
    cpu::load(process, va.page_down(), &mut buf).expect("load");
    buf
}

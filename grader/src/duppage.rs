use crate::{V, boot, boot_with, map_page};
use abyss::{
    KernelError,
    mmu::PteFlags,
    syscall::{EnvId, SyscallNumber},
};
use kern::{EnvHandle, MachineBuilder};
use ulib::{
    Process,
    cow::{PTE_COW, SharingMode},
    syscall::{ForkResult, Kernel},
};

fn exofork(p: &Process<EnvHandle>) -> EnvId {
    match p.kernel().sys_exofork() {
        Ok(ForkResult::Parent(child)) => child,
        r => panic!("exofork returned {r:?}"),
    }
}

#[test]
fn writable_page() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    map_page(&mut p, V, PteFlags::P | PteFlags::U | PteFlags::W, &[1, 2, 3]);
    let child = exofork(&p);
    let pa = machine.translate(id, V).and_then(|pte| pte.pa());

    assert_eq!(p.duppage(child, V.vpn()), Ok(SharingMode::SharedCow));
    let mine = machine.translate(id, V).unwrap();
    let theirs = machine.translate(child, V).unwrap();
    assert_eq!(mine, theirs);
    assert_eq!(mine.pa(), pa);
    assert_eq!(mine.flags(), PteFlags::P | PteFlags::U | PTE_COW);
    assert_eq!(machine.mapping_count(id, V), Some(2));
}

#[test]
fn cow_page() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    map_page(&mut p, V, PteFlags::P | PteFlags::U | PTE_COW, &[]);
    let child = exofork(&p);

    assert_eq!(p.duppage(child, V.vpn()), Ok(SharingMode::SharedCow));
    assert_eq!(machine.translate(id, V), machine.translate(child, V));
    assert!(!machine.translate(child, V).unwrap().flags().contains(PteFlags::W));
}

#[test]
fn read_only_page() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    let ro = PteFlags::P | PteFlags::U | PteFlags::AVAIL_0;
    map_page(&mut p, V, ro, &[]);
    let child = exofork(&p);
    let before = machine.translate(id, V);

    assert_eq!(p.duppage(child, V.vpn()), Ok(SharingMode::SharedReadOnly));
    assert_eq!(machine.translate(id, V), before);
    assert_eq!(machine.translate(child, V), before);
    assert_eq!(before.map(|pte| pte.flags()), Some(ro));
}

#[test]
fn unmapped_page() {
    let (machine, p) = boot();
    let child = exofork(&p);
    assert_eq!(p.duppage(child, V.vpn()), Err(KernelError::InvalidArgument));
    assert_eq!(machine.translate(child, V), None);
}

#[test]
fn not_my_child() {
    let (machine, mut p) = boot();
    map_page(&mut p, V, PteFlags::P | PteFlags::U | PteFlags::W, &[]);
    let stranger = machine.spawn().unwrap().id();
    let before = machine.translate(p.thisenv(), V);

    assert_eq!(p.duppage(stranger, V.vpn()), Err(KernelError::BadEnv));
    assert_eq!(machine.translate(p.thisenv(), V), before);
}

#[test]
fn child_map_fails_first() {
    // map_page leaves writable pages alone, so page_map #1 is the child's.
    let (machine, mut p) = boot_with(MachineBuilder::new().fail_syscall(
        SyscallNumber::PageMap,
        1,
        KernelError::NoMemory,
    ));
    let rw = PteFlags::P | PteFlags::U | PteFlags::W;
    map_page(&mut p, V, rw, &[]);
    let child = exofork(&p);

    assert_eq!(p.duppage(child, V.vpn()), Err(KernelError::NoMemory));
    assert_eq!(machine.translate(p.thisenv(), V).map(|pte| pte.flags()), Some(rw));
    assert_eq!(machine.translate(child, V), None);
}

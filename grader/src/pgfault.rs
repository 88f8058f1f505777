use crate::{V, boot, boot_with, map_page, read_page};
use abyss::{
    KernelError,
    addressing::{PAGE_SIZE, Va},
    memlayout::{PFTEMP, UXSTACK, UXSTACKTOP},
    mmu::{PFErrorCode, PteFlags},
    syscall::{EnvId, SyscallNumber},
    trap::UTrapframe,
};
use kern::{EnvHandle, EnvKilled, MachineBuilder, UPCALL_ENTRY, cpu};
use ulib::{
    Process,
    cow::PTE_COW,
    pgfault::{FaultError, pgfault},
    syscall::{Kernel, UpcallEntry},
};

const RO: PteFlags = PteFlags::from_bits_truncate(PteFlags::P.bits() | PteFlags::U.bits());
const RW: PteFlags = PteFlags::from_bits_truncate(RO.bits() | PteFlags::W.bits());
const COW: PteFlags = PteFlags::from_bits_truncate(RO.bits() | PTE_COW.bits());

fn alloc_on_fault(process: &mut Process<EnvHandle>, utf: &UTrapframe) -> Result<(), FaultError> {
    process
        .kernel()
        .sys_page_alloc(EnvId::CURRENT, utf.fault_va.page_down(), RW)?;
    Ok(())
}

#[test]
fn install_handler() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    assert!(!p.fault_context().is_installed());
    assert_eq!(p.fault_context().entry(), None);
    assert_eq!(p.fault_context().scratch(), PFTEMP);
    assert_eq!(machine.upcall(id), None);

    p.set_pgfault_handler(pgfault).unwrap();
    assert!(p.fault_context().is_installed());
    assert_eq!(p.fault_context().exception_stack(), Some(UXSTACK));
    assert_eq!(p.fault_context().entry(), Some(UPCALL_ENTRY));
    assert_eq!(machine.upcall(id), Some(UPCALL_ENTRY));
    assert_eq!(machine.translate(id, UXSTACK).map(|pte| pte.flags()), Some(RW));
}

#[test]
fn install_handler_twice() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    p.set_pgfault_handler(alloc_on_fault).unwrap();
    let xstack = machine.translate(id, UXSTACK);
    let frames = machine.live_frames();

    p.set_pgfault_handler(pgfault).unwrap();
    assert_eq!(machine.translate(id, UXSTACK), xstack);
    assert_eq!(machine.live_frames(), frames);
}

#[test]
fn custom_handler() {
    let (machine, mut p) = boot();
    let va = Va::from_u32(0x00a0_0123);
    p.set_pgfault_handler(alloc_on_fault).unwrap();
    cpu::store(&mut p, va, b"hello").unwrap();

    let mut buf = [0; 5];
    cpu::load(&mut p, va, &mut buf).unwrap();
    assert_eq!(&buf, b"hello");
    assert_eq!(
        machine.translate(p.thisenv(), va).map(|pte| pte.flags()),
        Some(RW)
    );
}

#[test]
fn cow_write_privatizes() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    let data = (0..PAGE_SIZE).map(|i| i as u8).collect::<Vec<_>>();
    map_page(&mut p, V, COW, &data);
    p.set_pgfault_handler(pgfault).unwrap();
    let old = machine.translate(id, V).unwrap();

    cpu::store(&mut p, V + 5, &[0xaa]).unwrap();
    let new = machine.translate(id, V).unwrap();
    assert_eq!(new.flags(), RW);
    assert_ne!(new.pa(), old.pa());
    assert_eq!(machine.mapping_count(id, V), Some(1));

    let mut expected = data;
    expected[5] = 0xaa;
    assert_eq!(read_page(&mut p, V), expected);
}

#[test]
fn upcall_on_copy() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    map_page(&mut p, V, COW, b"shared");
    p.set_pgfault_handler(pgfault).unwrap();
    let old = machine.translate(id, V).unwrap();

    let utf = UTrapframe::new(
        V + 2,
        PFErrorCode::USER | PFErrorCode::WRITE_ACCESS | PFErrorCode::PRESENT,
    );
    p.clone().upcall(&utf).unwrap();
    let new = machine.translate(id, V).unwrap();
    assert_eq!(new.flags(), RW);
    assert_ne!(new.pa(), old.pa());
    assert_eq!(machine.translate(id, PFTEMP), None);

    cpu::store(&mut p, V, b"S").unwrap();
    assert_eq!(&read_page(&mut p, V)[..6], b"Shared");
}

#[test]
fn scratch_unmapped() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    for i in 0..3 {
        map_page(&mut p, V + i * PAGE_SIZE, COW, &[i as u8]);
    }
    p.set_pgfault_handler(pgfault).unwrap();
    for i in 0..3 {
        cpu::store(&mut p, V + i * PAGE_SIZE + 1, &[0xff]).unwrap();
        assert_eq!(machine.translate(id, PFTEMP), None);
        assert_eq!(read_page(&mut p, V + i * PAGE_SIZE)[..2], [i as u8, 0xff]);
    }
}

#[test]
fn exception_frame() {
    let (_machine, mut p) = boot();
    map_page(&mut p, V, COW, &[]);
    p.set_pgfault_handler(pgfault).unwrap();
    cpu::store(&mut p, V + 0x10, &[1]).unwrap();

    let mut words = [0; 8];
    cpu::load(&mut p, UXSTACKTOP - 13 * 4, &mut words).unwrap();
    assert_eq!(u32::from_le_bytes(words[..4].try_into().unwrap()), 0x0080_0010);
    assert_eq!(
        u32::from_le_bytes(words[4..].try_into().unwrap()),
        (PFErrorCode::PRESENT | PFErrorCode::WRITE_ACCESS | PFErrorCode::USER).bits()
    );
}

#[test]
fn read_fault_is_fatal() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    map_page(&mut p, V, COW, &[]);
    p.set_pgfault_handler(pgfault).unwrap();

    let err = PFErrorCode::PRESENT | PFErrorCode::USER;
    assert_eq!(
        cpu::deliver(&mut p, UTrapframe::new(V, err)),
        Err(EnvKilled::Fatal(FaultError::NotWrite { va: V, err }))
    );
    assert_eq!(machine.status(id), None);
}

#[test]
fn write_to_read_only_is_fatal() {
    let (machine, mut p) = boot();
    let id = p.thisenv();
    map_page(&mut p, V, RO, &[0x42]);
    p.set_pgfault_handler(pgfault).unwrap();
    let pte = machine.translate(id, V);

    assert_eq!(
        cpu::store(&mut p, V, &[0]),
        Err(EnvKilled::Fatal(FaultError::NotCow { va: V, pte }))
    );
    assert_eq!(machine.status(id), None);
    assert_eq!(machine.live_envs(), 0);
}

#[test]
fn write_to_unmapped_is_fatal() {
    let (machine, mut p) = boot();
    p.set_pgfault_handler(pgfault).unwrap();
    let va = Va::from_u32(0x00c0_0000);
    assert_eq!(
        cpu::store(&mut p, va, &[0]),
        Err(EnvKilled::Fatal(FaultError::NotCow { va, pte: None }))
    );
    assert_eq!(machine.live_envs(), 0);
}

#[test]
fn fault_without_upcall() {
    let (machine, mut p) = boot();
    map_page(&mut p, V, COW, &[]);
    assert_eq!(cpu::store(&mut p, V, &[0]), Err(EnvKilled::NoUpcall));
    assert_eq!(machine.live_envs(), 0);
}

#[test]
fn exception_stack_not_writable() {
    let (machine, mut p) = boot();
    map_page(&mut p, V, COW, &[]);
    p.set_pgfault_handler(pgfault).unwrap();
    p.kernel()
        .sys_page_map(EnvId::CURRENT, UXSTACK, EnvId::CURRENT, UXSTACK, RO)
        .unwrap();
    assert_eq!(cpu::store(&mut p, V, &[0]), Err(EnvKilled::BadExceptionStack));
    assert_eq!(machine.live_envs(), 0);
}

#[test]
fn exception_stack_unmapped() {
    let (machine, mut p) = boot();
    map_page(&mut p, V, COW, &[]);
    p.set_pgfault_handler(pgfault).unwrap();
    p.kernel().sys_page_unmap(EnvId::CURRENT, UXSTACK).unwrap();
    assert_eq!(cpu::store(&mut p, V, &[0]), Err(EnvKilled::BadExceptionStack));
    assert_eq!(machine.live_envs(), 0);
}

#[test]
fn foreign_upcall_entry() {
    let (machine, mut p) = boot();
    map_page(&mut p, V, COW, &[]);
    p.set_pgfault_handler(pgfault).unwrap();
    p.kernel()
        .sys_env_set_pgfault_upcall(EnvId::CURRENT, UpcallEntry(0x1234))
        .unwrap();
    assert_eq!(cpu::store(&mut p, V, &[0]), Err(EnvKilled::BadEntry));
    assert_eq!(machine.live_envs(), 0);
}

#[test]
fn copy_allocation_fails() {
    // page_alloc #1 maps V, #2 is the exception stack, #3 the copy.
    let (machine, mut p) = boot_with(MachineBuilder::new().fail_syscall(
        SyscallNumber::PageAlloc,
        3,
        KernelError::NoMemory,
    ));
    map_page(&mut p, V, COW, &[]);
    p.set_pgfault_handler(pgfault).unwrap();
    assert_eq!(
        cpu::store(&mut p, V, &[0]),
        Err(EnvKilled::Fatal(FaultError::Kernel(KernelError::NoMemory)))
    );
    assert_eq!(machine.live_envs(), 0);
}

#[test]
fn exception_stack_allocation_fails() {
    let (machine, mut p) = boot_with(MachineBuilder::new().frame_limit(1));
    assert_eq!(
        p.set_pgfault_handler(pgfault),
        Err(KernelError::NoMemory)
    );
    assert!(!p.fault_context().is_installed());
    assert_eq!(machine.upcall(p.thisenv()), None);
}

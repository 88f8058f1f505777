//! User-mode execution.
//!
//! Loads and stores issued here behave like instructions executed by the
//! environment: they go through its page table with user privilege, and an
//! access the page table does not allow raises a page fault. The fault is
//! pushed onto the exception stack and delivered to the process's upcall;
//! if the upcall cannot be entered, or the handler gives up, the kernel
//! destroys the environment.

use crate::{
    handle::EnvHandle,
    machine::{Access, EnvKilled},
};
use abyss::{addressing::Va, trap::UTrapframe, warning};
use ulib::{Process, syscall::Syscall};

/// Execute a store of `bytes` at `va`.
pub fn store(process: &mut Process<EnvHandle>, va: Va, bytes: &[u8]) -> Result<(), EnvKilled> {
    for (i, &b) in bytes.iter().enumerate() {
        let va = va + i;
        execute(process, va, |k| k.machine().user_write(k.id(), va, &[b]))?;
    }
    Ok(())
}

/// Execute a load of `buf.len()` bytes at `va`.
pub fn load(process: &mut Process<EnvHandle>, va: Va, buf: &mut [u8]) -> Result<(), EnvKilled> {
    for (i, b) in buf.iter_mut().enumerate() {
        let va = va + i;
        let mut byte = [0];
        execute(process, va, |k| k.machine().user_read(k.id(), va, &mut byte))?;
        *b = byte[0];
    }
    Ok(())
}

fn execute(
    process: &mut Process<EnvHandle>,
    va: Va,
    mut access: impl FnMut(&EnvHandle) -> Result<(), Access>,
) -> Result<(), EnvKilled> {
    let mut faulted = false;
    loop {
        match access(process.kernel()) {
            Ok(()) => return Ok(()),
            Err(Access::Gone) => return Err(EnvKilled::NotRunnable),
            Err(Access::Fault(err)) if !faulted => {
                faulted = true;
                deliver(process, UTrapframe::new(va, err))?;
            }
            Err(Access::Fault(_)) => {
                let handle = process.kernel();
                warning!("[{}] fault at {} persists after the upcall", handle.id(), va);
                handle.machine().destroy(handle.id());
                return Err(EnvKilled::FaultLoop(va));
            }
        }
    }
}

/// Deliver the page fault `utf` to the process.
pub fn deliver(process: &mut Process<EnvHandle>, utf: UTrapframe) -> Result<(), EnvKilled> {
    let handle = process.kernel().clone();
    let entered = handle
        .machine()
        .prepare_upcall(handle.id(), &utf)
        .and_then(|entry| {
            if entry == handle.upcall_entry() {
                Ok(())
            } else {
                Err(EnvKilled::BadEntry)
            }
        });
    if let Err(killed) = entered {
        warning!(
            "[{}] user fault va {} ip {:08x}: {:?}",
            handle.id(),
            utf.fault_va,
            utf.eip,
            killed
        );
        handle.machine().destroy(handle.id());
        return Err(killed);
    }
    if let Err(e) = process.upcall(&utf) {
        warning!("[{}] unrecoverable fault: {}", handle.id(), e);
        handle.machine().destroy(handle.id());
        return Err(EnvKilled::Fatal(e));
    }
    Ok(())
}

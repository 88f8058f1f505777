//! The machine: frames, environments and the system call dispatcher.

use crate::{
    env::EnvTable,
    handle::EnvHandle,
    mm::FramePool,
    pgdir::AddressSpace,
};
use abyss::{
    KernelError,
    addressing::{PAGE_SIZE, Va},
    info,
    memlayout::{UTOP, UXSTACK, UXSTACKTOP},
    mmu::{PFErrorCode, Pde, Pte, PteFlags},
    syscall::{EnvId, EnvStatus, NENV, SyscallAbi, SyscallNumber},
    trap::UTrapframe,
};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};
use ulib::syscall::UpcallEntry;

/// Why the kernel tore an environment down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvKilled {
    /// The environment does not exist or may not run.
    NotRunnable,
    /// A fault arrived with no upcall registered.
    NoUpcall,
    /// The exception stack is not mapped user-writable.
    BadExceptionStack,
    /// The registered upcall is not the library's trampoline.
    BadEntry,
    /// The user handler reported the fault as unrecoverable.
    Fatal(ulib::pgfault::FaultError),
    /// The handler returned but the access faulted again.
    FaultLoop(Va),
}

#[derive(Clone, Copy)]
struct Failure {
    sysno: SyscallNumber,
    nth: usize,
    error: KernelError,
}

/// A builder for machine configuration settings.
pub struct MachineBuilder {
    max_envs: usize,
    frame_limit: Option<usize>,
    quiet: bool,
    failures: Vec<Failure>,
}

impl Default for MachineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineBuilder {
    /// Default configuration: [`NENV`] environments and unlimited frames.
    pub fn new() -> Self {
        Self {
            max_envs: NENV,
            frame_limit: None,
            quiet: false,
            failures: Vec::new(),
        }
    }

    /// Sets the maximum number of live environments.
    pub fn max_envs(mut self, max_envs: usize) -> Self {
        self.max_envs = max_envs;
        self
    }

    /// Sets the maximum number of live physical frames.
    pub fn frame_limit(mut self, frames: usize) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Silences leveled logging.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Makes the `nth` call (counting from 1) of system call `sysno` fail
    /// with `error` without doing anything.
    pub fn fail_syscall(mut self, sysno: SyscallNumber, nth: usize, error: KernelError) -> Self {
        self.failures.push(Failure { sysno, nth, error });
        self
    }

    /// Builds the machine.
    pub fn build(self) -> Machine {
        abyss::kprint::set_sink(|args| eprint!("{args}"));
        abyss::QUITE.store(self.quiet, core::sync::atomic::Ordering::SeqCst);
        Machine(Rc::new(RefCell::new(Inner {
            pool: FramePool::new(self.frame_limit),
            envs: EnvTable::new(self.max_envs),
            console: String::new(),
            calls: BTreeMap::new(),
            failures: self.failures,
        })))
    }
}

pub(crate) enum Access {
    Gone,
    Fault(PFErrorCode),
}

struct Inner {
    pool: FramePool,
    envs: EnvTable,
    console: String,
    calls: BTreeMap<usize, usize>,
    failures: Vec<Failure>,
}

/// A uniprocessor running the exokernel.
///
/// Cloning yields another reference to the same machine.
#[derive(Clone)]
pub struct Machine(Rc<RefCell<Inner>>);

impl Machine {
    /// Create a runnable environment with an empty address space.
    pub fn spawn(&self) -> Result<EnvHandle, KernelError> {
        let mut inner = self.0.borrow_mut();
        let space = AddressSpace::new(&inner.pool)?;
        let id = inner.envs.alloc(EnvId::CURRENT, EnvStatus::Runnable, space)?;
        info!("[{}] new env {}", EnvId::CURRENT, id);
        Ok(self.handle(id))
    }

    /// The user-side interface of environment `id`.
    pub fn handle(&self, id: EnvId) -> EnvHandle {
        EnvHandle::new(self.clone(), id)
    }

    /// Run state of `id`, or `None` once it is destroyed.
    pub fn status(&self, id: EnvId) -> Option<EnvStatus> {
        self.0.borrow().envs.get(id).map(|env| env.status)
    }

    /// Parent of `id`.
    pub fn parent(&self, id: EnvId) -> Option<EnvId> {
        self.0.borrow().envs.get(id).map(|env| env.parent)
    }

    /// Registered upcall of `id`.
    pub fn upcall(&self, id: EnvId) -> Option<UpcallEntry> {
        self.0.borrow().envs.get(id).and_then(|env| env.upcall)
    }

    /// Page table entry mapping `va` in `id`, as the kernel sees it.
    pub fn translate(&self, id: EnvId, va: Va) -> Option<Pte> {
        let inner = self.0.borrow();
        let env = inner.envs.get(id)?;
        env.space
            .lookup(va)
            .map(|(page, flags)| Pte::new(page.pa(), flags))
    }

    /// Number of mappings of the frame behind `va` in `id`, across all
    /// environments.
    pub fn mapping_count(&self, id: EnvId, va: Va) -> Option<usize> {
        let inner = self.0.borrow();
        let (page, _) = inner.envs.get(id)?.space.lookup(va)?;
        Some(page.ref_count())
    }

    /// Every mapping of `id` in address order.
    pub fn mappings(&self, id: EnvId) -> Vec<(Va, Pte)> {
        let inner = self.0.borrow();
        inner
            .envs
            .get(id)
            .map(|env| env.space.mappings().collect())
            .unwrap_or_default()
    }

    /// Whether `id` was created by exofork and has not resumed yet.
    pub fn is_fork_pending(&self, id: EnvId) -> bool {
        self.0
            .borrow()
            .envs
            .get(id)
            .is_some_and(|env| env.exofork_pending)
    }

    /// Number of frames in use, page tables included.
    pub fn live_frames(&self) -> usize {
        self.0.borrow().pool.live()
    }

    /// Number of live environments.
    pub fn live_envs(&self) -> usize {
        self.0.borrow().envs.len()
    }

    /// Everything printed with `SYS_cputs` so far.
    pub fn console(&self) -> String {
        self.0.borrow().console.clone()
    }

    /// Destroy `id` on the kernel's own initiative.
    pub fn destroy(&self, id: EnvId) {
        let env = self.0.borrow_mut().envs.remove(id);
        if env.is_some() {
            info!("[{}] free env {}", id, id);
        }
        // Frames are released here, outside of the borrow.
        drop(env);
    }

    pub(crate) fn dispatch(&self, caller: EnvId, abi: SyscallAbi) -> isize {
        let mut inner = self.0.borrow_mut();
        match inner.syscall(caller, abi) {
            Ok(ret) => ret as isize,
            Err(e) => e.into_isize(),
        }
    }

    pub(crate) fn pde(&self, id: EnvId, pdx: usize) -> Pde {
        let inner = self.0.borrow();
        inner
            .envs
            .get(id)
            .map_or(Pde::EMPTY, |env| env.space.pde(pdx))
    }

    pub(crate) fn pte(&self, id: EnvId, vpn: usize) -> Pte {
        let inner = self.0.borrow();
        inner
            .envs
            .get(id)
            .map_or(Pte::EMPTY, |env| env.space.pte(vpn))
    }

    /// Load `buf.len()` bytes at `va` with user privilege.
    pub(crate) fn user_read(&self, id: EnvId, va: Va, buf: &mut [u8]) -> Result<(), Access> {
        let inner = self.0.borrow();
        inner.check(id, va, buf.len(), false)?;
        let env = inner.envs.get(id).ok_or(Access::Gone)?;
        for (i, b) in buf.iter_mut().enumerate() {
            let va = va + i;
            let (page, _) = env.space.lookup(va).ok_or(Access::Gone)?;
            *b = page.with(|data| data[va.offset()]);
        }
        Ok(())
    }

    /// Store `bytes` at `va` with user privilege.
    ///
    /// Nothing is written unless the whole range is writable.
    pub(crate) fn user_write(&self, id: EnvId, va: Va, bytes: &[u8]) -> Result<(), Access> {
        let inner = self.0.borrow();
        inner.check(id, va, bytes.len(), true)?;
        let env = inner.envs.get(id).ok_or(Access::Gone)?;
        for (i, &b) in bytes.iter().enumerate() {
            let va = va + i;
            let (page, _) = env.space.lookup(va).ok_or(Access::Gone)?;
            page.with_mut(|data| data[va.offset()] = b);
        }
        Ok(())
    }

    /// Switch `id` onto its exception stack for the fault `utf`.
    ///
    /// Pushes the trap frame at the top of the exception stack.
    ///
    /// # Returns
    /// The upcall to enter.
    pub(crate) fn prepare_upcall(&self, id: EnvId, utf: &UTrapframe) -> Result<UpcallEntry, EnvKilled> {
        let inner = self.0.borrow();
        let env = inner
            .envs
            .get(id)
            .filter(|env| env.status == EnvStatus::Runnable)
            .ok_or(EnvKilled::NotRunnable)?;
        let entry = env.upcall.ok_or(EnvKilled::NoUpcall)?;
        let (page, flags) = env
            .space
            .lookup(UXSTACK)
            .ok_or(EnvKilled::BadExceptionStack)?;
        if !flags.contains(PteFlags::P | PteFlags::U | PteFlags::W) {
            return Err(EnvKilled::BadExceptionStack);
        }
        let words = [
            utf.fault_va.into_usize() as u32,
            utf.err.bits(),
            utf.regs.edi,
            utf.regs.esi,
            utf.regs.ebp,
            utf.regs.oesp,
            utf.regs.ebx,
            utf.regs.edx,
            utf.regs.ecx,
            utf.regs.eax,
            utf.eip,
            utf.eflags,
            utf.esp,
        ];
        let base = (UXSTACKTOP - words.len() * 4) - UXSTACK;
        page.with_mut(|data| {
            for (i, word) in words.iter().enumerate() {
                data[base + i * 4..base + i * 4 + 4].copy_from_slice(&word.to_le_bytes());
            }
        });
        Ok(entry)
    }
}

fn user_page(raw: usize) -> Result<Va, KernelError> {
    match Va::new(raw) {
        Some(va) if va < UTOP && va.is_page_aligned() => Ok(va),
        _ => Err(KernelError::InvalidArgument),
    }
}

fn user_perm(raw: usize) -> Result<PteFlags, KernelError> {
    let perm = u32::try_from(raw)
        .ok()
        .and_then(PteFlags::from_bits)
        .ok_or(KernelError::InvalidArgument)?;
    if !perm.contains(PteFlags::P | PteFlags::U) || !PteFlags::SYSCALL.contains(perm) {
        return Err(KernelError::InvalidArgument);
    }
    Ok(perm)
}

impl Inner {
    fn check(&self, id: EnvId, va: Va, len: usize, write: bool) -> Result<(), Access> {
        let env = self
            .envs
            .get(id)
            .filter(|env| env.status == EnvStatus::Runnable)
            .ok_or(Access::Gone)?;
        let mut need = PteFlags::P | PteFlags::U;
        let mut err = PFErrorCode::USER;
        if write {
            need |= PteFlags::W;
            err |= PFErrorCode::WRITE_ACCESS;
        }
        let mut cur = va.page_down();
        while cur.into_usize() < va.into_usize() + len {
            match env.space.lookup(cur) {
                None => return Err(Access::Fault(err)),
                Some((_, flags)) if !flags.contains(need) => {
                    return Err(Access::Fault(err | PFErrorCode::PRESENT));
                }
                Some(_) => cur = cur + PAGE_SIZE,
            }
        }
        Ok(())
    }

    fn injected(&mut self, sysno: SyscallNumber) -> Option<KernelError> {
        let count = self.calls.entry(sysno as usize).or_insert(0);
        *count += 1;
        let count = *count;
        self.failures
            .iter()
            .find(|f| f.sysno == sysno && f.nth == count)
            .map(|f| f.error)
    }

    fn syscall(&mut self, caller: EnvId, abi: SyscallAbi) -> Result<usize, KernelError> {
        let sysno = SyscallNumber::try_from(abi.sysno).map_err(|_| KernelError::NoSuchSyscall)?;
        let env = self
            .envs
            .get_mut(caller)
            .filter(|env| env.status == EnvStatus::Runnable)
            .ok_or(KernelError::BadEnv)?;
        if sysno == SyscallNumber::Exofork && env.exofork_pending {
            env.exofork_pending = false;
            return Ok(0);
        }
        if let Some(e) = self.injected(sysno) {
            return Err(e);
        }
        match sysno {
            SyscallNumber::Cputs => self.cputs(caller, abi.arg1, abi.arg2),
            SyscallNumber::Cgetc => Ok(0),
            SyscallNumber::Getenvid => Ok(caller.into_usize()),
            SyscallNumber::EnvDestroy => self.env_destroy(caller, EnvId::from_usize(abi.arg1)),
            SyscallNumber::PageAlloc => {
                self.page_alloc(caller, EnvId::from_usize(abi.arg1), abi.arg2, abi.arg3)
            }
            SyscallNumber::PageMap => self.page_map(
                caller,
                EnvId::from_usize(abi.arg1),
                abi.arg2,
                EnvId::from_usize(abi.arg3),
                abi.arg4,
                abi.arg5,
            ),
            SyscallNumber::PageUnmap => {
                self.page_unmap(caller, EnvId::from_usize(abi.arg1), abi.arg2)
            }
            SyscallNumber::Exofork => self.exofork(caller),
            SyscallNumber::EnvSetStatus => {
                self.env_set_status(caller, EnvId::from_usize(abi.arg1), abi.arg2)
            }
            SyscallNumber::EnvSetPgfaultUpcall => {
                self.env_set_pgfault_upcall(caller, EnvId::from_usize(abi.arg1), abi.arg2)
            }
            SyscallNumber::Yield => Ok(0),
        }
    }

    fn cputs(&mut self, caller: EnvId, va: usize, len: usize) -> Result<usize, KernelError> {
        let va = Va::new(va).ok_or(KernelError::BadAddress)?;
        self.check(caller, va, len, false)
            .map_err(|_| KernelError::BadAddress)?;
        let env = self.envs.get(caller).ok_or(KernelError::BadEnv)?;
        let bytes = (0..len)
            .map(|i| {
                let va = va + i;
                env.space
                    .lookup(va)
                    .map_or(0, |(page, _)| page.with(|data| data[va.offset()]))
            })
            .collect::<Vec<u8>>();
        let s = String::from_utf8_lossy(&bytes);
        abyss::print!("{s}");
        self.console.push_str(&s);
        Ok(0)
    }

    fn env_destroy(&mut self, caller: EnvId, id: EnvId) -> Result<usize, KernelError> {
        let id = self.envs.envid2env(caller, id, true)?;
        if id == caller {
            info!("[{}] exiting gracefully", caller);
        } else {
            info!("[{}] destroying {}", caller, id);
        }
        let env = self.envs.remove(id);
        info!("[{}] free env {}", caller, id);
        drop(env);
        Ok(0)
    }

    fn page_alloc(&mut self, caller: EnvId, id: EnvId, va: usize, perm: usize) -> Result<usize, KernelError> {
        let id = self.envs.envid2env(caller, id, true)?;
        let va = user_page(va)?;
        let perm = user_perm(perm)?;
        let page = self.pool.alloc().ok_or(KernelError::NoMemory)?;
        let env = self.envs.get_mut(id).ok_or(KernelError::BadEnv)?;
        env.space.insert(&self.pool, va, page, perm)?;
        Ok(0)
    }

    fn page_map(
        &mut self,
        caller: EnvId,
        src: EnvId,
        src_va: usize,
        dst: EnvId,
        dst_va: usize,
        perm: usize,
    ) -> Result<usize, KernelError> {
        let src = self.envs.envid2env(caller, src, true)?;
        let dst = self.envs.envid2env(caller, dst, true)?;
        let src_va = user_page(src_va)?;
        let dst_va = user_page(dst_va)?;
        let perm = user_perm(perm)?;
        let (page, flags) = self
            .envs
            .get(src)
            .ok_or(KernelError::BadEnv)?
            .space
            .lookup(src_va)
            .ok_or(KernelError::InvalidArgument)?;
        if perm.contains(PteFlags::W) && !flags.contains(PteFlags::W) {
            return Err(KernelError::InvalidArgument);
        }
        let page = page.clone();
        let env = self.envs.get_mut(dst).ok_or(KernelError::BadEnv)?;
        env.space.insert(&self.pool, dst_va, page, perm)?;
        Ok(0)
    }

    fn page_unmap(&mut self, caller: EnvId, id: EnvId, va: usize) -> Result<usize, KernelError> {
        let id = self.envs.envid2env(caller, id, true)?;
        let va = user_page(va)?;
        let env = self.envs.get_mut(id).ok_or(KernelError::BadEnv)?;
        env.space.remove(va);
        Ok(0)
    }

    fn exofork(&mut self, caller: EnvId) -> Result<usize, KernelError> {
        let space = AddressSpace::new(&self.pool)?;
        let id = self.envs.alloc(caller, EnvStatus::NotRunnable, space)?;
        if let Some(env) = self.envs.get_mut(id) {
            env.exofork_pending = true;
        }
        info!("[{}] new env {}", caller, id);
        Ok(id.into_usize())
    }

    fn env_set_status(&mut self, caller: EnvId, id: EnvId, status: usize) -> Result<usize, KernelError> {
        let status = u32::try_from(status)
            .ok()
            .and_then(|s| EnvStatus::try_from(s).ok())
            .filter(|s| matches!(s, EnvStatus::Runnable | EnvStatus::NotRunnable))
            .ok_or(KernelError::InvalidArgument)?;
        let id = self.envs.envid2env(caller, id, true)?;
        let env = self.envs.get_mut(id).ok_or(KernelError::BadEnv)?;
        env.status = status;
        Ok(0)
    }

    fn env_set_pgfault_upcall(&mut self, caller: EnvId, id: EnvId, entry: usize) -> Result<usize, KernelError> {
        let id = self.envs.envid2env(caller, id, true)?;
        let env = self.envs.get_mut(id).ok_or(KernelError::BadEnv)?;
        env.upcall = Some(UpcallEntry(entry));
        Ok(0)
    }
}

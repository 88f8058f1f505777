//! Bare-metal backend.
//!
//! System calls trap through `int 0x30`, the page table mirror is read
//! straight out of [`UVPD`] and [`UVPT`], and user memory is ordinary
//! memory. The page fault upcall trampoline lives here as well.

use crate::{
    process::Process,
    syscall::{Kernel, Syscall, UpcallEntry},
    vpt::{UserMemory, Vpt},
};
use abyss::{
    KernelError,
    addressing::Va,
    memlayout::{UVPD, UVPT},
    mmu::{Pde, Pte},
    syscall::{EnvId, SyscallAbi},
    trap::UTrapframe,
};
use core::sync::atomic::{AtomicPtr, Ordering};

/// The kernel, reached through the trap gate.
#[derive(Clone, Copy, Debug, Default)]
pub struct Native;

impl Syscall for Native {
    fn syscall(&self, abi: SyscallAbi) -> isize {
        let args = [abi.arg1, abi.arg2, abi.arg3, abi.arg4, abi.arg5];
        let ret: isize;
        // ebx and esi cannot be named as operands, so they are loaded from
        // the argument array inside the block.
        unsafe {
            core::arch::asm!(
                "push ebx",
                "push esi",
                "mov ebx, [edi + 8]",
                "mov esi, [edi + 16]",
                "mov edi, [edi + 12]",
                "int 0x30",
                "pop esi",
                "pop ebx",
                inlateout("eax") abi.sysno as isize => ret,
                in("edx") args[0],
                in("ecx") args[1],
                inout("edi") args.as_ptr() => _,
            );
        }
        ret
    }

    fn upcall_entry(&self) -> UpcallEntry {
        unsafe extern "C" {
            fn _pgfault_upcall();
        }
        UpcallEntry(_pgfault_upcall as usize)
    }
}

impl Vpt for Native {
    fn uvpd(&self, pdx: usize) -> Pde {
        let p = (UVPD.into_usize() as *const u32).wrapping_add(pdx);
        Pde(unsafe { p.read_volatile() })
    }

    fn uvpt(&self, vpn: usize) -> Pte {
        let p = (UVPT.into_usize() as *const u32).wrapping_add(vpn);
        Pte(unsafe { p.read_volatile() })
    }
}

impl UserMemory for Native {
    fn memmove(&self, dst: Va, src: Va, len: usize) -> Result<(), KernelError> {
        unsafe {
            core::ptr::copy(
                src.into_usize() as *const u8,
                dst.into_usize() as *mut u8,
                len,
            );
        }
        Ok(())
    }

    fn read(&self, va: Va, buf: &mut [u8]) -> Result<(), KernelError> {
        unsafe {
            core::ptr::copy_nonoverlapping(va.into_usize() as *const u8, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }
}

static PROCESS: AtomicPtr<Process<Native>> = AtomicPtr::new(core::ptr::null_mut());

/// Make `process` the target of the page fault upcall and route console
/// output through `SYS_cputs`.
///
/// A fault can arrive while `process` is mutably borrowed, for instance on
/// a write to a copy-on-write stack page in the middle of
/// [`Process::fork`]. The upcall therefore only reads `process` through a
/// shared reference and runs the handler on its own copy. Fault handling
/// state is only written by [`Process::set_pgfault_handler`] after all of
/// its system calls have returned.
pub fn register(process: &'static mut Process<Native>) {
    abyss::kprint::set_sink(console);
    PROCESS.store(process, Ordering::SeqCst);
}

#[unsafe(no_mangle)]
extern "C" fn ulib_native_upcall(utf: *const UTrapframe) {
    let process = PROCESS.load(Ordering::SeqCst);
    // Safety: `process` came from a `&'static mut` and is only read here.
    let outcome = match unsafe { (process.as_ref(), utf.as_ref()) } {
        (Some(process), Some(utf)) => process.clone().upcall(utf).map_err(|e| (utf.eip, e)),
        _ => Err((0, crate::pgfault::FaultError::NoHandler)),
    };
    if let Err((eip, e)) = outcome {
        warning!("[{}] user fault at eip {:08x}: {}", Native.sys_getenvid(), eip, e);
        let _ = Native.sys_env_destroy(EnvId::CURRENT);
        loop {
            Native.sys_yield();
        }
    }
}

// Entered by the kernel on the exception stack with the `UTrapframe` on top.
// Calls the handler, then returns to the faulting instruction by pushing the
// trap-time eip onto the trap-time stack and restoring everything else.
core::arch::global_asm!(
    ".globl _pgfault_upcall",
    "_pgfault_upcall:",
    "pushl %esp",
    "call ulib_native_upcall",
    "addl $4, %esp",
    "movl 0x28(%esp), %ebx",
    "subl $4, 0x30(%esp)",
    "movl 0x30(%esp), %eax",
    "movl %ebx, (%eax)",
    "addl $8, %esp",
    "popal",
    "addl $4, %esp",
    "popfl",
    "popl %esp",
    "ret",
    options(att_syntax)
);

struct Console {
    buf: [u8; 128],
    len: usize,
}

impl Console {
    fn flush(&mut self) {
        if self.len > 0 {
            let va = Va::new(self.buf.as_ptr() as usize).unwrap_or(Va::ZERO);
            let _ = Native.sys_cputs(va, self.len);
            self.len = 0;
        }
    }
}

impl core::fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for &b in s.as_bytes() {
            if self.len == self.buf.len() {
                self.flush();
            }
            self.buf[self.len] = b;
            self.len += 1;
        }
        Ok(())
    }
}

fn console(args: core::fmt::Arguments<'_>) {
    let mut console = Console {
        buf: [0; 128],
        len: 0,
    };
    let _ = core::fmt::Write::write_fmt(&mut console, args);
    console.flush();
}

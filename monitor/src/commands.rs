//! Monitor commands.

use crate::{COMMANDS, MonitorError, symbols::Symbolize};
use abyss::{
    addressing::{PAGE_SIZE, PTSIZE, Va},
    mmu::PteFlags,
};
use alloc::string::String;
use core::fmt::Write;
use ulib::{
    cow::PTE_COW,
    vpt::{UserMemory, Vpt},
};

/// Base of the kernel's virtual mapping of physical memory.
pub const KERNBASE: u32 = 0xf000_0000;

/// Deepest stack walked by [`backtrace`].
pub const MAX_FRAMES: usize = 64;

/// Print every command with its description.
pub fn help(out: &mut dyn Write) -> Result<(), MonitorError> {
    for command in COMMANDS.iter() {
        writeln!(out, "{} - {}", command.name, command.desc)?;
    }
    Ok(())
}

/// Print the addresses of the special kernel symbols and the size of the
/// kernel image.
pub fn kerninfo<S: Symbolize + ?Sized>(symbols: &S, out: &mut dyn Write) -> Result<(), MonitorError> {
    writeln!(out, "Special kernel symbols:")?;
    match symbols.address_of("_start") {
        Some(start) => writeln!(out, "  _start                  {start:08x} (phys)")?,
        None => writeln!(out, "  _start                  ???????? (phys)")?,
    }
    for name in ["entry", "etext", "edata", "end"] {
        match symbols.address_of(name) {
            Some(va) => writeln!(
                out,
                "  {name:<6} {va:08x} (virt)  {:08x} (phys)",
                va.wrapping_sub(KERNBASE)
            )?,
            None => writeln!(out, "  {name:<6} ???????? (virt)  ???????? (phys)")?,
        }
    }
    if let (Some(entry), Some(end)) = (symbols.address_of("entry"), symbols.address_of("end")) {
        let size = end.saturating_sub(entry) as usize;
        writeln!(
            out,
            "Kernel executable memory footprint: {}KB",
            size.div_ceil(1024)
        )?;
    }
    Ok(())
}

/// Walk the chain of saved frame pointers starting at `ebp`.
///
/// Each frame holds the caller's frame pointer at `[ebp]`, the return
/// address at `[ebp + 4]` and the first arguments above that. The walk stops
/// at a null frame pointer, a frame that cannot be read, or after
/// [`MAX_FRAMES`] frames.
pub fn backtrace<M, S>(mem: &M, symbols: &S, ebp: u32, out: &mut dyn Write) -> Result<(), MonitorError>
where
    M: UserMemory + ?Sized,
    S: Symbolize + ?Sized,
{
    writeln!(out, "Stack backtrace:")?;
    let mut ebp = ebp;
    for _ in 0..MAX_FRAMES {
        if ebp == 0 {
            return Ok(());
        }
        let mut raw = [0u8; 28];
        if mem.read(Va::from_u32(ebp), &mut raw).is_err() {
            writeln!(out, "ebp {ebp:08x} <unreadable>")?;
            return Ok(());
        }
        let mut words = [0u32; 7];
        for (word, bytes) in words.iter_mut().zip(raw.chunks_exact(4)) {
            *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        let eip = words[1];
        write!(out, "ebp {ebp:08x} eip {eip:08x} args")?;
        for arg in &words[2..] {
            write!(out, " {arg:08x}")?;
        }
        writeln!(out)?;
        if let Some(symbol) = symbols.resolve(eip) {
            writeln!(
                out,
                "     {}:{}: {}+{}",
                symbol.file.as_deref().unwrap_or("<unknown>"),
                symbol.line.unwrap_or(0),
                symbol.name,
                symbol.offset(eip)
            )?;
        }
        ebp = words[0];
    }
    writeln!(out, "... (stopped after {MAX_FRAMES} frames)")?;
    Ok(())
}

/// Render the permission bits of a mapping.
///
/// One character per bit, from the highest: `C` copy-on-write, `G` global,
/// `S` superpage, `D` dirty, `A` accessed, `N` cache disabled, `T`
/// write-through, `U` user, `W` writable, `P` present.
pub fn perm_string(flags: PteFlags) -> String {
    [
        (PTE_COW, 'C'),
        (PteFlags::G, 'G'),
        (PteFlags::PS, 'S'),
        (PteFlags::D, 'D'),
        (PteFlags::A, 'A'),
        (PteFlags::PCD, 'N'),
        (PteFlags::PWT, 'T'),
        (PteFlags::U, 'U'),
        (PteFlags::W, 'W'),
        (PteFlags::P, 'P'),
    ]
    .iter()
    .map(|&(flag, c)| if flags.contains(flag) { c } else { '-' })
    .collect()
}

/// Parse a hexadecimal address, with or without a `0x` prefix.
pub fn parse_hex(arg: &str) -> Result<u32, MonitorError> {
    let digits = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    u32::from_str_radix(digits, 16).map_err(|_| MonitorError::InvalidHex(String::from(arg)))
}

fn lookup<M: Vpt + ?Sized>(mem: &M, va: Va) -> Option<(u32, PteFlags)> {
    const PS_MASK: u32 = PTSIZE as u32 - 1;
    let pde = mem.uvpd(va.pdx());
    if pde.is_present() && pde.flags().contains(PteFlags::PS) {
        let base = pde.pa()?.into_usize() as u32 & !PS_MASK;
        return Some((base | (va.into_usize() as u32 & PS_MASK), pde.flags()));
    }
    let pte = mem.walk(va)?;
    Some((pte.pa()?.into_usize() as u32, pte.flags()))
}

/// `showmappings 0xBEGIN 0xEND`: print the mapping of every page in the
/// range.
///
/// Both bounds are rounded up to a page boundary and the end is inclusive.
pub fn showmappings<M: Vpt + ?Sized>(mem: &M, argv: &[&str], out: &mut dyn Write) -> Result<(), MonitorError> {
    let [_, begin, end] = argv else {
        return Err(MonitorError::Usage("showmappings 0xbegin_addr 0xend_addr"));
    };
    let begin = parse_hex(begin)?;
    let end = parse_hex(end)?;
    if begin > end {
        return Err(MonitorError::RangeInverted { begin, end });
    }

    let last = Va::from_u32(end)
        .page_up()
        .unwrap_or(Va::from_u32(u32::MAX).page_down());
    let Some(mut cur) = Va::from_u32(begin).page_up() else {
        return Ok(());
    };
    if cur > last {
        return Ok(());
    }
    loop {
        match lookup(mem, cur) {
            Some((pa, flags)) => writeln!(
                out,
                "virtual address [{cur}] - physical address [{:08x}], permission: {}",
                pa & !(PAGE_SIZE as u32 - 1),
                perm_string(flags)
            )?,
            None => writeln!(out, "virtual address [{cur}] - not mapped")?,
        }
        // The last page of the address space has no successor.
        match cur.checked_add(PAGE_SIZE) {
            Some(next) if cur < last => cur = next,
            _ => return Ok(()),
        }
    }
}

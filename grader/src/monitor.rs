use crate::{V, boot, map_page};
use abyss::{
    KernelError,
    addressing::{PAGE_SIZE, Va},
    memlayout::USTACKTOP,
    mmu::PteFlags,
};
use kern::{EnvHandle, cpu};
use monitor::{Monitor, MonitorError, symbols::SymbolTable, teletype::Teletype};
use std::collections::VecDeque;
use ulib::{Process, syscall::ForkResult};

const HELP: &str = "help - Display this list of commands
kerninfo - Display information about the kernel
backtrace - Display a stack backtrace
showmappings - Display mappings info
";

struct Script {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl Script {
    fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }
}

impl Teletype for Script {
    fn write(&mut self, data: &[u8]) -> Result<usize, KernelError> {
        self.output.extend_from_slice(data);
        Ok(data.len())
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize, KernelError> {
        let mut n = 0;
        while n < data.len() {
            match self.input.pop_front() {
                Some(b) => data[n] = b,
                None => break,
            }
            n += 1;
        }
        Ok(n)
    }
}

fn run(monitor: &Monitor<'_, EnvHandle, SymbolTable>, line: &str) -> Result<String, MonitorError> {
    let mut out = String::new();
    monitor.runcmd(line, &mut out)?;
    Ok(out)
}

fn push_frame(p: &mut Process<EnvHandle>, ebp: u32, words: [u32; 7]) {
    let bytes = words.iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<_>>();
    cpu::store(p, Va::from_u32(ebp), &bytes).unwrap();
}

fn kernel_symbols() -> SymbolTable {
    let mut symbols = SymbolTable::new();
    symbols.insert("_start", 0x0010_000c, 0);
    symbols.insert("entry", 0xf010_000c, 0);
    symbols.insert("test_backtrace", 0xf010_0040, 0x60);
    symbols.insert("i386_init", 0xf010_00a0, 0x60);
    symbols.insert("etext", 0xf010_1a75, 0);
    symbols.insert("edata", 0xf011_2300, 0);
    symbols.insert("end", 0xf011_2960, 0);
    symbols.insert_line(0xf010_0040, "kern/init.c", 13);
    symbols.insert_line(0xf010_00a0, "kern/init.c", 24);
    symbols
}

#[test]
fn help() {
    let (_machine, p) = boot();
    let symbols = SymbolTable::new();
    let monitor = Monitor::new(p.kernel(), &symbols);
    assert_eq!(run(&monitor, "help").unwrap(), HELP);
    assert_eq!(run(&monitor, "  help\textra  ").unwrap(), HELP);
    assert_eq!(run(&monitor, "").unwrap(), "");
    assert_eq!(run(&monitor, " \t ").unwrap(), "");
}

#[test]
fn kerninfo() {
    let (_machine, p) = boot();
    let symbols = kernel_symbols();
    let monitor = Monitor::new(p.kernel(), &symbols);
    assert_eq!(
        run(&monitor, "kerninfo").unwrap(),
        "Special kernel symbols:
  _start                  0010000c (phys)
  entry  f010000c (virt)  0010000c (phys)
  etext  f0101a75 (virt)  00101a75 (phys)
  edata  f0112300 (virt)  00112300 (phys)
  end    f0112960 (virt)  00112960 (phys)
Kernel executable memory footprint: 75KB
"
    );
}

#[test]
fn kerninfo_without_symbols() {
    let (_machine, p) = boot();
    let symbols = SymbolTable::new();
    let monitor = Monitor::new(p.kernel(), &symbols);
    assert_eq!(
        run(&monitor, "kerninfo").unwrap(),
        "Special kernel symbols:
  _start                  ???????? (phys)
  entry  ???????? (virt)  ???????? (phys)
  etext  ???????? (virt)  ???????? (phys)
  edata  ???????? (virt)  ???????? (phys)
  end    ???????? (virt)  ???????? (phys)
"
    );
}

#[test]
fn backtrace() {
    let (_machine, mut p) = boot();
    let rw = PteFlags::P | PteFlags::U | PteFlags::W;
    map_page(&mut p, USTACKTOP - PAGE_SIZE, rw, &[]);
    push_frame(&mut p, 0xeebf_df00, [0xeebf_df40, 0xf010_0068, 1, 2, 3, 4, 5]);
    push_frame(&mut p, 0xeebf_df40, [0, 0xf010_00d4, 0x10, 0x20, 0x30, 0x40, 0x50]);

    let symbols = kernel_symbols();
    let monitor = Monitor::new(p.kernel(), &symbols).at_frame(0xeebf_df00);
    assert_eq!(
        run(&monitor, "backtrace").unwrap(),
        "Stack backtrace:
ebp eebfdf00 eip f0100068 args 00000001 00000002 00000003 00000004 00000005
     kern/init.c:13: test_backtrace+40
ebp eebfdf40 eip f01000d4 args 00000010 00000020 00000030 00000040 00000050
     kern/init.c:24: i386_init+52
"
    );
}

#[test]
fn backtrace_unreadable() {
    let (_machine, p) = boot();
    let symbols = SymbolTable::new();
    let monitor = Monitor::new(p.kernel(), &symbols).at_frame(0x00c0_0000);
    assert_eq!(
        run(&monitor, "backtrace").unwrap(),
        "Stack backtrace:\nebp 00c00000 <unreadable>\n"
    );

    let monitor = Monitor::new(p.kernel(), &symbols);
    assert_eq!(run(&monitor, "backtrace").unwrap(), "Stack backtrace:\n");
}

#[test]
fn backtrace_loop() {
    let (_machine, mut p) = boot();
    let rw = PteFlags::P | PteFlags::U | PteFlags::W;
    map_page(&mut p, USTACKTOP - PAGE_SIZE, rw, &[]);
    push_frame(&mut p, 0xeebf_df00, [0xeebf_df00, 0, 0, 0, 0, 0, 0]);

    let symbols = SymbolTable::new();
    let monitor = Monitor::new(p.kernel(), &symbols).at_frame(0xeebf_df00);
    let out = run(&monitor, "backtrace").unwrap();
    let lines = out.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 1 + monitor::commands::MAX_FRAMES + 1);
    assert_eq!(lines.last(), Some(&"... (stopped after 64 frames)"));
}

#[test]
fn showmappings() {
    let (machine, mut p) = boot();
    let ro = PteFlags::P | PteFlags::U;
    map_page(&mut p, V, ro | PteFlags::W, &[]);
    map_page(&mut p, V + PAGE_SIZE, ro, &[]);
    let child = match p.fork() {
        Ok(ForkResult::Parent(child)) => child,
        r => panic!("fork returned {r:?}"),
    };
    let pa = |va| {
        machine
            .translate(child, va)
            .and_then(|pte| pte.pa())
            .map_or(0, |pa| pa.into_usize())
    };

    let symbols = SymbolTable::new();
    let handle = machine.handle(child);
    let monitor = Monitor::new(&handle, &symbols);
    assert_eq!(
        run(&monitor, "showmappings 0x800000 0x802000").unwrap(),
        format!(
            "virtual address [00800000] - physical address [{:08x}], permission: C------U-P
virtual address [00801000] - physical address [{:08x}], permission: -------U-P
virtual address [00802000] - not mapped
",
            pa(V),
            pa(V + PAGE_SIZE)
        )
    );
    assert_eq!(
        run(&monitor, "showmappings 0x800001 800fff").unwrap(),
        format!(
            "virtual address [00801000] - physical address [{:08x}], permission: -------U-P\n",
            pa(V + PAGE_SIZE)
        )
    );
}

#[test]
fn showmappings_errors() {
    let (_machine, p) = boot();
    let symbols = SymbolTable::new();
    let monitor = Monitor::new(p.kernel(), &symbols);

    let usage = run(&monitor, "showmappings 0x800000").unwrap_err();
    assert_eq!(usage, MonitorError::Usage("showmappings 0xbegin_addr 0xend_addr"));
    assert_eq!(usage.to_string(), "Usage:showmappings 0xbegin_addr 0xend_addr");
    assert_eq!(
        run(&monitor, "showmappings zz 0x1000"),
        Err(MonitorError::InvalidHex(String::from("zz")))
    );
    assert_eq!(
        run(&monitor, "showmappings 0x2000 0x1000"),
        Err(MonitorError::RangeInverted {
            begin: 0x2000,
            end: 0x1000
        })
    );
}

#[test]
fn command_errors() {
    let (_machine, p) = boot();
    let symbols = SymbolTable::new();
    let monitor = Monitor::new(p.kernel(), &symbols);

    let unknown = run(&monitor, "foo bar").unwrap_err();
    assert_eq!(unknown, MonitorError::UnknownCommand(String::from("foo")));
    assert_eq!(unknown.to_string(), "Unknown command 'foo'");

    let fifteen = ["help"; 15].join(" ");
    assert_eq!(run(&monitor, &fifteen).unwrap(), HELP);
    let sixteen = ["help"; 16].join(" ");
    assert_eq!(run(&monitor, &sixteen), Err(MonitorError::TooManyArgs));
}

#[test]
fn interactive() {
    let (_machine, p) = boot();
    let symbols = SymbolTable::new();
    let monitor = Monitor::new(p.kernel(), &symbols);
    let mut tty = Script::new(b"foo\nhelq\x7fp\n\x01\n");
    monitor.run(&mut tty).unwrap();

    let expected = format!(
        "Welcome to the kernel monitor!
Type 'help' for a list of commands.
K> foo
Unknown command 'foo'
K> helq\x08 \x08p
{HELP}K> 
K> "
    );
    assert_eq!(String::from_utf8(tty.output).unwrap(), expected);
}

//! # Kernel monitor
//!
//! A small command interpreter for poking at a running environment. It
//! reads the same page table mirror and memory the fork library relies on
//! and never changes either.
//!
//! | Command        | Description                                   |
//! |----------------|-----------------------------------------------|
//! | `help`         | Display this list of commands                 |
//! | `kerninfo`     | Display information about the kernel          |
//! | `backtrace`    | Display a stack backtrace                     |
//! | `showmappings` | Display mappings of a virtual address range   |
//!
//! Input errors, such as a malformed address, are reported to the caller as
//! a [`MonitorError`] and leave the monitor ready for the next command.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

extern crate alloc;

pub mod commands;
pub mod symbols;
pub mod teletype;

use abyss::KernelError;
use alloc::string::String;
use arrayvec::ArrayVec;
use core::fmt::Write;
use symbols::Symbolize;
use teletype::{Teletype, TtyWriter, readline};
use ulib::vpt::{UserMemory, Vpt};

/// Characters separating arguments.
pub const WHITESPACE: &[char] = &['\t', '\r', '\n', ' '];

/// Maximum number of arguments, command name included.
pub const MAXARGS: usize = 16;

/// A command the monitor knows.
pub struct Command {
    /// Name typed to run the command.
    pub name: &'static str,
    /// One line description.
    pub desc: &'static str,
}

/// Every command, in the order `help` lists them.
pub const COMMANDS: [Command; 4] = [
    Command {
        name: "help",
        desc: "Display this list of commands",
    },
    Command {
        name: "kerninfo",
        desc: "Display information about the kernel",
    },
    Command {
        name: "backtrace",
        desc: "Display a stack backtrace",
    },
    Command {
        name: "showmappings",
        desc: "Display mappings info",
    },
];

/// A recoverable error in a monitor command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorError {
    /// Wrong number of arguments; carries the usage line.
    Usage(&'static str),
    /// An argument is not a hexadecimal number.
    InvalidHex(String),
    /// The end of a range lies before its beginning.
    RangeInverted {
        /// Beginning of the range.
        begin: u32,
        /// End of the range.
        end: u32,
    },
    /// No command has this name.
    UnknownCommand(String),
    /// The line has more than [`MAXARGS`] arguments.
    TooManyArgs,
    /// The output device failed.
    Output,
}

impl From<core::fmt::Error> for MonitorError {
    fn from(_: core::fmt::Error) -> Self {
        MonitorError::Output
    }
}

impl core::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MonitorError::Usage(usage) => write!(f, "Usage:{usage}"),
            MonitorError::InvalidHex(arg) => {
                write!(f, "Invalid address '{arg}', expected a hexadecimal number")
            }
            MonitorError::RangeInverted { begin, end } => {
                write!(f, "end_addr {end:08x} must not be below begin_addr {begin:08x}")
            }
            MonitorError::UnknownCommand(name) => write!(f, "Unknown command '{name}'"),
            MonitorError::TooManyArgs => write!(f, "Too many arguments (max {MAXARGS})"),
            MonitorError::Output => write!(f, "Output error"),
        }
    }
}

/// The monitor.
///
/// Reads memory and mappings through `mem`, resolves code addresses through
/// `symbols`, and starts stack walks at the frame pointer set with
/// [`Monitor::at_frame`].
pub struct Monitor<'a, M: ?Sized, S: ?Sized> {
    mem: &'a M,
    symbols: &'a S,
    ebp: u32,
}

impl<'a, M, S> Monitor<'a, M, S>
where
    M: Vpt + UserMemory + ?Sized,
    S: Symbolize + ?Sized,
{
    /// A monitor over `mem` with `symbols`.
    pub fn new(mem: &'a M, symbols: &'a S) -> Self {
        Self {
            mem,
            symbols,
            ebp: 0,
        }
    }

    /// Start backtraces at frame pointer `ebp`.
    pub fn at_frame(self, ebp: u32) -> Self {
        Self { ebp, ..self }
    }

    /// Parse and run one command line, writing its output to `out`.
    ///
    /// An empty line does nothing.
    pub fn runcmd(&self, line: &str, out: &mut dyn Write) -> Result<(), MonitorError> {
        let mut argv = ArrayVec::<&str, { MAXARGS - 1 }>::new();
        for arg in line.split(WHITESPACE).filter(|arg| !arg.is_empty()) {
            argv.try_push(arg).map_err(|_| MonitorError::TooManyArgs)?;
        }
        let Some(&name) = argv.first() else {
            return Ok(());
        };
        match name {
            "help" => commands::help(out),
            "kerninfo" => commands::kerninfo(self.symbols, out),
            "backtrace" => commands::backtrace(self.mem, self.symbols, self.ebp, out),
            "showmappings" => commands::showmappings(self.mem, &argv, out),
            _ => Err(MonitorError::UnknownCommand(String::from(name))),
        }
    }

    /// Run the interactive loop on `tty` until its input ends.
    pub fn run<T: Teletype + ?Sized>(&self, tty: &mut T) -> Result<(), KernelError> {
        let _ = write!(
            TtyWriter(&mut *tty),
            "Welcome to the kernel monitor!\nType 'help' for a list of commands.\n"
        );
        while let Some(line) = readline(tty, "K> ")? {
            let mut out = TtyWriter(&mut *tty);
            if let Err(e) = self.runcmd(&line, &mut out) {
                let _ = writeln!(out, "{e}");
            }
        }
        Ok(())
    }
}

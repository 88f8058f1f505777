//! Console print utilities.
//!
//! Output is routed through a single sink function registered with
//! [`set_sink`]. User environments install a sink that issues `SYS_cputs`,
//! while the host kernel model writes to its own console. Until a sink is
//! registered, output is discarded.

use core::sync::atomic::{AtomicUsize, Ordering};

/// A console sink.
pub type Sink = fn(core::fmt::Arguments<'_>);

// Holds a `Sink` cast to an address; zero means no sink.
static SINK: AtomicUsize = AtomicUsize::new(0);

/// Register the console sink.
///
/// The last registration wins.
pub fn set_sink(sink: Sink) {
    SINK.store(sink as usize, Ordering::SeqCst);
}

#[doc(hidden)]
pub fn _print(fmt: core::fmt::Arguments<'_>) {
    let raw = SINK.load(Ordering::SeqCst);
    if raw != 0 {
        // Safety: only values produced from a `Sink` in `set_sink` are stored.
        let sink = unsafe { core::mem::transmute::<usize, Sink>(raw) };
        sink(fmt);
    }
}

/// Prints out the message.
///
/// Use the format! syntax to write data to the console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kprint::_print(format_args!($($arg)*)));
}

/// Prints out the message with a newline.
///
/// Use the format! syntax to write data to the console.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Display an information message.
///
/// Use the format! syntax to write data to the console.
#[macro_export]
macro_rules! info {
    () => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[INFO]\n") });
    ($($arg:tt)*) => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[INFO] {}\n", format_args!($($arg)*)) });
}

/// Display a warning message.
///
/// Use the format! syntax to write data to the console.
#[macro_export]
macro_rules! warning {
    () => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[WARN]\n") });
    ($($arg:tt)*) => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[WARN] {}\n", format_args!($($arg)*)) });
}

/// Display a debug message.
///
/// Use the format! syntax to write data to the console.
#[macro_export]
macro_rules! debug {
    () => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[DEBUG]\n") });
    ($($arg:tt)*) => (if !$crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) { $crate::print!("[DEBUG] {}\n", format_args!($($arg)*))} );
}

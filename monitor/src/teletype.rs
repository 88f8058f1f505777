//! A teletype (TTY) interface for character-based I/O.

use abyss::KernelError;
use alloc::string::String;

/// Maximum length of a line read by [`readline`].
pub const BUFLEN: usize = 1024;

/// The `Teletype` trait represents a generic character-based input/output
/// device.
pub trait Teletype {
    /// Writes data to the teletype.
    ///
    /// # Arguments
    /// - `data`: A byte slice containing the data to be written.
    ///
    /// # Returns
    /// - `Ok(usize)`: The number of bytes successfully written.
    /// - `Err(KernelError)`: If the write operation failed.
    fn write(&mut self, data: &[u8]) -> Result<usize, KernelError>;

    /// Reads data from the teletype.
    ///
    /// # Arguments
    /// - `data`: A mutable byte slice where the read data will be stored.
    ///
    /// # Returns
    /// - `Ok(usize)`: The number of bytes successfully read; `0` at the end
    ///   of input.
    /// - `Err(KernelError)`: If the read operation failed.
    fn read(&mut self, data: &mut [u8]) -> Result<usize, KernelError>;
}

/// Adapts a [`Teletype`] to [`core::fmt::Write`].
pub struct TtyWriter<'a, T: Teletype + ?Sized>(pub &'a mut T);

impl<T: Teletype + ?Sized> core::fmt::Write for TtyWriter<'_, T> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let mut data = s.as_bytes();
        while !data.is_empty() {
            match self.0.write(data) {
                Ok(0) | Err(_) => return Err(core::fmt::Error),
                Ok(n) => data = &data[n..],
            }
        }
        Ok(())
    }
}

/// Print `prompt` and read one line, echoing as it is typed.
///
/// Backspace (`0x08` or `0x7f`) erases the previous character. Characters
/// beyond [`BUFLEN`] are dropped.
///
/// # Returns
/// - `Ok(Some(line))` without the line terminator.
/// - `Ok(None)` at the end of input with nothing typed.
pub fn readline<T: Teletype + ?Sized>(tty: &mut T, prompt: &str) -> Result<Option<String>, KernelError> {
    tty.write(prompt.as_bytes())?;
    let mut line = String::new();
    let mut c = [0u8];
    loop {
        if tty.read(&mut c)? == 0 {
            return Ok(if line.is_empty() { None } else { Some(line) });
        }
        match c[0] {
            0x08 | 0x7f => {
                if line.pop().is_some() {
                    tty.write(b"\x08 \x08")?;
                }
            }
            b'\n' | b'\r' => {
                tty.write(b"\n")?;
                return Ok(Some(line));
            }
            ch if (b' '..0x7f).contains(&ch) && line.len() < BUFLEN - 1 => {
                tty.write(&c)?;
                line.push(ch as char);
            }
            _ => {}
        }
    }
}

//! # Stack-trace formatting
//!
//! Two line layouts, both consumed by existing crash-ingestion tooling and so
//! fixed byte for byte:
//!
//! ```text
//! 0x00005555555551a9 my_crate::foo [src/main.rs:12]
//! /usr/bin/app!my_crate::foo + some bytes [src/main.rs:12]\r\n
//! ```
//!
//! The first is for humans. The function falls back to `UnknownFunction` when
//! debug info was consulted and to the raw address when it was not; the
//! bracket is left out entirely when no file is known. The second is for
//! machines: every field is always present, substituted by `Unknown`,
//! `UnknownFunction` or line `0`, and the terminator is `\r\n` on every host.
//!
//! ## Fixed buffers
//!
//! [`FrameBuffer`] and [`StackTraceBuffer`] are stack-allocated writers for the
//! crash path, where growing a `String` is not an option.

use std::fmt;

use crate::types::Address;

/// Placeholder for an unknown module or source file.
pub const UNKNOWN: &str = "Unknown";
/// Placeholder for an unknown function.
pub const UNKNOWN_FUNCTION: &str = "UnknownFunction";

/// One human-readable frame line, borrowing every field.
#[derive(Clone, Copy)]
pub struct FrameLine<'a>
{
    pub address: Address,
    pub function: Option<&'a dyn fmt::Display>,
    pub file: Option<&'a dyn fmt::Display>,
    pub line: Option<u32>,
    /// Whether debug info was consulted for this frame.
    pub debug_info: bool,
}

impl fmt::Display for FrameLine<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} ", self.address)?;
        match self.function {
            Some(function) => write!(f, "{function}")?,
            None if self.debug_info => f.write_str(UNKNOWN_FUNCTION)?,
            None => write!(f, "{}", self.address)?,
        }
        if let Some(file) = self.file {
            write!(f, " [{file}:{}]", self.line.unwrap_or(0))?;
        }
        Ok(())
    }
}

/// One machine-oriented frame line, including its `\r\n` terminator.
#[derive(Clone, Copy)]
pub struct MachineLine<'a>
{
    pub module: Option<&'a dyn fmt::Display>,
    pub function: Option<&'a dyn fmt::Display>,
    pub file: Option<&'a dyn fmt::Display>,
    pub line: Option<u32>,
}

impl fmt::Display for MachineLine<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let module: &dyn fmt::Display = self.module.unwrap_or(&UNKNOWN);
        let function: &dyn fmt::Display = self.function.unwrap_or(&UNKNOWN_FUNCTION);
        let file: &dyn fmt::Display = self.file.unwrap_or(&UNKNOWN);
        write!(
            f,
            "{module}!{function} + some bytes [{file}:{}]\r\n",
            self.line.unwrap_or(0)
        )
    }
}

/// Fixed-capacity UTF-8 text buffer implementing [`fmt::Write`].
///
/// Writes past the capacity are cut at a character boundary and dropped; the
/// buffer remembers that it overflowed. Lives entirely inline, so it can be
/// placed on the stack of a signal handler.
///
/// ## Example
///
/// ```rust
/// use std::fmt::Write;
///
/// use crashsym_core::FrameBuffer;
///
/// let mut out = FrameBuffer::<8>::new();
/// write!(out, "0x{:016x}", 0x1000_u64)?;
/// assert_eq!(out.as_str(), "0x000000");
/// assert!(out.overflowed());
/// # Ok::<(), std::fmt::Error>(())
/// ```
pub struct FrameBuffer<const N: usize>
{
    bytes: [u8; N],
    len: usize,
    overflowed: bool,
}

impl<const N: usize> FrameBuffer<N>
{
    pub const fn new() -> Self
    {
        Self {
            bytes: [0; N],
            len: 0,
            overflowed: false,
        }
    }

    pub fn as_str(&self) -> &str
    {
        // Only whole characters are ever copied in.
        std::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    pub fn len(&self) -> usize
    {
        self.len
    }

    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize
    {
        N
    }

    /// Whether any write was cut short.
    pub fn overflowed(&self) -> bool
    {
        self.overflowed
    }

    pub fn clear(&mut self)
    {
        self.len = 0;
        self.overflowed = false;
    }

    fn truncate(&mut self, len: usize)
    {
        self.len = self.len.min(len);
    }
}

impl<const N: usize> Default for FrameBuffer<N>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for FrameBuffer<N>
{
    fn write_str(&mut self, s: &str) -> fmt::Result
    {
        let room = N - self.len;
        let take = if s.len() <= room {
            s.len()
        } else {
            self.overflowed = true;
            let mut cut = room;
            while !s.is_char_boundary(cut) {
                cut -= 1;
            }
            cut
        };
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

impl<const N: usize> fmt::Display for FrameBuffer<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> fmt::Debug for FrameBuffer<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("FrameBuffer")
            .field("text", &self.as_str())
            .field("capacity", &N)
            .finish()
    }
}

/// Bounded text buffer collecting whole stack-trace lines.
///
/// A line that does not fit is dropped entirely and the buffer stops accepting
/// further lines, so the contents always end on a line terminator.
///
/// ## Example
///
/// ```rust
/// use crashsym_core::StackTraceBuffer;
///
/// let mut trace = StackTraceBuffer::<16>::new();
/// assert!(trace.push_line("frame one\r\n"));
/// assert!(!trace.push_line("frame two\r\n"));
/// assert!(trace.is_full());
/// assert_eq!(trace.as_str(), "frame one\r\n");
/// ```
#[derive(Debug, Default)]
pub struct StackTraceBuffer<const N: usize>
{
    text: FrameBuffer<N>,
    full: bool,
}

impl<const N: usize> StackTraceBuffer<N>
{
    pub const fn new() -> Self
    {
        Self {
            text: FrameBuffer::new(),
            full: false,
        }
    }

    /// Append one formatted line.
    ///
    /// ## Returns
    ///
    /// `false` when the line was not appended: either the buffer is full, or
    /// formatting the line failed part-way. Nothing of a rejected line is kept.
    pub fn push_line(&mut self, line: impl fmt::Display) -> bool
    {
        if self.full {
            return false;
        }
        let start = self.text.len();
        let written = fmt::Write::write_fmt(&mut self.text, format_args!("{line}"));
        if self.text.overflowed() {
            self.text.truncate(start);
            self.full = true;
            return false;
        }
        if written.is_err() {
            self.text.truncate(start);
            return false;
        }
        true
    }

    pub fn as_str(&self) -> &str
    {
        self.text.as_str()
    }

    pub fn is_full(&self) -> bool
    {
        self.full
    }

    pub fn clear(&mut self)
    {
        self.text.clear();
        self.full = false;
    }
}

impl<const N: usize> fmt::Display for StackTraceBuffer<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests
{
    use std::fmt::Write;

    use super::*;

    #[test]
    fn test_frame_line_fully_resolved()
    {
        let line = FrameLine {
            address: Address::new(0x5555_5555_51a9),
            function: Some(&"app::foo"),
            file: Some(&"src/main.rs"),
            line: Some(12),
            debug_info: true,
        };
        assert_eq!(line.to_string(), "0x00005555555551a9 app::foo [src/main.rs:12]");
    }

    #[test]
    fn test_frame_line_unknowns()
    {
        let mut line = FrameLine {
            address: Address::new(0x10),
            function: None,
            file: None,
            line: None,
            debug_info: true,
        };
        assert_eq!(line.to_string(), "0x0000000000000010 UnknownFunction");

        line.debug_info = false;
        assert_eq!(line.to_string(), "0x0000000000000010 0x0000000000000010");

        line.file = Some(&"lib.rs");
        assert_eq!(line.to_string(), "0x0000000000000010 0x0000000000000010 [lib.rs:0]");
    }

    #[test]
    fn test_machine_line_sentinels()
    {
        let empty = MachineLine {
            module: None,
            function: None,
            file: None,
            line: None,
        };
        assert_eq!(empty.to_string(), "Unknown!UnknownFunction + some bytes [Unknown:0]\r\n");

        let full = MachineLine {
            module: Some(&"/usr/bin/app"),
            function: Some(&"app::foo"),
            file: Some(&"src/main.rs"),
            line: Some(3),
        };
        assert_eq!(full.to_string(), "/usr/bin/app!app::foo + some bytes [src/main.rs:3]\r\n");
    }

    #[test]
    fn test_frame_buffer_truncates_on_char_boundary()
    {
        let mut buffer = FrameBuffer::<5>::new();
        write!(buffer, "ab").unwrap();
        assert!(!buffer.overflowed());
        write!(buffer, "cdé").unwrap();
        // "é" is two bytes and only one is left after "abcd".
        assert_eq!(buffer.as_str(), "abcd");
        assert!(buffer.overflowed());

        buffer.clear();
        assert!(buffer.is_empty());
        write!(buffer, "{}", 12345).unwrap();
        assert_eq!(buffer.as_str(), "12345");
        assert_eq!(buffer.capacity(), 5);
    }

    #[test]
    fn test_stack_buffer_keeps_whole_lines()
    {
        let mut buffer = StackTraceBuffer::<16>::new();
        assert!(buffer.push_line("first\r\n"));
        assert!(buffer.push_line("second\r\n"));
        assert!(!buffer.push_line("third\r\n"));
        assert!(buffer.is_full());
        assert!(!buffer.push_line("x"));
        assert_eq!(buffer.as_str(), "first\r\nsecond\r\n");
    }

    struct FailsHalfway;

    impl fmt::Display for FailsHalfway
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
        {
            f.write_str("partial")?;
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_stack_buffer_drops_line_that_fails_to_format()
    {
        let mut buffer = StackTraceBuffer::<64>::new();
        assert!(buffer.push_line("first\r\n"));
        assert!(!buffer.push_line(FailsHalfway));
        assert_eq!(buffer.as_str(), "first\r\n");
        assert!(!buffer.is_full());
        assert!(buffer.push_line("second\r\n"));
        assert_eq!(buffer.as_str(), "first\r\nsecond\r\n");
    }
}

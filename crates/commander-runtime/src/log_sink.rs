#![forbid(unsafe_code)]

//! In-memory, line-buffered text sink.
//!
//! [`TextSink`] implements [`std::io::Write`] and collects complete lines
//! into a shared buffer, so that:
//!
//! 1. Output is line-buffered (no torn lines).
//! 2. Content is sanitized: escape sequences and control characters other
//!    than tab are stripped.
//! 3. Clones observe the same buffer, so a test can keep one clone while a
//!    logger writes through another.
//!
//! # Usage
//!
//! ```
//! use commander_runtime::TextSink;
//! use std::io::Write;
//!
//! let sink = TextSink::new();
//! let mut writer = sink.clone();
//! writeln!(writer, "moved \x1b[31mshape\x1b[0m").unwrap();
//! assert_eq!(sink.lines(), vec!["moved shape"]);
//! ```

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
struct SinkBuffer {
    text: String,
    partial: Vec<u8>,
}

/// Shared, line-buffered text buffer.
#[derive(Clone, Default)]
pub struct TextSink {
    inner: Arc<Mutex<SinkBuffer>>,
}

impl TextSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every complete line written so far, newline-terminated.
    #[must_use]
    pub fn contents(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text
            .clone()
    }

    /// Complete lines written so far, without terminators.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.text.is_empty() && buffer.partial.is_empty()
    }

    /// Drop everything written so far, including a pending partial line.
    pub fn clear(&self) {
        let mut buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.text.clear();
        buffer.partial.clear();
    }
}

impl Write for TextSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for &byte in buf {
            if byte == b'\n' {
                let line = sanitize(&String::from_utf8_lossy(&buffer.partial));
                buffer.text.push_str(&line);
                buffer.text.push('\n');
                buffer.partial.clear();
            } else {
                buffer.partial.push(byte);
            }
        }
        Ok(buf.len())
    }

    /// Commits a pending partial line as if it were newline-terminated.
    fn flush(&mut self) -> io::Result<()> {
        let mut buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !buffer.partial.is_empty() {
            let line = sanitize(&String::from_utf8_lossy(&buffer.partial));
            buffer.text.push_str(&line);
            buffer.text.push('\n');
            buffer.partial.clear();
        }
        Ok(())
    }
}

impl fmt::Debug for TextSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TextSink")
            .field("bytes", &buffer.text.len())
            .field("partial", &buffer.partial.len())
            .finish()
    }
}

/// Strip ANSI escape sequences and control characters other than tab.
fn sanitize(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // CSI: ESC [ params final-byte
            if chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&next) {
                        break;
                    }
                }
            } else {
                chars.next();
            }
            continue;
        }
        if c == '\t' || !c.is_control() {
            out.push(c);
        }
    }
    out
}

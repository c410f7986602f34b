//! Independent read cursors over an [`Sgl`]

use super::buffer::{ReadOutcome, Sgl};
use crate::error::{Error, Result};
use std::cmp::min;
use std::io::{self, Read, Seek, SeekFrom};

/// Seek anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = Error;

    /// Decode a raw anchor (0 = start, 1 = current, 2 = end)
    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(Error::InvalidSeek(format!("unknown seek anchor {}", other))),
        }
    }
}

/// Resolve a seek to an absolute cursor position
fn resolve(current: usize, end: usize, delta: i64, whence: Whence) -> Result<usize> {
    let base = match whence {
        Whence::Start => 0,
        Whence::Current => current as i128,
        Whence::End => end as i128,
    };
    let target = base + delta as i128;
    if target < 0 {
        return Err(Error::InvalidSeek(format!(
            "negative position {} ({:?}{:+})",
            target, whence, delta
        )));
    }
    usize::try_from(target)
        .map_err(|_| Error::InvalidSeek(format!("position {} out of range", target)))
}

/// Resolve a `std::io` seek; absolute positions need not fit in `i64`
fn resolve_io(current: usize, end: usize, pos: SeekFrom) -> Result<usize> {
    match pos {
        SeekFrom::Start(n) => usize::try_from(n)
            .map_err(|_| Error::InvalidSeek(format!("position {} out of range", n))),
        SeekFrom::Current(delta) => resolve(current, end, delta, Whence::Current),
        SeekFrom::End(delta) => resolve(current, end, delta, Whence::End),
    }
}

/// Stream view over a whole [`Sgl`]
///
/// Holds only a shared borrow and its own cursor, so any number of readers
/// can walk one buffer at once without affecting each other or the
/// buffer's own read offset. Cloning a reader forks its cursor.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    sgl: &'a Sgl,
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(sgl: &'a Sgl) -> Self {
        Self { sgl, offset: 0 }
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Read at this reader's cursor and advance it
    pub fn read_next(&mut self, buf: &mut [u8]) -> ReadOutcome {
        let outcome = self.sgl.read_at(buf, self.offset);
        self.offset = outcome.offset;
        outcome
    }

    /// Move the cursor; `End` resolves against the buffer's current size
    ///
    /// Seeking past the end is allowed: the next read reports end-of-data.
    pub fn seek_from(&mut self, delta: i64, whence: Whence) -> Result<u64> {
        self.offset = resolve(self.offset, self.sgl.len(), delta, whence)?;
        Ok(self.offset as u64)
    }
}

impl Read for Reader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_next(buf).bytes)
    }
}

impl Seek for Reader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.offset = resolve_io(self.offset, self.sgl.len(), pos)?;
        Ok(self.offset as u64)
    }
}

/// Read view restricted to the window `[start, start + len)` of an [`Sgl`]
///
/// The cursor and every offset it reports are relative to `start`.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    sgl: &'a Sgl,
    start: usize,
    len: usize,
    offset: usize,
}

impl<'a> SliceReader<'a> {
    pub(crate) fn new(sgl: &'a Sgl, start: usize, len: usize) -> Self {
        Self {
            sgl,
            start,
            len,
            offset: 0,
        }
    }

    /// Window start within the buffer
    pub fn start(&self) -> usize {
        self.start
    }

    /// Window length
    pub fn window_len(&self) -> usize {
        self.len
    }

    /// Cursor position relative to the window start
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Read within the window and advance the cursor
    ///
    /// When fewer than `buf.len()` bytes remain in the window (or in the
    /// written data), the read is truncated and `eof` is reported together
    /// with that final partial read.
    pub fn read_next(&mut self, buf: &mut [u8]) -> ReadOutcome {
        let pos = match self.start.checked_add(self.offset) {
            Some(pos) if self.offset < self.len => pos,
            _ => {
                return ReadOutcome {
                    bytes: 0,
                    offset: self.offset,
                    eof: true,
                }
            }
        };
        let remaining = min(
            self.sgl.len().saturating_sub(pos),
            self.len.saturating_sub(self.offset),
        );

        let (dst, eof) = if remaining < buf.len() {
            (&mut buf[..remaining], true)
        } else {
            (buf, false)
        };

        let outcome = self.sgl.read_at(dst, pos);
        self.offset += outcome.bytes;

        ReadOutcome {
            bytes: outcome.bytes,
            offset: self.offset,
            eof,
        }
    }

    /// Move the cursor within the window
    ///
    /// `End` resolves to the window end clamped to the written data.
    pub fn seek_from(&mut self, delta: i64, whence: Whence) -> Result<u64> {
        self.offset = resolve(self.offset, self.window_end(), delta, whence)?;
        Ok(self.offset as u64)
    }

    /// Window end clamped to the written data, relative to `start`
    fn window_end(&self) -> usize {
        min(self.sgl.len(), self.start + self.len).saturating_sub(self.start)
    }

    /// Rewind to the start of the window
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

impl Read for SliceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_next(buf).bytes)
    }
}

impl Seek for SliceReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.offset = resolve_io(self.offset, self.window_end(), pos)?;
        Ok(self.offset as u64)
    }
}

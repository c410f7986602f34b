//! Growable scatter-gather buffer built from slab chunks

use super::reader::{Reader, SliceReader};
use crate::error::{Error, Result};
use crate::metrics::SGL_RELEASED;
use crate::slab::{Chunk, Slab};
use bytes::Bytes;
use std::cmp::min;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::debug;

/// Result of a single read against an [`Sgl`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes copied into the destination
    pub bytes: usize,
    /// Cursor position after the read
    pub offset: usize,
    /// No further bytes are available at or beyond `offset`
    ///
    /// Set on the same call that returns the final partial read. A read
    /// that exactly fills the destination is never end-of-data.
    pub eof: bool,
}

/// Scatter-gather list
///
/// An ordered sequence of equal-size chunks drawn from one [`Slab`],
/// presented as a single contiguous, growable byte stream. The byte at
/// logical offset `o` lives in `chunks[o / chunk_size]` at `o % chunk_size`.
///
/// Single writer: every mutating operation takes `&mut self`. Readers borrow
/// `&self`, so the borrow checker keeps them from overlapping a write or
/// outliving [`Sgl::release`].
///
/// Using an `Sgl` after `release` panics.
pub struct Sgl {
    /// Back-reference used for growth and release only; `None` once released
    slab: Option<Arc<Slab>>,
    chunk_size: usize,
    chunks: Vec<Chunk>,
    /// Bytes logically present
    write_offset: usize,
    /// This buffer's own cursor for `read_next` / `io::Read`
    read_offset: usize,
}

impl Sgl {
    pub(crate) fn new(slab: Arc<Slab>) -> Self {
        Self {
            chunk_size: slab.chunk_size(),
            slab: Some(slab),
            chunks: Vec::new(),
            write_offset: 0,
            read_offset: 0,
        }
    }

    /// Bytes logically written
    pub fn len(&self) -> usize {
        self.write_offset
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.write_offset == 0
    }

    /// Bytes the owned chunks can hold without growing
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.chunk_size
    }

    /// Size of each chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks currently owned
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes between this buffer's own read cursor and its end
    pub fn remaining(&self) -> usize {
        self.write_offset.saturating_sub(self.read_offset)
    }

    /// Check if [`Sgl::release`] has been called
    pub fn is_released(&self) -> bool {
        self.slab.is_none()
    }

    /// The slab this buffer grows from
    pub fn slab(&self) -> Option<&Arc<Slab>> {
        self.slab.as_ref()
    }

    #[track_caller]
    fn assert_live(&self) {
        assert!(self.slab.is_some(), "use of a released SGL");
    }

    /// Grow until `capacity() >= target`, one chunk at a time
    fn grow(&mut self, target: usize) {
        let slab = match &self.slab {
            Some(slab) => slab,
            None => panic!("use of a released SGL"),
        };
        while self.chunks.len() * self.chunk_size < target {
            self.chunks.push(slab.allocate());
        }
    }

    /// Ensure room for `additional` more bytes without further growth
    pub fn reserve(&mut self, additional: usize) {
        self.assert_live();
        let target = self.write_offset + additional;
        if target > self.capacity() {
            self.grow(target);
        }
    }

    /// Append bytes at the write offset, growing as needed
    ///
    /// Always writes everything; returns `data.len()`.
    pub fn append(&mut self, data: &[u8]) -> usize {
        self.assert_live();
        let needed = self.write_offset + data.len();
        if needed > self.capacity() {
            self.grow(needed);
        }

        let mut written = 0;
        while written < data.len() {
            let idx = self.write_offset / self.chunk_size;
            let off = self.write_offset % self.chunk_size;
            let n = min(self.chunk_size - off, data.len() - written);

            self.chunks[idx][off..off + n].copy_from_slice(&data[written..written + n]);
            written += n;
            self.write_offset += n;
        }
        written
    }

    /// Pull everything `src` produces into the buffer
    ///
    /// Grows one chunk at a time, only when the last chunk is full. The
    /// source's end-of-data (`Ok(0)`) ends ingestion successfully. Any source
    /// error is returned as-is inside [`Error::Source`]; bytes read before it
    /// stay in the buffer.
    pub fn read_from<R: Read>(&mut self, mut src: R) -> Result<u64> {
        self.assert_live();
        let mut total = 0u64;

        loop {
            if self.capacity() == self.write_offset {
                self.grow(self.capacity() + self.chunk_size);
            }

            let idx = self.write_offset / self.chunk_size;
            let off = self.write_offset % self.chunk_size;
            match src.read(&mut self.chunks[idx][off..]) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    self.write_offset += n;
                    total += n as u64;
                }
                Err(source) => {
                    return Err(Error::Source {
                        transferred: total,
                        source,
                    })
                }
            }
        }
    }

    /// Stream exactly `len()` bytes to `sink` in chunk order
    ///
    /// Stops at the first sink error, which is returned as-is inside
    /// [`Error::Sink`] together with the bytes already emitted.
    pub fn write_to<W: Write>(&self, mut sink: W) -> Result<u64> {
        self.assert_live();
        let mut remaining = self.write_offset;
        let mut total = 0u64;

        for chunk in &self.chunks {
            if remaining == 0 {
                break;
            }
            let take = min(remaining, self.chunk_size);
            let mut pending = &chunk[..take];

            while !pending.is_empty() {
                match sink.write(pending) {
                    Ok(0) => {
                        return Err(Error::Sink {
                            transferred: total,
                            source: io::Error::new(
                                io::ErrorKind::WriteZero,
                                "sink accepted no bytes",
                            ),
                        })
                    }
                    Ok(n) => {
                        pending = &pending[n..];
                        total += n as u64;
                    }
                    Err(source) => {
                        return Err(Error::Sink {
                            transferred: total,
                            source,
                        })
                    }
                }
            }
            remaining -= take;
        }

        Ok(total)
    }

    /// Overwrite already-written bytes in place
    ///
    /// Relocates the write cursor to `offset`, appends, then restores it, so
    /// `len()` is unchanged. Only valid for the single writer.
    ///
    /// # Panics
    /// If `offset + data.len()` exceeds `len()`; this never extends the buffer.
    #[track_caller]
    pub fn overwrite_at(&mut self, data: &[u8], offset: usize) {
        self.assert_live();
        let in_range = offset
            .checked_add(data.len())
            .map_or(false, |end| end <= self.write_offset);
        assert!(
            in_range,
            "overwrite of {} bytes at offset {} exceeds SGL size {}",
            data.len(),
            offset,
            self.write_offset
        );

        let saved = self.write_offset;
        self.write_offset = offset;
        self.append(data);
        self.write_offset = saved;
    }

    /// Copy bytes starting at `offset` into `buf`
    ///
    /// Crosses chunk boundaries as needed. `eof` is set when `offset` is at
    /// or beyond `len()`, or when fewer than `buf.len()` bytes were left.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> ReadOutcome {
        self.assert_live();
        if offset >= self.write_offset {
            return ReadOutcome {
                bytes: 0,
                offset,
                eof: true,
            };
        }

        let want = min(buf.len(), self.write_offset - offset);
        let mut copied = 0;
        let mut pos = offset;
        while copied < want {
            let idx = pos / self.chunk_size;
            let off = pos % self.chunk_size;
            let n = min(self.chunk_size - off, want - copied);

            buf[copied..copied + n].copy_from_slice(&self.chunks[idx][off..off + n]);
            copied += n;
            pos += n;
        }

        ReadOutcome {
            bytes: copied,
            offset: pos,
            eof: copied < buf.len(),
        }
    }

    /// Read from this buffer's own cursor and advance it
    pub fn read_next(&mut self, buf: &mut [u8]) -> ReadOutcome {
        let outcome = self.read_at(buf, self.read_offset);
        self.read_offset = outcome.offset;
        outcome
    }

    /// Copy the whole content into one flat buffer
    ///
    /// Allocates; meant for small buffers and diagnostics.
    pub fn read_all(&self) -> Bytes {
        self.assert_live();
        let mut out = Vec::with_capacity(self.write_offset);
        let mut remaining = self.write_offset;
        for chunk in &self.chunks {
            if remaining == 0 {
                break;
            }
            let n = min(remaining, self.chunk_size);
            out.extend_from_slice(&chunk[..n]);
            remaining -= n;
        }
        Bytes::from(out)
    }

    /// Open an independent reader over the whole buffer
    pub fn reader(&self) -> Reader<'_> {
        self.assert_live();
        Reader::new(self)
    }

    /// Open an independent reader over `[start, start + len)`
    pub fn slice_reader(&self, start: usize, len: usize) -> SliceReader<'_> {
        self.assert_live();
        assert!(
            start.checked_add(len).is_some(),
            "slice window [{}, {}+{}) overflows",
            start,
            start,
            len
        );
        SliceReader::new(self, start, len)
    }

    /// Rewind both offsets to zero, keeping the chunks for reuse
    pub fn reset(&mut self) {
        self.assert_live();
        self.write_offset = 0;
        self.read_offset = 0;
    }

    /// Return every chunk to the slab and invalidate this buffer
    ///
    /// # Panics
    /// If the buffer was already released.
    #[track_caller]
    pub fn release(&mut self) {
        let slab = match self.slab.take() {
            Some(slab) => slab,
            None => panic!("SGL released twice"),
        };

        let count = self.chunks.len();
        slab.release(self.chunks.drain(..));
        self.write_offset = 0;
        self.read_offset = 0;

        SGL_RELEASED.inc();
        debug!(chunk_size = self.chunk_size, chunks = count, "Released SGL");
    }
}

impl Drop for Sgl {
    fn drop(&mut self) {
        if self.slab.is_some() {
            self.release();
        }
    }
}

impl Read for Sgl {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_next(buf).bytes)
    }
}

impl Write for Sgl {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.append(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for Sgl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sgl")
            .field("chunk_size", &self.chunk_size)
            .field("chunks", &self.chunks.len())
            .field("write_offset", &self.write_offset)
            .field("read_offset", &self.read_offset)
            .field("released", &self.slab.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sgl(chunk_size: usize) -> Sgl {
        Arc::new(Slab::new(chunk_size).unwrap()).new_sgl()
    }

    /// Source that yields fixed pieces, then an optional error
    struct Pieces {
        pieces: Vec<&'static [u8]>,
        fail: Option<io::ErrorKind>,
    }

    impl Read for Pieces {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pieces.is_empty() {
                return match self.fail.take() {
                    Some(kind) => Err(io::Error::new(kind, "source broke")),
                    None => Ok(0),
                };
            }
            let piece = self.pieces[0];
            let n = min(piece.len(), buf.len());
            buf[..n].copy_from_slice(&piece[..n]);
            if n == piece.len() {
                self.pieces.remove(0);
            } else {
                self.pieces[0] = &piece[n..];
            }
            Ok(n)
        }
    }

    /// Sink that accepts at most `limit` bytes per call and `budget` in total
    struct Trickle {
        out: Vec<u8>,
        limit: usize,
        budget: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
            }
            let n = min(min(buf.len(), self.limit), self.budget);
            self.out.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_new_sgl_is_empty() {
        let sgl = sgl(4);
        assert_eq!(sgl.len(), 0);
        assert_eq!(sgl.capacity(), 0);
        assert_eq!(sgl.chunk_count(), 0);
        assert!(sgl.is_empty());
    }

    #[test]
    fn test_append_across_chunks() {
        let mut sgl = sgl(4);
        assert_eq!(sgl.append(b"ABCDEFGHIJ"), 10);

        assert_eq!(sgl.len(), 10);
        assert_eq!(sgl.capacity(), 12);
        assert_eq!(sgl.chunk_count(), 3);
        assert_eq!(&sgl.read_all()[..], b"ABCDEFGHIJ");
    }

    #[test]
    fn test_append_exact_chunk_does_not_overgrow() {
        let mut sgl = sgl(4);
        sgl.append(b"ABCD");
        assert_eq!(sgl.capacity(), 4);
        sgl.append(b"");
        assert_eq!(sgl.capacity(), 4);
        sgl.append(b"E");
        assert_eq!(sgl.capacity(), 8);
    }

    #[test]
    fn test_read_at_end_of_data() {
        let mut sgl = sgl(4);
        sgl.append(b"ABCDEFGHIJ");

        let mut buf = [0u8; 4];
        let out = sgl.read_at(&mut buf, 6);
        assert_eq!(out, ReadOutcome { bytes: 4, offset: 10, eof: false });
        assert_eq!(&buf, b"GHIJ");

        let out = sgl.read_at(&mut buf, 8);
        assert_eq!(out, ReadOutcome { bytes: 2, offset: 10, eof: true });
        assert_eq!(&buf[..2], b"IJ");

        let out = sgl.read_at(&mut buf, 10);
        assert_eq!(out, ReadOutcome { bytes: 0, offset: 10, eof: true });
    }

    #[test]
    fn test_own_cursor_and_io_read() {
        let mut sgl = sgl(3);
        sgl.append(b"hello world");

        let mut buf = [0u8; 5];
        let out = sgl.read_next(&mut buf);
        assert_eq!(&buf, b"hello");
        assert_eq!(out.offset, 5);
        assert_eq!(sgl.remaining(), 6);

        let mut rest = String::new();
        sgl.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, " world");
        assert_eq!(sgl.remaining(), 0);
    }

    #[test]
    fn test_io_write_impl() {
        let mut sgl = sgl(8);
        write!(sgl, "{}-{}", "object", 42).unwrap();
        assert_eq!(&sgl.read_all()[..], b"object-42");
    }

    #[test]
    fn test_read_from_grows_one_chunk_at_a_time() -> Result<()> {
        let mut sgl = sgl(4);
        let src = Pieces {
            pieces: vec![&b"AB"[..], &b"CDEFG"[..], &b"HIJ"[..]],
            fail: None,
        };

        assert_eq!(sgl.read_from(src)?, 10);
        assert_eq!(sgl.len(), 10);
        assert_eq!(&sgl.read_all()[..], b"ABCDEFGHIJ");
        assert_eq!(sgl.capacity() % 4, 0);
        assert!(sgl.capacity() >= sgl.len());
        Ok(())
    }

    #[test]
    fn test_read_from_keeps_partial_progress() {
        let mut sgl = sgl(4);
        sgl.append(b"xy");
        let src = Pieces {
            pieces: vec![&b"12345"[..]],
            fail: Some(io::ErrorKind::TimedOut),
        };

        let err = sgl.read_from(src).unwrap_err();
        assert_eq!(err.transferred(), 5);
        assert_eq!(err.into_io().kind(), io::ErrorKind::TimedOut);
        assert_eq!(&sgl.read_all()[..], b"xy12345");
    }

    #[test]
    fn test_write_to_emits_size_not_capacity() -> Result<()> {
        let mut sgl = sgl(4);
        sgl.append(b"ABCDEFGHIJ");

        let mut sink = Trickle {
            out: Vec::new(),
            limit: 3,
            budget: usize::MAX,
        };
        assert_eq!(sgl.write_to(&mut sink)?, 10);
        assert_eq!(sink.out, b"ABCDEFGHIJ");
        Ok(())
    }

    #[test]
    fn test_write_to_stops_on_first_error() {
        let mut sgl = sgl(4);
        sgl.append(b"ABCDEFGHIJ");

        let mut sink = Trickle {
            out: Vec::new(),
            limit: 4,
            budget: 6,
        };
        let err = sgl.write_to(&mut sink).unwrap_err();
        assert!(matches!(err, Error::Sink { transferred: 6, .. }));
        assert_eq!(sink.out, b"ABCDEF");
    }

    #[test]
    fn test_write_to_zero_write_sink_is_write_zero() {
        let mut sgl = sgl(4);
        sgl.append(b"ABCDEF");

        let mut sink = Trickle {
            out: Vec::new(),
            limit: 0,
            budget: usize::MAX,
        };
        let err = sgl.write_to(&mut sink).unwrap_err();
        assert!(matches!(err, Error::Sink { transferred: 0, .. }));
        assert_eq!(err.into_io().kind(), io::ErrorKind::WriteZero);
        assert!(sink.out.is_empty());
    }

    #[test]
    fn test_read_from_ending_on_chunk_boundary() -> Result<()> {
        let mut sgl = sgl(4);
        let src = Pieces {
            pieces: vec![&b"ABCDEFGH"[..]],
            fail: None,
        };

        assert_eq!(sgl.read_from(src)?, 8);
        assert_eq!(sgl.len(), 8);
        // One spare chunk was taken to observe end-of-data
        assert_eq!(sgl.chunk_count(), 3);
        assert_eq!(sgl.capacity(), 12);
        assert_eq!(&sgl.read_all()[..], b"ABCDEFGH");
        Ok(())
    }

    #[test]
    fn test_write_to_vec() -> Result<()> {
        let mut sgl = sgl(16);
        sgl.append(b"payload");

        let mut out = Vec::new();
        assert_eq!(sgl.write_to(&mut out)?, 7);
        assert_eq!(out, b"payload");
        Ok(())
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut sgl = sgl(4);
        sgl.append(b"ABCDEFGHIJ");

        sgl.overwrite_at(b"XYZ", 0);
        assert_eq!(sgl.len(), 10);
        assert_eq!(&sgl.read_all()[..], b"XYZDEFGHIJ");

        // Straddles the chunk boundary at 4 and ends exactly at len()
        sgl.overwrite_at(b"3456789", 3);
        assert_eq!(sgl.len(), 10);
        assert_eq!(&sgl.read_all()[..], b"XYZ3456789");
    }

    #[test]
    #[should_panic(expected = "exceeds SGL size")]
    fn test_overwrite_past_end_panics() {
        let mut sgl = sgl(4);
        sgl.append(b"ABCDEFGHIJ");
        sgl.overwrite_at(b"XYZ", 8);
    }

    #[test]
    fn test_reset_reuses_chunks() {
        let slab = Arc::new(Slab::new(4).unwrap());
        let mut sgl = slab.new_sgl();
        sgl.append(b"ABCDEFGHIJ");
        let allocated = slab.stats().total_chunks;

        sgl.reset();
        assert_eq!(sgl.len(), 0);
        assert_eq!(sgl.capacity(), 12);

        sgl.append(b"klmnopqrstuv");
        assert_eq!(&sgl.read_all()[..], b"klmnopqrstuv");
        assert_eq!(slab.stats().total_chunks, allocated);
    }

    #[test]
    fn test_release_returns_chunks() {
        let slab = Arc::new(Slab::new(4).unwrap());
        let mut sgl = slab.new_sgl();
        sgl.append(b"ABCDEFGHIJ");
        assert_eq!(slab.stats().in_use_chunks, 3);

        sgl.release();
        assert!(sgl.is_released());
        assert_eq!(sgl.capacity(), 0);
        assert_eq!(sgl.len(), 0);
        assert_eq!(slab.free_count(), 3);
        assert_eq!(slab.stats().in_use_chunks, 0);
    }

    #[test]
    fn test_drop_releases() {
        let slab = Arc::new(Slab::new(8).unwrap());
        {
            let mut sgl = slab.new_sgl();
            sgl.append(&[7u8; 20]);
        }
        assert_eq!(slab.free_count(), 3);
    }

    #[test]
    #[should_panic(expected = "released SGL")]
    fn test_write_after_release_panics() {
        let mut sgl = sgl(4);
        sgl.release();
        sgl.append(b"late");
    }

    #[test]
    #[should_panic(expected = "released SGL")]
    fn test_read_after_release_panics() {
        let mut sgl = sgl(4);
        sgl.append(b"data");
        sgl.release();
        let mut buf = [0u8; 4];
        sgl.read_at(&mut buf, 0);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_release_panics() {
        let mut sgl = sgl(4);
        sgl.release();
        sgl.release();
    }

    #[test]
    fn test_reserve() {
        let mut sgl = sgl(4);
        sgl.reserve(9);
        assert_eq!(sgl.capacity(), 12);
        assert_eq!(sgl.len(), 0);
    }
}

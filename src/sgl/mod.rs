//! Scatter-gather lists
//!
//! A growable logical buffer made of slab chunks, plus the read-only cursor
//! views layered on it.
//!
//! ```text
//! Sgl: [chunk 0: ABCD][chunk 1: EFGH][chunk 2: IJ..]   write_offset = 10
//!        Reader      → cursor 3  (whole buffer)
//!        SliceReader → window [2, 7), cursor 1
//! ```

pub mod buffer;
pub mod reader;

pub use buffer::{ReadOutcome, Sgl};
pub use reader::{Reader, SliceReader, Whence};

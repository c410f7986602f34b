//! Slab Allocator
//!
//! In-memory pools of equal-size chunks. Each slab keeps a free list of
//! idle chunks and hands them to scatter-gather lists on demand.
//!
//! # Architecture
//!
//! ```text
//! Slab(4 KiB)
//!   ├─→ Free: [chunk, chunk, chunk]
//!   └─→ In use: owned by Sgl A (2 chunks), Sgl B (5 chunks)
//! ```
//!
//! A chunk is owned by exactly one buffer or by the free list, never both.

pub mod allocator;
pub mod chunk;
pub mod size_class;

pub use allocator::{Slab, SlabStats};
pub use chunk::Chunk;
pub use size_class::{calculate_size_classes, select_class};

//! Chunk type handed out by a slab

use std::fmt;
use std::ops::{Deref, DerefMut};

/// A fixed-size block of memory owned by exactly one holder
///
/// Chunks are move-only: there is no `Clone`, so a chunk released back to
/// its slab cannot still be referenced by the buffer that returned it.
/// Each chunk remembers the slab that cut it and can only go back there.
pub struct Chunk {
    data: Box<[u8]>,
    slab_id: u64,
}

impl Chunk {
    /// Allocate a fresh chunk of `size` bytes owned by slab `slab_id`
    pub(crate) fn new(size: usize, slab_id: u64) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            slab_id,
        }
    }

    /// Size of this chunk in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Id of the slab this chunk belongs to
    pub fn slab_id(&self) -> u64 {
        self.slab_id
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Chunk {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk(size={}, slab={})", self.data.len(), self.slab_id)
    }
}

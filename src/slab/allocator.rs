//! Fixed-size chunk pool

use super::chunk::Chunk;
use crate::error::{Error, Result};
use crate::metrics::{init_metrics, CHUNKS_ALLOCATED, CHUNKS_FREE, CHUNKS_RELEASED, CHUNKS_REUSED};
use crate::sgl::Sgl;
use parking_lot::Mutex;
use prometheus::{IntCounter, IntGauge};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

static NEXT_SLAB_ID: AtomicU64 = AtomicU64::new(1);

/// Slab of equal-size chunks
///
/// Hands out chunks of one constant size and takes them back for reuse.
/// The free list is the only shared state; its lock is held for push/pop
/// only, never while allocating fresh memory or doing I/O.
///
/// Recycled chunks keep whatever bytes they held last.
pub struct Slab {
    /// Process-unique id stamped into every chunk this slab cuts
    id: u64,
    /// Size of every chunk in this slab (bytes)
    chunk_size: usize,
    /// Idle chunks ready for reuse
    free_list: Mutex<Vec<Chunk>>,
    /// Chunks created by this slab and not yet dropped by `shrink`
    total_chunks: AtomicU64,
    /// Chunks currently owned by buffers
    in_use: AtomicU64,
    metrics: SlabMetrics,
}

struct SlabMetrics {
    allocated: IntCounter,
    reused: IntCounter,
    released: IntCounter,
    free: IntGauge,
}

impl SlabMetrics {
    fn new(chunk_size: usize) -> Self {
        init_metrics();
        let label = chunk_size.to_string();
        Self {
            allocated: CHUNKS_ALLOCATED.with_label_values(&[label.as_str()]),
            reused: CHUNKS_REUSED.with_label_values(&[label.as_str()]),
            released: CHUNKS_RELEASED.with_label_values(&[label.as_str()]),
            free: CHUNKS_FREE.with_label_values(&[label.as_str()]),
        }
    }
}

impl Slab {
    /// Create an empty slab
    ///
    /// # Arguments
    /// * `chunk_size` - Size of every chunk handed out (must be non-zero)
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument(
                "Slab chunk size must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            id: NEXT_SLAB_ID.fetch_add(1, Ordering::Relaxed),
            chunk_size,
            free_list: Mutex::new(Vec::new()),
            total_chunks: AtomicU64::new(0),
            in_use: AtomicU64::new(0),
            metrics: SlabMetrics::new(chunk_size),
        })
    }

    /// Create a slab whose free list is seeded with `count` chunks
    pub fn with_prealloc(chunk_size: usize, count: usize) -> Result<Self> {
        let slab = Self::new(chunk_size)?;
        if count > 0 {
            let chunks: Vec<Chunk> = (0..count).map(|_| Chunk::new(chunk_size, slab.id)).collect();
            slab.total_chunks.fetch_add(count as u64, Ordering::Relaxed);
            slab.metrics.allocated.inc_by(count as u64);
            slab.metrics.free.add(count as i64);
            *slab.free_list.lock() = chunks;
            debug!(chunk_size, count, "Preallocated slab chunks");
        }
        Ok(slab)
    }

    /// Process-unique id of this slab
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size of every chunk in this slab
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Take one chunk, reusing an idle one when available
    pub fn allocate(&self) -> Chunk {
        let reused = self.free_list.lock().pop();

        let chunk = match reused {
            Some(chunk) => {
                self.metrics.reused.inc();
                self.metrics.free.dec();
                chunk
            }
            None => {
                self.total_chunks.fetch_add(1, Ordering::Relaxed);
                self.metrics.allocated.inc();
                Chunk::new(self.chunk_size, self.id)
            }
        };
        self.in_use.fetch_add(1, Ordering::Relaxed);

        trace!(chunk_size = self.chunk_size, "Allocated chunk");
        chunk
    }

    /// Return chunks to the free list
    ///
    /// Every chunk is checked before any is accepted, so a rejected batch
    /// leaves the slab untouched.
    ///
    /// # Panics
    /// If a chunk came from a different slab.
    pub fn release<I>(&self, chunks: I)
    where
        I: IntoIterator<Item = Chunk>,
    {
        let chunks: Vec<Chunk> = chunks.into_iter().collect();
        for chunk in &chunks {
            assert_eq!(
                chunk.size(),
                self.chunk_size,
                "chunk released to a slab of a different size"
            );
            assert_eq!(
                chunk.slab_id(),
                self.id,
                "chunk released to a slab that did not allocate it"
            );
        }

        let count = chunks.len() as u64;
        self.free_list.lock().extend(chunks);

        if count > 0 {
            self.in_use.fetch_sub(count, Ordering::Relaxed);
            self.metrics.released.inc_by(count);
            self.metrics.free.add(count as i64);
            debug!(chunk_size = self.chunk_size, count, "Released chunks to slab");
        }
    }

    /// Create an empty scatter-gather list that grows from this slab
    pub fn new_sgl(self: &Arc<Self>) -> Sgl {
        Sgl::new(Arc::clone(self))
    }

    /// Number of idle chunks in the free list
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Drop every idle chunk, returning the number of bytes freed
    pub fn shrink(&self) -> usize {
        let idle = std::mem::take(&mut *self.free_list.lock());
        let count = idle.len();
        drop(idle);

        if count > 0 {
            self.total_chunks.fetch_sub(count as u64, Ordering::Relaxed);
            self.metrics.free.sub(count as i64);
            debug!(chunk_size = self.chunk_size, count, "Shrunk slab free list");
        }
        count * self.chunk_size
    }

    /// Get statistics about the slab
    pub fn stats(&self) -> SlabStats {
        let total_chunks = self.total_chunks.load(Ordering::Relaxed);
        let in_use_chunks = self.in_use.load(Ordering::Relaxed);
        SlabStats {
            chunk_size: self.chunk_size,
            total_chunks,
            free_chunks: self.free_count() as u64,
            in_use_chunks,
            allocated_bytes: total_chunks * self.chunk_size as u64,
        }
    }
}

impl fmt::Debug for Slab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("id", &self.id)
            .field("chunk_size", &self.chunk_size)
            .field("free_chunks", &self.free_count())
            .field("in_use", &self.in_use.load(Ordering::Relaxed))
            .finish()
    }
}

/// Statistics for a single slab
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlabStats {
    pub chunk_size: usize,
    pub total_chunks: u64,
    pub free_chunks: u64,
    pub in_use_chunks: u64,
    pub allocated_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_slab_rejects_zero_chunk_size() {
        assert!(matches!(Slab::new(0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_slab_allocate_and_reuse() -> Result<()> {
        let slab = Slab::new(64)?;
        assert_eq!(slab.chunk_size(), 64);

        let mut chunk = slab.allocate();
        assert_eq!(chunk.size(), 64);
        chunk[..5].copy_from_slice(b"stale");

        slab.release(vec![chunk]);
        assert_eq!(slab.free_count(), 1);

        // Reused chunk comes back as-is, not zeroed
        let chunk = slab.allocate();
        assert_eq!(&chunk[..5], b"stale");
        assert_eq!(slab.free_count(), 0);

        let stats = slab.stats();
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.in_use_chunks, 1);
        Ok(())
    }

    #[test]
    fn test_slab_release_many() -> Result<()> {
        let slab = Slab::new(32)?;
        let chunks: Vec<Chunk> = (0..4).map(|_| slab.allocate()).collect();
        assert_eq!(slab.stats().in_use_chunks, 4);

        slab.release(chunks);

        let stats = slab.stats();
        assert_eq!(stats.free_chunks, 4);
        assert_eq!(stats.in_use_chunks, 0);
        assert_eq!(stats.allocated_bytes, 128);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "different size")]
    fn test_slab_rejects_foreign_chunk() {
        let small = Slab::new(16).unwrap();
        let large = Slab::new(32).unwrap();
        small.release(Some(large.allocate()));
    }

    #[test]
    #[should_panic(expected = "did not allocate it")]
    fn test_slab_rejects_chunk_of_same_size_from_other_slab() {
        let a = Slab::new(16).unwrap();
        let b = Slab::new(16).unwrap();
        assert_ne!(a.id(), b.id());
        a.release(Some(b.allocate()));
    }

    #[test]
    fn test_rejected_release_leaves_slab_untouched() -> Result<()> {
        let a = Slab::new(16)?;
        let b = Slab::new(16)?;
        let own = a.allocate();
        let foreign = b.allocate();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            a.release(vec![own, foreign]);
        }));
        assert!(result.is_err());

        let stats = a.stats();
        assert_eq!(stats.free_chunks, 0);
        assert_eq!(stats.in_use_chunks, 1);
        assert_eq!(stats.total_chunks, 1);
        Ok(())
    }

    #[test]
    fn test_slab_prealloc_and_shrink() -> Result<()> {
        let slab = Slab::with_prealloc(128, 3)?;
        assert_eq!(slab.free_count(), 3);

        let chunk = slab.allocate();
        assert_eq!(slab.stats().total_chunks, 3);

        assert_eq!(slab.shrink(), 2 * 128);
        assert_eq!(slab.free_count(), 0);

        slab.release(Some(chunk));
        let stats = slab.stats();
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.free_chunks, 1);
        Ok(())
    }

    #[test]
    fn test_slab_concurrent_use() -> Result<()> {
        let slab = Arc::new(Slab::new(256)?);

        thread::scope(|s| {
            for _ in 0..8 {
                let slab = Arc::clone(&slab);
                s.spawn(move || {
                    for _ in 0..100 {
                        let chunks: Vec<Chunk> = (0..3).map(|_| slab.allocate()).collect();
                        slab.release(chunks);
                    }
                });
            }
        });

        let stats = slab.stats();
        assert_eq!(stats.in_use_chunks, 0);
        assert_eq!(stats.free_chunks, stats.total_chunks);
        assert!(stats.total_chunks <= 24);
        Ok(())
    }
}

//! Buffer manager: one slab per chunk size class
//!
//! Callers that do not care about chunk sizes ask the manager for a buffer
//! sized to the object they expect to stage. Each size class keeps its own
//! slab, so buffers of similar size recycle each other's chunks.

use crate::config::MemsysConfig;
use crate::error::{Error, Result};
use crate::sgl::Sgl;
use crate::slab::{calculate_size_classes, select_class, Slab, SlabStats};
use std::sync::Arc;
use tracing::info;

/// Set of slabs covering a range of power-of-two chunk sizes
#[derive(Debug)]
pub struct BufferManager {
    /// Slabs sorted by chunk size
    slabs: Vec<Arc<Slab>>,
    /// Chunk sizes, parallel to `slabs`
    classes: Vec<usize>,
}

impl BufferManager {
    /// Create a manager with slabs for every power of two in `[min, max]`
    ///
    /// # Arguments
    /// * `min_chunk_size` - Smallest chunk size (rounded up to a power of two)
    /// * `max_chunk_size` - Largest chunk size
    /// * `prealloc_chunks` - Idle chunks to seed each slab with
    pub fn new(min_chunk_size: usize, max_chunk_size: usize, prealloc_chunks: usize) -> Result<Self> {
        let classes = calculate_size_classes(min_chunk_size, max_chunk_size);
        if classes.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "No chunk size class fits in [{}, {}]",
                min_chunk_size, max_chunk_size
            )));
        }

        let slabs = classes
            .iter()
            .map(|&size| Slab::with_prealloc(size, prealloc_chunks).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Initializing buffer manager with {} slabs: {:?}",
            classes.len(),
            classes
        );

        Ok(Self { slabs, classes })
    }

    /// Create a manager from configuration
    pub fn from_config(config: &MemsysConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            config.min_chunk_size,
            config.max_chunk_size,
            config.prealloc_chunks,
        )
    }

    /// Create an empty buffer for an object of roughly `expected_size` bytes
    ///
    /// Zero means unknown and selects the smallest chunk size.
    pub fn new_sgl(&self, expected_size: usize) -> Sgl {
        let size = select_class(&self.classes, expected_size);
        // `size` always comes from `classes`
        let idx = self.classes.partition_point(|&c| c < size);
        self.slabs[idx].new_sgl()
    }

    /// Slab with exactly this chunk size, if managed
    pub fn slab_for(&self, chunk_size: usize) -> Option<Arc<Slab>> {
        self.classes
            .binary_search(&chunk_size)
            .ok()
            .map(|idx| Arc::clone(&self.slabs[idx]))
    }

    /// All slabs, smallest chunk size first
    pub fn slabs(&self) -> &[Arc<Slab>] {
        &self.slabs
    }

    /// Managed chunk sizes, ascending
    pub fn chunk_sizes(&self) -> &[usize] {
        &self.classes
    }

    /// Drop idle chunks from every slab, returning the bytes freed
    pub fn shrink(&self) -> usize {
        let freed: usize = self.slabs.iter().map(|slab| slab.shrink()).sum();
        info!(freed_bytes = freed, "Shrunk buffer manager free lists");
        freed
    }

    /// Get statistics across all slabs
    pub fn stats(&self) -> ManagerStats {
        let slabs: Vec<SlabStats> = self.slabs.iter().map(|slab| slab.stats()).collect();
        ManagerStats {
            allocated_bytes: slabs.iter().map(|s| s.allocated_bytes).sum(),
            in_use_bytes: slabs
                .iter()
                .map(|s| s.in_use_chunks * s.chunk_size as u64)
                .sum(),
            slabs,
        }
    }
}

/// Buffer manager statistics
#[derive(Debug, Clone, Default)]
pub struct ManagerStats {
    pub slabs: Vec<SlabStats>,
    /// Bytes held by all slabs, idle or in use
    pub allocated_bytes: u64,
    /// Bytes currently owned by buffers
    pub in_use_bytes: u64,
}

//! Prometheus metrics for slab and buffer activity
//!
//! Every slab records into the counters below, labelled by chunk size.
//! Registration with [`METRICS_REGISTRY`] happens once, on first use.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref CHUNKS_ALLOCATED: IntCounterVec = IntCounterVec::new(
        Opts::new("memsys_chunks_allocated_total", "Chunks freshly allocated from the heap"),
        &["chunk_size"]
    ).unwrap();

    pub static ref CHUNKS_REUSED: IntCounterVec = IntCounterVec::new(
        Opts::new("memsys_chunks_reused_total", "Chunks handed out from a free list"),
        &["chunk_size"]
    ).unwrap();

    pub static ref CHUNKS_RELEASED: IntCounterVec = IntCounterVec::new(
        Opts::new("memsys_chunks_released_total", "Chunks returned to a free list"),
        &["chunk_size"]
    ).unwrap();

    pub static ref CHUNKS_FREE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("memsys_chunks_free", "Idle chunks currently held in a free list"),
        &["chunk_size"]
    ).unwrap();

    pub static ref SGL_RELEASED: IntCounter = IntCounter::new(
        "memsys_sgl_released_total",
        "Scatter-gather lists released back to their slab"
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry (idempotent)
pub fn init_metrics() {
    INIT.call_once(|| {
        info!("Initializing memsys metrics");

        METRICS_REGISTRY.register(Box::new(CHUNKS_ALLOCATED.clone())).ok();
        METRICS_REGISTRY.register(Box::new(CHUNKS_REUSED.clone())).ok();
        METRICS_REGISTRY.register(Box::new(CHUNKS_RELEASED.clone())).ok();
        METRICS_REGISTRY.register(Box::new(CHUNKS_FREE.clone())).ok();
        METRICS_REGISTRY.register(Box::new(SGL_RELEASED.clone())).ok();
    });
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> String {
    init_metrics();

    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("# Error converting metrics\n"))
}

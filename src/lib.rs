// PhotonDB memsys
// Slab-backed buffer pool and scatter-gather I/O for staging object data

#![warn(rust_2018_idioms)]

//! Memory subsystem for staging object data in transit.
//!
//! ```text
//! BufferManager
//!   ├─→ Slab(4 KiB)   → Free: [chunk, chunk, ...]
//!   ├─→ Slab(8 KiB)   → Free: [...]
//!   └─→ Slab(128 KiB) → Free: []
//!
//! Sgl (single writer)
//!   └─→ [chunk 0][chunk 1][chunk 2]  ← write_offset somewhere in chunk 2
//!        ├─→ Reader       (own cursor, whole buffer)
//!        └─→ SliceReader  (own cursor, fixed window)
//! ```
//!
//! A producer writes into an [`Sgl`], any number of consumers read it back
//! through [`Reader`]s and [`SliceReader`]s, and releasing the `Sgl` returns
//! its chunks to the [`Slab`] for the next transfer.

pub mod config;
pub mod manager;
pub mod metrics;
pub mod sgl;
pub mod slab;

// Re-exports for convenience
pub use config::MemsysConfig;
pub use manager::{BufferManager, ManagerStats};
pub use sgl::{ReadOutcome, Reader, Sgl, SliceReader, Whence};
pub use slab::{Chunk, Slab, SlabStats};

/// memsys error types
pub mod error {
    use std::io;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Source error after {transferred} bytes: {source}")]
        Source {
            transferred: u64,
            #[source]
            source: io::Error,
        },

        #[error("Sink error after {transferred} bytes: {source}")]
        Sink {
            transferred: u64,
            #[source]
            source: io::Error,
        },

        #[error("Invalid seek: {0}")]
        InvalidSeek(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    impl Error {
        /// Bytes moved before a source or sink failed
        pub fn transferred(&self) -> u64 {
            match self {
                Error::Source { transferred, .. } | Error::Sink { transferred, .. } => *transferred,
                _ => 0,
            }
        }

        /// Convert into an `io::Error`, handing back a wrapped source/sink error as-is
        pub fn into_io(self) -> io::Error {
            match self {
                Error::Source { source, .. } | Error::Sink { source, .. } => source,
                Error::InvalidSeek(msg) | Error::InvalidArgument(msg) => {
                    io::Error::new(io::ErrorKind::InvalidInput, msg)
                }
                Error::Config(msg) => io::Error::new(io::ErrorKind::Other, msg),
            }
        }
    }

    impl From<Error> for io::Error {
        fn from(e: Error) -> Self {
            e.into_io()
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::io;

use thiserror::Error;

mod gc;
mod procfs;

pub use gc::{platform_gc_hook, GcHook};
pub use procfs::ProcSelfSampler;

/// Where a memory reading came from.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemorySourceKind {
    /// `Private_Clean + Private_Dirty` from `/proc/self/smaps_rollup`.
    SmapsRollup,
    /// `RssAnon` from `/proc/self/status`.
    StatusRssAnon,
    /// Supplied by a caller-provided sampler.
    External,
}

/// Memory usage of the host process.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ProcessMemoryInfo {
    /// Bytes mapped privately by this process.
    pub private_bytes: u64,
    pub source: MemorySourceKind,
}

impl ProcessMemoryInfo {
    pub fn new(private_bytes: u64, source: MemorySourceKind) -> Self {
        Self {
            private_bytes,
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to read memory info: {0}")]
    Io(#[from] io::Error),
    #[error("memory info is missing `{0}`")]
    MissingField(&'static str),
    #[error("process memory sampling is not supported on this platform")]
    Unsupported,
    /// A reading of zero private bytes cannot be right for a live process,
    /// so it is reported as a failure rather than as "no pressure".
    #[error("memory sample reported zero private bytes")]
    ZeroReading,
}

/// Source of process memory readings.
pub trait MemorySampler {
    fn sample(&mut self) -> Result<ProcessMemoryInfo, SampleError>;
}

impl<F> MemorySampler for F
where
    F: FnMut() -> Result<ProcessMemoryInfo, SampleError>,
{
    fn sample(&mut self) -> Result<ProcessMemoryInfo, SampleError> {
        self()
    }
}

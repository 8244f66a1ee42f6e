use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{MemorySampler, MemorySourceKind, ProcessMemoryInfo, SampleError};

/// Reads this process's private memory from procfs.
///
/// Prefers `/proc/self/smaps_rollup` and falls back to `RssAnon` in
/// `/proc/self/status` on kernels older than 4.14. The read buffer is reused
/// across samples.
#[derive(Debug)]
pub struct ProcSelfSampler {
    smaps_rollup: PathBuf,
    status: PathBuf,
    buffer: Vec<u8>,
}

impl ProcSelfSampler {
    /// Creates a sampler reading the standard `/proc/self` files.
    pub fn new() -> Self {
        Self::with_paths("/proc/self/smaps_rollup", "/proc/self/status")
    }

    /// Reads from the given files instead of `/proc/self`.
    pub fn with_paths(smaps_rollup: impl Into<PathBuf>, status: impl Into<PathBuf>) -> Self {
        Self {
            smaps_rollup: smaps_rollup.into(),
            status: status.into(),
            buffer: Vec::with_capacity(4096),
        }
    }
}

impl Default for ProcSelfSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcSelfSampler {
    fn sample(&mut self) -> Result<ProcessMemoryInfo, SampleError> {
        if !cfg!(target_os = "linux") {
            return Err(SampleError::Unsupported);
        }

        let info = match read_to_buffer(&self.smaps_rollup, &mut self.buffer) {
            Ok(bytes) => ProcessMemoryInfo::new(
                parse_smaps_rollup(bytes)?,
                MemorySourceKind::SmapsRollup,
            ),
            Err(err) => {
                debug!(error = %err, "smaps_rollup unavailable, falling back to status");
                let bytes = read_to_buffer(&self.status, &mut self.buffer)?;
                ProcessMemoryInfo::new(parse_status_rss_anon(bytes)?, MemorySourceKind::StatusRssAnon)
            }
        };

        if info.private_bytes == 0 {
            return Err(SampleError::ZeroReading);
        }
        Ok(info)
    }
}

fn read_to_buffer<'a>(path: &Path, buffer: &'a mut Vec<u8>) -> io::Result<&'a [u8]> {
    buffer.clear();
    let mut file = File::open(path)?;
    file.read_to_end(buffer)?;
    Ok(buffer.as_slice())
}

fn parse_smaps_rollup(bytes: &[u8]) -> Result<u64, SampleError> {
    let mut clean: Option<u64> = None;
    let mut dirty: Option<u64> = None;

    for line in bytes.split(|b| *b == b'\n') {
        if clean.is_none() && line.starts_with(b"Private_Clean:") {
            clean = parse_kb_value(line).map(|v| v.saturating_mul(1024));
        } else if dirty.is_none() && line.starts_with(b"Private_Dirty:") {
            dirty = parse_kb_value(line).map(|v| v.saturating_mul(1024));
        }

        if clean.is_some() && dirty.is_some() {
            break;
        }
    }

    let clean = clean.ok_or(SampleError::MissingField("Private_Clean"))?;
    let dirty = dirty.ok_or(SampleError::MissingField("Private_Dirty"))?;
    Ok(clean.saturating_add(dirty))
}

fn parse_status_rss_anon(bytes: &[u8]) -> Result<u64, SampleError> {
    for line in bytes.split(|b| *b == b'\n') {
        if line.starts_with(b"RssAnon:") {
            return parse_kb_value(line)
                .map(|v| v.saturating_mul(1024))
                .ok_or(SampleError::MissingField("RssAnon"));
        }
    }
    Err(SampleError::MissingField("RssAnon"))
}

fn parse_kb_value(line: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut saw_digit = false;
    for byte in line.iter().copied() {
        if byte.is_ascii_digit() {
            saw_digit = true;
            value = value
                .saturating_mul(10)
                .saturating_add((byte - b'0') as u64);
        } else if saw_digit {
            break;
        }
    }
    if saw_digit {
        Some(value)
    } else {
        None
    }
}

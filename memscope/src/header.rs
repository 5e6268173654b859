//! Trace header codec
//!
//! The header is read exactly once, when a reader is opened, and is
//! immutable afterwards.

use log::info;
use memscope_common::{RawHeaderBody, RawVersion, CURRENT_HEADER_VERSION, MAGIC};

use crate::domain::{FormatError, ReaderError, SourceError};
use crate::source::{read_struct, Source};

/// Counters the agent stores in the header when tracking stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerStats {
    pub n_allocations: u64,
    pub n_frames: u64,
    /// Milliseconds since the Unix epoch
    pub start_time: i64,
    /// Milliseconds since the Unix epoch
    pub end_time: i64,
}

impl TrackerStats {
    /// Wall-clock length of the tracked interval in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        self.end_time.saturating_sub(self.start_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    /// Whether allocation records carry native stacks
    pub native_traces: bool,
    pub stats: TrackerStats,
    /// Command line of the traced process
    pub command_line: String,
}

impl Header {
    /// Parse and validate the header at the start of `source`
    ///
    /// # Errors
    /// - [`FormatError::NotATrace`] if the magic bytes don't match
    /// - [`FormatError::VersionMismatch`] for any version but the current one
    /// - [`FormatError::TruncatedHeader`] if the source ends inside the header
    pub fn read<S: Source + ?Sized>(source: &mut S) -> Result<Self, ReaderError> {
        let mut magic = [0u8; MAGIC.len()];
        match source.read_exact(&mut magic) {
            Ok(()) if magic == MAGIC => {}
            Ok(()) | Err(SourceError::Exhausted) => return Err(FormatError::NotATrace.into()),
            Err(SourceError::Io(e)) => return Err(e.into()),
        }

        let version = read_struct::<RawVersion, _>(source).map_err(truncated)?.version.get();
        if version != CURRENT_HEADER_VERSION {
            return Err(FormatError::VersionMismatch {
                found: version,
                expected: CURRENT_HEADER_VERSION,
            }
            .into());
        }

        let body = read_struct::<RawHeaderBody, _>(source).map_err(truncated)?;
        let command_line = source.read_cstring().map_err(truncated)?;

        let header = Self {
            version,
            native_traces: body.native_traces != 0,
            stats: TrackerStats {
                n_allocations: body.stats.n_allocations.get(),
                n_frames: body.stats.n_frames.get(),
                start_time: body.stats.start_time.get(),
                end_time: body.stats.end_time.get(),
            },
            command_line,
        };

        info!(
            "Opened trace v{} of `{}` (native traces: {})",
            header.version, header.command_line, header.native_traces
        );
        Ok(header)
    }
}

fn truncated(err: SourceError) -> ReaderError {
    match err {
        SourceError::Exhausted => FormatError::TruncatedHeader.into(),
        SourceError::Io(e) => e.into(),
    }
}

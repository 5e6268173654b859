//! Allocation export functionality
//!
//! [`AllocationExporter`] writes one JSON object per allocation (JSON lines),
//! with its interpreter stack and, optionally, its symbolized native stack.
//! [`AllocationSummary`] aggregates a whole trace for quick inspection.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

use crate::allocation::{Allocation, AllocatorKind, StackFrame};
use crate::reader::RecordReader;
use crate::source::Source;
use crate::symbolization::{NativeFrame, SymbolResolver};

/// One exported line
#[derive(Debug, Serialize)]
struct AllocationEvent {
    tid: u64,
    address: u64,
    size: u64,
    allocator: AllocatorKind,
    /// Memory map generation the native stack was resolved against
    generation: usize,
    stack: Vec<StackFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    native_stack: Option<Vec<NativeFrame>>,
}

/// JSON-lines exporter for decoded allocations
pub struct AllocationExporter<W: Write> {
    writer: W,
    max_depth: usize,
    /// Resolve native stacks as well
    native: bool,
    written: u64,
}

impl<W: Write> AllocationExporter<W> {
    /// Create a new exporter writing to any writer (file, stdout, buffer, etc.)
    pub fn new(writer: W, max_depth: usize, native: bool) -> Self {
        Self { writer, max_depth, native, written: 0 }
    }

    /// Resolve the stacks of `allocation` and write it as one JSON line
    ///
    /// # Errors
    /// Returns an error if a stack refers to unknown frames or writing fails
    pub fn write_allocation<S: Source, R: SymbolResolver>(
        &mut self,
        reader: &RecordReader<S, R>,
        allocation: &Allocation,
    ) -> Result<()> {
        let record = &allocation.record;
        let stack = reader
            .stack_trace(allocation.frame_handle, self.max_depth)
            .context("Failed to rebuild interpreter stack")?;
        let native_stack = self
            .native
            .then(|| {
                reader.native_stack_trace(
                    record.native_index,
                    allocation.native_generation,
                    self.max_depth,
                )
            })
            .transpose()
            .context("Failed to rebuild native stack")?;

        let event = AllocationEvent {
            tid: record.tid.0,
            address: record.address,
            size: record.size,
            allocator: record.allocator,
            generation: allocation.native_generation.0,
            stack,
            native_stack,
        };

        serde_json::to_writer(&mut self.writer, &event)
            .context("Failed to write allocation JSON")?;
        self.writer.write_all(b"\n").context("Failed to write allocation JSON")?;
        self.written += 1;
        Ok(())
    }

    /// Get the number of allocations written
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and return the underlying writer
    ///
    /// # Errors
    /// Returns an error if flushing fails
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush().context("Failed to flush allocation export")?;
        Ok(self.writer)
    }
}

/// Per-allocator totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorTotals {
    pub count: u64,
    pub bytes: u64,
}

/// Aggregate view of a whole trace
#[derive(Debug, Default, Serialize)]
pub struct AllocationSummary {
    pub allocations: u64,
    pub deallocations: u64,
    /// Bytes requested by allocating calls
    pub bytes_allocated: u64,
    pub by_allocator: BTreeMap<&'static str, AllocatorTotals>,
}

impl AllocationSummary {
    pub fn record(&mut self, allocation: &Allocation) {
        let record = &allocation.record;
        if record.allocator.is_deallocation() {
            self.deallocations += 1;
        } else {
            self.allocations += 1;
            self.bytes_allocated = self.bytes_allocated.saturating_add(record.size);
        }
        let totals = self.by_allocator.entry(record.allocator.as_str()).or_default();
        totals.count += 1;
        totals.bytes = totals.bytes.saturating_add(record.size);
    }

    /// Human-readable report, one allocator per line
    #[must_use]
    pub fn format(&self) -> String {
        let mut lines = vec![format!(
            "{} allocations ({} bytes), {} deallocations",
            self.allocations, self.bytes_allocated, self.deallocations
        )];
        lines.extend(self.by_allocator.iter().map(|(name, totals)| {
            format!("  {name:<16} {:>10} calls {:>14} bytes", totals.count, totals.bytes)
        }));
        lines.join("\n")
    }
}

//! Decoded allocation events

use memscope_common::{allocator, RawAllocationRecord};
use serde::Serialize;
use std::fmt;

use crate::domain::{FrameHandle, Generation, NativeIndex, ProtocolViolation, ThreadId};

/// Allocator entry point that produced an allocation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    Malloc,
    Free,
    Calloc,
    Realloc,
    PosixMemalign,
    Memalign,
    Valloc,
    Pvalloc,
    Mmap,
    Munmap,
}

impl AllocatorKind {
    /// Decode the allocator byte of an allocation record
    ///
    /// # Errors
    /// [`ProtocolViolation::UnknownAllocator`] for values the agent never writes
    pub fn decode(value: u8) -> Result<Self, ProtocolViolation> {
        Ok(match value {
            allocator::MALLOC => Self::Malloc,
            allocator::FREE => Self::Free,
            allocator::CALLOC => Self::Calloc,
            allocator::REALLOC => Self::Realloc,
            allocator::POSIX_MEMALIGN => Self::PosixMemalign,
            allocator::MEMALIGN => Self::Memalign,
            allocator::VALLOC => Self::Valloc,
            allocator::PVALLOC => Self::Pvalloc,
            allocator::MMAP => Self::Mmap,
            allocator::MUNMAP => Self::Munmap,
            other => return Err(ProtocolViolation::UnknownAllocator(other)),
        })
    }

    /// Whether this call releases memory instead of acquiring it
    #[must_use]
    pub fn is_deallocation(self) -> bool {
        matches!(self, Self::Free | Self::Munmap)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malloc => "malloc",
            Self::Free => "free",
            Self::Calloc => "calloc",
            Self::Realloc => "realloc",
            Self::PosixMemalign => "posix_memalign",
            Self::Memalign => "memalign",
            Self::Valloc => "valloc",
            Self::Pvalloc => "pvalloc",
            Self::Mmap => "mmap",
            Self::Munmap => "munmap",
        }
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields of an allocation record, as written by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    pub tid: ThreadId,
    pub address: u64,
    pub size: u64,
    pub allocator: AllocatorKind,
    /// Interpreter line executing in the innermost frame
    pub py_lineno: i32,
    /// Innermost native frame, [`NativeIndex::NONE`] without native traces
    pub native_index: NativeIndex,
}

impl TryFrom<RawAllocationRecord> for AllocationRecord {
    type Error = ProtocolViolation;

    fn try_from(raw: RawAllocationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            tid: ThreadId(raw.tid.get()),
            address: raw.address.get(),
            size: raw.size.get(),
            allocator: AllocatorKind::decode(raw.allocator)?,
            py_lineno: raw.py_lineno.get(),
            native_index: NativeIndex(raw.native_frame_id.get()),
        })
    }
}

/// One allocation event with the context needed to rebuild its stacks
///
/// `frame_handle` and `native_generation` are only meaningful to the reader
/// that produced the allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub record: AllocationRecord,
    /// Interpreter stack at the time of the call
    pub frame_handle: FrameHandle,
    /// Memory map generation native frames must be resolved against
    pub native_generation: Generation,
}

/// An interpreter frame of an allocation's stack, ready for presentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub function: String,
    pub filename: String,
    pub lineno: i32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.function, self.filename, self.lineno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::byteorder::{I32, U32, U64};

    fn raw(allocator: u8) -> RawAllocationRecord {
        RawAllocationRecord {
            tid: U64::new(3),
            address: U64::new(0xdead_0000),
            size: U64::new(64),
            allocator,
            py_lineno: I32::new(17),
            native_frame_id: U32::new(2),
        }
    }

    #[test]
    fn test_record_from_raw() {
        let record = AllocationRecord::try_from(raw(allocator::CALLOC)).unwrap();
        assert_eq!(record.tid, ThreadId(3));
        assert_eq!(record.address, 0xdead_0000);
        assert_eq!(record.size, 64);
        assert_eq!(record.allocator, AllocatorKind::Calloc);
        assert_eq!(record.py_lineno, 17);
        assert_eq!(record.native_index, NativeIndex(2));
    }

    #[test]
    fn test_unknown_allocator() {
        assert_eq!(
            AllocationRecord::try_from(raw(0)).unwrap_err(),
            ProtocolViolation::UnknownAllocator(0)
        );
        assert!(AllocatorKind::decode(11).is_err());
    }

    #[test]
    fn test_deallocations() {
        let deallocating: Vec<AllocatorKind> = (1..=10)
            .map(|v| AllocatorKind::decode(v).unwrap())
            .filter(|kind| kind.is_deallocation())
            .collect();
        assert_eq!(deallocating, [AllocatorKind::Free, AllocatorKind::Munmap]);
    }

    #[test]
    fn test_allocator_names_match_serde() {
        let kind = AllocatorKind::PosixMemalign;
        assert_eq!(kind.to_string(), "posix_memalign");
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"posix_memalign\"");
    }
}

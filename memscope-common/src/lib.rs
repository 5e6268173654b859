//! # Trace Wire Format (Agent ↔ Reader)
//!
//! Defines the on-disk/on-socket layout written by the allocation tracking
//! agent and consumed by the `memscope` reader. Every fixed-size structure is
//! `#[repr(C)]` and built exclusively from unaligned little-endian field types,
//! so a struct's in-memory bytes are exactly its wire bytes.
//!
//! ## Layout
//!
//! ```text
//! Header   := MAGIC · version:u32 · native_traces:u8 · TrackerStats · cmdline\0
//! Stream   := (tag:u8 · payload)*
//! ```
//!
//! See [`RecordType`] for the payload of each tag.

#![cfg_attr(not(test), no_std)]

use zerocopy::byteorder::{LittleEndian, I32, I64, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ============================================================================
// Header
// ============================================================================

/// Leading bytes of every trace file
pub const MAGIC: [u8; 8] = *b"memscope";

/// The only header version this reader understands
pub const CURRENT_HEADER_VERSION: u32 = 1;

/// Header version, read on its own so it can be checked before the rest
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawVersion {
    pub version: U32<LittleEndian>,
}

/// Fixed part of the header that follows the version
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawHeaderBody {
    /// Non-zero when the agent recorded native stacks
    pub native_traces: u8,
    pub stats: RawTrackerStats,
}

/// Statistics block written by the agent when tracking stops
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawTrackerStats {
    pub n_allocations: U64<LittleEndian>,
    pub n_frames: U64<LittleEndian>,
    /// Milliseconds since the Unix epoch
    pub start_time: I64<LittleEndian>,
    /// Milliseconds since the Unix epoch
    pub end_time: I64<LittleEndian>,
}

// ============================================================================
// Record Tags
// ============================================================================

/// Tag byte preceding every record in the stream
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Payload: [`RawAllocationRecord`]
    Allocation = 1,
    /// Payload: `frame_id:u64 · function\0 · filename\0 · parent_lineno:i32`
    FrameIndex = 2,
    /// Payload: [`RawFrameSeqEntry`]
    Frame = 3,
    /// Payload: [`RawNativeFrame`]
    NativeTraceIndex = 4,
    /// No payload
    MemoryMapStart = 5,
    /// Payload: `filename\0 · num_segments:u64 · base_addr:u64 · SEGMENT*`
    SegmentHeader = 6,
    /// Payload: [`RawSegment`]; only valid inside a segment header
    Segment = 7,
}

impl RecordType {
    /// Decode a tag byte, returning `None` for values the format doesn't define
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Allocation,
            2 => Self::FrameIndex,
            3 => Self::Frame,
            4 => Self::NativeTraceIndex,
            5 => Self::MemoryMapStart,
            6 => Self::SegmentHeader,
            7 => Self::Segment,
            _ => return None,
        })
    }
}

// ============================================================================
// Stack Events
// ============================================================================

/// A frame was entered on thread `tid`
pub const FRAME_PUSH: u8 = 1;

/// The innermost frame of thread `tid` returned
pub const FRAME_POP: u8 = 2;

/// One push/pop event of a thread's interpreter stack
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawFrameSeqEntry {
    pub tid: U64<LittleEndian>,
    /// [`FRAME_PUSH`] or [`FRAME_POP`]
    pub action: u8,
    /// Ignored by the reader for pops
    pub frame_id: U64<LittleEndian>,
}

/// Fixed head of a frame index record
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawFrameIndexId {
    pub frame_id: U64<LittleEndian>,
}

/// Fixed tail of a frame index record
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawParentLineno {
    pub parent_lineno: I32<LittleEndian>,
}

/// An unresolved native frame: instruction pointer plus a link to its caller
///
/// `caller_index` is the 1-based position of the caller entry in the native
/// frame table, or 0 when this frame is the outermost one.
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawNativeFrame {
    pub ip: U64<LittleEndian>,
    pub caller_index: U32<LittleEndian>,
}

// ============================================================================
// Allocations
// ============================================================================

/// Allocator entry point numbering used in [`RawAllocationRecord::allocator`]
pub mod allocator {
    pub const MALLOC: u8 = 1;
    pub const FREE: u8 = 2;
    pub const CALLOC: u8 = 3;
    pub const REALLOC: u8 = 4;
    pub const POSIX_MEMALIGN: u8 = 5;
    pub const MEMALIGN: u8 = 6;
    pub const VALLOC: u8 = 7;
    pub const PVALLOC: u8 = 8;
    pub const MMAP: u8 = 9;
    pub const MUNMAP: u8 = 10;
}

/// A single allocator call as laid out on the wire
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawAllocationRecord {
    pub tid: U64<LittleEndian>,
    pub address: U64<LittleEndian>,
    pub size: U64<LittleEndian>,
    /// One of the [`allocator`] constants
    pub allocator: u8,
    /// Interpreter line active when the allocation happened
    pub py_lineno: I32<LittleEndian>,
    /// 1-based index of the innermost native frame, 0 if none was recorded
    pub native_frame_id: U32<LittleEndian>,
}

// ============================================================================
// Memory Maps
// ============================================================================

/// Fixed part of a segment header, after the NUL-terminated filename
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawSegmentHeader {
    pub num_segments: U64<LittleEndian>,
    /// Load bias of the shared object
    pub base_addr: U64<LittleEndian>,
}

/// One `PT_LOAD` style segment of a mapped shared object
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes, FromZeroes, Unaligned)]
pub struct RawSegment {
    pub vaddr: U64<LittleEndian>,
    pub memsz: U64<LittleEndian>,
}

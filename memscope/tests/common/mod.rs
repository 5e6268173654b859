#![allow(dead_code)]

use std::cell::RefCell;
use std::io::Cursor;

use memscope::domain::Generation;
use memscope::reader::RecordReader;
use memscope::source::StreamSource;
use memscope::symbolization::{
    InlinedFrame, MappedImage, MemoryMaps, ResolvedFrame, Segment, SymbolResolver,
};
use memscope_common::{
    RawAllocationRecord, RawFrameIndexId, RawFrameSeqEntry, RawHeaderBody, RawNativeFrame,
    RawParentLineno, RawSegment, RawSegmentHeader, RawTrackerStats, RawVersion, RecordType,
    CURRENT_HEADER_VERSION, FRAME_POP, FRAME_PUSH, MAGIC,
};
use zerocopy::byteorder::{I32, I64, U32, U64};
use zerocopy::AsBytes;

pub type TestReader = RecordReader<StreamSource<Cursor<Vec<u8>>>, MockResolver>;

/// Writes trace bytes the way the tracking agent does
pub struct TraceBuilder {
    bytes: Vec<u8>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::with_header(true, "python3 app.py")
    }

    pub fn with_header(native_traces: bool, command_line: &str) -> Self {
        let mut bytes = MAGIC.to_vec();
        let version = RawVersion { version: U32::new(CURRENT_HEADER_VERSION) };
        bytes.extend_from_slice(version.as_bytes());
        let body = RawHeaderBody {
            native_traces: u8::from(native_traces),
            stats: RawTrackerStats {
                n_allocations: U64::new(0),
                n_frames: U64::new(0),
                start_time: I64::new(1_700_000_000_000),
                end_time: I64::new(1_700_000_002_500),
            },
        };
        bytes.extend_from_slice(body.as_bytes());
        bytes.extend_from_slice(command_line.as_bytes());
        bytes.push(0);
        Self { bytes }
    }

    fn tag(mut self, record: RecordType) -> Self {
        self.bytes.push(record as u8);
        self
    }

    fn cstring(mut self, s: &str) -> Self {
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self
    }

    fn payload<T: AsBytes>(mut self, value: &T) -> Self {
        self.bytes.extend_from_slice(value.as_bytes());
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn frame_index(
        self,
        frame_id: u64,
        function: &str,
        filename: &str,
        parent_lineno: i32,
    ) -> Self {
        self.tag(RecordType::FrameIndex)
            .payload(&RawFrameIndexId { frame_id: U64::new(frame_id) })
            .cstring(function)
            .cstring(filename)
            .payload(&RawParentLineno { parent_lineno: I32::new(parent_lineno) })
    }

    pub fn frame_action(self, tid: u64, action: u8, frame_id: u64) -> Self {
        self.tag(RecordType::Frame).payload(&RawFrameSeqEntry {
            tid: U64::new(tid),
            action,
            frame_id: U64::new(frame_id),
        })
    }

    pub fn push(self, tid: u64, frame_id: u64) -> Self {
        self.frame_action(tid, FRAME_PUSH, frame_id)
    }

    pub fn pop(self, tid: u64) -> Self {
        self.frame_action(tid, FRAME_POP, 0)
    }

    pub fn allocation_with(
        self,
        tid: u64,
        address: u64,
        size: u64,
        allocator: u8,
        py_lineno: i32,
        native_frame_id: u32,
    ) -> Self {
        self.tag(RecordType::Allocation).payload(&RawAllocationRecord {
            tid: U64::new(tid),
            address: U64::new(address),
            size: U64::new(size),
            allocator,
            py_lineno: I32::new(py_lineno),
            native_frame_id: U32::new(native_frame_id),
        })
    }

    /// A `malloc` of 64 bytes without native stack
    pub fn allocation(self, tid: u64, py_lineno: i32) -> Self {
        self.allocation_with(tid, 0x1000, 64, memscope_common::allocator::MALLOC, py_lineno, 0)
    }

    pub fn native_frame(self, ip: u64, caller_index: u32) -> Self {
        self.tag(RecordType::NativeTraceIndex).payload(&RawNativeFrame {
            ip: U64::new(ip),
            caller_index: U32::new(caller_index),
        })
    }

    pub fn memory_map_start(self) -> Self {
        self.tag(RecordType::MemoryMapStart)
    }

    pub fn segment_header(self, filename: &str, base_addr: u64, segments: &[(u64, u64)]) -> Self {
        let mut builder = self.tag(RecordType::SegmentHeader).cstring(filename).payload(
            &RawSegmentHeader {
                num_segments: U64::new(segments.len() as u64),
                base_addr: U64::new(base_addr),
            },
        );
        for &(vaddr, memsz) in segments {
            builder = builder
                .tag(RecordType::Segment)
                .payload(&RawSegment { vaddr: U64::new(vaddr), memsz: U64::new(memsz) });
        }
        builder
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    pub fn open(self) -> TestReader {
        RecordReader::open(StreamSource::new(Cursor::new(self.build())), MockResolver::default())
            .expect("Failed to open trace")
    }
}

/// Resolver that names every mapped address `<file>+0x<offset>` and records
/// which generations it was asked about
#[derive(Default)]
pub struct MockResolver {
    maps: MemoryMaps,
    pub queried: RefCell<Vec<Generation>>,
}

impl SymbolResolver for MockResolver {
    fn clear_segments(&mut self) {
        self.maps.clear();
    }

    fn add_segments(&mut self, filename: &str, base_addr: u64, segments: Vec<Segment>) {
        self.maps.add_image(MappedImage { filename: filename.to_string(), base_addr, segments });
    }

    fn current_generation(&self) -> Generation {
        self.maps.current_generation()
    }

    fn resolve(&self, ip: u64, generation: Generation) -> Option<ResolvedFrame> {
        self.queried.borrow_mut().push(generation);
        let image = self.maps.find(ip, generation)?;
        let function = format!("{}+0x{:x}", image.filename, image.object_address(ip));
        Some(ResolvedFrame { addr: ip, frames: vec![InlinedFrame { function, location: None }] })
    }
}

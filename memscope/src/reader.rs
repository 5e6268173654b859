//! Record decode loop
//!
//! [`RecordReader`] pulls records from a [`Source`] until it reaches the
//! next allocation, replaying every frame, native frame and memory map
//! record on the way into its tables. The returned [`Allocation`] holds
//! only handles into those tables; [`RecordReader::stack_trace`] and
//! [`RecordReader::native_stack_trace`] turn them back into frames.
//!
//! ```text
//!   open ──► Active ──(tag)──► dispatch ──► Active
//!              │                   │
//!              │ source ends       │ violation / I/O error
//!              ▼                   ▼
//!          Exhausted            Failed
//!        (Ok(None) forever)   (Err(Aborted) forever)
//! ```

use log::{debug, info};
use memscope_common::{
    RawAllocationRecord, RawFrameIndexId, RawFrameSeqEntry, RawNativeFrame, RawParentLineno,
    RawSegment, RawSegmentHeader, RecordType,
};
use std::iter::FusedIterator;
use std::path::Path;
use zerocopy::{AsBytes, FromBytes};

use crate::allocation::{Allocation, AllocationRecord, StackFrame};
use crate::domain::{
    FrameHandle, Generation, NativeIndex, ProtocolViolation, ReaderError, SourceError, ThreadId,
};
use crate::frames::{Ancestors, FrameAction, FrameTable, FrameTree, StackReplayer};
use crate::header::Header;
use crate::native::NativeFrameTable;
use crate::source::{read_struct, FileSource, Source, SourceConfig};
use crate::symbolization::{NativeFrame, Segment, SegmentResolver, SymbolResolver};

/// Upper bound on segments preallocated for one header, whatever it claims
const MAX_SEGMENT_PREALLOCATION: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Active,
    Exhausted,
    Failed,
}

/// Forward-only decoder of one trace
pub struct RecordReader<S: Source, R: SymbolResolver> {
    source: S,
    resolver: R,
    header: Header,
    state: ReaderState,
    frames: FrameTable,
    stacks: StackReplayer,
    tree: FrameTree,
    native_frames: NativeFrameTable,
    allocations_read: u64,
}

impl RecordReader<FileSource, SegmentResolver> {
    /// Open a trace file with the default DWARF-backed resolver
    ///
    /// # Errors
    /// I/O errors opening the file plus everything [`RecordReader::open`]
    /// reports.
    pub fn from_path<P: AsRef<Path>>(path: P, config: &SourceConfig) -> Result<Self, ReaderError> {
        let source = FileSource::open(path, config)?;
        Self::open(source, SegmentResolver::new())
    }
}

impl<S: Source, R: SymbolResolver> RecordReader<S, R> {
    /// Read the header and prepare to decode records
    ///
    /// # Errors
    /// [`FormatError`](crate::domain::FormatError) if `source` doesn't start
    /// with a supported header.
    pub fn open(mut source: S, resolver: R) -> Result<Self, ReaderError> {
        let header = Header::read(&mut source)?;
        Ok(Self {
            source,
            resolver,
            header,
            state: ReaderState::Active,
            frames: FrameTable::new(),
            stacks: StackReplayer::new(),
            tree: FrameTree::new(),
            native_frames: NativeFrameTable::new(),
            allocations_read: 0,
        })
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.source.is_open()
    }

    pub fn close(&mut self) {
        self.source.close();
    }

    /// Decode records until the next allocation
    ///
    /// Returns `Ok(None)` once the source ends between records, and keeps
    /// doing so on every later call.
    ///
    /// # Errors
    /// The first malformed record or I/O failure is returned as is; every
    /// call after that fails with [`ReaderError::Aborted`].
    pub fn next_allocation(&mut self) -> Result<Option<Allocation>, ReaderError> {
        match self.state {
            ReaderState::Exhausted => return Ok(None),
            ReaderState::Failed => return Err(ReaderError::Aborted),
            ReaderState::Active => {}
        }

        match self.decode_until_allocation() {
            Ok(Some(allocation)) => {
                self.allocations_read += 1;
                Ok(Some(allocation))
            }
            Ok(None) => {
                self.state = ReaderState::Exhausted;
                info!(
                    "Trace exhausted after {} allocations from {} threads \
                     ({} frames, {} stack nodes, {} native frames)",
                    self.allocations_read,
                    self.stacks.thread_count(),
                    self.frames.len(),
                    self.tree.len(),
                    self.native_frames.len()
                );
                Ok(None)
            }
            Err(e) => {
                self.state = ReaderState::Failed;
                Err(e)
            }
        }
    }

    /// Iterate over the remaining allocations
    ///
    /// Yields at most one error, then ends.
    pub fn allocations(&mut self) -> Allocations<'_, S, R> {
        Allocations { reader: self }
    }

    /// Interpreter frames of `handle`, innermost first, decoded lazily
    #[must_use]
    pub fn frames(&self, handle: FrameHandle, max_depth: usize) -> StackFrames<'_> {
        StackFrames {
            ancestors: self.tree.ancestors(handle, max_depth),
            table: &self.frames,
            caller_lineno: None,
            failed: false,
        }
    }

    /// Interpreter stack of `handle`, innermost first, at most `max_depth` frames
    ///
    /// # Errors
    /// [`ProtocolViolation::UnknownStackFrameReference`] if the stack refers
    /// to a frame that was never registered.
    pub fn stack_trace(
        &self,
        handle: FrameHandle,
        max_depth: usize,
    ) -> Result<Vec<StackFrame>, ProtocolViolation> {
        self.frames(handle, max_depth).collect()
    }

    /// Native stack of `index` as mapped in `generation`, innermost first
    ///
    /// `max_depth` bounds the number of native table entries visited;
    /// inlined calls may make the result longer.
    ///
    /// # Errors
    /// [`ProtocolViolation::UnknownNativeFrameReference`] if `index` was never
    /// recorded.
    pub fn native_stack_trace(
        &self,
        index: NativeIndex,
        generation: Generation,
        max_depth: usize,
    ) -> Result<Vec<NativeFrame>, ProtocolViolation> {
        self.native_frames.resolve(index, generation, max_depth, &self.resolver)
    }

    fn decode_until_allocation(&mut self) -> Result<Option<Allocation>, ReaderError> {
        loop {
            let mut tag = 0u8;
            match self.source.read_exact(tag.as_bytes_mut()) {
                Ok(()) => {}
                Err(SourceError::Exhausted) => return Ok(None),
                Err(SourceError::Io(e)) => return Err(e.into()),
            }

            match RecordType::from_u8(tag) {
                Some(RecordType::Allocation) => return self.parse_allocation().map(Some),
                Some(RecordType::Frame) => self.parse_frame()?,
                Some(RecordType::FrameIndex) => self.parse_frame_index()?,
                Some(RecordType::NativeTraceIndex) => self.parse_native_frame()?,
                Some(RecordType::MemoryMapStart) => {
                    debug!("Memory map start");
                    self.resolver.clear_segments();
                }
                Some(RecordType::SegmentHeader) => self.parse_segment_header()?,
                // Segments only ever appear inside a segment header
                Some(RecordType::Segment) | None => {
                    return Err(ProtocolViolation::UnknownRecordTag(tag).into())
                }
            }
        }
    }

    fn parse_allocation(&mut self) -> Result<Allocation, ReaderError> {
        let raw: RawAllocationRecord = self.read(RecordType::Allocation)?;
        let record = AllocationRecord::try_from(raw)?;

        let frame_handle = match self.stacks.stack_mut(record.tid) {
            Some(stack) => {
                self.frames.correct_top_of_stack(stack, record.py_lineno)?;
                self.tree.get_handle(stack)
            }
            None => FrameHandle::ROOT,
        };

        Ok(Allocation {
            record,
            frame_handle,
            native_generation: self.resolver.current_generation(),
        })
    }

    fn parse_frame(&mut self) -> Result<(), ReaderError> {
        let entry: RawFrameSeqEntry = self.read(RecordType::Frame)?;
        let tid = ThreadId(entry.tid.get());
        let action = FrameAction::decode(entry.action, entry.frame_id.get())?;
        debug!("{tid}: {action:?}");
        self.stacks.apply(tid, action)?;
        Ok(())
    }

    fn parse_frame_index(&mut self) -> Result<(), ReaderError> {
        let frame_id = self.read::<RawFrameIndexId>(RecordType::FrameIndex)?.frame_id.get();
        let function_name = self.read_cstring(RecordType::FrameIndex)?;
        let filename = self.read_cstring(RecordType::FrameIndex)?;
        let parent_lineno =
            self.read::<RawParentLineno>(RecordType::FrameIndex)?.parent_lineno.get();

        debug!("Frame {frame_id}: {function_name} ({filename}:{parent_lineno})");
        self.frames.register(frame_id, &function_name, &filename, parent_lineno)?;
        Ok(())
    }

    fn parse_native_frame(&mut self) -> Result<(), ReaderError> {
        let raw: RawNativeFrame = self.read(RecordType::NativeTraceIndex)?;
        self.native_frames.record(raw.ip.get(), NativeIndex(raw.caller_index.get()))?;
        Ok(())
    }

    fn parse_segment_header(&mut self) -> Result<(), ReaderError> {
        let filename = self.read_cstring(RecordType::SegmentHeader)?;
        let raw: RawSegmentHeader = self.read(RecordType::SegmentHeader)?;
        let num_segments = raw.num_segments.get();

        let capacity = usize::try_from(num_segments)
            .unwrap_or(usize::MAX)
            .min(MAX_SEGMENT_PREALLOCATION);
        let mut segments = Vec::with_capacity(capacity);
        for _ in 0..num_segments {
            let mut tag = 0u8;
            self.read_into(RecordType::Segment, tag.as_bytes_mut())?;
            if tag != RecordType::Segment as u8 {
                return Err(ProtocolViolation::UnexpectedSegmentTag(tag).into());
            }
            let segment: RawSegment = self.read(RecordType::Segment)?;
            segments.push(Segment { vaddr: segment.vaddr.get(), memsz: segment.memsz.get() });
        }

        self.resolver.add_segments(&filename, raw.base_addr.get(), segments);
        Ok(())
    }

    /// Read a fixed-size payload of a record whose tag was already consumed
    fn read<T: AsBytes + FromBytes>(&mut self, record: RecordType) -> Result<T, ReaderError> {
        read_struct(&mut self.source).map_err(|e| mid_record(e, record))
    }

    fn read_into(&mut self, record: RecordType, buf: &mut [u8]) -> Result<(), ReaderError> {
        self.source.read_exact(buf).map_err(|e| mid_record(e, record))
    }

    fn read_cstring(&mut self, record: RecordType) -> Result<String, ReaderError> {
        self.source.read_cstring().map_err(|e| mid_record(e, record))
    }
}

fn mid_record(err: SourceError, record: RecordType) -> ReaderError {
    match err {
        SourceError::Exhausted => ProtocolViolation::TruncatedRecord(record).into(),
        SourceError::Io(e) => e.into(),
    }
}

/// Iterator returned by [`RecordReader::allocations`]
pub struct Allocations<'a, S: Source, R: SymbolResolver> {
    reader: &'a mut RecordReader<S, R>,
}

impl<S: Source, R: SymbolResolver> Iterator for Allocations<'_, S, R> {
    type Item = Result<Allocation, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.state {
            ReaderState::Active => self.reader.next_allocation().transpose(),
            ReaderState::Exhausted | ReaderState::Failed => None,
        }
    }
}

impl<S: Source, R: SymbolResolver> FusedIterator for Allocations<'_, S, R> {}

/// Iterator returned by [`RecordReader::frames`]
///
/// The innermost frame reports the line its allocation happened at; every
/// caller reports the line that called into the frame below it.
pub struct StackFrames<'a> {
    ancestors: Ancestors<'a>,
    table: &'a FrameTable,
    caller_lineno: Option<i32>,
    failed: bool,
}

impl Iterator for StackFrames<'_> {
    type Item = Result<StackFrame, ProtocolViolation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let node = self.ancestors.next()?;
        let frame = match self.table.lookup(node.frame_id) {
            Ok(frame) => frame,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        let lineno = self.caller_lineno.unwrap_or_else(|| frame.lineno.unwrap_or(0));
        self.caller_lineno = Some(frame.parent_lineno);
        Some(Ok(StackFrame {
            function: frame.function_name.to_string(),
            filename: frame.filename.to_string(),
            lineno,
        }))
    }
}

impl FusedIterator for StackFrames<'_> {}

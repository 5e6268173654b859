//! Structured error types for memscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! End of data is deliberately absent from [`ReaderError`]: a trace that
//! ends cleanly between records is reported as `Ok(None)`.

use super::types::{FrameId, NativeIndex, ThreadId};
use memscope_common::RecordType;
use thiserror::Error;

/// The input is not a trace this reader can decode
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("The provided input does not look like a memscope trace")]
    NotATrace,

    #[error("Unsupported trace version {found} (this reader supports version {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("The trace ended inside its header")]
    TruncatedHeader,
}

/// The record stream is malformed
///
/// Every variant is fatal: the reader stops producing allocations once one
/// has been reported.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("Two entries with the same frame id {0} found")]
    DuplicateFrameId(u64),

    #[error("Pop on empty stack of {0}")]
    StackUnderflow(ThreadId),

    #[error("Invalid record type {0}")]
    UnknownRecordTag(u8),

    #[error("Stack references unregistered {0}")]
    UnknownStackFrameReference(FrameId),

    #[error("Invalid frame action {0}")]
    UnknownFrameAction(u8),

    #[error("Invalid allocator kind {0}")]
    UnknownAllocator(u8),

    #[error("Expected a segment record inside segment header, found tag {0}")]
    UnexpectedSegmentTag(u8),

    #[error("Native frame links to caller {caller} but only {len} frames are known")]
    InvalidNativeCaller { caller: u32, len: usize },

    #[error("Native frame table cannot address more than u32::MAX frames")]
    NativeFrameTableFull,

    #[error("Reference to unknown {0}")]
    UnknownNativeFrameReference(NativeIndex),

    #[error("Trace ended in the middle of a {0:?} record")]
    TruncatedRecord(RecordType),
}

/// Failure reported by a [`Source`](crate::source::Source)
#[derive(Error, Debug)]
pub enum SourceError {
    /// No more bytes will ever arrive
    #[error("Source exhausted")]
    Exhausted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error("Failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reading was aborted by an earlier error")]
    Aborted,
}

impl ReaderError {
    /// Returns the protocol violation behind this error, if any
    #[must_use]
    pub fn as_protocol_violation(&self) -> Option<&ProtocolViolation> {
        match self {
            Self::Protocol(violation) => Some(violation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_display() {
        let err = FormatError::VersionMismatch { found: 7, expected: 1 };
        assert_eq!(
            err.to_string(),
            "Unsupported trace version 7 (this reader supports version 1)"
        );
    }

    #[test]
    fn test_underflow_display() {
        let err = ProtocolViolation::StackUnderflow(ThreadId(12));
        assert_eq!(err.to_string(), "Pop on empty stack of TID:12");
    }

    #[test]
    fn test_reader_error_exposes_violation() {
        let err = ReaderError::from(ProtocolViolation::UnknownRecordTag(99));
        assert_eq!(err.as_protocol_violation(), Some(&ProtocolViolation::UnknownRecordTag(99)));
        assert!(ReaderError::Aborted.as_protocol_violation().is_none());
    }
}

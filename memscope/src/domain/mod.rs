//! Domain model for memscope
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time separation of the many integer ids flowing through a trace
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{FrameHandle, FrameId, Generation, NativeIndex, ThreadId};

pub use errors::{FormatError, ProtocolViolation, ReaderError, SourceError};

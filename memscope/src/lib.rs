//! # memscope - Allocation Trace Decoder
//!
//! memscope reads the binary trace written by a memory allocation tracking
//! agent and rebuilds, for every recorded allocator call, the interpreter
//! stack (and optionally the native stack) that was live when it happened.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Tracked process + agent                      │
//! └───────────────────────┬──────────────────────────────────────┘
//!                         │ header · (tag · payload)*
//!                         ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Source (file / TCP)  ──▶  RecordReader (decode loop)        │
//! │                              │                               │
//! │        ┌─────────────────────┼──────────────────┐            │
//! │        ▼                     ▼                  ▼            │
//! │  StackReplayer ─▶ FrameTable ─▶ FrameTree  NativeFrameTable  │
//! │  (push/pop)       (line fixup)  (handles)       │            │
//! │                                                 ▼            │
//! │                                   SymbolResolver (maps)      │
//! └───────────────────────┬──────────────────────────────────────┘
//!                         │ Allocation { record, handle, generation }
//!                         ▼
//!               stack_trace / native_stack_trace / export
//! ```
//!
//! ## Module Structure
//!
//! - [`source`]: the [`Source`](source::Source) trait plus file, socket and
//!   generic stream implementations
//! - [`header`]: magic/version validation and tracker statistics
//! - [`frames`]: frame table, per-thread stack replay and the suffix tree
//!   that gives every distinct stack a compact handle
//! - [`native`]: append-only native frame table linked by caller indices
//! - [`symbolization`]: memory map generations and DWARF symbolization
//! - [`reader`]: the decode loop producing [`Allocation`](allocation::Allocation)s
//! - [`export`]: JSON-lines export and aggregate summaries
//! - [`cli`]: command-line argument parsing
//! - [`domain`]: id newtypes and structured errors
//!
//! ## Typical Usage
//!
//! ```no_run
//! use memscope::reader::RecordReader;
//! use memscope::source::SourceConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut reader = RecordReader::from_path("trace.bin", &SourceConfig::default())?;
//! while let Some(allocation) = reader.next_allocation()? {
//!     for frame in reader.stack_trace(allocation.frame_handle, 16)? {
//!         println!("{frame}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod allocation;
pub mod cli;
pub mod domain;
pub mod export;
pub mod frames;
pub mod header;
pub mod native;
pub mod reader;
pub mod source;
pub mod symbolization;

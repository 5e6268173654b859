//! # Native Symbol Resolution
//!
//! Native frames arrive as raw instruction pointers of the traced process.
//! Turning them into function names, file paths and line numbers requires
//! knowing which shared object was mapped at that address *at the time the
//! allocation happened*.
//!
//! ## Memory Map Generations
//!
//! The agent describes the traced process's memory map with a
//! `MEMORY_MAP_START` record followed by one `SEGMENT_HEADER` per loaded
//! object. Every `SEGMENT_HEADER` produces a new **generation**: a frozen view
//! of all objects registered since the last `MEMORY_MAP_START`. Allocations
//! remember the generation that was current when they were decoded, so a
//! library that is unloaded (or re-mapped elsewhere) later in the trace does
//! not change how their stacks resolve.
//!
//! ```text
//! MEMORY_MAP_START
//! SEGMENT_HEADER libc.so      -> gen 1 = {libc}
//! SEGMENT_HEADER python3      -> gen 2 = {libc, python3}
//! ALLOCATION                  (captures gen 2)
//! MEMORY_MAP_START
//! SEGMENT_HEADER libc.so      -> gen 3 = {libc}
//! ALLOCATION                  (captures gen 3)
//! ```
//!
//! ## Address Translation
//!
//! ```text
//! Runtime Address = Load Bias + Object Address
//! Object Address  = Runtime Address - Load Bias
//! ```
//!
//! A segment `(vaddr, memsz)` of an object loaded at bias `base` covers
//! `[base + vaddr, base + vaddr + memsz)`. The object address is then looked
//! up in the object's DWARF line tables, falling back to its symbol table
//! for stripped objects.
//!
//! ## Module Structure
//!
//! - **`memory_maps`**: segments, mapped images and the generation arena
//! - **`symbolizer`**: DWARF/symbol-table lookups for one object file
//! - **`resolver`**: the [`SymbolResolver`] trait and [`SegmentResolver`],
//!   which ties the two together with per-file symbolizer caching
//!
//! **Libraries used**:
//! - `gimli`: Low-level DWARF parser
//! - `addr2line`: High-level symbolization library built on gimli
//! - `object`: ELF binary parser
//! - `rustc-demangle`: Rust symbol demangling for symbol-table fallbacks

pub mod memory_maps;
pub mod resolver;
pub mod symbolizer;

pub use memory_maps::{MappedImage, MemoryMaps, MemoryRange, Segment};
pub use resolver::{SegmentResolver, SymbolResolver};
pub use symbolizer::{InlinedFrame, NativeFrame, ResolvedFrame, SourceLocation, Symbolizer};

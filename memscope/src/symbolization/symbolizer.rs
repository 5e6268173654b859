use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianRcSlice, RunTimeEndian};
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};
use rustc_demangle::demangle;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// A function symbol from the object's symbol table
#[derive(Debug, Clone)]
struct FunctionSymbol {
    start: u64,
    size: u64,
    name: String,
}

/// Resolves object addresses of one ELF file to functions and source lines
///
/// DWARF line tables are preferred. Objects shipped without debug info
/// still resolve to function names through their (dynamic) symbol table.
/// Results are cached per address, including misses.
pub struct Symbolizer {
    ctx: Context<EndianRcSlice<RunTimeEndian>>,
    /// Text symbols sorted by start address
    symbols: Vec<FunctionSymbol>,
    cache: RefCell<HashMap<u64, Option<ResolvedFrame>>>,
}

impl Symbolizer {
    /// Create a new symbolizer for the given binary
    ///
    /// # Errors
    /// Returns an error if the binary file cannot be read or parsed
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let binary_data = fs::read(binary_path.as_ref()).with_context(|| {
            format!("Failed to read binary file {}", binary_path.as_ref().display())
        })?;

        let obj_file = object::File::parse(&*binary_data).context("Failed to parse object file")?;

        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianRcSlice::new(Rc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF debug information")?;

        let mut symbols: Vec<FunctionSymbol> = obj_file
            .symbols()
            .chain(obj_file.dynamic_symbols())
            .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.address() != 0)
            .filter_map(|symbol| {
                let name = symbol.name().ok()?;
                (!name.is_empty()).then(|| FunctionSymbol {
                    start: symbol.address(),
                    size: symbol.size(),
                    name: Self::demangle_symbol(name),
                })
            })
            .collect();
        symbols.sort_by_key(|symbol| symbol.start);
        symbols.dedup_by_key(|symbol| symbol.start);

        Ok(Self { ctx, symbols, cache: RefCell::new(HashMap::new()) })
    }

    /// Resolve an object address to its (possibly inlined) frames
    ///
    /// Returns `None` when neither debug info nor the symbol table know the
    /// address.
    pub fn resolve(&self, addr: u64) -> Option<ResolvedFrame> {
        if let Some(cached) = self.cache.borrow().get(&addr) {
            return cached.clone();
        }

        let mut frames = self.resolve_dwarf(addr);
        if frames.is_empty() {
            frames.extend(
                self.lookup_symbol(addr)
                    .map(|name| InlinedFrame { function: name.to_string(), location: None }),
            );
        }
        let resolved = (!frames.is_empty()).then_some(ResolvedFrame { addr, frames });

        self.cache.borrow_mut().insert(addr, resolved.clone());
        resolved
    }

    fn resolve_dwarf(&self, addr: u64) -> Vec<InlinedFrame> {
        let mut result = Vec::new();

        if let Ok(mut frame_iter) = self.ctx.find_frames(addr).skip_all_loads() {
            while let Ok(Some(frame)) = frame_iter.next() {
                let function = frame
                    .function
                    .and_then(|f| f.demangle().ok().map(|s| s.to_string()))
                    .or_else(|| self.lookup_symbol(addr).map(str::to_string));

                let location = frame.location.map(|loc| SourceLocation {
                    file: loc.file.map(std::string::ToString::to_string),
                    line: loc.line,
                    column: loc.column,
                });

                if function.is_none() && location.is_none() {
                    continue;
                }
                let function = function.unwrap_or_else(|| "<unknown>".to_string());
                result.push(InlinedFrame { function, location });
            }
        }

        result
    }

    fn lookup_symbol(&self, addr: u64) -> Option<&str> {
        let after = self.symbols.partition_point(|symbol| symbol.start <= addr);
        let symbol = self.symbols.get(after.checked_sub(1)?)?;
        // Zero-sized symbols (common in hand-written assembly) match up to the next one
        let covers = symbol.size == 0 || addr < symbol.start.saturating_add(symbol.size);
        covers.then_some(symbol.name.as_str())
    }

    /// Demangle a Rust symbol name
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }
}

/// A resolved stack frame (may contain multiple inlined frames)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub addr: u64,
    /// Innermost inlined call first
    pub frames: Vec<InlinedFrame>,
}

/// An inlined frame within a resolved frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedFrame {
    pub function: String,
    pub location: Option<SourceLocation>,
}

/// Source code location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// One symbolized native frame, flattened for presentation and export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeFrame {
    /// Runtime instruction pointer in the traced process
    pub address: u64,
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl ResolvedFrame {
    /// Flatten into one [`NativeFrame`] per inlined call, innermost first
    #[must_use]
    pub fn into_native_frames(self) -> Vec<NativeFrame> {
        let address = self.addr;
        self.frames
            .into_iter()
            .map(|inlined| {
                let (file, line) =
                    inlined.location.map_or((None, None), |loc| (loc.file, loc.line));
                NativeFrame { address, function: inlined.function, file, line }
            })
            .collect()
    }
}

impl fmt::Display for NativeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x} {}", self.address, self.function)?;
        if let Some(ref file) = self.file {
            write!(f, " at {file}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved() -> ResolvedFrame {
        ResolvedFrame {
            addr: 0x1234,
            frames: vec![
                InlinedFrame {
                    function: "inner".to_string(),
                    location: Some(SourceLocation {
                        file: Some("lib.c".to_string()),
                        line: Some(10),
                        column: Some(3),
                    }),
                },
                InlinedFrame { function: "outer".to_string(), location: None },
            ],
        }
    }

    #[test]
    fn test_into_native_frames_keeps_order_and_address() {
        let frames = resolved().into_native_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function, "inner");
        assert_eq!(frames[0].file.as_deref(), Some("lib.c"));
        assert_eq!(frames[0].line, Some(10));
        assert_eq!(frames[1].function, "outer");
        assert!(frames[1].file.is_none());
        assert!(frames.iter().all(|f| f.address == 0x1234));
    }

    #[test]
    fn test_native_frame_display() {
        let frames = resolved().into_native_frames();
        assert_eq!(frames[0].to_string(), "0x0000000000001234 inner at lib.c:10");
        assert_eq!(frames[1].to_string(), "0x0000000000001234 outer");

        let unnumbered = NativeFrame { line: None, ..frames[0].clone() };
        assert_eq!(unnumbered.to_string(), "0x0000000000001234 inner at lib.c");
    }

    #[test]
    fn test_demangle_symbol() {
        assert_eq!(
            Symbolizer::demangle_symbol("_ZN4core3fmt5write17h0123456789abcdefE"),
            "core::fmt::write"
        );
        assert_eq!(Symbolizer::demangle_symbol("malloc"), "malloc");
    }

    #[test]
    fn test_missing_binary_fails() {
        assert!(Symbolizer::new("/nonexistent/libnothing.so").is_err());
    }

    #[test]
    fn test_resolves_own_test_binary() {
        let exe = std::env::current_exe().unwrap();
        let symbolizer = Symbolizer::new(&exe).unwrap();
        // Repeated lookups hit the cache and agree
        let first = symbolizer.resolve(0x1000);
        assert_eq!(first, symbolizer.resolve(0x1000));
    }
}

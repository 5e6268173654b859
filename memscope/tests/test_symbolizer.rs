use memscope::domain::Generation;
use memscope::symbolization::{Segment, SegmentResolver, SymbolResolver, Symbolizer};

/// Text symbols of `binary_path` as reported by nm: (address, demangled line)
fn text_symbols(binary_path: &str) -> Vec<(u64, String)> {
    let nm_output = std::process::Command::new("nm")
        .args(["-C", binary_path])
        .output()
        .expect("Failed to run nm");

    String::from_utf8_lossy(&nm_output.stdout)
        .lines()
        .filter(|line| line.contains(" T ") || line.contains(" t "))
        .filter_map(|line| {
            let addr_str = line.split_whitespace().next()?;
            let addr = u64::from_str_radix(addr_str, 16).ok()?;
            (addr != 0).then(|| (addr, line.to_string()))
        })
        .collect()
}

#[test]
fn test_symbolizer_creation() {
    // Test that we can create a symbolizer for a binary
    let binary_path = env!("CARGO_BIN_EXE_memscope");

    println!("Testing symbolizer creation on: {binary_path}");

    let symbolizer = Symbolizer::new(binary_path);
    assert!(symbolizer.is_ok(), "Failed to create symbolizer: {:?}", symbolizer.err());
}

#[test]
fn test_symbolizer_resolves_function_names() {
    let binary_path = env!("CARGO_BIN_EXE_memscope");
    let symbolizer = Symbolizer::new(binary_path).expect("Failed to create symbolizer");

    let symbols = text_symbols(binary_path);
    assert!(!symbols.is_empty(), "nm found no text symbols in {binary_path}");

    let mut found_valid_symbol = false;
    for (addr, line) in symbols.iter().take(20) {
        println!("\nTrying address: 0x{addr:x} ({line})");

        let Some(resolved) = symbolizer.resolve(*addr) else {
            continue;
        };
        assert_eq!(resolved.addr, *addr);

        for (idx, frame) in resolved.frames.iter().enumerate() {
            println!("  Frame {idx}: {}", frame.function);
            if frame.function != "<unknown>" {
                found_valid_symbol = true;
            }
        }
    }

    assert!(
        found_valid_symbol,
        "Symbolizer should resolve at least one nm text symbol to a function name"
    );
}

#[test]
fn test_segment_resolver_applies_load_bias() {
    let binary_path = env!("CARGO_BIN_EXE_memscope");
    let symbolizer = Symbolizer::new(binary_path).expect("Failed to create symbolizer");

    // Pick a symbol the symbolizer knows when asked directly
    let (addr, expected) = text_symbols(binary_path)
        .into_iter()
        .find_map(|(addr, _)| symbolizer.resolve(addr).map(|resolved| (addr, resolved)))
        .expect("No resolvable text symbol");

    let base = 0x7f00_0000_0000;
    let mut resolver = SegmentResolver::new();
    resolver.clear_segments();
    resolver.add_segments(binary_path, base, vec![Segment { vaddr: 0, memsz: addr + 0x1000 }]);
    let generation = resolver.current_generation();
    assert_eq!(generation, Generation(1));

    let resolved = resolver.resolve(base + addr, generation).expect("Failed to resolve");
    assert_eq!(resolved.addr, base + addr);
    assert_eq!(resolved.frames, expected.frames);

    // A later map without the binary leaves the old generation intact
    resolver.clear_segments();
    let other = vec![Segment { vaddr: 0, memsz: 0x100 }];
    resolver.add_segments("/nonexistent/libother.so", 0x1000, other);
    assert!(resolver.resolve(base + addr, resolver.current_generation()).is_none());
    assert!(resolver.resolve(base + addr, generation).is_some());
}

#[test]
#[ignore] // Only run if you want to verify full debug info is available
fn test_dwarf_debug_info_available() {
    // This test verifies that DWARF debug info with file:line is available
    // It's ignored by default because it depends on build configuration

    let binary_path = env!("CARGO_BIN_EXE_memscope");
    let symbolizer = Symbolizer::new(binary_path).expect("Failed to create symbolizer");

    for (addr, _) in text_symbols(binary_path).into_iter().take(50) {
        let Some(resolved) = symbolizer.resolve(addr) else {
            continue;
        };
        for frame in &resolved.frames {
            if let Some(ref loc) = frame.location {
                if let (Some(ref file), Some(line)) = (&loc.file, loc.line) {
                    println!("Found debug info: {} at {}:{}", frame.function, file, line);
                    return;
                }
            }
        }
    }

    panic!("No source location found - DWARF debug info not available in this build");
}

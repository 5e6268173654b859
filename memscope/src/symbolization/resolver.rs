use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::memory_maps::{MappedImage, MemoryMaps, Segment};
use super::symbolizer::{ResolvedFrame, Symbolizer};
use crate::domain::Generation;

/// Seam between the decoder and native symbolization
///
/// The reader feeds memory-map records into the resolver as they are
/// decoded and asks it to resolve instruction pointers against the
/// generation captured by an allocation.
pub trait SymbolResolver {
    /// A `MEMORY_MAP_START` was decoded
    fn clear_segments(&mut self);

    /// A `SEGMENT_HEADER` was decoded
    fn add_segments(&mut self, filename: &str, base_addr: u64, segments: Vec<Segment>);

    /// The generation allocations decoded now should capture
    fn current_generation(&self) -> Generation;

    /// Resolve a runtime instruction pointer as the map stood in `generation`
    ///
    /// `None` means the address is not covered by any known object, or the
    /// object couldn't be symbolized.
    fn resolve(&self, ip: u64, generation: Generation) -> Option<ResolvedFrame>;
}

/// [`SymbolResolver`] backed by [`MemoryMaps`] and on-disk ELF objects
///
/// Each object file is loaded at most once; files that fail to load are
/// remembered and reported once.
#[derive(Default)]
pub struct SegmentResolver {
    maps: MemoryMaps,
    symbolizers: RefCell<HashMap<String, Option<Rc<Symbolizer>>>>,
}

impl SegmentResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn symbolizer(&self, filename: &str) -> Option<Rc<Symbolizer>> {
        if let Some(cached) = self.symbolizers.borrow().get(filename) {
            return cached.clone();
        }

        let loaded = match Symbolizer::new(filename) {
            Ok(symbolizer) => {
                debug!("Loaded symbols for {filename}");
                Some(Rc::new(symbolizer))
            }
            Err(e) => {
                warn!("Cannot symbolize {filename}: {e:#}");
                None
            }
        };
        self.symbolizers.borrow_mut().insert(filename.to_string(), loaded.clone());
        loaded
    }
}

impl SymbolResolver for SegmentResolver {
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
        let image = self.maps.find(ip, generation)?;
        let symbolizer = self.symbolizer(&image.filename)?;
        let mut resolved = symbolizer.resolve(image.object_address(ip))?;
        resolved.addr = ip;
        Some(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{Object, ObjectSymbol};

    const BASE: u64 = 0x5555_0000_0000;

    fn whole_file() -> Vec<Segment> {
        vec![Segment { vaddr: 0, memsz: 0x1_0000_0000 }]
    }

    fn main_address(path: &std::path::Path) -> u64 {
        let data = std::fs::read(path).unwrap();
        let file = object::File::parse(&*data).unwrap();
        file.symbols()
            .find(|symbol| symbol.name().is_ok_and(|name| name == "main"))
            .map(|symbol| symbol.address())
            .unwrap()
    }

    #[test]
    fn test_generations_follow_segment_headers() {
        let mut resolver = SegmentResolver::new();
        assert_eq!(resolver.current_generation(), Generation(0));

        resolver.clear_segments();
        assert_eq!(resolver.current_generation(), Generation(0));

        resolver.add_segments("/lib/a.so", BASE, whole_file());
        resolver.add_segments("/lib/b.so", BASE * 2, whole_file());
        assert_eq!(resolver.current_generation(), Generation(2));
        assert_eq!(resolver.maps.images(Generation(2)).len(), 2);
    }

    #[test]
    fn test_unmapped_address_is_unresolved() {
        let resolver = SegmentResolver::new();
        assert!(resolver.resolve(0x1234, Generation(0)).is_none());
    }

    #[test]
    fn test_unloadable_object_is_cached_as_failure() {
        let mut resolver = SegmentResolver::new();
        resolver.add_segments("/nonexistent/libgone.so", BASE, whole_file());
        let generation = resolver.current_generation();

        assert!(resolver.resolve(BASE + 0x10, generation).is_none());
        assert!(resolver.resolve(BASE + 0x20, generation).is_none());
        assert_eq!(resolver.symbolizers.borrow().len(), 1);
        assert!(resolver.symbolizers.borrow()["/nonexistent/libgone.so"].is_none());
    }

    #[test]
    fn test_resolves_through_load_bias() {
        let exe = std::env::current_exe().unwrap();
        let main = main_address(&exe);

        let mut resolver = SegmentResolver::new();
        resolver.add_segments(exe.to_str().unwrap(), BASE, whole_file());
        let generation = resolver.current_generation();

        let resolved = resolver.resolve(BASE + main, generation).unwrap();
        assert_eq!(resolved.addr, BASE + main);
        assert!(!resolved.frames.is_empty());

        // The same address is unknown to the empty initial map
        assert!(resolver.resolve(BASE + main, Generation(0)).is_none());
    }
}

//! Memory map bookkeeping for native address resolution
//!
//! Images (shared objects with their load bias and segments) are appended
//! to a single arena and never removed. A generation is just the range of
//! arena entries that made up the map when it was created, so keeping every
//! generation alive costs two integers each.

use log::{debug, info};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use crate::domain::Generation;

/// Address range `[start, end)` in the traced process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// A loadable segment of an object, relative to the object's load bias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub vaddr: u64,
    pub memsz: u64,
}

/// One shared object as mapped into the traced process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedImage {
    pub filename: String,
    /// Load bias: runtime address minus object address
    pub base_addr: u64,
    pub segments: Vec<Segment>,
}

impl MappedImage {
    /// Runtime address ranges covered by this image's segments
    pub fn ranges(&self) -> impl Iterator<Item = MemoryRange> + '_ {
        self.segments.iter().map(|segment| {
            let start = self.base_addr.wrapping_add(segment.vaddr);
            MemoryRange { start, end: start.saturating_add(segment.memsz) }
        })
    }

    /// Translate a runtime address into an address inside the object file
    #[must_use]
    pub fn object_address(&self, addr: u64) -> u64 {
        addr.wrapping_sub(self.base_addr)
    }
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    range: MemoryRange,
    image: usize,
    /// Greatest `range.end` of this and every earlier interval
    reach: u64,
}

/// Every memory map generation of one trace
#[derive(Debug)]
pub struct MemoryMaps {
    images: Vec<MappedImage>,
    /// Arena range of each generation; generation 0 is the empty map
    generations: Vec<Range<usize>>,
    /// Where the map being built by the current `MEMORY_MAP_START` begins
    map_start: usize,
    /// Sorted lookup tables, built on first use per generation
    intervals: RefCell<HashMap<Generation, Rc<[Interval]>>>,
}

impl Default for MemoryMaps {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            generations: vec![0..0],
            map_start: 0,
            intervals: RefCell::new(HashMap::new()),
        }
    }
}

impl MemoryMaps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start describing a fresh memory map
    ///
    /// Takes effect with the next [`MemoryMaps::add_image`]; the current
    /// generation stays valid for allocations decoded until then.
    pub fn clear(&mut self) {
        self.map_start = self.images.len();
        debug!("Memory map cleared at {}", self.current_generation());
    }

    /// Register an image and open a new generation containing it
    pub fn add_image(&mut self, image: MappedImage) -> Generation {
        info!(
            "Mapped {} at 0x{:x} ({} segments)",
            image.filename,
            image.base_addr,
            image.segments.len()
        );
        self.images.push(image);
        self.generations.push(self.map_start..self.images.len());
        self.current_generation()
    }

    #[must_use]
    pub fn current_generation(&self) -> Generation {
        Generation(self.generations.len() - 1)
    }

    /// Images making up `generation`, empty for unknown generations
    #[must_use]
    pub fn images(&self, generation: Generation) -> &[MappedImage] {
        self.generations
            .get(generation.0)
            .map_or(&[], |range| &self.images[range.clone()])
    }

    /// The image covering `addr` in `generation`
    ///
    /// When images overlap, the one whose range starts closest below `addr`
    /// wins.
    #[must_use]
    pub fn find(&self, addr: u64, generation: Generation) -> Option<&MappedImage> {
        let intervals = self.intervals_for(generation);
        let after = intervals.partition_point(|interval| interval.range.start <= addr);
        intervals[..after]
            .iter()
            .rev()
            .take_while(|interval| interval.reach > addr)
            .find(|interval| interval.range.contains(addr))
            .map(|interval| &self.images[interval.image])
    }

    fn intervals_for(&self, generation: Generation) -> Rc<[Interval]> {
        if let Some(cached) = self.intervals.borrow().get(&generation) {
            return Rc::clone(cached);
        }

        let range = self.generations.get(generation.0).cloned().unwrap_or(0..0);
        let mut intervals: Vec<Interval> = range
            .flat_map(|image| {
                self.images[image].ranges().map(move |range| Interval { range, image, reach: 0 })
            })
            .filter(|interval| interval.range.start < interval.range.end)
            .collect();
        intervals.sort_by_key(|interval| interval.range.start);

        let mut reach = 0;
        for interval in &mut intervals {
            reach = reach.max(interval.range.end);
            interval.reach = reach;
        }

        let intervals: Rc<[Interval]> = intervals.into();
        self.intervals.borrow_mut().insert(generation, Rc::clone(&intervals));
        intervals
    }
}

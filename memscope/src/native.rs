//! Native (C-level) frame table
//!
//! The agent writes each distinct native frame once, as an instruction
//! pointer plus the index of its caller's entry. A native stack is then
//! identified by the index of its innermost frame, and walking it means
//! following caller indices until 0.

use std::iter::FusedIterator;

use crate::domain::{Generation, NativeIndex, ProtocolViolation};
use crate::symbolization::{NativeFrame, SymbolResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnresolvedNativeFrame {
    pub ip: u64,
    pub caller: NativeIndex,
}

/// Append-only table of native frames, addressed by 1-based [`NativeIndex`]
#[derive(Debug, Default)]
pub struct NativeFrameTable {
    frames: Vec<UnresolvedNativeFrame>,
}

impl NativeFrameTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame and return its index
    ///
    /// # Errors
    /// [`ProtocolViolation::InvalidNativeCaller`] if `caller` doesn't refer to
    /// an entry that already exists. This keeps every chain finite.
    pub fn record(
        &mut self,
        ip: u64,
        caller: NativeIndex,
    ) -> Result<NativeIndex, ProtocolViolation> {
        if caller.0 as usize > self.frames.len() {
            return Err(ProtocolViolation::InvalidNativeCaller {
                caller: caller.0,
                len: self.frames.len(),
            });
        }
        let index = u32::try_from(self.frames.len() + 1)
            .map_err(|_| ProtocolViolation::NativeFrameTableFull)?;
        self.frames.push(UnresolvedNativeFrame { ip, caller });
        Ok(NativeIndex(index))
    }

    #[must_use]
    pub fn get(&self, index: NativeIndex) -> Option<&UnresolvedNativeFrame> {
        (index.0 as usize).checked_sub(1).and_then(|i| self.frames.get(i))
    }

    /// Walk the unresolved chain starting at `index`, innermost first
    ///
    /// # Errors
    /// [`ProtocolViolation::UnknownNativeFrameReference`] if `index` is past
    /// the end of the table.
    pub fn chain(
        &self,
        index: NativeIndex,
        max_depth: usize,
    ) -> Result<NativeChain<'_>, ProtocolViolation> {
        if index.0 as usize > self.frames.len() {
            return Err(ProtocolViolation::UnknownNativeFrameReference(index));
        }
        Ok(NativeChain { table: self, current: index, remaining: max_depth })
    }

    /// Symbolize the chain starting at `index` against one map generation
    ///
    /// Every unresolved entry counts towards `max_depth`, whether or not it
    /// resolves. Addresses unknown to the resolver are skipped; addresses
    /// resolving to inlined calls contribute all their frames in order.
    ///
    /// # Errors
    /// See [`NativeFrameTable::chain`].
    pub fn resolve<R: SymbolResolver + ?Sized>(
        &self,
        index: NativeIndex,
        generation: Generation,
        max_depth: usize,
        resolver: &R,
    ) -> Result<Vec<NativeFrame>, ProtocolViolation> {
        let mut frames = Vec::new();
        for unresolved in self.chain(index, max_depth)? {
            let Some(resolved) = resolver.resolve(unresolved.ip, generation) else {
                continue;
            };
            frames.extend(resolved.into_native_frames());
        }
        Ok(frames)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Iterator returned by [`NativeFrameTable::chain`]
pub struct NativeChain<'a> {
    table: &'a NativeFrameTable,
    current: NativeIndex,
    remaining: usize,
}

impl Iterator for NativeChain<'_> {
    type Item = UnresolvedNativeFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.current.is_none() {
            return None;
        }
        let frame = *self.table.get(self.current)?;
        self.remaining -= 1;
        self.current = frame.caller;
        Some(frame)
    }
}

impl FusedIterator for NativeChain<'_> {}

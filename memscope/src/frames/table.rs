//! Frame metadata table
//!
//! The agent registers each frame once with the line in its *caller* that
//! entered it. The line that is executing inside the frame when an
//! allocation happens is only known later, from the allocation record, so
//! [`FrameTable::correct_top_of_stack`] binds it at that point and
//! deduplicates the result: two allocations from the same function at the
//! same line share one corrected entry.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::domain::{FrameId, ProtocolViolation};

/// Interns function and file names for one decode session
#[derive(Debug, Default)]
pub struct StringCache {
    strings: HashSet<Rc<str>>,
}

impl StringCache {
    pub fn intern(&mut self, s: &str) -> Rc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Rc::clone(existing);
        }
        let interned: Rc<str> = Rc::from(s);
        self.strings.insert(Rc::clone(&interned));
        interned
    }
}

/// An interpreter frame
///
/// `lineno` is `None` for frames as registered by the agent and `Some` once
/// the frame has been corrected to the line of an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub function_name: Rc<str>,
    pub filename: Rc<str>,
    /// Line in the calling frame that entered this one
    pub parent_lineno: i32,
    pub lineno: Option<i32>,
}

#[derive(Debug, Default)]
pub struct FrameTable {
    raw: HashMap<u64, Frame>,
    corrected: Vec<Frame>,
    corrected_ids: HashMap<Frame, usize>,
    strings: StringCache,
}

impl FrameTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a frame announced by the agent
    ///
    /// # Errors
    /// [`ProtocolViolation::DuplicateFrameId`] if `frame_id` is already
    /// known; the existing entry is kept.
    pub fn register(
        &mut self,
        frame_id: u64,
        function_name: &str,
        filename: &str,
        parent_lineno: i32,
    ) -> Result<(), ProtocolViolation> {
        match self.raw.entry(frame_id) {
            Entry::Occupied(_) => Err(ProtocolViolation::DuplicateFrameId(frame_id)),
            Entry::Vacant(slot) => {
                slot.insert(Frame {
                    function_name: self.strings.intern(function_name),
                    filename: self.strings.intern(filename),
                    parent_lineno,
                    lineno: None,
                });
                Ok(())
            }
        }
    }

    /// # Errors
    /// [`ProtocolViolation::UnknownStackFrameReference`] if the id was never
    /// registered.
    pub fn lookup(&self, id: FrameId) -> Result<&Frame, ProtocolViolation> {
        let frame = match id {
            FrameId::Raw(raw) => self.raw.get(&raw),
            FrameId::Corrected(index) => self.corrected.get(index),
        };
        frame.ok_or(ProtocolViolation::UnknownStackFrameReference(id))
    }

    /// Rewrite the innermost frame of `stack` to its corrected form for `lineno`
    ///
    /// An empty stack is left untouched.
    ///
    /// # Errors
    /// [`ProtocolViolation::UnknownStackFrameReference`] if the top frame was
    /// never registered.
    pub fn correct_top_of_stack(
        &mut self,
        stack: &mut [FrameId],
        lineno: i32,
    ) -> Result<(), ProtocolViolation> {
        let Some(top) = stack.last_mut() else {
            return Ok(());
        };

        let frame = Frame { lineno: Some(lineno), ..self.lookup(*top)?.clone() };
        let index = match self.corrected_ids.get(&frame) {
            Some(&index) => index,
            None => {
                let index = self.corrected.len();
                self.corrected.push(frame.clone());
                self.corrected_ids.insert(frame, index);
                index
            }
        };

        *top = FrameId::Corrected(index);
        Ok(())
    }

    /// Total number of entries, registered and corrected
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len() + self.corrected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

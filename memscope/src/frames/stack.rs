//! Per-thread stack replay
//!
//! The agent only records deltas (frame entered, frame left) per thread.
//! Replaying them in stream order reconstructs every thread's live stack at
//! any point of the trace.

use memscope_common::{FRAME_POP, FRAME_PUSH};
use std::collections::HashMap;

use crate::domain::{FrameId, ProtocolViolation, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    Push(FrameId),
    Pop,
}

impl FrameAction {
    /// Decode the action byte of a frame record
    ///
    /// # Errors
    /// [`ProtocolViolation::UnknownFrameAction`] for anything but push or pop
    pub fn decode(action: u8, frame_id: u64) -> Result<Self, ProtocolViolation> {
        match action {
            FRAME_PUSH => Ok(Self::Push(FrameId::Raw(frame_id))),
            FRAME_POP => Ok(Self::Pop),
            other => Err(ProtocolViolation::UnknownFrameAction(other)),
        }
    }
}

/// Live stacks of every thread seen so far, outermost frame first
#[derive(Debug, Default)]
pub struct StackReplayer {
    stacks: HashMap<ThreadId, Vec<FrameId>>,
}

impl StackReplayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one push/pop event to `tid`'s stack
    ///
    /// # Errors
    /// [`ProtocolViolation::StackUnderflow`] when popping an empty stack
    pub fn apply(&mut self, tid: ThreadId, action: FrameAction) -> Result<(), ProtocolViolation> {
        let stack = self.stacks.entry(tid).or_default();
        match action {
            FrameAction::Push(frame_id) => stack.push(frame_id),
            FrameAction::Pop => {
                stack.pop().ok_or(ProtocolViolation::StackUnderflow(tid))?;
            }
        }
        Ok(())
    }

    /// `None` if the thread never pushed or popped anything
    #[must_use]
    pub fn stack(&self, tid: ThreadId) -> Option<&[FrameId]> {
        self.stacks.get(&tid).map(Vec::as_slice)
    }

    pub fn stack_mut(&mut self, tid: ThreadId) -> Option<&mut Vec<FrameId>> {
        self.stacks.get_mut(&tid)
    }

    /// Number of threads with a stack, empty or not
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.stacks.len()
    }
}

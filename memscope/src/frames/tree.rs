//! Frame suffix tree
//!
//! Every distinct stack seen at an allocation maps to one node of this
//! tree. A node stores only its own frame and a handle to the node of the
//! stack without that frame, so stacks sharing outer frames share storage
//! and memory grows with the number of distinct stacks, not with the number
//! of allocations times their depth.
//!
//! ```text
//!            root (0)
//!           /        \
//!      main (1)     worker (4)
//!       /    \
//!  load (2)  save (3)
//! ```
//!
//! Nodes live in a dense arena and are never removed; handles are indices.

use std::collections::HashMap;
use std::iter::FusedIterator;

use crate::domain::{FrameHandle, FrameId};

/// One tree node: a frame plus the handle of its caller's node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub frame_id: FrameId,
    pub parent: FrameHandle,
}

#[derive(Debug, Default)]
pub struct FrameTree {
    /// `nodes[h - 1]` is the node behind handle `h`
    nodes: Vec<Node>,
    children: HashMap<(FrameHandle, FrameId), FrameHandle>,
}

impl FrameTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle identifying exactly the frames of `stack`, outermost first
    ///
    /// Equal stacks always get equal handles and different stacks different
    /// ones. The empty stack is [`FrameHandle::ROOT`].
    pub fn get_handle(&mut self, stack: &[FrameId]) -> FrameHandle {
        let mut current = FrameHandle::ROOT;
        for &frame_id in stack {
            current = match self.children.get(&(current, frame_id)) {
                Some(&child) => child,
                None => {
                    self.nodes.push(Node { frame_id, parent: current });
                    let child = FrameHandle(self.nodes.len());
                    self.children.insert((current, frame_id), child);
                    child
                }
            };
        }
        current
    }

    /// The node behind `handle`, `None` for the root or a foreign handle
    #[must_use]
    pub fn walk(&self, handle: FrameHandle) -> Option<Node> {
        handle.0.checked_sub(1).and_then(|index| self.nodes.get(index)).copied()
    }

    /// Lazily walk from `handle` towards the root, innermost frame first
    ///
    /// Stops at the root or after `max_depth` nodes.
    #[must_use]
    pub fn ancestors(&self, handle: FrameHandle, max_depth: usize) -> Ancestors<'_> {
        Ancestors { tree: self, current: handle, remaining: max_depth }
    }

    /// Number of nodes, excluding the root
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Iterator returned by [`FrameTree::ancestors`]
pub struct Ancestors<'a> {
    tree: &'a FrameTree,
    current: FrameHandle,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.current.is_root() {
            return None;
        }
        let node = self.tree.walk(self.current)?;
        self.remaining -= 1;
        self.current = node.parent;
        Some(node)
    }
}

impl FusedIterator for Ancestors<'_> {}

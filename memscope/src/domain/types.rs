//! Domain types providing compile-time safety and self-documentation
//!
//! A trace carries several unrelated integer id spaces (thread ids, agent
//! frame ids, tree handles, native table indices, map generations). These
//! newtypes keep them from being mixed up.

use std::fmt;

/// Origin (thread) id as recorded by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Identifier of an entry in the frame table
///
/// Frames announced by the agent keep their raw id. Frames minted by the
/// reader when binding an allocation line live in their own namespace, so
/// they can never shadow an id the agent may register later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameId {
    Raw(u64),
    Corrected(usize),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(id) => write!(f, "frame#{id}"),
            Self::Corrected(id) => write!(f, "frame#c{id}"),
        }
    }
}

/// Handle of a node in the frame suffix tree
///
/// Handle 0 is the root, i.e. the empty stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FrameHandle(pub usize);

impl FrameHandle {
    pub const ROOT: Self = Self(0);

    #[must_use]
    pub fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based position in the native frame table; 0 means "no frame"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeIndex(pub u32);

impl NativeIndex {
    pub const NONE: Self = Self(0);

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native#{}", self.0)
    }
}

/// Memory map generation of the symbol resolver
///
/// Generation 0 is the empty map in effect before any segment is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(pub usize);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen:{}", self.0)
    }
}

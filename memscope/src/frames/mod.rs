//! Interpreter frame bookkeeping
//!
//! - [`table`]: frame metadata keyed by id, with allocation-line correction
//! - [`stack`]: per-thread stacks replayed from push/pop events
//! - [`tree`]: suffix tree giving every distinct stack a compact handle

pub mod stack;
pub mod table;
pub mod tree;

pub use stack::{FrameAction, StackReplayer};
pub use table::{Frame, FrameTable, StringCache};
pub use tree::{Ancestors, FrameTree, Node};

//! Structured trace events emitted by the engine.
//!
//! Tracing is opt-in: the engine records events only when asked, so the
//! regular rewrite path pays nothing. Events describe the rule walk as a
//! flat stream with enter/exit framing, which the report printer turns
//! back into an indented tree.

use crate::tags::Tag;

/// Which document a traced operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Positive,
    Negative,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Positive => "positive",
            Side::Negative => "negative",
        }
    }
}

/// The mutation a leaf rule performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Add,
    AddNegative,
    Remove,
    RemoveNegative,
    Tmp,
    Swap,
    SwapNegative,
}

impl MutationOp {
    pub fn label(self) -> &'static str {
        match self {
            MutationOp::Add => "add",
            MutationOp::AddNegative => "add_negative",
            MutationOp::Remove => "remove",
            MutationOp::RemoveNegative => "remove_negative",
            MutationOp::Tmp => "tmp",
            MutationOp::Swap => "swap",
            MutationOp::SwapNegative => "swap_negative",
        }
    }
}

#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// A rule starts executing. `label` is its position in the tree,
    /// e.g. `:root[0]` or `children[2]`.
    EnterRule { label: String, kind: &'static str, name: Option<String> },
    /// The matching `EnterRule` frame closes.
    ExitRule,
    /// One condition list was evaluated against the positive document.
    Condition { check: &'static str, tags: Vec<String>, passed: bool },
    /// An anchor list was resolved (or not) for one side.
    Anchor { side: Side, candidates: Vec<String>, resolved: Option<Tag> },
    /// A mutation ran with the given tags.
    Mutation { op: MutationOp, tags: Vec<String> },
    /// A switch fell through to its default child.
    DefaultSelected { index: usize },
    /// The rule did not run.
    Skipped { reason: &'static str },
}

//! Declarative rewriting for paired positive/negative generation prompts.
//!
//! Prompts are written in a weighted-tag micro-language (comma-separated
//! tags, parenthesis emphasis, `BREAK` region dividers). Rules live in YAML
//! files and describe conditional mutations: add or remove tags, switch
//! between alternatives, swap one tag for another, all relative to named
//! anchor tags so insertions land where they belong instead of at the end.
//!
//! The usual entry points are [`rewrite`] for an in-memory rule list and
//! [`rewrite_with`] for a [`Pipeline`] over a rule directory with
//! change-aware caching.

extern crate self as promptweave;

#[macro_use]
mod macros;

pub mod api;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod rules;
pub mod tags;
pub mod trace;

pub use api::{
    rewrite, rewrite_verbose_with, rewrite_with, RewriteDetails, RewriteResult,
    RewriteResultVerbose,
};
pub use engine::Engine;
pub use error::{Error, Result, ValidationError};
pub use pipeline::{FileTrace, Pipeline};
pub use prompt::{Prompt, RegionPrompt, REGION_DIVIDER};
pub use rules::{Rule, RuleKind, RuleList, TagMutations};
pub use tags::{Tag, TagList};
pub use trace::{MutationOp, Side, TraceEvent};

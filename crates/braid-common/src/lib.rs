//! Shared types for the Braid compiler.
//!
//! Every phase that reports a source location depends on this crate rather
//! than on each other.

pub mod span;

pub use span::{LineIndex, Span};

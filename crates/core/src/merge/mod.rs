//! Streaming k-way merge of keyed sequences.

mod merger;

pub use merger::*;

//! Field catalogue and period boundary resolution.
//!
//! Every reportable field code maps to a measure (what is computed) and a
//! period (how far back the comparison point lies).

mod period_model;
mod period_resolver;

pub use period_model::*;
pub use period_resolver::*;

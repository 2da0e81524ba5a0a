//! Composites: entities whose performance is aggregated from member entities.
//!
//! Membership is tracked per effective-date range. A [`CompositeSource`]
//! serves composite rows to a regular performance service by aligning the
//! members' locked performance by date and folding each date with a
//! [`CompositeMethod`].

mod composite_model;
mod composite_source;
mod composite_traits;
mod in_memory_composite;

pub use composite_model::*;
pub use composite_source::*;
pub use composite_traits::*;
pub use in_memory_composite::*;

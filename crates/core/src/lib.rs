//! Perfledger Core - bi-temporal investment performance engine.
//!
//! Performance is kept as immutable blocks of chain-linked daily points,
//! indexed by effective date and by the as-of time they became known. This
//! crate reconciles overlapping blocks, reports period statistics from the
//! linked aggregates and builds composites from member entities. It is
//! storage-agnostic and defines the traits implemented by the
//! `storage-local` crate.

pub mod composites;
pub mod constants;
pub mod errors;
pub mod merge;
pub mod performance;
pub mod periods;
pub mod returns;
pub mod settings;
pub mod utils;

// Re-export the types most callers need
pub use performance::{
    BlockStoreTrait, EntityId, PerformanceDataPoint, PerformanceDataSet, PerformanceQuery,
    PerformanceService, PerformanceSourceTrait,
};

// Re-export error types
pub use errors::Error;
pub use errors::Result;

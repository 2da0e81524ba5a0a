//! Performance data model, block storage contract, block merge and reporting.
//!
//! Performance is held as immutable, as-of tagged blocks of chain-linked data
//! points. Queries reconcile the blocks known at a given as-of time into one
//! series and derive period statistics from the linked aggregates.

pub mod block_merge;
mod in_memory_block_store;
mod performance_model;
mod performance_service;
mod performance_traits;

pub use block_merge::{combine, CombinedPoints, MergeSlice};
pub use in_memory_block_store::*;
pub use performance_model::*;
pub use performance_service::*;
pub use performance_traits::*;

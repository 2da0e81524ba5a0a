//! Filesystem storage for perfledger.
//!
//! This crate implements the block store trait defined in `perfledger-core`
//! on top of a directory tree of JSON files:
//!
//! ```text
//! <root>/<entity scope>/<entity code>/<performance scope>/
//!     index.json          block ranges and as-of times
//!     block-<uuid>.json   the points of one block
//! ```
//!
//! Opening a store reads only the index; block points are loaded the first
//! time a block is merged or queried.

pub mod blocks;
pub mod errors;

pub use blocks::LocalBlockStore;
pub use errors::StorageError;

// Re-export from perfledger-core for convenience
pub use perfledger_core::errors::{Error, Result};

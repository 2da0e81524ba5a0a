//! Import of externally computed returns into the block store.

mod returns_importer;
mod returns_model;

pub use returns_importer::*;
pub use returns_model::*;

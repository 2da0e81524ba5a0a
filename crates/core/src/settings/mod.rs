//! Engine configuration.
//!
//! Settings are plain values threaded into the services that need them.

mod settings_model;

pub use settings_model::*;

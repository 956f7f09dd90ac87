//! st-core: shared errors, configuration, typed IDs, media types, and the
//! run event bus.
//!
//! This crate is the foundational dependency for the other st-* crates.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::{format_time, parse_timestamp, SourceFile, SourceSummary};

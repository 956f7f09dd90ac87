//! segtrim - cut multiple time ranges out of a video with lossless stream copy
//!
//! This library crate exposes the CLI's building blocks for integration testing.

pub mod config;
pub mod extract;

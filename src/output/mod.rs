//! Persistence and human-readable summaries.
//!
//! - [`json`]: JSON encoding of covariance matrices, filter banks and inverse
//!   operators, to strings or files
//! - [`terminal`]: colored one-screen summaries

pub mod json;
pub mod terminal;

pub use json::{from_json, load_json, save_json, to_json, to_json_pretty};
pub use terminal::{format_covariance, format_peak};

//! Transformation module.
//!
//! - Grouper: rows to one line per `Type`
//! - Pipeline: decode, validate, group and export

pub mod grouper;
pub mod pipeline;

pub use grouper::{group, join_distinct};
pub use pipeline::*;

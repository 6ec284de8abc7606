//! Error types shared across the sipmesh crates

pub mod types;

pub use types::{Error, Result};

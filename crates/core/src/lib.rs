#![deny(unused)]
//! Core types, traits, and error definitions for Cellbox.
//!
//! This crate provides the foundational building blocks shared across the
//! sandbox backends and the toolkit layer.

pub mod error;
pub mod path;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::Tool;
pub use types::ToolOutput;

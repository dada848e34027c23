//! # Swarm Common Library
//!
//! Shared code for the prediction swarm services including:
//! - Domain models (tweets, slices, parsed predictions, failure causes)
//! - Configuration loading (TOML + environment + compiled defaults)
//! - Database pool creation and schema bootstrap
//! - Text utilities for slice extraction
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod text;
pub mod time;

pub use error::{Error, Result};

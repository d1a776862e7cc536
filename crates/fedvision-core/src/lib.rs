//! Core types and utilities for federated image-classification clients.
//!
//! This crate provides the error type, configuration, device selection,
//! metric records and CLI helpers shared by the dataset and training crates.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use backend::*;
pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use metrics::*;
pub use types::*;

//! # bubblebox-core
//!
//! Core types, configuration, and utilities for bubblebox.
//!
//! This crate provides shared functionality used by the sandbox and CLI crates:
//!
//! - **Configuration**: Loading and validation of the JSON5 config file
//! - **Types**: The declarative host-path access policy tree
//! - **Utilities**: Session environment and scratch directory handling

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use env::SessionEnv;
pub use error::{ConfigError, PolicyError};
pub use types::*;

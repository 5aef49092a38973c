//! # Flora Common Library
//!
//! Shared code for the flora catalog crates:
//! - Common error type
//! - TOML configuration loading and root folder resolution
//! - Logging setup

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};

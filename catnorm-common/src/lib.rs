//! # catnorm common library
//!
//! Shared code for the catnorm crates:
//! - Error type and result alias
//! - Bootstrap configuration (TOML file, environment, OS defaults)
//! - SQLite database initialization for the session store

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;

pub use config::TomlConfig;
pub use error::{Error, Result};

//! # catnorm
//!
//! Normalization and classification of catalog item names.
//!
//! A raw name such as `"Молоток ER-00013004 100x100 50кг"` goes through a
//! versioned pipeline of stages:
//! - pattern cleanup: detect article codes, dimensions and quantities and
//!   strip them ([`normalization`])
//! - AI correction: an external model suggests a cleaner name ([`ai`])
//! - classification: an external model picks a category path, which is
//!   folded to a fixed display depth ([`classification`]) and scored
//!   ([`validators`])
//!
//! Every stage is persisted before it takes effect ([`db`]), history is
//! append-only and reverts add a stage instead of removing any.
//! [`stats`] aggregates pattern frequencies and pipeline metrics across
//! sessions.

pub mod ai;
pub mod classification;
pub mod db;
pub mod error;
pub mod models;
pub mod normalization;
pub mod pipeline;
pub mod stats;
pub mod validators;

pub use crate::error::{PipelineError, Result};
pub use crate::pipeline::{BatchConfig, BatchDriver, BatchItem, BatchReport, PipelineConfig, VersionedPipeline};

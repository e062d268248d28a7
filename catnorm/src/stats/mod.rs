//! Statistics aggregation
//!
//! Shared, lock-protected structures fed by the pipeline and batch driver.

pub mod collector;
pub mod counter;
pub mod pattern_analyzer;
pub mod top_n;

pub use collector::{StatsCollector, StatsSnapshot};
pub use counter::Counter;
pub use pattern_analyzer::{CategoryAggregate, PatternAnalyzer, PatternReport, DEFAULT_TOP_PATTERNS};
pub use top_n::{BoundedTopN, RankedItem};

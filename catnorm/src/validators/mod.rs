//! Result validators
//!
//! Score normalized names and classifications so the pipeline can flag weak
//! stages and detect benchmark-quality results.

pub mod quality_validator;

pub use quality_validator::{
    extract_keywords, is_valid_kpved_format, ExtendedInputs, ProcessingLevel, QualityScore,
    QualityValidator, BENCHMARK_THRESHOLD,
};

//! Versioned pipeline against the SQLite session store
//!
//! **Test Coverage:**
//! - Reference name through pattern cleanup, persisted and reloaded
//! - Append-only revert survives a reopen from disk
//! - Classification stage round-trips category paths and quality
//! - Normalization and folding properties over a sample of names

use async_trait::async_trait;
use catnorm::ai::{
    AiError, CategoryClassifier, ClassificationRequest, ClassificationResponse, CorrectionRequest,
    CorrectionResponse, NameCorrector,
};
use catnorm::classification::FoldingEngine;
use catnorm::db::{SessionStore, SqliteSessionStore};
use catnorm::models::{PipelineState, SessionStatus, StageType};
use catnorm::normalization::{NameNormalizer, PatternDetector};
use catnorm::{PipelineConfig, PipelineError, VersionedPipeline};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const REFERENCE_NAME: &str = "Молоток ER-00013004 100x100 50кг";

struct StaticCorrector;

#[async_trait]
impl NameCorrector for StaticCorrector {
    async fn correct(
        &self,
        request: CorrectionRequest,
        _cancel: &CancellationToken,
    ) -> Result<CorrectionResponse, AiError> {
        Ok(CorrectionResponse {
            corrected_name: format!("{} слесарный", request.current_name),
            confidence: 0.93,
            reasoning: "added purpose".to_string(),
        })
    }
}

struct StaticClassifier;

#[async_trait]
impl CategoryClassifier for StaticClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest,
        _cancel: &CancellationToken,
    ) -> Result<ClassificationResponse, AiError> {
        assert_eq!(request.code.as_deref(), Some("ER-00013004"));
        Ok(ClassificationResponse {
            category_path: vec![
                "Обработка".to_string(),
                "Металлические изделия".to_string(),
                "Инструменты".to_string(),
                "Молотки".to_string(),
            ],
            confidence: 0.88,
            reasoning: "hand tool".to_string(),
            alternatives: Vec::new(),
        })
    }
}

/// Helper: on-disk store in a temp dir
async fn disk_store() -> (TempDir, Arc<SqliteSessionStore>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = SqliteSessionStore::open(&temp_dir.path().join("sessions.db"))
        .await
        .expect("Failed to open store");
    (temp_dir, Arc::new(store))
}

#[tokio::test]
async fn test_reference_name_persisted() {
    let (_temp_dir, store) = disk_store().await;
    let mut pipeline = VersionedPipeline::new(store.clone(), PipelineConfig::default()).unwrap();

    // Given: the reference catalog name
    let session = pipeline.start_session("item-42", REFERENCE_NAME).await.unwrap();

    // When: pattern cleanup runs
    let stage = pipeline.apply_patterns().await.unwrap();

    // Then: code, dimensions and quantity are gone and the result is stored
    assert_eq!(stage.output_name, "молоток");
    let stored = store.get_stage_history(session.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, stage.id);
    assert_eq!(stored[0].output_name, "молоток");
    assert_eq!(stored[0].applied_patterns.len(), 3);
    assert_eq!(stored[0].applied_patterns, stage.applied_patterns.clone());

    let reloaded = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(reloaded.current_name, "молоток");
    assert_eq!(reloaded.state, PipelineState::PatternsApplied);
}

#[tokio::test]
async fn test_revert_survives_reopen() {
    let (_temp_dir, store) = disk_store().await;
    let mut pipeline = VersionedPipeline::new(store.clone(), PipelineConfig::default())
        .unwrap()
        .with_corrector(Arc::new(StaticCorrector));

    let session = pipeline.start_session("item-42", REFERENCE_NAME).await.unwrap();
    let first = pipeline.apply_patterns().await.unwrap();
    pipeline
        .apply_ai_correction(false, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(pipeline.current_name(), Some("молоток слесарный"));

    // Reopen in a fresh pipeline, as the CLI revert command does
    let mut reopened = VersionedPipeline::new(store.clone(), PipelineConfig::default()).unwrap();
    reopened.open_session(session.id).await.unwrap();
    let revert = reopened.revert_to_stage(first.id).await.unwrap();

    assert_eq!(revert.output_name, "молоток");
    assert_eq!(revert.reverted_to, Some(first.id));

    let history = store.get_stage_history(session.id).await.unwrap();
    let kinds: Vec<StageType> = history.iter().map(|s| s.stage_type).collect();
    assert_eq!(
        kinds,
        vec![StageType::PatternCleanup, StageType::AiCorrection, StageType::Revert]
    );

    let stored = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.current_name, "молоток");
    assert_eq!(stored.stage_count, 3);
    assert_eq!(stored.status, SessionStatus::Reverted);
    assert_eq!(stored.state, PipelineState::AiCorrected);
}

#[tokio::test]
async fn test_full_run_round_trips_classification() {
    let store = Arc::new(SqliteSessionStore::in_memory().await.unwrap());
    let mut pipeline = VersionedPipeline::new(store.clone(), PipelineConfig::default())
        .unwrap()
        .with_corrector(Arc::new(StaticCorrector))
        .with_classifier(Arc::new(StaticClassifier));
    let cancel = CancellationToken::new();

    let session = pipeline.start_session("item-42", REFERENCE_NAME).await.unwrap();
    pipeline
        .set_metadata("code", serde_json::json!("ER-00013004"))
        .await
        .unwrap();
    pipeline.apply_patterns().await.unwrap();
    pipeline.apply_ai_correction(true, &cancel).await.unwrap();
    let classified = pipeline.classify(None, &cancel).await.unwrap();
    pipeline.complete().await.unwrap();

    let history = store.get_stage_history(session.id).await.unwrap();
    let stored = history.last().unwrap();
    assert_eq!(stored.id, classified.id);
    assert_eq!(stored.category_original, classified.category_original);
    assert_eq!(
        stored.category_folded.as_deref().unwrap(),
        &["Обработка".to_string(), "Металлические изделия / Инструменты / Молотки".to_string()]
    );
    assert_eq!(stored.strategy_id.as_deref(), Some("top_priority"));
    assert!(stored.quality.is_some());

    let session = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.state, PipelineState::Classified);
    assert_eq!(session.current_name, "молоток слесарный");
}

#[tokio::test]
async fn test_revert_rejects_stage_from_other_session() {
    let store = Arc::new(SqliteSessionStore::in_memory().await.unwrap());
    let mut pipeline = VersionedPipeline::new(store.clone(), PipelineConfig::default()).unwrap();

    pipeline.start_session("item-1", "Болт М8х40 ГОСТ 7798").await.unwrap();
    let foreign = pipeline.apply_patterns().await.unwrap();

    pipeline.start_session("item-2", REFERENCE_NAME).await.unwrap();
    pipeline.apply_patterns().await.unwrap();

    let err = pipeline.revert_to_stage(foreign.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::StageNotFound(_)));
    assert_eq!(pipeline.history().len(), 1);
}

#[test]
fn test_normalize_is_idempotent() {
    let normalizer = NameNormalizer::new();
    let names = [
        REFERENCE_NAME,
        "  Кабель   ВВГ 3х2,5  медный -",
        "Болт М8х40 ГОСТ 7798 (оцинк.)",
        "КРАСКА ВД-АК 15кг белая",
        "",
    ];

    for name in names {
        let once = normalizer.normalize(name, &[]);
        let twice = normalizer.normalize(&once, &[]);
        assert_eq!(once, twice, "normalize not idempotent for {:?}", name);
        assert!(!once.contains("  "));
    }
}

#[test]
fn test_detected_patterns_never_overlap() {
    let detector = PatternDetector::new();
    let names = [
        REFERENCE_NAME,
        "Труба 57х3,5 ст.20 L=6000мм 12шт",
        "Лист 1500x3000x2 AISI 304 арт. 100-200-300",
        "Саморез 4,2х16 (1000 шт) PN-12345",
    ];

    for name in names {
        let matches = detector.detect_patterns(name);
        for (i, a) in matches.iter().enumerate() {
            for b in &matches[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?} in {:?}", a, b, name);
            }
        }
    }
}

#[test]
fn test_fold_depth_properties() {
    let engine = FoldingEngine::new();
    let path: Vec<String> = ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect();

    for strategy in ["top_priority", "bottom_priority", "mixed_priority"] {
        for depth in 1..=6u32 {
            let folded = engine.fold(&path, strategy, depth).unwrap();
            assert!(folded.len() <= depth as usize, "{} depth {}", strategy, depth);
            if path.len() <= depth as usize {
                assert_eq!(folded, path);
            }
        }
    }

    let four: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
    assert_eq!(engine.fold(&four, "top_priority", 2).unwrap(), vec!["A", "B / C / D"]);
    assert_eq!(engine.fold(&four, "bottom_priority", 2).unwrap(), vec!["A / B / C", "D"]);
}

//! Versioned pipeline
//!
//! State machine over one session: Created → PatternsApplied → AiCorrected
//! → Classified. Every mutating operation builds the next session value and
//! the stage record, persists both through the store in one append, and only
//! then swaps them into memory. A failed append or collaborator call leaves
//! the pipeline exactly as it was.
//!
//! Reverts never shorten history: they append a `revert` stage pointing at
//! the target and mark the session `Reverted` without moving the state
//! machine.

use crate::ai::{AiError, CategoryClassifier, ClassificationRequest, CorrectionRequest, NameCorrector};
use crate::classification::FoldingEngine;
use crate::db::SessionStore;
use crate::error::{PipelineError, Result};
use crate::models::{
    AiContext, PatternMatch, PipelineState, PriorStage, Session, SessionStatus, Stage, StageType,
};
use crate::normalization::{pattern_confidence, NameNormalizer};
use crate::pipeline::PipelineConfig;
use crate::stats::{PatternAnalyzer, StatsCollector};
use crate::validators::{ProcessingLevel, QualityValidator};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Category bucket for items that were never classified
const UNCATEGORIZED: &str = "без категории";

/// Stage-by-stage normalization of one session at a time
pub struct VersionedPipeline {
    store: Arc<dyn SessionStore>,
    corrector: Option<Arc<dyn NameCorrector>>,
    classifier: Option<Arc<dyn CategoryClassifier>>,
    folding: Arc<FoldingEngine>,
    normalizer: NameNormalizer,
    validator: QualityValidator,
    analyzer: Option<Arc<PatternAnalyzer>>,
    stats: Option<Arc<StatsCollector>>,
    config: PipelineConfig,
    session: Option<Session>,
    stages: Vec<Stage>,
}

impl VersionedPipeline {
    /// Pipeline with the built-in folding strategies and no AI collaborators
    pub fn new(store: Arc<dyn SessionStore>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            corrector: None,
            classifier: None,
            folding: Arc::new(FoldingEngine::new()),
            normalizer: NameNormalizer::new(),
            validator: QualityValidator::new(),
            analyzer: None,
            stats: None,
            config,
            session: None,
            stages: Vec::new(),
        })
    }

    pub fn with_corrector(mut self, corrector: Arc<dyn NameCorrector>) -> Self {
        self.corrector = Some(corrector);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn CategoryClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_folding_engine(mut self, folding: Arc<FoldingEngine>) -> Self {
        self.folding = folding;
        self
    }

    pub fn with_normalizer(mut self, normalizer: NameNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Feed completed sessions into a shared pattern analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<PatternAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Report quality and errors to a shared collector
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_corrector(&self) -> bool {
        self.corrector.is_some()
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Create and persist a new session; replaces any session held before
    pub async fn start_session(&mut self, item_ref: &str, original_name: &str) -> Result<Session> {
        if original_name.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "original name is empty".to_string(),
            ));
        }

        let session = Session::new(item_ref, original_name);
        if let Err(e) = self.store.create_session(&session).await {
            self.record_error(&e);
            return Err(e);
        }

        info!(
            session_id = %session.id,
            item_ref = %session.item_ref,
            "Started normalization session"
        );
        self.session = Some(session.clone());
        self.stages.clear();
        Ok(session)
    }

    /// Resume a stored session with its full stage history
    pub async fn open_session(&mut self, session_id: Uuid) -> Result<Session> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| PipelineError::InvalidInput(format!("session {} not found", session_id)))?;
        let stages = self.store.get_stage_history(session_id).await?;

        debug!(
            session_id = %session_id,
            stages = stages.len(),
            state = session.state.as_str(),
            "Opened session"
        );
        self.session = Some(session.clone());
        self.stages = stages;
        Ok(session)
    }

    /// Detect noise in the current name and append a `pattern_cleanup` stage
    ///
    /// Repeatable; every call appends a new stage.
    pub async fn apply_patterns(&mut self) -> Result<Stage> {
        let session = self.active_session()?;
        let session_id = session.id;
        let input = session.current_name.clone();

        let (normalized, matches) = self.normalizer.normalize_raw(&input);
        let output = if normalized.is_empty() {
            warn!(
                session_id = %session_id,
                name = %input,
                "Pattern cleanup removed the whole name, keeping its text"
            );
            let plain = self.normalizer.normalize(&input, &[]);
            if plain.is_empty() {
                input.clone()
            } else {
                plain
            }
        } else {
            normalized
        };
        let confidence = pattern_confidence(&matches);

        let next = self.prepare(&output, Some(PipelineState::PatternsApplied))?;
        let stage = Stage::new(
            session_id,
            next.stage_count,
            StageType::PatternCleanup,
            input,
            output,
            confidence,
        )
        .with_patterns(matches);

        self.commit(next, stage).await
    }

    /// Ask the corrector for a better name and append an `ai_correction` stage
    ///
    /// With `use_chat` the request carries the earlier AI stages, the stage
    /// count and the original name.
    pub async fn apply_ai_correction(
        &mut self,
        use_chat: bool,
        cancel: &CancellationToken,
    ) -> Result<Stage> {
        let corrector = self
            .corrector
            .clone()
            .ok_or_else(|| PipelineError::InvalidInput("no AI corrector configured".to_string()))?;
        let session = self.active_session()?;
        let session_id = session.id;
        let input = session.current_name.clone();

        let prior_stages: Vec<PriorStage> = if use_chat {
            self.stages
                .iter()
                .filter(|s| s.is_ai_stage())
                .map(|s| PriorStage {
                    stage_type: s.stage_type,
                    input_name: s.input_name.clone(),
                    output_name: s.output_name.clone(),
                    confidence: s.confidence,
                })
                .collect()
        } else {
            Vec::new()
        };

        let request = CorrectionRequest {
            current_name: input.clone(),
            original_name: session.original_name.clone(),
            prior_stages: prior_stages.clone(),
            stage_count: if use_chat { session.stage_count } else { 0 },
        };

        let response = self
            .guarded("ai_correction", cancel, corrector.correct(request, cancel))
            .await?;

        let suggested = response.corrected_name.trim().to_string();
        if suggested.is_empty() {
            let err = PipelineError::ExternalService(
                "ai_correction: corrector returned an empty name".to_string(),
            );
            self.record_error(&err);
            return Err(err);
        }

        let context = AiContext {
            use_chat,
            prior_stages,
            suggested_name: suggested.clone(),
            confidence: response.confidence,
            reasoning: response.reasoning,
            model: corrector.model(),
        };

        let next = self.prepare(&suggested, Some(PipelineState::AiCorrected))?;
        let stage = Stage::new(
            session_id,
            next.stage_count,
            StageType::AiCorrection,
            input,
            suggested,
            response.confidence,
        )
        .with_ai_context(context);

        self.commit(next, stage).await
    }

    /// Classify the current name, fold the path and append a
    /// `classification` stage
    ///
    /// `strategy_id` defaults to the configured strategy. An unknown
    /// strategy falls back to `top_priority` at depth 2 instead of failing.
    /// The name itself is not changed.
    pub async fn classify(
        &mut self,
        strategy_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Stage> {
        let classifier = self
            .classifier
            .clone()
            .ok_or_else(|| PipelineError::InvalidInput("no AI classifier configured".to_string()))?;
        let session = self.active_session()?;
        let session_id = session.id;
        let name = session.current_name.clone();
        let original_name = session.original_name.clone();

        let request = ClassificationRequest {
            item_name: name.clone(),
            code: metadata_text(session, "code"),
            description: metadata_text(session, "description"),
            max_levels: self.config.classification_levels,
        };

        let response = self
            .guarded("classification", cancel, classifier.classify(request, cancel))
            .await?;

        let path: Vec<String> = response
            .category_path
            .iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();
        if path.is_empty() {
            let err = PipelineError::ExternalService(
                "classification: classifier returned an empty category path".to_string(),
            );
            self.record_error(&err);
            return Err(err);
        }

        let strategy = strategy_id
            .unwrap_or(&self.config.default_strategy)
            .to_string();
        let folded = self
            .folding
            .fold_or_default(&path, &strategy, self.config.max_depth);

        let category = path.last().map(String::as_str).unwrap_or_default();
        let quality = self.validator.score(
            &original_name,
            &name,
            category,
            response.confidence,
            ProcessingLevel::AiEnhanced,
        );

        info!(
            session_id = %session_id,
            path = ?path,
            folded = ?folded.levels,
            strategy = %folded.strategy_id,
            quality = quality.overall,
            benchmark = quality.is_benchmark_quality,
            "Classified item"
        );

        let context = AiContext {
            use_chat: false,
            prior_stages: Vec::new(),
            suggested_name: name.clone(),
            confidence: response.confidence,
            reasoning: response.reasoning,
            model: None,
        };

        let next = self.prepare(&name, Some(PipelineState::Classified))?;
        let stage = Stage::new(
            session_id,
            next.stage_count,
            StageType::Classification,
            name.clone(),
            name,
            response.confidence,
        )
        .with_category(path, folded.levels, folded.strategy_id, folded.max_depth)
        .with_quality(quality)
        .with_ai_context(context);

        self.commit(next, stage).await
    }

    /// Append a `revert` stage restoring the output of `stage_id`
    pub async fn revert_to_stage(&mut self, stage_id: Uuid) -> Result<Stage> {
        let session = self.active_session()?;
        let session_id = session.id;
        let input = session.current_name.clone();

        let target = self
            .stages
            .iter()
            .find(|s| s.id == stage_id)
            .cloned()
            .ok_or_else(|| {
                PipelineError::StageNotFound(format!(
                    "stage {} is not part of session {}",
                    stage_id, session_id
                ))
            })?;

        let mut next = self.prepare(&target.output_name, None)?;
        next.status = SessionStatus::Reverted;

        info!(
            session_id = %session_id,
            target_stage = %target.id,
            target_ordinal = target.ordinal,
            "Reverting session"
        );

        let stage = Stage::new(
            session_id,
            next.stage_count,
            StageType::Revert,
            input,
            target.output_name,
            target.confidence,
        )
        .with_revert_target(target.id);

        self.commit(next, stage).await
    }

    /// Stages of the current session in append order
    pub fn history(&self) -> &[Stage] {
        &self.stages
    }

    pub fn current_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.current_name.as_str())
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn get_metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.session.as_ref().and_then(|s| s.metadata.get(key))
    }

    /// Set a metadata value and persist the session
    ///
    /// `code` and `description` are passed to the classifier.
    pub async fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let mut next = self.active_session()?.clone();
        next.metadata.insert(key.into(), value);
        next.updated_at = Utc::now();

        self.store.update_session(&next).await?;
        self.session = Some(next);
        Ok(())
    }

    /// Mark the session completed; later mutating calls are rejected
    pub async fn complete(&mut self) -> Result<Session> {
        let mut next = self.active_session()?.clone();
        next.status = SessionStatus::Completed;
        next.updated_at = Utc::now();

        if let Err(e) = self.store.update_session(&next).await {
            self.record_error(&e);
            return Err(e);
        }

        self.record_completion(&next);
        info!(
            session_id = %next.id,
            stages = next.stage_count,
            name = %next.current_name,
            "Completed normalization session"
        );
        self.session = Some(next.clone());
        Ok(next)
    }

    fn active_session(&self) -> Result<&Session> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| PipelineError::InvalidInput("no active session".to_string()))?;
        if session.is_completed() {
            return Err(PipelineError::InvalidInput(format!(
                "session {} is completed",
                session.id
            )));
        }
        Ok(session)
    }

    /// Next session value for a stage producing `output`
    ///
    /// The state machine only moves forward.
    fn prepare(&self, output: &str, state: Option<PipelineState>) -> Result<Session> {
        let mut next = self.active_session()?.clone();
        next.current_name = output.to_string();
        next.stage_count += 1;
        next.updated_at = Utc::now();

        if let Some(target) = state {
            if target > next.state {
                let transition = next.transition_to(target);
                debug!(
                    session_id = %next.id,
                    from = transition.old_state.as_str(),
                    to = transition.new_state.as_str(),
                    "State transition"
                );
            }
        }
        Ok(next)
    }

    async fn commit(&mut self, next: Session, stage: Stage) -> Result<Stage> {
        if let Err(e) = self.store.append_stage(&next, &stage).await {
            self.record_error(&e);
            return Err(e);
        }

        debug!(
            session_id = %next.id,
            ordinal = stage.ordinal,
            stage_type = stage.stage_type.as_str(),
            input = %stage.input_name,
            output = %stage.output_name,
            confidence = stage.confidence,
            "Stage appended"
        );

        self.session = Some(next);
        self.stages.push(stage.clone());
        Ok(stage)
    }

    /// Run a collaborator call that also stops on `cancel`
    async fn guarded<T, F>(&self, operation: &str, cancel: &CancellationToken, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, AiError>>,
    {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AiError::Cancelled),
            result = call => result,
        };

        result.map_err(|e| {
            warn!(operation = operation, error = %e, "AI collaborator failed");
            let err = PipelineError::ExternalService(format!("{}: {}", operation, e));
            self.record_error(&err);
            err
        })
    }

    fn record_error(&self, err: &PipelineError) {
        if let Some(stats) = &self.stats {
            stats.record_error(err.kind(), err.to_string());
        }
    }

    fn record_completion(&self, session: &Session) {
        let classification = self
            .stages
            .iter()
            .rev()
            .find(|s| s.stage_type == StageType::Classification);
        let has_ai = self.stages.iter().any(Stage::is_ai_stage);

        let quality = classification
            .and_then(|s| s.quality.clone())
            .unwrap_or_else(|| {
                let level = if has_ai {
                    ProcessingLevel::AiEnhanced
                } else {
                    ProcessingLevel::Basic
                };
                self.validator
                    .score(&session.original_name, &session.current_name, "", 0.0, level)
            });
        let level = if quality.is_benchmark_quality {
            ProcessingLevel::Benchmark
        } else if has_ai {
            ProcessingLevel::AiEnhanced
        } else {
            ProcessingLevel::Basic
        };

        if let Some(stats) = &self.stats {
            stats.record_normalization(level, quality.overall);
        }

        if let Some(analyzer) = &self.analyzer {
            let matches: Vec<PatternMatch> = self
                .stages
                .iter()
                .filter(|s| s.stage_type == StageType::PatternCleanup)
                .flat_map(|s| s.applied_patterns.iter().cloned())
                .collect();
            let category = classification
                .and_then(|s| s.category_folded.as_ref())
                .and_then(|levels| levels.first())
                .map(String::as_str)
                .unwrap_or(UNCATEGORIZED);
            let confidence = classification
                .or_else(|| self.stages.last())
                .map(|s| s.confidence)
                .unwrap_or(1.0);
            analyzer.record(&session.original_name, category, confidence, &matches);
        }
    }
}

fn metadata_text(session: &Session, key: &str) -> Option<String> {
    session
        .metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ClassificationResponse, CorrectionResponse};
    use crate::db::InMemorySessionStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const REFERENCE_NAME: &str = "Молоток ER-00013004 100x100 50кг";

    struct FixedCorrector {
        name: String,
        confidence: f64,
        requests: Mutex<Vec<CorrectionRequest>>,
    }

    impl FixedCorrector {
        fn new(name: &str, confidence: f64) -> Self {
            Self {
                name: name.to_string(),
                confidence,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NameCorrector for FixedCorrector {
        async fn correct(
            &self,
            request: CorrectionRequest,
            _cancel: &CancellationToken,
        ) -> std::result::Result<CorrectionResponse, AiError> {
            self.requests.lock().unwrap().push(request);
            Ok(CorrectionResponse {
                corrected_name: self.name.clone(),
                confidence: self.confidence,
                reasoning: "fixed".to_string(),
            })
        }

        fn model(&self) -> Option<String> {
            Some("fixed-model".to_string())
        }
    }

    struct FailingCorrector;

    #[async_trait]
    impl NameCorrector for FailingCorrector {
        async fn correct(
            &self,
            _request: CorrectionRequest,
            _cancel: &CancellationToken,
        ) -> std::result::Result<CorrectionResponse, AiError> {
            Err(AiError::Api {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    struct SlowCorrector;

    #[async_trait]
    impl NameCorrector for SlowCorrector {
        async fn correct(
            &self,
            _request: CorrectionRequest,
            _cancel: &CancellationToken,
        ) -> std::result::Result<CorrectionResponse, AiError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CorrectionResponse {
                corrected_name: "never".to_string(),
                confidence: 1.0,
                reasoning: String::new(),
            })
        }
    }

    struct FixedClassifier(Vec<&'static str>);

    #[async_trait]
    impl CategoryClassifier for FixedClassifier {
        async fn classify(
            &self,
            _request: ClassificationRequest,
            _cancel: &CancellationToken,
        ) -> std::result::Result<ClassificationResponse, AiError> {
            Ok(ClassificationResponse {
                category_path: self.0.iter().map(|s| s.to_string()).collect(),
                confidence: 0.9,
                reasoning: "tool".to_string(),
                alternatives: Vec::new(),
            })
        }
    }

    /// Store whose appends can be switched to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemorySessionStore,
        fail_appends: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create_session(&self, session: &Session) -> Result<()> {
            self.inner.create_session(session).await
        }

        async fn append_stage(&self, session: &Session, stage: &Stage) -> Result<()> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(PipelineError::Persistence("disk full".to_string()));
            }
            self.inner.append_stage(session, stage).await
        }

        async fn update_session(&self, session: &Session) -> Result<()> {
            self.inner.update_session(session).await
        }

        async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
            self.inner.get_session(session_id).await
        }

        async fn get_stage_history(&self, session_id: Uuid) -> Result<Vec<Stage>> {
            self.inner.get_stage_history(session_id).await
        }

        async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
            self.inner.list_sessions(limit).await
        }
    }

    fn pipeline() -> (VersionedPipeline, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        let pipeline = VersionedPipeline::new(store.clone(), PipelineConfig::default()).unwrap();
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (mut pipeline, store) = pipeline();
        for name in ["", "   "] {
            let err = pipeline.start_session("item-1", name).await.unwrap_err();
            assert!(matches!(err, PipelineError::InvalidInput(_)));
        }
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_reference_name_pattern_cleanup() {
        let (mut pipeline, store) = pipeline();
        let session = pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();

        let stage = pipeline.apply_patterns().await.unwrap();
        assert_eq!(stage.ordinal, 1);
        assert_eq!(stage.output_name, "молоток");
        assert_eq!(stage.applied_patterns.len(), 3);
        assert_eq!(pipeline.current_name(), Some("молоток"));
        assert_eq!(pipeline.session().unwrap().state, PipelineState::PatternsApplied);

        let stored = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.current_name, "молоток");
        assert_eq!(store.get_stage_history(session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fully_stripped_name_keeps_normalized_text() {
        let (mut pipeline, _) = pipeline();

        // Given: a name made of nothing but a technical code
        pipeline.start_session("item-1", "  ER-00013004   ").await.unwrap();

        // When: cleanup would remove everything
        let stage = pipeline.apply_patterns().await.unwrap();

        // Then: the code is kept, still lower-cased and trimmed
        assert_eq!(stage.output_name, "er-00013004");
        assert_eq!(stage.applied_patterns.len(), 1);
        assert_eq!(pipeline.current_name(), Some("er-00013004"));
    }

    #[tokio::test]
    async fn test_repeated_patterns_append_stages() {
        let (mut pipeline, _) = pipeline();
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();
        pipeline.apply_patterns().await.unwrap();
        let second = pipeline.apply_patterns().await.unwrap();

        assert_eq!(second.ordinal, 2);
        assert_eq!(second.input_name, "молоток");
        assert_eq!(second.output_name, "молоток");
        assert_eq!(second.confidence, 1.0);
        assert_eq!(pipeline.history().len(), 2);
    }

    #[tokio::test]
    async fn test_revert_is_append_only() {
        let corrector = Arc::new(FixedCorrector::new("молоток слесарный", 0.95));
        let (pipeline, _) = pipeline();
        let mut pipeline = pipeline.with_corrector(corrector);
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();

        let first = pipeline.apply_patterns().await.unwrap();
        pipeline
            .apply_ai_correction(false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(pipeline.current_name(), Some("молоток слесарный"));

        let revert = pipeline.revert_to_stage(first.id).await.unwrap();
        assert_eq!(revert.stage_type, StageType::Revert);
        assert_eq!(revert.reverted_to, Some(first.id));
        assert_eq!(revert.ordinal, 3);
        assert_eq!(pipeline.current_name(), Some("молоток"));

        let session = pipeline.session().unwrap();
        assert_eq!(session.stage_count, 3);
        assert_eq!(session.status, SessionStatus::Reverted);
        assert_eq!(session.state, PipelineState::AiCorrected);
        assert_eq!(pipeline.history().len(), 3);
    }

    #[tokio::test]
    async fn test_revert_to_foreign_stage() {
        let (mut pipeline, _) = pipeline();
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();
        pipeline.apply_patterns().await.unwrap();

        let err = pipeline.revert_to_stage(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StageNotFound(_)));
        assert_eq!(pipeline.history().len(), 1);
    }

    #[tokio::test]
    async fn test_ai_failure_leaves_session_unchanged() {
        let stats = Arc::new(StatsCollector::new());
        let (pipeline, store) = pipeline();
        let mut pipeline = pipeline
            .with_corrector(Arc::new(FailingCorrector))
            .with_stats(stats.clone());
        let session = pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();
        pipeline.apply_patterns().await.unwrap();

        let err = pipeline
            .apply_ai_correction(false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExternalService(_)));
        assert_eq!(pipeline.history().len(), 1);
        assert_eq!(pipeline.session().unwrap().state, PipelineState::PatternsApplied);
        assert_eq!(store.get_stage_history(session.id).await.unwrap().len(), 1);
        assert_eq!(stats.snapshot().errors_by_kind.get("external_service"), Some(&1));
    }

    #[tokio::test]
    async fn test_empty_suggestion_rejected() {
        let (pipeline, _) = pipeline();
        let mut pipeline = pipeline.with_corrector(Arc::new(FixedCorrector::new("  ", 0.9)));
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();

        let err = pipeline
            .apply_ai_correction(false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExternalService(_)));
        assert!(pipeline.history().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_maps_to_external_service() {
        let (pipeline, _) = pipeline();
        let mut pipeline = pipeline.with_corrector(Arc::new(SlowCorrector));
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = pipeline.apply_ai_correction(false, &cancel).await.unwrap_err();
        match err {
            PipelineError::ExternalService(msg) => assert!(msg.contains("cancelled")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(pipeline.history().is_empty());
        assert_eq!(pipeline.session().unwrap().state, PipelineState::Created);
    }

    #[tokio::test]
    async fn test_chat_mode_passes_prior_stages() {
        let corrector = Arc::new(FixedCorrector::new("молоток слесарный", 0.9));
        let (pipeline, _) = pipeline();
        let mut pipeline = pipeline.with_corrector(corrector.clone());
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();
        pipeline.apply_patterns().await.unwrap();

        let cancel = CancellationToken::new();
        pipeline.apply_ai_correction(true, &cancel).await.unwrap();
        let stage = pipeline.apply_ai_correction(true, &cancel).await.unwrap();

        let requests = corrector.requests.lock().unwrap();
        assert!(requests[0].prior_stages.is_empty());
        assert_eq!(requests[0].stage_count, 1);
        assert_eq!(requests[1].prior_stages.len(), 1);
        assert_eq!(requests[1].prior_stages[0].output_name, "молоток слесарный");
        assert_eq!(requests[1].original_name, REFERENCE_NAME);

        let context = stage.ai_context.unwrap();
        assert!(context.use_chat);
        assert_eq!(context.model.as_deref(), Some("fixed-model"));
    }

    #[tokio::test]
    async fn test_classify_folds_and_scores() {
        let (pipeline, _) = pipeline();
        let mut pipeline = pipeline.with_classifier(Arc::new(FixedClassifier(vec!["A", "B", "C", "D"])));
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();
        pipeline.apply_patterns().await.unwrap();

        let stage = pipeline
            .classify(Some("bottom_priority"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stage.input_name, stage.output_name);
        assert_eq!(stage.category_original.as_ref().unwrap().len(), 4);
        assert_eq!(
            stage.category_folded.unwrap(),
            vec!["A / B / C".to_string(), "D".to_string()]
        );
        assert_eq!(stage.strategy_id.as_deref(), Some("bottom_priority"));
        let quality = stage.quality.unwrap();
        assert!((0.0..=1.0).contains(&quality.overall));
        assert_eq!(pipeline.session().unwrap().state, PipelineState::Classified);
        assert_eq!(pipeline.current_name(), Some("молоток"));
    }

    #[tokio::test]
    async fn test_unknown_strategy_falls_back() {
        let (pipeline, _) = pipeline();
        let mut pipeline = pipeline.with_classifier(Arc::new(FixedClassifier(vec!["A", "B", "C", "D"])));
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();

        let stage = pipeline
            .classify(Some("no_such_strategy"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stage.strategy_id.as_deref(), Some("top_priority"));
        assert_eq!(stage.max_depth, Some(2));
        assert_eq!(
            stage.category_folded.unwrap(),
            vec!["A".to_string(), "B / C / D".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_collaborators() {
        let (mut pipeline, _) = pipeline();
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();
        let cancel = CancellationToken::new();
        assert!(matches!(
            pipeline.apply_ai_correction(false, &cancel).await,
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(
            pipeline.classify(None, &cancel).await,
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_append_keeps_memory_state() {
        let store = Arc::new(FlakyStore::default());
        let mut pipeline = VersionedPipeline::new(store.clone(), PipelineConfig::default()).unwrap();
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();

        store.fail_appends.store(true, Ordering::SeqCst);
        let err = pipeline.apply_patterns().await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(pipeline.history().is_empty());
        assert_eq!(pipeline.current_name(), Some(REFERENCE_NAME));
        assert_eq!(pipeline.session().unwrap().stage_count, 0);

        store.fail_appends.store(false, Ordering::SeqCst);
        let stage = pipeline.apply_patterns().await.unwrap();
        assert_eq!(stage.ordinal, 1);
    }

    #[tokio::test]
    async fn test_complete_blocks_mutation_and_records_stats() {
        let stats = Arc::new(StatsCollector::new());
        let analyzer = Arc::new(PatternAnalyzer::new(10));
        let (pipeline, _) = pipeline();
        let mut pipeline = pipeline.with_stats(stats.clone()).with_analyzer(analyzer.clone());
        pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();
        pipeline.apply_patterns().await.unwrap();

        let session = pipeline.complete().await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(matches!(
            pipeline.apply_patterns().await,
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(
            pipeline.set_metadata("code", serde_json::json!("x")).await,
            Err(PipelineError::InvalidInput(_))
        ));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_normalized, 1);
        assert_eq!(snapshot.ai_enhanced, 0);
        assert_eq!(snapshot.basic + snapshot.benchmark, 1);
        assert_eq!(analyzer.report().total_items, 1);
        assert!(analyzer.category(UNCATEGORIZED).is_some());
    }

    #[tokio::test]
    async fn test_metadata_and_reopen() {
        let (mut pipeline, store) = pipeline();
        let session = pipeline.start_session("item-1", REFERENCE_NAME).await.unwrap();
        pipeline
            .set_metadata("code", serde_json::json!("ER-00013004"))
            .await
            .unwrap();
        pipeline.apply_patterns().await.unwrap();
        assert_eq!(pipeline.get_metadata("code"), Some(&serde_json::json!("ER-00013004")));

        let mut reopened = VersionedPipeline::new(store, PipelineConfig::default()).unwrap();
        reopened.open_session(session.id).await.unwrap();
        assert_eq!(reopened.history().len(), 1);
        assert_eq!(reopened.current_name(), Some("молоток"));
        assert_eq!(reopened.get_metadata("code"), Some(&serde_json::json!("ER-00013004")));

        assert!(matches!(
            reopened.open_session(Uuid::new_v4()).await,
            Err(PipelineError::InvalidInput(_))
        ));
    }
}

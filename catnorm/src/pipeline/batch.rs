//! Batch driver
//!
//! Runs the pipeline over many items, one session each. Item failures are
//! counted by error kind and the run moves on. The stop signal is polled
//! before each item and before each AI call; a call already in flight is
//! allowed to finish. Consecutive AI calls are spaced by the configured
//! inter-call delay.

use crate::error::{PipelineError, Result};
use crate::models::StageType;
use crate::pipeline::{BatchConfig, VersionedPipeline};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One input row
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub item_ref: String,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
}

impl BatchItem {
    pub fn new(item_ref: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            item_ref: item_ref.into(),
            name: name.into(),
            code: None,
            description: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Parse a name list
    ///
    /// One item per non-blank line. A line is either a bare name
    /// (reference `line-N`) or tab-separated `ref<TAB>name[<TAB>code]`.
    pub fn from_lines(text: &str) -> Vec<Self> {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
                match fields.as_slice() {
                    [item_ref, name, code, ..] if !code.is_empty() => {
                        Self::new(*item_ref, *name).with_code(*code)
                    }
                    [item_ref, name, ..] => Self::new(*item_ref, *name),
                    _ => Self::new(format!("line-{}", index + 1), line.trim()),
                }
            })
            .collect()
    }
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Items that were started (succeeded + failed)
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Items never started because the stop signal fired
    pub skipped: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
    /// Succeeded items whose classification reached benchmark quality
    pub benchmark_count: u64,
    pub ai_calls: u64,
    /// Whether the run ended on the stop signal
    pub stopped: bool,
    pub duration_ms: u64,
    /// Sessions created, in input order
    pub session_ids: Vec<Uuid>,
}

impl BatchReport {
    fn record_failure(&mut self, err: &PipelineError) {
        self.failed += 1;
        *self.errors_by_kind.entry(err.kind().to_string()).or_insert(0) += 1;
    }
}

/// Sequential batch runner over one [`VersionedPipeline`]
pub struct BatchDriver {
    pipeline: VersionedPipeline,
    config: BatchConfig,
    ai_calls: u64,
}

impl BatchDriver {
    pub fn new(pipeline: VersionedPipeline, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        if config.use_ai_correction && !pipeline.has_corrector() {
            return Err(PipelineError::Config(
                "batch requests AI correction but no corrector is configured".to_string(),
            ));
        }
        if config.classify && !pipeline.has_classifier() {
            return Err(PipelineError::Config(
                "batch requests classification but no classifier is configured".to_string(),
            ));
        }
        Ok(Self {
            pipeline,
            config,
            ai_calls: 0,
        })
    }

    pub fn pipeline(&self) -> &VersionedPipeline {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> VersionedPipeline {
        self.pipeline
    }

    /// Process `items` in order until done or `stop` fires
    pub async fn run(&mut self, items: Vec<BatchItem>, stop: &CancellationToken) -> BatchReport {
        let started = Instant::now();
        let total = items.len();
        let mut report = BatchReport::default();
        self.ai_calls = 0;

        info!(
            items = total,
            ai_correction = self.config.use_ai_correction,
            classify = self.config.classify,
            delay_ms = self.config.inter_call_delay.as_millis() as u64,
            "Starting batch"
        );

        for (index, item) in items.iter().enumerate() {
            if stop.is_cancelled() {
                report.stopped = true;
                report.skipped = (total - index) as u64;
                warn!(
                    remaining = report.skipped,
                    "Stop requested, skipping remaining items"
                );
                break;
            }

            report.processed += 1;
            match self.process_item(item, stop, &mut report.session_ids).await {
                Ok(benchmark) => {
                    report.succeeded += 1;
                    if benchmark {
                        report.benchmark_count += 1;
                    }
                }
                Err(e) => {
                    error!(
                        item_ref = %item.item_ref,
                        name = %item.name,
                        kind = e.kind(),
                        error = %e,
                        "Batch item failed"
                    );
                    report.record_failure(&e);
                }
            }
        }

        if stop.is_cancelled() {
            report.stopped = true;
        }
        report.ai_calls = self.ai_calls;
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            benchmark = report.benchmark_count,
            duration_ms = report.duration_ms,
            "Batch finished"
        );
        report
    }

    /// Returns whether the item reached benchmark quality
    async fn process_item(
        &mut self,
        item: &BatchItem,
        stop: &CancellationToken,
        session_ids: &mut Vec<Uuid>,
    ) -> Result<bool> {
        let session = self.pipeline.start_session(&item.item_ref, &item.name).await?;
        session_ids.push(session.id);

        if let Some(code) = &item.code {
            self.pipeline
                .set_metadata("code", serde_json::Value::String(code.clone()))
                .await?;
        }
        if let Some(description) = &item.description {
            self.pipeline
                .set_metadata("description", serde_json::Value::String(description.clone()))
                .await?;
        }

        self.pipeline.apply_patterns().await?;

        // In-flight calls get their own token so the stop signal never
        // interrupts them
        if self.config.use_ai_correction && self.wait_for_ai_slot(stop).await {
            self.pipeline
                .apply_ai_correction(self.config.use_chat, &CancellationToken::new())
                .await?;
        }
        if self.config.classify && self.wait_for_ai_slot(stop).await {
            self.pipeline
                .classify(self.config.strategy_id.as_deref(), &CancellationToken::new())
                .await?;
        }

        self.pipeline.complete().await?;

        let benchmark = self
            .pipeline
            .history()
            .iter()
            .rev()
            .find(|s| s.stage_type == StageType::Classification)
            .and_then(|s| s.quality.as_ref())
            .map(|q| q.is_benchmark_quality)
            .unwrap_or(false);

        debug!(
            item_ref = %item.item_ref,
            session_id = %session.id,
            name = ?self.pipeline.current_name(),
            benchmark,
            "Batch item done"
        );
        Ok(benchmark)
    }

    /// Wait out the inter-call delay; false if the stop signal fired
    async fn wait_for_ai_slot(&mut self, stop: &CancellationToken) -> bool {
        if stop.is_cancelled() {
            return false;
        }
        if self.ai_calls > 0 && !self.config.inter_call_delay.is_zero() {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return false,
                _ = tokio::time::sleep(self.config.inter_call_delay) => {}
            }
        }
        self.ai_calls += 1;
        true
    }
}

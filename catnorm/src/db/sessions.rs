//! SQLite session store
//!
//! Stages are rows of `normalization_stages`; list-valued fields (patterns,
//! category paths, AI context, quality) are JSON text columns. Timestamps
//! are RFC 3339 strings.

use crate::db::SessionStore;
use crate::error::{PipelineError, Result};
use crate::models::{Session, Stage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, item_ref, original_name, current_name, stage_count, status, state, metadata, created_at, updated_at";

const STAGE_COLUMNS: &str = "id, session_id, ordinal, stage_type, input_name, output_name, applied_patterns, ai_context, category_original, category_folded, strategy_id, max_depth, quality, reverted_to, confidence, status, created_at";

#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Wrap a pool whose schema is already initialized
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file with the session schema
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = catnorm_common::db::init_database(path).await?;
        Ok(Self::new(pool))
    }

    /// Fresh in-memory database
    pub async fn in_memory() -> Result<Self> {
        let pool = catnorm_common::db::init_memory_database().await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        let metadata = to_json(&session.metadata, "metadata")?;

        sqlx::query(
            r#"
            INSERT INTO normalization_sessions (
                id, item_ref, original_name, current_name, stage_count,
                status, state, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(&session.item_ref)
        .bind(&session.original_name)
        .bind(&session.current_name)
        .bind(session.stage_count as i64)
        .bind(session.status.as_str())
        .bind(session.state.as_str())
        .bind(&metadata)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(session_id = %session.id, "Created session row");
        Ok(())
    }

    async fn append_stage(&self, session: &Session, stage: &Stage) -> Result<()> {
        if stage.session_id != session.id {
            return Err(PipelineError::Persistence(format!(
                "stage {} belongs to session {}, not {}",
                stage.id, stage.session_id, session.id
            )));
        }

        // Serialize before opening the transaction
        let applied_patterns = to_json(&stage.applied_patterns, "applied_patterns")?;
        let ai_context = stage
            .ai_context
            .as_ref()
            .map(|c| to_json(c, "ai_context"))
            .transpose()?;
        let category_original = stage
            .category_original
            .as_ref()
            .map(|c| to_json(c, "category_original"))
            .transpose()?;
        let category_folded = stage
            .category_folded
            .as_ref()
            .map(|c| to_json(c, "category_folded"))
            .transpose()?;
        let quality = stage
            .quality
            .as_ref()
            .map(|q| to_json(q, "quality"))
            .transpose()?;
        let metadata = to_json(&session.metadata, "metadata")?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO normalization_stages (
                id, session_id, ordinal, stage_type, input_name, output_name,
                applied_patterns, ai_context, category_original, category_folded,
                strategy_id, max_depth, quality, reverted_to, confidence, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(stage.id.to_string())
        .bind(stage.session_id.to_string())
        .bind(stage.ordinal as i64)
        .bind(stage.stage_type.as_str())
        .bind(&stage.input_name)
        .bind(&stage.output_name)
        .bind(&applied_patterns)
        .bind(&ai_context)
        .bind(&category_original)
        .bind(&category_folded)
        .bind(&stage.strategy_id)
        .bind(stage.max_depth.map(|d| d as i64))
        .bind(&quality)
        .bind(stage.reverted_to.map(|id| id.to_string()))
        .bind(stage.confidence)
        .bind(stage.status.as_str())
        .bind(stage.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let updated = write_session(&mut tx, session, &metadata).await?;
        if updated == 0 {
            tx.rollback().await?;
            return Err(PipelineError::Persistence(format!(
                "session {} not found",
                session.id
            )));
        }

        tx.commit().await?;

        debug!(
            session_id = %session.id,
            stage_id = %stage.id,
            ordinal = stage.ordinal,
            stage_type = stage.stage_type.as_str(),
            "Appended stage"
        );
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let metadata = to_json(&session.metadata, "metadata")?;
        let mut tx = self.pool.begin().await?;
        let updated = write_session(&mut tx, session, &metadata).await?;
        if updated == 0 {
            tx.rollback().await?;
            return Err(PipelineError::Persistence(format!(
                "session {} not found",
                session.id
            )));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM normalization_sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_session(&row)).transpose()
    }

    async fn get_stage_history(&self, session_id: Uuid) -> Result<Vec<Stage>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM normalization_stages WHERE session_id = ? ORDER BY ordinal ASC",
            STAGE_COLUMNS
        ))
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_stage).collect()
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM normalization_sessions ORDER BY updated_at DESC, created_at DESC LIMIT ?",
            SESSION_COLUMNS
        ))
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }
}

async fn write_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session: &Session,
    metadata: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE normalization_sessions SET
            current_name = ?,
            stage_count = ?,
            status = ?,
            state = ?,
            metadata = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&session.current_name)
    .bind(session.stage_count as i64)
    .bind(session.status.as_str())
    .bind(session.state.as_str())
    .bind(metadata)
    .bind(session.updated_at.to_rfc3339())
    .bind(session.id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

fn row_to_session(row: &SqliteRow) -> Result<Session> {
    let metadata: String = row.try_get("metadata")?;

    Ok(Session {
        id: parse_uuid(row.try_get("id")?)?,
        item_ref: row.try_get("item_ref")?,
        original_name: row.try_get("original_name")?,
        current_name: row.try_get("current_name")?,
        stage_count: row.try_get::<i64, _>("stage_count")? as u32,
        status: parse_enum(row.try_get("status")?)?,
        state: parse_enum(row.try_get("state")?)?,
        metadata: from_json(&metadata, "metadata")?,
        created_at: parse_time(row.try_get("created_at")?)?,
        updated_at: parse_time(row.try_get("updated_at")?)?,
    })
}

fn row_to_stage(row: &SqliteRow) -> Result<Stage> {
    let applied_patterns: String = row.try_get("applied_patterns")?;
    let ai_context: Option<String> = row.try_get("ai_context")?;
    let category_original: Option<String> = row.try_get("category_original")?;
    let category_folded: Option<String> = row.try_get("category_folded")?;
    let quality: Option<String> = row.try_get("quality")?;
    let reverted_to: Option<String> = row.try_get("reverted_to")?;
    let max_depth: Option<i64> = row.try_get("max_depth")?;

    Ok(Stage {
        id: parse_uuid(row.try_get("id")?)?,
        session_id: parse_uuid(row.try_get("session_id")?)?,
        ordinal: row.try_get::<i64, _>("ordinal")? as u32,
        stage_type: parse_enum(row.try_get("stage_type")?)?,
        input_name: row.try_get("input_name")?,
        output_name: row.try_get("output_name")?,
        applied_patterns: from_json(&applied_patterns, "applied_patterns")?,
        ai_context: ai_context.map(|s| from_json(&s, "ai_context")).transpose()?,
        category_original: category_original
            .map(|s| from_json(&s, "category_original"))
            .transpose()?,
        category_folded: category_folded
            .map(|s| from_json(&s, "category_folded"))
            .transpose()?,
        strategy_id: row.try_get("strategy_id")?,
        max_depth: max_depth.map(|d| d as u32),
        quality: quality.map(|s| from_json(&s, "quality")).transpose()?,
        reverted_to: reverted_to.map(parse_uuid).transpose()?,
        confidence: row.try_get("confidence")?,
        status: parse_enum(row.try_get("status")?)?,
        created_at: parse_time(row.try_get("created_at")?)?,
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T, field: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| PipelineError::Persistence(format!("Failed to serialize {}: {}", field, e)))
}

fn from_json<T: DeserializeOwned>(text: &str, field: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| PipelineError::Persistence(format!("Failed to deserialize {}: {}", field, e)))
}

fn parse_uuid(text: String) -> Result<Uuid> {
    Uuid::parse_str(&text)
        .map_err(|e| PipelineError::Persistence(format!("Invalid id '{}': {}", text, e)))
}

fn parse_time(text: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PipelineError::Persistence(format!("Invalid timestamp '{}': {}", text, e)))
}

fn parse_enum<T: FromStr<Err = String>>(text: String) -> Result<T> {
    T::from_str(&text).map_err(PipelineError::Persistence)
}

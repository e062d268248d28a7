//! Database initialization
//!
//! Creates the session store schema on first run. All statements are
//! idempotent, so opening an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the session database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets batch readers run while a pipeline appends stages
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_session_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database with the session schema (single connection)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_session_tables(&pool).await?;

    Ok(pool)
}

/// Create the normalization session and stage tables
pub async fn create_session_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS normalization_sessions (
            id TEXT PRIMARY KEY,
            item_ref TEXT NOT NULL,
            original_name TEXT NOT NULL,
            current_name TEXT NOT NULL,
            stage_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            state TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS normalization_stages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES normalization_sessions(id),
            ordinal INTEGER NOT NULL,
            stage_type TEXT NOT NULL,
            input_name TEXT NOT NULL,
            output_name TEXT NOT NULL,
            applied_patterns TEXT NOT NULL DEFAULT '[]',
            ai_context TEXT,
            category_original TEXT,
            category_folded TEXT,
            strategy_id TEXT,
            max_depth INTEGER,
            quality TEXT,
            reverted_to TEXT,
            confidence REAL NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (session_id, ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_stages_session ON normalization_stages(session_id, ordinal)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_item ON normalization_sessions(item_ref)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

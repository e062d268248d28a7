//! Session persistence
//!
//! The pipeline only sees [`SessionStore`]: an append-only log of stages
//! keyed by session id. [`SqliteSessionStore`] persists to SQLite (schema in
//! `catnorm_common::db`), [`InMemorySessionStore`] keeps everything in
//! process for tests and one-off CLI runs.

pub mod memory;
pub mod sessions;

pub use memory::InMemorySessionStore;
pub use sessions::SqliteSessionStore;

use crate::error::Result;
use crate::models::{Session, Stage};
use async_trait::async_trait;
use uuid::Uuid;

/// Transactional stage log
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session; fails if the id already exists
    async fn create_session(&self, session: &Session) -> Result<()>;

    /// Insert `stage` and write `session` (already updated to reflect the
    /// stage) in one transaction. Nothing is written if either part fails.
    async fn append_stage(&self, session: &Session, stage: &Stage) -> Result<()>;

    /// Overwrite the mutable session fields (status, metadata, names)
    async fn update_session(&self, session: &Session) -> Result<()>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>>;

    /// Stages of a session in append order
    async fn get_stage_history(&self, session_id: Uuid) -> Result<Vec<Stage>>;

    /// Most recently updated sessions first
    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>>;
}

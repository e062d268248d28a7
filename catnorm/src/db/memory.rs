//! In-process session store

use crate::db::SessionStore;
use crate::error::{PipelineError, Result};
use crate::models::{Session, Stage};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
struct Entry {
    session: Session,
    stages: Vec<Stage>,
}

/// [`SessionStore`] held in memory; contents are lost on drop
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&session.id) {
            return Err(PipelineError::Persistence(format!(
                "session {} already exists",
                session.id
            )));
        }
        entries.insert(
            session.id,
            Entry {
                session: session.clone(),
                stages: Vec::new(),
            },
        );
        Ok(())
    }

    async fn append_stage(&self, session: &Session, stage: &Stage) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&session.id).ok_or_else(|| {
            PipelineError::Persistence(format!("session {} not found", session.id))
        })?;

        if stage.session_id != session.id {
            return Err(PipelineError::Persistence(format!(
                "stage {} belongs to session {}, not {}",
                stage.id, stage.session_id, session.id
            )));
        }
        if entry.stages.iter().any(|s| s.ordinal == stage.ordinal) {
            return Err(PipelineError::Persistence(format!(
                "stage ordinal {} already recorded for session {}",
                stage.ordinal, session.id
            )));
        }

        // Both checks passed; write lock is held so the pair lands together
        entry.stages.push(stage.clone());
        entry.session = session.clone();
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&session.id).ok_or_else(|| {
            PipelineError::Persistence(format!("session {} not found", session.id))
        })?;
        entry.session = session.clone();
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self
            .entries
            .read()
            .await
            .get(&session_id)
            .map(|e| e.session.clone()))
    }

    async fn get_stage_history(&self, session_id: Uuid) -> Result<Vec<Stage>> {
        let entries = self.entries.read().await;
        let mut stages = entries
            .get(&session_id)
            .map(|e| e.stages.clone())
            .unwrap_or_default();
        stages.sort_by_key(|s| s.ordinal);
        Ok(stages)
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let entries = self.entries.read().await;
        let mut sessions: Vec<Session> = entries.values().map(|e| e.session.clone()).collect();
        sessions.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        sessions.truncate(limit);
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageType;

    #[tokio::test]
    async fn test_append_and_history() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new("item-1", "Молоток");
        store.create_session(&session).await.unwrap();

        for ordinal in 1..=3 {
            let stage = Stage::new(session.id, ordinal, StageType::PatternCleanup, "a", "b", 1.0);
            session.stage_count = ordinal;
            store.append_stage(&session, &stage).await.unwrap();
        }

        let history = store.get_stage_history(session.id).await.unwrap();
        assert_eq!(history.iter().map(|s| s.ordinal).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(store.get_session(session.id).await.unwrap().unwrap().stage_count, 3);
    }

    #[tokio::test]
    async fn test_rejected_append_leaves_session_untouched() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new("item-1", "Молоток");
        store.create_session(&session).await.unwrap();
        let stage = Stage::new(session.id, 1, StageType::PatternCleanup, "Молоток", "молоток", 1.0);
        session.current_name = "молоток".to_string();
        session.stage_count = 1;
        store.append_stage(&session, &stage).await.unwrap();

        let mut next = session.clone();
        next.current_name = "другое".to_string();
        next.stage_count = 2;
        let clash = Stage::new(session.id, 1, StageType::PatternCleanup, "молоток", "другое", 1.0);
        assert!(store.append_stage(&next, &clash).await.is_err());

        let stored = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.current_name, "молоток");
        assert_eq!(stored.stage_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_sessions() {
        let store = InMemorySessionStore::new();
        let session = Session::new("item-1", "name");
        store.create_session(&session).await.unwrap();
        assert!(store.create_session(&session).await.is_err());

        let other = Session::new("item-2", "name");
        assert!(store.update_session(&other).await.is_err());
        assert!(store.get_stage_history(other.id).await.unwrap().is_empty());
        assert_eq!(store.session_count().await, 1);
    }
}

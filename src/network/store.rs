//! Session Store
//!
//! Keyed storage for session records. The engine only relies on
//! get / conditional create / per-field update semantics, so any document
//! store can sit behind [`SessionStore`].
//!
//! Concurrency contract:
//! - `merge_input` touches only `inputs[connection]`. It never races with a
//!   state write because state writes never rewrite `inputs`.
//! - `write_state` succeeds only if `stateVersion` still equals the version
//!   the caller loaded, then bumps it.

use std::collections::BTreeMap;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::core::grid::Direction;
use crate::game::state::{ConnectionId, GameState, GameStateError};
use crate::network::session::{MatchId, SessionRecord, SessionStatus};

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record under this id.
    #[error("session {0} not found")]
    NotFound(MatchId),

    /// Conditional create found an existing record.
    #[error("session {0} already exists")]
    AlreadyExists(MatchId),

    /// Input from a connection that is not in the session.
    #[error("connection {connection_id} is not a player in session {match_id}")]
    NotParticipant {
        /// Session
        match_id: MatchId,
        /// Offending connection
        connection_id: ConnectionId,
    },

    /// Someone else wrote the game state since it was loaded.
    #[error("state version conflict on session {match_id}: expected {expected}, found {found}")]
    VersionConflict {
        /// Session
        match_id: MatchId,
        /// Version the writer loaded
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Stored document does not decode or fails validation.
    #[error("stored session {match_id} is corrupt: {source}")]
    Corrupt {
        /// Session
        match_id: MatchId,
        /// Decode or validation failure
        #[source]
        source: GameStateError,
    },

    /// Backend could not be reached.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Failures that might succeed if simply attempted again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Keyed session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a record.
    async fn get(&self, match_id: &MatchId) -> Result<Option<SessionRecord>, StoreError>;

    /// Create a record; fails if the id is taken.
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Set `inputs[connection_id] = direction` on an existing session.
    async fn merge_input(
        &self,
        match_id: &MatchId,
        connection_id: &ConnectionId,
        direction: Direction,
    ) -> Result<(), StoreError>;

    /// Write the game state if `stateVersion == expected_version`.
    /// Returns the new version.
    async fn write_state(
        &self,
        match_id: &MatchId,
        expected_version: u64,
        state: &GameState,
    ) -> Result<u64, StoreError>;

    /// Change the status.
    async fn set_status(&self, match_id: &MatchId, status: SessionStatus) -> Result<(), StoreError>;

    /// All records currently `ACTIVE`.
    async fn list_active(&self) -> Result<Vec<SessionRecord>, StoreError>;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Process-local store keeping each record as a JSON document.
///
/// Every read goes through [`SessionRecord::from_json`], so schema
/// validation runs exactly as it would against a remote document store.
#[derive(Default)]
pub struct InMemorySessionStore {
    documents: RwLock<BTreeMap<MatchId, String>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw document, bypassing validation (imports and tests).
    pub async fn put_raw(&self, match_id: MatchId, document: String) {
        self.documents.write().await.insert(match_id, document);
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn decode(match_id: &MatchId, document: &str) -> Result<SessionRecord, StoreError> {
        SessionRecord::from_json(document).map_err(|source| StoreError::Corrupt {
            match_id: match_id.clone(),
            source,
        })
    }

    fn encode(match_id: &MatchId, record: &SessionRecord) -> Result<String, StoreError> {
        record.to_json().map_err(|e| StoreError::Corrupt {
            match_id: match_id.clone(),
            source: GameStateError::Malformed(e),
        })
    }

    /// Read-modify-write one document under the write lock.
    async fn modify<T>(
        &self,
        match_id: &MatchId,
        f: impl FnOnce(&mut SessionRecord) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get(match_id)
            .ok_or_else(|| StoreError::NotFound(match_id.clone()))?;

        let mut record = Self::decode(match_id, document)?;
        let out = f(&mut record)?;
        let encoded = Self::encode(match_id, &record)?;
        documents.insert(match_id.clone(), encoded);
        Ok(out)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, match_id: &MatchId) -> Result<Option<SessionRecord>, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(match_id)
            .map(|document| Self::decode(match_id, document))
            .transpose()
    }

    async fn create(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&record.match_id) {
            return Err(StoreError::AlreadyExists(record.match_id));
        }
        let encoded = Self::encode(&record.match_id, &record)?;
        documents.insert(record.match_id, encoded);
        Ok(())
    }

    async fn merge_input(
        &self,
        match_id: &MatchId,
        connection_id: &ConnectionId,
        direction: Direction,
    ) -> Result<(), StoreError> {
        self.modify(match_id, |record| {
            if !record.is_participant(connection_id) {
                return Err(StoreError::NotParticipant {
                    match_id: match_id.clone(),
                    connection_id: connection_id.clone(),
                });
            }
            record.inputs.insert(connection_id.clone(), direction);
            Ok(())
        })
        .await?;

        debug!(%match_id, connection = %connection_id, %direction, "input merged");
        Ok(())
    }

    async fn write_state(
        &self,
        match_id: &MatchId,
        expected_version: u64,
        state: &GameState,
    ) -> Result<u64, StoreError> {
        self.modify(match_id, |record| {
            if record.state_version != expected_version {
                return Err(StoreError::VersionConflict {
                    match_id: match_id.clone(),
                    expected: expected_version,
                    found: record.state_version,
                });
            }
            record.game_state = Some(state.clone());
            record.state_version += 1;
            record.updated_at = Utc::now();
            Ok(record.state_version)
        })
        .await
    }

    async fn set_status(&self, match_id: &MatchId, status: SessionStatus) -> Result<(), StoreError> {
        self.modify(match_id, |record| {
            record.status = status;
            record.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn list_active(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let documents = self.documents.read().await;
        let mut active = Vec::new();
        for (match_id, document) in documents.iter() {
            match Self::decode(match_id, document) {
                Ok(record) if record.status == SessionStatus::Active => active.push(record),
                Ok(_) => {}
                Err(e) => warn!(%match_id, error = %e, "skipping corrupt session"),
            }
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::Cell;

    fn record(id: &str) -> SessionRecord {
        SessionRecord::new(MatchId::new(id), vec![ConnectionId::new("a"), ConnectionId::new("b")])
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemorySessionStore::new();
        store.create(record("m1")).await.unwrap();

        let loaded = store.get(&MatchId::new("m1")).await.unwrap().unwrap();
        assert_eq!(loaded.players.len(), 2);
        assert_eq!(loaded.status, SessionStatus::Active);
        assert!(store.get(&MatchId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_is_conditional() {
        let store = InMemorySessionStore::new();
        store.create(record("m1")).await.unwrap();
        assert!(matches!(store.create(record("m1")).await, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_merge_input() {
        let store = InMemorySessionStore::new();
        let id = MatchId::new("m1");
        store.create(record("m1")).await.unwrap();

        store.merge_input(&id, &ConnectionId::new("a"), Direction::Up).await.unwrap();
        store.merge_input(&id, &ConnectionId::new("a"), Direction::Left).await.unwrap();

        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.inputs.get(&ConnectionId::new("a")), Some(&Direction::Left));
    }

    #[tokio::test]
    async fn test_merge_input_failures() {
        let store = InMemorySessionStore::new();
        store.create(record("m1")).await.unwrap();

        let missing = store.merge_input(&MatchId::new("nope"), &ConnectionId::new("a"), Direction::Up).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        let stranger = store.merge_input(&MatchId::new("m1"), &ConnectionId::new("zz"), Direction::Up).await;
        assert!(matches!(stranger, Err(StoreError::NotParticipant { .. })));
    }

    #[tokio::test]
    async fn test_write_state_version_check() {
        let store = InMemorySessionStore::new();
        let id = MatchId::new("m1");
        store.create(record("m1")).await.unwrap();
        let state = GameState::new(10, 10, Cell::new(2, 2));

        assert_eq!(store.write_state(&id, 0, &state).await.unwrap(), 1);
        assert_eq!(store.write_state(&id, 1, &state).await.unwrap(), 2);

        // A writer that loaded version 1 has been superseded
        let stale = store.write_state(&id, 1, &state).await;
        assert!(matches!(stale, Err(StoreError::VersionConflict { expected: 1, found: 2, .. })));
    }

    #[tokio::test]
    async fn test_state_write_keeps_inputs() {
        let store = InMemorySessionStore::new();
        let id = MatchId::new("m1");
        store.create(record("m1")).await.unwrap();

        // Tick loads version 0, an input lands, then the tick writes
        let loaded = store.get(&id).await.unwrap().unwrap();
        store.merge_input(&id, &ConnectionId::new("b"), Direction::Down).await.unwrap();
        store
            .write_state(&id, loaded.state_version, &GameState::new(10, 10, Cell::new(0, 0)))
            .await
            .unwrap();

        let after = store.get(&id).await.unwrap().unwrap();
        assert_eq!(after.inputs.get(&ConnectionId::new("b")), Some(&Direction::Down));
        assert!(after.game_state.is_some());
    }

    #[tokio::test]
    async fn test_list_active() {
        let store = InMemorySessionStore::new();
        store.create(record("m1")).await.unwrap();
        store.create(record("m2")).await.unwrap();
        store.set_status(&MatchId::new("m2"), SessionStatus::Ended).await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].match_id, MatchId::new("m1"));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_corrupt_document() {
        let store = InMemorySessionStore::new();
        store.put_raw(MatchId::new("bad"), "{\"matchId\": 7}".to_string()).await;

        let result = store.get(&MatchId::new("bad")).await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        assert!(!result.unwrap_err().is_transient());
    }
}

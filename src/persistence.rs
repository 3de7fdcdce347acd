// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Durability Layer (C5): debounced writes of document snapshots to a
//! relational store, load-on-demand, graceful flush on shutdown, and
//! transactional room cleanup.
//!
//! Persistence failures never propagate into [`crate::document::Document::ingest`]
//! — see [`crate::error::RoomError`]'s doc comment. They are logged here and
//! retried; the caller only ever learns "the write was scheduled."

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::PgPool;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::room::DocumentId;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub id: DocumentId,
    pub content: String,
    pub revision: u64,
}

/// Either a real Postgres-backed store, or the in-process fallback used when
/// no database is configured (local development, tests). Both sides of the
/// match implement the same four operations, so nothing above this module
/// needs to know which backend is live.
enum Backend {
    Postgres(PgPool),
    Memory(Mutex<HashMap<(String, DocumentId), (String, u64)>>),
}

impl Backend {
    async fn init_documents(&self, code: &str, ids: &[DocumentId]) -> Result<(), PersistenceError> {
        match self {
            Self::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                for &id in ids {
                    sqlx::query(
                        "INSERT INTO documents (room_code, editor_id, content, revision, updated_at) \
                         VALUES ($1, $2, '', 0, now()) \
                         ON CONFLICT (room_code, editor_id) DO NOTHING",
                    )
                    .bind(code)
                    .bind(id as i64)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
            }
            Self::Memory(store) => {
                let mut store = store.lock().expect("memory store poisoned");
                for &id in ids {
                    store
                        .entry((code.to_string(), id))
                        .or_insert((String::new(), 0));
                }
            }
        }
        Ok(())
    }

    async fn load_documents(&self, code: &str) -> Result<Vec<DocumentRow>, PersistenceError> {
        match self {
            Self::Postgres(pool) => {
                let rows: Vec<(i64, String, i64)> = sqlx::query_as(
                    "SELECT editor_id, content, revision FROM documents WHERE room_code = $1",
                )
                .bind(code)
                .fetch_all(pool)
                .await?;
                Ok(rows
                    .into_iter()
                    .map(|(id, content, revision)| DocumentRow {
                        id: id as DocumentId,
                        content,
                        revision: revision as u64,
                    })
                    .collect())
            }
            Self::Memory(store) => {
                let store = store.lock().expect("memory store poisoned");
                Ok(store
                    .iter()
                    .filter(|((c, _), _)| c == code)
                    .map(|((_, id), (content, revision))| DocumentRow {
                        id: *id,
                        content: content.clone(),
                        revision: *revision,
                    })
                    .collect())
            }
        }
    }

    async fn save_document(
        &self,
        code: &str,
        id: DocumentId,
        content: &str,
        revision: u64,
    ) -> Result<(), PersistenceError> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO documents (room_code, editor_id, content, revision, updated_at) \
                     VALUES ($1, $2, $3, $4, now()) \
                     ON CONFLICT (room_code, editor_id) \
                     DO UPDATE SET content = $3, revision = $4, updated_at = now()",
                )
                .bind(code)
                .bind(id as i64)
                .bind(content)
                .bind(revision as i64)
                .execute(pool)
                .await?;
            }
            Self::Memory(store) => {
                let mut store = store.lock().expect("memory store poisoned");
                store.insert((code.to_string(), id), (content.to_string(), revision));
            }
        }
        Ok(())
    }

    async fn cleanup_room(&self, code: &str) -> Result<(), PersistenceError> {
        match self {
            Self::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                sqlx::query("DELETE FROM documents WHERE room_code = $1")
                    .bind(code)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
            Self::Memory(store) => {
                let mut store = store.lock().expect("memory store poisoned");
                store.retain(|(c, _), _| c != code);
            }
        }
        Ok(())
    }
}

struct PendingWrite {
    content: String,
    revision: u64,
    generation: u64,
}

/// A handle to the Durability Layer, cheap to clone, shared between the
/// registry and every room it owns. Holds the pending-writes table: at most
/// one scheduled write per `(roomCode, editorId)`, debounced by `Tw`.
#[derive(Clone)]
pub struct PersistenceHandle {
    backend: Arc<Backend>,
    debounce: Duration,
    pending: Arc<Mutex<HashMap<(String, DocumentId), PendingWrite>>>,
}

impl PersistenceHandle {
    #[must_use]
    pub fn postgres(pool: PgPool, debounce: Duration) -> Self {
        Self {
            backend: Arc::new(Backend::Postgres(pool)),
            debounce,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn in_memory(debounce: Duration) -> Self {
        Self {
            backend: Arc::new(Backend::Memory(Mutex::new(HashMap::new()))),
            debounce,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn init_documents(&self, code: &str, ids: &[DocumentId]) {
        if let Err(err) = self.backend.init_documents(code, ids).await {
            warn!(room_code = code, %err, "failed to initialize persisted documents");
        }
    }

    pub async fn load_documents(&self, code: &str) -> Vec<DocumentRow> {
        match self.backend.load_documents(code).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(room_code = code, %err, "failed to load persisted documents");
                Vec::new()
            }
        }
    }

    pub async fn cleanup_room(&self, code: &str) {
        self.pending
            .lock()
            .expect("pending writes poisoned")
            .retain(|(c, _), _| c != code);
        if let Err(err) = self.backend.cleanup_room(code).await {
            warn!(room_code = code, %err, "failed to clean up persisted room");
        }
    }

    /// Replace the pending write for `(code, id)` and arm a fresh debounce
    /// timer. A write already in flight whose generation has been
    /// superseded by this call becomes a no-op when its timer fires.
    pub fn schedule_write(&self, code: String, id: DocumentId, content: String, revision: u64) {
        let generation = {
            let mut pending = self.pending.lock().expect("pending writes poisoned");
            let generation = pending
                .get(&(code.clone(), id))
                .map_or(0, |p| p.generation + 1);
            pending.insert(
                (code.clone(), id),
                PendingWrite {
                    content,
                    revision,
                    generation,
                },
            );
            generation
        };

        let handle = self.clone();
        let debounce = self.debounce;
        tokio::spawn(async move {
            sleep(debounce).await;
            handle.fire_if_current(&code, id, generation).await;
        });
    }

    async fn fire_if_current(&self, code: &str, id: DocumentId, generation: u64) {
        let write = {
            let mut pending = self.pending.lock().expect("pending writes poisoned");
            match pending.get(&(code.to_string(), id)) {
                Some(p) if p.generation == generation => pending.remove(&(code.to_string(), id)),
                _ => None,
            }
        };
        let Some(write) = write else { return };

        if let Err(err) = self
            .backend
            .save_document(code, id, &write.content, write.revision)
            .await
        {
            warn!(room_code = code, editor_id = id, %err, "persisted write failed, will retry on next edit");
        } else {
            info!(room_code = code, editor_id = id, revision = write.revision, "debounced write persisted");
        }
    }

    /// Drive every pending write to completion synchronously. Called once,
    /// on graceful shutdown.
    pub async fn flush_all(&self) {
        let writes: Vec<((String, DocumentId), PendingWrite)> = {
            let mut pending = self.pending.lock().expect("pending writes poisoned");
            pending.drain().collect()
        };
        for ((code, id), write) in writes {
            if let Err(err) = self
                .backend
                .save_document(&code, id, &write.content, write.revision)
                .await
            {
                warn!(room_code = code, editor_id = id, %err, "failed to flush pending write on shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips_init_save_load() {
        let store = PersistenceHandle::in_memory(Duration::from_millis(10));
        store.init_documents("ABCDEF", &[0, 1]).await;
        store.schedule_write("ABCDEF".to_string(), 0, "hello".to_string(), 3);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let rows = store.load_documents("ABCDEF").await;
        let doc0 = rows.iter().find(|r| r.id == 0).unwrap();
        assert_eq!(doc0.content, "hello");
        assert_eq!(doc0.revision, 3);
    }

    #[tokio::test]
    async fn superseded_write_is_dropped_in_favor_of_latest() {
        let store = PersistenceHandle::in_memory(Duration::from_millis(30));
        store.init_documents("ABCDEF", &[0]).await;
        store.schedule_write("ABCDEF".to_string(), 0, "first".to_string(), 1);
        store.schedule_write("ABCDEF".to_string(), 0, "second".to_string(), 2);
        tokio::time::sleep(Duration::from_millis(80)).await;

        let rows = store.load_documents("ABCDEF").await;
        let doc0 = rows.iter().find(|r| r.id == 0).unwrap();
        assert_eq!(doc0.content, "second");
        assert_eq!(doc0.revision, 2);
    }

    #[tokio::test]
    async fn cleanup_room_removes_all_rows() {
        let store = PersistenceHandle::in_memory(Duration::from_millis(10));
        store.init_documents("ABCDEF", &[0, 1]).await;
        store.cleanup_room("ABCDEF").await;
        assert!(store.load_documents("ABCDEF").await.is_empty());
    }

    #[tokio::test]
    async fn flush_all_persists_pending_writes_immediately() {
        let store = PersistenceHandle::in_memory(Duration::from_secs(3600));
        store.init_documents("ABCDEF", &[0]).await;
        store.schedule_write("ABCDEF".to_string(), 0, "urgent".to_string(), 9);
        store.flush_all().await;

        let rows = store.load_documents("ABCDEF").await;
        assert_eq!(rows[0].content, "urgent");
    }
}

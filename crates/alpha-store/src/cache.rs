//! Client-local key/value cache.
//!
//! Survives restarts of the same client. Values are JSON documents keyed by a
//! fixed string: `context:<installation>` for the context record and
//! `conversations` for the cached conversation list.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use alpha_core::{
    ContextRecord, ConversationDraft, ConversationId, ConversationRecord, ConversationUpdate,
    InstallationId,
};

use crate::backend::{ContextBackend, ConversationBackend};
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;
use crate::schema;

const TABLE: &str = "cache_entries";
const CONVERSATIONS_KEY: &str = "conversations";

fn context_key(owner: &InstallationId) -> String {
    format!("context:{owner}")
}

#[derive(Clone)]
pub struct LocalCache {
    db: Database,
}

impl LocalCache {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open_with(path, &schema::CACHE)?,
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::in_memory_with(&schema::CACHE)?,
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| read(conn, key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| write(conn, key, value))
    }

    /// Returns whether the key was present.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key])? > 0)
        })
    }

    // ── Context ─────────────────────────────────────────────────────

    pub fn context(&self, owner: &InstallationId) -> Result<Option<ContextRecord>, StoreError> {
        self.get(&context_key(owner))?
            .map(|raw| row_helpers::parse_json(&raw, TABLE, "value"))
            .transpose()
    }

    /// Upsert with the same timestamp rules as the authoritative store.
    #[instrument(skip(self, record), fields(owner = %owner))]
    pub fn put_context(
        &self,
        owner: &InstallationId,
        record: &ContextRecord,
    ) -> Result<ContextRecord, StoreError> {
        let key = context_key(owner);
        self.db.with_conn(|conn| {
            let previous: Option<ContextRecord> = read_json(conn, &key)?;
            let now = row_helpers::now();
            let mut stored = record.clone();
            stored.created_at = previous
                .and_then(|p| p.created_at)
                .or(record.created_at)
                .or(Some(now));
            stored.updated_at = Some(now);
            write_json(conn, &key, &stored)?;
            Ok(stored)
        })
    }

    /// Store a record exactly as the authoritative store returned it.
    pub fn mirror_context(
        &self,
        owner: &InstallationId,
        record: &ContextRecord,
    ) -> Result<(), StoreError> {
        let key = context_key(owner);
        self.db.with_conn(|conn| write_json(conn, &key, record))
    }

    // ── Conversations ───────────────────────────────────────────────

    pub fn conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        self.db
            .with_conn(|conn| Ok(read_json(conn, CONVERSATIONS_KEY)?.unwrap_or_default()))
    }

    /// Replace the cached list with the authoritative one, keeping entries
    /// that only exist locally.
    #[instrument(skip_all, fields(remote = remote.len()))]
    pub fn mirror_conversations(&self, remote: &[ConversationRecord]) -> Result<(), StoreError> {
        self.modify_conversations(|list| {
            let unsynced: Vec<ConversationRecord> = list
                .drain(..)
                .filter(|c| c.id.is_local() && !remote.iter().any(|r| r.id == c.id))
                .collect();
            list.extend(remote.iter().cloned());
            list.extend(unsynced);
        })
    }

    /// Insert or replace by id. Returns whether the id was already cached.
    #[instrument(skip_all, fields(conversation_id = %record.id))]
    pub fn upsert_conversation(&self, record: &ConversationRecord) -> Result<bool, StoreError> {
        self.modify_conversations(|list| {
            match list.iter_mut().find(|c| c.id == record.id) {
                Some(existing) => {
                    *existing = record.clone();
                    true
                }
                None => {
                    list.insert(0, record.clone());
                    false
                }
            }
        })
    }

    /// Replace by id without inserting. Returns whether the id was cached.
    #[instrument(skip_all, fields(conversation_id = %record.id))]
    pub fn replace_conversation(&self, record: &ConversationRecord) -> Result<bool, StoreError> {
        self.modify_conversations(|list| match list.iter_mut().find(|c| c.id == record.id) {
            Some(existing) => {
                *existing = record.clone();
                true
            }
            None => false,
        })
    }

    /// Returns whether the id was cached.
    #[instrument(skip(self), fields(conversation_id = %id))]
    pub fn remove_conversation(&self, id: &ConversationId) -> Result<bool, StoreError> {
        self.modify_conversations(|list| {
            let before = list.len();
            list.retain(|c| &c.id != id);
            list.len() != before
        })
    }

    /// Read-modify-write of the conversation list under one lock.
    fn modify_conversations<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Vec<ConversationRecord>) -> T,
    {
        self.db.with_conn(|conn| {
            let mut list: Vec<ConversationRecord> =
                read_json(conn, CONVERSATIONS_KEY)?.unwrap_or_default();
            let out = f(&mut list);
            write_json(conn, CONVERSATIONS_KEY, &list)?;
            Ok(out)
        })
    }
}

fn read(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row("SELECT value FROM cache_entries WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?)
}

fn write(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO cache_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, value, row_helpers::format_ts(&row_helpers::now())],
    )?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>, StoreError> {
    read(conn, key)?
        .map(|raw| row_helpers::parse_json(&raw, TABLE, "value"))
        .transpose()
}

fn write_json<T: Serialize>(conn: &Connection, key: &str, value: &T) -> Result<(), StoreError> {
    write(conn, key, &serde_json::to_string(value)?)
}

#[async_trait]
impl ContextBackend for LocalCache {
    async fn load_context(
        &self,
        owner: &InstallationId,
    ) -> Result<Option<ContextRecord>, StoreError> {
        self.context(owner)
    }

    async fn save_context(
        &self,
        owner: &InstallationId,
        record: &ContextRecord,
    ) -> Result<ContextRecord, StoreError> {
        self.put_context(owner, record)
    }
}

#[async_trait]
impl ConversationBackend for LocalCache {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        self.conversations()
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationRecord, StoreError> {
        self.conversations()?
            .into_iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("cached conversation {id}")))
    }

    /// Offline creation: the id is synthesized locally.
    async fn create_conversation(
        &self,
        draft: &ConversationDraft,
    ) -> Result<ConversationRecord, StoreError> {
        let record = ConversationRecord::from_draft(
            ConversationId::local(),
            draft.clone().normalized(),
            row_helpers::now(),
        );
        let _ = self.upsert_conversation(&record)?;
        Ok(record)
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<ConversationRecord, StoreError> {
        self.modify_conversations(|list| {
            list.iter_mut().find(|c| &c.id == id).map(|existing| {
                existing.apply(update.clone(), row_helpers::now());
                existing.clone()
            })
        })?
        .ok_or_else(|| StoreError::NotFound(format!("cached conversation {id}")))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        if self.remove_conversation(id)? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("cached conversation {id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpha_core::Message;

    fn record(id: ConversationId, text: &str) -> ConversationRecord {
        ConversationRecord::from_draft(
            id,
            ConversationDraft::new(vec![Message::user(text)], ""),
            row_helpers::now(),
        )
    }

    #[test]
    fn raw_get_set_remove() {
        let cache = LocalCache::in_memory().unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        cache.set("k", "v1").unwrap();
        cache.set("k", "v2").unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v2"));
        assert!(cache.remove("k").unwrap());
        assert!(!cache.remove("k").unwrap());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let cache = LocalCache::open(&path).unwrap();
            cache.upsert_conversation(&record(ConversationId::local(), "kept")).unwrap();
        }
        let cache = LocalCache::open(&path).unwrap();
        assert_eq!(cache.conversations().unwrap()[0].title, "kept");
    }

    #[test]
    fn context_keys_are_per_installation() {
        let cache = LocalCache::in_memory().unwrap();
        let mut rec = ContextRecord::default();
        rec.general_memory = "desk notes".into();
        cache.put_context(&InstallationId::new("desk"), &rec).unwrap();
        assert!(cache.context(&InstallationId::new("laptop")).unwrap().is_none());
        assert!(cache.get("context:desk").unwrap().is_some());
    }

    #[test]
    fn put_context_keeps_created_at() {
        let cache = LocalCache::in_memory().unwrap();
        let owner = InstallationId::default();
        let first = cache.put_context(&owner, &ContextRecord::default()).unwrap();
        let second = cache.put_context(&owner, &ContextRecord::default()).unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn corrupt_entry_is_reported() {
        let cache = LocalCache::in_memory().unwrap();
        cache.set(CONVERSATIONS_KEY, "{broken").unwrap();
        assert!(matches!(
            cache.conversations(),
            Err(StoreError::CorruptRow { table: TABLE, .. })
        ));
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let cache = LocalCache::in_memory().unwrap();
        let mut rec = record(ConversationId::new(), "first");
        assert!(!cache.upsert_conversation(&rec).unwrap());
        rec.messages.push(Message::assistant_placeholder());
        assert!(cache.upsert_conversation(&rec).unwrap());

        let all = cache.conversations().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].messages.len(), 2);
    }

    #[test]
    fn mirror_keeps_unsynced_local_entries() {
        let cache = LocalCache::in_memory().unwrap();
        let stale = record(ConversationId::new(), "deleted elsewhere");
        let offline = record(ConversationId::local(), "offline");
        cache.upsert_conversation(&stale).unwrap();
        cache.upsert_conversation(&offline).unwrap();

        let remote = vec![record(ConversationId::new(), "remote")];
        cache.mirror_conversations(&remote).unwrap();

        let ids: Vec<_> = cache.conversations().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![remote[0].id.clone(), offline.id]);
    }

    #[tokio::test]
    async fn backend_create_uses_local_ids() {
        let cache = LocalCache::in_memory().unwrap();
        let created = cache
            .create_conversation(&ConversationDraft::new(vec![Message::user("hi")], ""))
            .await
            .unwrap();
        assert!(created.id.is_local());
        assert_eq!(cache.get_conversation(&created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn backend_update_and_delete_report_missing() {
        let cache = LocalCache::in_memory().unwrap();
        let rec = record(ConversationId::new(), "x");
        let missing = ConversationId::new();
        assert!(cache
            .update_conversation(&missing, &rec.to_update())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(cache.delete_conversation(&missing).await.unwrap_err().is_not_found());

        cache.upsert_conversation(&rec).unwrap();
        let mut update = rec.to_update();
        update.title = "renamed".into();
        let updated = cache.update_conversation(&rec.id, &update).await.unwrap();
        assert_eq!(updated.title, "renamed");
        cache.delete_conversation(&rec.id).await.unwrap();
        assert!(cache.conversations().unwrap().is_empty());
    }
}

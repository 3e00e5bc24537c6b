use std::sync::Arc;

use tracing::{debug, instrument};

use alpha_core::{ConversationDraft, ConversationId, ConversationRecord};

use crate::backend::ConversationBackend;
use crate::cache::LocalCache;
use crate::error::StoreError;
use crate::fallback::{attempt, cached};
use crate::row_helpers;

/// Conversation CRUD, remote first with the local cache as fallback.
///
/// The cache is reconciled on every write regardless of the remote outcome,
/// so local state never lags what the user last saw.
#[derive(Clone)]
pub struct ConversationStore {
    remote: Arc<dyn ConversationBackend>,
    cache: Arc<LocalCache>,
}

impl ConversationStore {
    pub fn new(remote: Arc<dyn ConversationBackend>, cache: Arc<LocalCache>) -> Self {
        Self { remote, cache }
    }

    /// Remote list (newest update first), mirrored into the cache. On remote
    /// failure the cached list, in cache order.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Vec<ConversationRecord> {
        match attempt("conversations.list", self.remote.list_conversations()).await {
            Ok(list) => {
                let _ = cached("conversations.mirror", self.cache.mirror_conversations(&list));
                list
            }
            Err(_) => cached("conversations.list", self.cache.list_conversations().await)
                .unwrap_or_default(),
        }
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    pub async fn get(&self, id: &ConversationId) -> Result<ConversationRecord, StoreError> {
        match attempt("conversations.get", self.remote.get_conversation(id)).await {
            Ok(record) => {
                let _ = cached("conversations.mirror", self.cache.upsert_conversation(&record));
                Ok(record)
            }
            Err(_) => self.cache.get_conversation(id).await,
        }
    }

    /// Create remotely; when that fails the conversation gets a local id and
    /// lives in the cache only.
    #[instrument(skip(self, draft), fields(messages = draft.messages.len()))]
    pub async fn create(&self, draft: ConversationDraft) -> Result<ConversationRecord, StoreError> {
        let draft = draft.normalized();
        match attempt("conversations.create", self.remote.create_conversation(&draft)).await {
            Ok(record) => {
                let _ = cached("conversations.mirror", self.cache.upsert_conversation(&record));
                Ok(record)
            }
            Err(_) => {
                let record = self.cache.create_conversation(&draft).await?;
                debug!(conversation_id = %record.id, "created conversation locally");
                Ok(record)
            }
        }
    }

    /// Replace the conversation's fields by id.
    ///
    /// The cache is reconciled with the caller's record either way, except
    /// that a record the remote no longer knows is never re-inserted: when
    /// the remote reports not found, only an id already cached is updated.
    /// Fails only when the remote write failed and the id was not cached
    /// before.
    #[instrument(skip(self, record), fields(conversation_id = %record.id))]
    pub async fn update(
        &self,
        record: &ConversationRecord,
    ) -> Result<ConversationRecord, StoreError> {
        let remote = attempt(
            "conversations.update",
            self.remote.update_conversation(&record.id, &record.to_update()),
        )
        .await;

        let reconciled = match &remote {
            Ok(stored) => stored.clone(),
            Err(_) => {
                let mut local = record.clone();
                local.updated_at = row_helpers::now();
                local
            }
        };
        let cache_write = match &remote {
            Err(e) if e.is_not_found() => self.cache.replace_conversation(&reconciled),
            _ => self.cache.upsert_conversation(&reconciled),
        };
        let was_cached = cached("conversations.update", cache_write).unwrap_or(false);

        match remote {
            Ok(stored) => Ok(stored),
            Err(_) if was_cached => Ok(reconciled),
            Err(e) => Err(e),
        }
    }

    /// Delete by id from both stores. Fails only when the id was not cached
    /// and the remote delete failed.
    #[instrument(skip(self), fields(conversation_id = %id))]
    pub async fn delete(&self, id: &ConversationId) -> Result<(), StoreError> {
        let remote = attempt("conversations.delete", self.remote.delete_conversation(id)).await;
        let was_cached =
            cached("conversations.delete", self.cache.remove_conversation(id)).unwrap_or(false);

        match remote {
            Ok(()) => Ok(()),
            Err(_) if was_cached => Ok(()),
            Err(e) => Err(e),
        }
    }
}

//! Persistence interfaces shared by the authoritative store, the HTTP client
//! talking to it, and the local cache.

use async_trait::async_trait;

use alpha_core::{
    ContextRecord, ConversationDraft, ConversationId, ConversationRecord, ConversationUpdate,
    InstallationId,
};

use crate::error::StoreError;

#[async_trait]
pub trait ContextBackend: Send + Sync {
    /// `Ok(None)` when nothing has been saved for `owner` yet.
    async fn load_context(&self, owner: &InstallationId)
        -> Result<Option<ContextRecord>, StoreError>;

    /// Upsert: replaces all fields, sets `updatedAt`, sets `createdAt` once.
    /// Returns the record as stored.
    async fn save_context(
        &self,
        owner: &InstallationId,
        record: &ContextRecord,
    ) -> Result<ContextRecord, StoreError>;
}

#[async_trait]
pub trait ConversationBackend: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError>;

    async fn get_conversation(&self, id: &ConversationId)
        -> Result<ConversationRecord, StoreError>;

    /// The backend chooses the id.
    async fn create_conversation(
        &self,
        draft: &ConversationDraft,
    ) -> Result<ConversationRecord, StoreError>;

    /// `NotFound` when no record has this id.
    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<ConversationRecord, StoreError>;

    /// `NotFound` when no record has this id.
    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StoreError>;
}

/// Stand-in for an authoritative store when none is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unconfigured;

#[async_trait]
impl ContextBackend for Unconfigured {
    async fn load_context(&self, _: &InstallationId) -> Result<Option<ContextRecord>, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn save_context(
        &self,
        _: &InstallationId,
        _: &ContextRecord,
    ) -> Result<ContextRecord, StoreError> {
        Err(StoreError::NotConfigured)
    }
}

#[async_trait]
impl ConversationBackend for Unconfigured {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn get_conversation(&self, _: &ConversationId) -> Result<ConversationRecord, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn create_conversation(
        &self,
        _: &ConversationDraft,
    ) -> Result<ConversationRecord, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn update_conversation(
        &self,
        _: &ConversationId,
        _: &ConversationUpdate,
    ) -> Result<ConversationRecord, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn delete_conversation(&self, _: &ConversationId) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }
}

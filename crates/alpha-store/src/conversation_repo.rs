use async_trait::async_trait;
use tracing::instrument;

use alpha_core::{ConversationDraft, ConversationId, ConversationRecord, ConversationUpdate};

use crate::backend::ConversationBackend;
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "conversations";
const COLUMNS: &str = "id, title, messages, system_prompt, created_at, updated_at";

/// SQLite-backed conversation records.
pub struct ConversationRepo {
    db: Database,
}

impl ConversationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All conversations, most recently updated first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations ORDER BY updated_at DESC, id DESC"
            ))?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_conversation(row)?);
            }
            Ok(out)
        })
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    pub fn get(&self, id: &ConversationId) -> Result<ConversationRecord, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_conversation(row),
                None => Err(StoreError::NotFound(format!("conversation {id}"))),
            }
        })
    }

    #[instrument(skip(self, draft), fields(messages = draft.messages.len()))]
    pub fn create(&self, draft: &ConversationDraft) -> Result<ConversationRecord, StoreError> {
        let record = ConversationRecord::from_draft(
            ConversationId::new(),
            draft.clone().normalized(),
            row_helpers::now(),
        );
        let messages = serde_json::to_string(&record.messages)?;
        let created = row_helpers::format_ts(&record.created_at);

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, title, messages, system_prompt, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![
                    record.id.as_str(),
                    record.title,
                    messages,
                    record.system_prompt,
                    created,
                ],
            )?;
            Ok(())
        })?;
        Ok(record)
    }

    #[instrument(skip(self, update), fields(conversation_id = %id, messages = update.messages.len()))]
    pub fn update(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<ConversationRecord, StoreError> {
        let messages = serde_json::to_string(&update.messages)?;
        let now = row_helpers::format_ts(&row_helpers::now());

        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE conversations
                 SET title = ?2, messages = ?3, system_prompt = ?4, updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id.as_str(), update.title, messages, update.system_prompt, now],
            )?)
        })?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("conversation {id}")));
        }
        self.get(id)
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    pub fn delete(&self, id: &ConversationId) -> Result<(), StoreError> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM conversations WHERE id = ?1", [id.as_str()])?)
        })?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<ConversationRecord, StoreError> {
    let id: String = row_helpers::get(row, 0, TABLE, "id")?;
    let title: String = row_helpers::get(row, 1, TABLE, "title")?;
    let messages: String = row_helpers::get(row, 2, TABLE, "messages")?;
    let system_prompt: String = row_helpers::get(row, 3, TABLE, "system_prompt")?;
    let created_at: String = row_helpers::get(row, 4, TABLE, "created_at")?;
    let updated_at: String = row_helpers::get(row, 5, TABLE, "updated_at")?;

    Ok(ConversationRecord {
        id: ConversationId::from_raw(id),
        title,
        messages: row_helpers::parse_json(&messages, TABLE, "messages")?,
        system_prompt,
        created_at: row_helpers::parse_ts(&created_at, TABLE, "created_at")?,
        updated_at: row_helpers::parse_ts(&updated_at, TABLE, "updated_at")?,
    })
}

#[async_trait]
impl ConversationBackend for ConversationRepo {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        self.list()
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationRecord, StoreError> {
        self.get(id)
    }

    async fn create_conversation(
        &self,
        draft: &ConversationDraft,
    ) -> Result<ConversationRecord, StoreError> {
        self.create(draft)
    }

    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<ConversationRecord, StoreError> {
        self.update(id, update)
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        self.delete(id)
    }
}

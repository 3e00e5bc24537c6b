use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;

use alpha_core::{ContextRecord, InstallationId};

use crate::backend::ContextBackend;
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "context";

/// SQLite-backed context records, one row per installation.
pub struct ContextRepo {
    db: Database,
}

impl ContextRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub fn get(&self, owner: &InstallationId) -> Result<Option<ContextRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT payload, created_at, updated_at FROM context WHERE owner_id = ?1",
            )?;
            let mut rows = stmt.query([owner.as_str()])?;
            match rows.next()? {
                Some(row) => {
                    let payload: String = row_helpers::get(row, 0, TABLE, "payload")?;
                    let created_at: String = row_helpers::get(row, 1, TABLE, "created_at")?;
                    let updated_at: String = row_helpers::get(row, 2, TABLE, "updated_at")?;

                    let mut record: ContextRecord =
                        row_helpers::parse_json(&payload, TABLE, "payload")?;
                    record.created_at =
                        Some(row_helpers::parse_ts(&created_at, TABLE, "created_at")?);
                    record.updated_at =
                        Some(row_helpers::parse_ts(&updated_at, TABLE, "updated_at")?);
                    Ok(Some(record))
                }
                None => Ok(None),
            }
        })
    }

    /// Replace the record for `owner`, keeping the original `created_at`.
    #[instrument(skip(self, record), fields(owner = %owner))]
    pub fn upsert(
        &self,
        owner: &InstallationId,
        record: &ContextRecord,
    ) -> Result<ContextRecord, StoreError> {
        let mut payload = record.clone();
        payload.created_at = None;
        payload.updated_at = None;
        let json = serde_json::to_string(&payload)?;
        let now = row_helpers::format_ts(&row_helpers::now());

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO context (owner_id, payload, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(owner_id) DO UPDATE SET
                     payload = excluded.payload,
                     updated_at = excluded.updated_at",
                rusqlite::params![owner.as_str(), json, now],
            )?;
            Ok(())
        })?;

        self.get(owner)?
            .ok_or_else(|| StoreError::NotFound(format!("context {owner}")))
    }
}

#[async_trait]
impl ContextBackend for ContextRepo {
    async fn load_context(
        &self,
        owner: &InstallationId,
    ) -> Result<Option<ContextRecord>, StoreError> {
        self.get(owner)
    }

    async fn save_context(
        &self,
        owner: &InstallationId,
        record: &ContextRecord,
    ) -> Result<ContextRecord, StoreError> {
        self.upsert(owner, record)
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::instrument;

use alpha_core::wire::{
    ContextEnvelope, ConversationEnvelope, ConversationsEnvelope, SaveEnvelope, SuccessEnvelope,
    INSTALLATION_HEADER,
};
use alpha_core::{
    ContextRecord, ConversationDraft, ConversationId, ConversationRecord, ConversationUpdate,
    InstallationId,
};
use alpha_store::{ContextBackend, ConversationBackend, StoreError};

use crate::error::ClientError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_client(timeout: Option<Duration>) -> Result<Client, ClientError> {
    let mut builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ClientError::NetworkError(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Authoritative store reached over the server's `/api` routes.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(Some(timeout))?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

fn degraded(error: Option<String>) -> Result<(), ClientError> {
    match error {
        Some(e) => Err(ClientError::Degraded(e)),
        None => Ok(()),
    }
}

#[async_trait]
impl ContextBackend for HttpBackend {
    #[instrument(skip(self), fields(owner = %owner))]
    async fn load_context(
        &self,
        owner: &InstallationId,
    ) -> Result<Option<ContextRecord>, StoreError> {
        let req = self
            .client
            .get(self.url("/api/context"))
            .header(INSTALLATION_HEADER, owner.as_str());
        let env: ContextEnvelope = self.send(req).await?;
        degraded(env.error)?;
        Ok(env.context)
    }

    #[instrument(skip(self, record), fields(owner = %owner))]
    async fn save_context(
        &self,
        owner: &InstallationId,
        record: &ContextRecord,
    ) -> Result<ContextRecord, StoreError> {
        let req = self
            .client
            .post(self.url("/api/context"))
            .header(INSTALLATION_HEADER, owner.as_str())
            .json(record);
        let env: SaveEnvelope = self.send(req).await?;
        if !env.success {
            let reason = env.error.unwrap_or_else(|| "save rejected".into());
            return Err(ClientError::Degraded(reason).into());
        }
        Ok(env.context.unwrap_or_else(|| record.clone()))
    }
}

#[async_trait]
impl ConversationBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        let env: ConversationsEnvelope = self
            .send(self.client.get(self.url("/api/conversations")))
            .await?;
        degraded(env.error)?;
        Ok(env.conversations)
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationRecord, StoreError> {
        let env: ConversationEnvelope = self
            .send(self.client.get(self.url(&format!("/api/conversations/{id}"))))
            .await?;
        Ok(env.conversation)
    }

    #[instrument(skip(self, draft))]
    async fn create_conversation(
        &self,
        draft: &ConversationDraft,
    ) -> Result<ConversationRecord, StoreError> {
        let req = self.client.post(self.url("/api/conversations")).json(draft);
        let env: ConversationEnvelope = self.send(req).await?;
        Ok(env.conversation)
    }

    #[instrument(skip(self, update), fields(conversation_id = %id))]
    async fn update_conversation(
        &self,
        id: &ConversationId,
        update: &ConversationUpdate,
    ) -> Result<ConversationRecord, StoreError> {
        let req = self
            .client
            .put(self.url(&format!("/api/conversations/{id}")))
            .json(update);
        let env: ConversationEnvelope = self.send(req).await?;
        Ok(env.conversation)
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        let env: SuccessEnvelope = self
            .send(self.client.delete(self.url(&format!("/api/conversations/{id}"))))
            .await?;
        if env.success {
            Ok(())
        } else {
            Err(ClientError::Degraded("delete rejected".into()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    fn backend(url: &str) -> HttpBackend {
        HttpBackend::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn join_url_tolerates_trailing_slash() {
        assert_eq!(join_url("http://h:1/", "/api/x"), "http://h:1/api/x");
        assert_eq!(join_url("http://h:1", "/api/x"), "http://h:1/api/x");
    }

    #[tokio::test]
    async fn degraded_read_becomes_unavailable() {
        let router = Router::new()
            .route(
                "/api/context",
                get(|| async { Json(json!({"context": null, "error": "Database not configured"})) }),
            )
            .route(
                "/api/conversations",
                get(|| async { Json(json!({"conversations": [], "error": "Failed to fetch"})) }),
            );
        let b = backend(&serve(router).await);

        let err = b.load_context(&InstallationId::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        let err = b.list_conversations().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn empty_context_is_none() {
        let router = Router::new().route(
            "/api/context",
            get(|| async { Json(json!({"context": null})) }),
        );
        let b = backend(&serve(router).await);
        assert_eq!(b.load_context(&InstallationId::default()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_conversation_is_not_found() {
        let router = Router::new().route(
            "/api/conversations/{id}",
            get(|Path(_id): Path<String>| async {
                (StatusCode::NOT_FOUND, Json(json!({"error": "Conversation not found"})))
            }),
        );
        let b = backend(&serve(router).await);
        let err = b
            .get_conversation(&ConversationId::from_raw("conv_missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let b = backend(&format!("http://{addr}"));
        let err = b.list_conversations().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}

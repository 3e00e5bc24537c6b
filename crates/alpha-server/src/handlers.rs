//! HTTP handlers for the `/api` routes.
//!
//! Read endpoints answer 200 even when the store is missing or failing; the
//! body's `error` field tells the client to fall back to its cache.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde_json::json;
use tracing::{error, info, warn};

use alpha_core::stream::{fragment_json, SENTINEL};
use alpha_core::transcript;
use alpha_core::wire::{
    ChatRequest, ContextEnvelope, ConversationEnvelope, ConversationsEnvelope, SaveEnvelope,
    SuccessEnvelope, Transcription, INSTALLATION_HEADER,
};
use alpha_core::{
    ContextRecord, ConversationDraft, ConversationId, ConversationUpdate, InstallationId,
};

use crate::error::{ApiError, UpstreamError};
use crate::server::AppState;

const NOT_CONFIGURED: &str = "Database not configured";

fn owner(state: &AppState, headers: &HeaderMap) -> InstallationId {
    headers
        .get(INSTALLATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(InstallationId::new)
        .unwrap_or_else(|| state.installation.clone())
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "database": state.context.is_some(),
        "chat": state.upstream.chat_configured(),
        "transcription": state.upstream.transcription_configured(),
    }))
}

pub async fn get_context(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<ContextEnvelope> {
    let Some(repo) = &state.context else {
        warn!("context requested but no database is configured");
        return Json(ContextEnvelope {
            context: None,
            error: Some(NOT_CONFIGURED.into()),
        });
    };
    match repo.get(&owner(&state, &headers)) {
        Ok(context) => Json(ContextEnvelope {
            context,
            error: None,
        }),
        Err(e) => {
            error!(error = %e, "failed to fetch context");
            Json(ContextEnvelope {
                context: None,
                error: Some("Failed to fetch context".into()),
            })
        }
    }
}

pub async fn save_context(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(record): Json<ContextRecord>,
) -> (StatusCode, Json<SaveEnvelope>) {
    let Some(repo) = &state.context else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SaveEnvelope {
                success: false,
                context: None,
                error: Some(NOT_CONFIGURED.into()),
            }),
        );
    };
    match repo.upsert(&owner(&state, &headers), &record) {
        Ok(saved) => (
            StatusCode::OK,
            Json(SaveEnvelope {
                success: true,
                context: Some(saved),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "failed to update context");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SaveEnvelope {
                    success: false,
                    context: None,
                    error: Some("Failed to update context".into()),
                }),
            )
        }
    }
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Json<ConversationsEnvelope> {
    let Some(repo) = &state.conversations else {
        return Json(ConversationsEnvelope {
            conversations: Vec::new(),
            error: Some(NOT_CONFIGURED.into()),
        });
    };
    match repo.list() {
        Ok(conversations) => Json(ConversationsEnvelope {
            conversations,
            error: None,
        }),
        Err(e) => {
            error!(error = %e, "failed to fetch conversations");
            Json(ConversationsEnvelope {
                conversations: Vec::new(),
                error: Some("Failed to fetch conversations".into()),
            })
        }
    }
}

pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<ConversationDraft>,
) -> Result<Json<ConversationEnvelope>, ApiError> {
    let repo = state.conversations.as_ref().ok_or(ApiError::NotConfigured)?;
    let conversation = repo
        .create(&draft)
        .map_err(|e| ApiError::from_store(e, "Failed to create conversation"))?;
    info!(conversation_id = %conversation.id, "conversation created");
    Ok(Json(ConversationEnvelope {
        success: None,
        conversation,
    }))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConversationEnvelope>, ApiError> {
    let repo = state.conversations.as_ref().ok_or(ApiError::NotConfigured)?;
    let conversation = repo
        .get(&ConversationId::from_raw(id))
        .map_err(|e| ApiError::from_store(e, "Failed to fetch conversation"))?;
    Ok(Json(ConversationEnvelope {
        success: None,
        conversation,
    }))
}

pub async fn update_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<ConversationUpdate>,
) -> Result<Json<ConversationEnvelope>, ApiError> {
    let repo = state.conversations.as_ref().ok_or(ApiError::NotConfigured)?;
    let conversation = repo
        .update(&ConversationId::from_raw(id), &update)
        .map_err(|e| ApiError::from_store(e, "Failed to update conversation"))?;
    Ok(Json(ConversationEnvelope {
        success: Some(true),
        conversation,
    }))
}

pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessEnvelope>, ApiError> {
    let repo = state.conversations.as_ref().ok_or(ApiError::NotConfigured)?;
    repo.delete(&ConversationId::from_raw(id))
        .map_err(|e| ApiError::from_store(e, "Failed to delete conversation"))?;
    Ok(Json(SuccessEnvelope { success: true }))
}

/// Accept a multipart `audio` field, transcribe it upstream and return both
/// the cleaned and the raw text.
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    mut form: Multipart,
) -> Result<Json<Transcription>, ApiError> {
    let mut audio = None;
    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("audio") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("recording.webm").to_string();
        let mime = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read audio: {e}")))?;
        audio = Some((bytes, file_name, mime));
        break;
    }

    let Some((bytes, file_name, mime)) = audio.filter(|(bytes, _, _)| !bytes.is_empty()) else {
        return Err(ApiError::BadRequest("No audio file provided".into()));
    };
    if bytes.len() as u64 > state.max_audio_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Audio file exceeds {} bytes",
            state.max_audio_bytes
        )));
    }

    let original = state
        .upstream
        .transcribe(bytes, file_name, mime)
        .await
        .inspect_err(|e| error!(error = %e, kind = e.error_kind(), "transcription failed"))?;
    Ok(Json(Transcription {
        text: transcript::clean(&original),
        original,
    }))
}

/// Proxy a chat request upstream and re-emit the answer as
/// `data: {"content": ...}` frames closed by `data: [DONE]`.
///
/// An upstream failure after the stream has started aborts the response body
/// so the client sees a transport error rather than a short answer.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let fragments = state
        .upstream
        .stream_chat(&request)
        .await
        .inspect_err(|e| error!(error = %e, kind = e.error_kind(), "chat upstream failed"))?;

    let frames = fragments
        .map(|fragment| match fragment {
            Ok(content) => Ok(Event::default().data(fragment_json(&content))),
            Err(e) => {
                warn!(error = %e, "chat stream interrupted");
                Err(e)
            }
        })
        .chain(futures::stream::once(async {
            Ok::<_, UpstreamError>(Event::default().data(SENTINEL))
        }));

    let sse = Sse::new(frames).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));
    Ok(sse.into_response())
}

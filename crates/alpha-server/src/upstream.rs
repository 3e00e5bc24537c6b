//! Clients for the model providers the server proxies to: an
//! OpenAI-compatible chat completions API and a Whisper-compatible
//! transcription API.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use alpha_core::lines::LineBuffer;
use alpha_core::stream::SENTINEL;
use alpha_core::wire::ChatRequest;
use alpha_settings::{ChatUpstreamSettings, TranscriptionSettings};

use crate::error::UpstreamError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(120);

/// Content fragments of one streamed completion.
pub type Fragments = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

pub struct ChatUpstream {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
}

impl ChatUpstream {
    pub fn from_settings(settings: &ChatUpstreamSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone().map(SecretString::from),
            model: settings.model.clone(),
        }
    }
}

pub struct TranscriptionUpstream {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub language: String,
}

impl TranscriptionUpstream {
    pub fn from_settings(settings: &TranscriptionSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone().map(SecretString::from),
            model: settings.model.clone(),
            language: settings.language.clone(),
        }
    }
}

pub struct Upstream {
    client: Client,
    chat: ChatUpstream,
    transcription: TranscriptionUpstream,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionBody {
    text: String,
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

impl Upstream {
    pub fn new(
        chat: ChatUpstream,
        transcription: TranscriptionUpstream,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            chat,
            transcription,
        })
    }

    pub fn chat_configured(&self) -> bool {
        self.chat.api_key.is_some()
    }

    pub fn transcription_configured(&self) -> bool {
        self.transcription.api_key.is_some()
    }

    /// Start a streamed completion. The system prompt goes first, followed by
    /// the turns in order.
    #[instrument(skip(self, request), fields(turns = request.messages.len()))]
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<Fragments, UpstreamError> {
        let key = self
            .chat
            .api_key
            .as_ref()
            .ok_or(UpstreamError::MissingApiKey("chat"))?;

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": request.system_prompt}));
        }
        for turn in &request.messages {
            messages.push(json!({"role": turn.role.as_str(), "content": turn.content}));
        }
        let model = request.model.as_deref().unwrap_or(&self.chat.model);
        let body = json!({"model": model, "messages": messages, "stream": true});

        let resp = self
            .client
            .post(endpoint(&self.chat.base_url, "/chat/completions"))
            .bearer_auth(key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, body));
        }

        debug!(model, "completion stream opened");
        let bytes = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| UpstreamError::StreamInterrupted(e.to_string())));
        Ok(completion_fragments(bytes))
    }

    /// Transcribe audio and return the raw text.
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    pub async fn transcribe(
        &self,
        audio: Bytes,
        file_name: String,
        mime: Option<String>,
    ) -> Result<String, UpstreamError> {
        let key = self
            .transcription
            .api_key
            .as_ref()
            .ok_or(UpstreamError::MissingApiKey("transcription"))?;

        let mut part = Part::bytes(audio.to_vec()).file_name(file_name);
        if let Some(mime) = mime {
            part = part
                .mime_str(&mime)
                .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        }
        let form = Form::new()
            .part("file", part)
            .text("model", self.transcription.model.clone())
            .text("language", self.transcription.language.clone())
            .text("response_format", "json")
            .text("temperature", "0");

        let resp = self
            .client
            .post(endpoint(&self.transcription.base_url, "/audio/transcriptions"))
            .bearer_auth(key.expose_secret())
            .timeout(TRANSCRIBE_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, body));
        }
        let body: TranscriptionBody = resp
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        Ok(body.text)
    }
}

struct LineState<S> {
    bytes: Pin<Box<S>>,
    lines: LineBuffer,
    pending: VecDeque<Result<String, UpstreamError>>,
    done: bool,
}

/// Turn a chat-completions SSE byte stream into content fragments.
///
/// Stops at `data: [DONE]`. Lines that are not content deltas are skipped.
pub fn completion_fragments<S>(bytes: S) -> Fragments
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Send + 'static,
{
    let state = LineState {
        bytes: Box::pin(bytes),
        lines: LineBuffer::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in state.lines.push(&chunk) {
                        if state.push_line(&line) {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(e));
                }
                None => {
                    if let Some(rest) = state.lines.finish() {
                        state.push_line(&rest);
                    }
                    state.done = true;
                }
            }
        }
    }))
}

impl<S> LineState<S> {
    /// Queue the fragment carried by one line. Returns true at the end marker.
    fn push_line(&mut self, line: &str) -> bool {
        if self.done {
            return true;
        }
        let Some(payload) = line.trim().strip_prefix("data:").map(str::trim) else {
            return false;
        };
        if payload == SENTINEL {
            self.done = true;
            self.lines.clear();
            return true;
        }
        if let Ok(chunk) = serde_json::from_str::<CompletionChunk>(payload) {
            let content: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if !content.is_empty() {
                self.pending.push_back(Ok(content));
            }
        }
        false
    }
}

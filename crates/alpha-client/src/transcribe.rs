use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::instrument;

use alpha_core::wire::Transcription;

use crate::error::ClientError;
use crate::remote::{build_client, join_url};

/// Recorded audio ready for upload.
#[derive(Clone, Debug)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: String,
}

impl AudioClip {
    pub fn webm(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "recording.webm".into(),
            mime: "audio/webm".into(),
        }
    }

    /// Guess the MIME type from the file extension.
    pub fn from_file_name(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let mime = match ext.as_str() {
            "wav" => "audio/wav",
            "mp3" => "audio/mpeg",
            "m4a" | "mp4" => "audio/mp4",
            "ogg" => "audio/ogg",
            "flac" => "audio/flac",
            _ => "audio/webm",
        };
        Self {
            bytes,
            file_name,
            mime: mime.into(),
        }
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: AudioClip) -> Result<Transcription, ClientError>;
}

/// Uploads audio to the server's `/api/transcribe` route.
pub struct HttpTranscriber {
    client: Client,
    base_url: String,
}

impl HttpTranscriber {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(Some(timeout))?,
            base_url: base_url.into(),
        })
    }
}

fn failed(e: impl std::fmt::Display) -> ClientError {
    ClientError::Transcription(e.to_string())
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    #[instrument(skip(self, clip), fields(bytes = clip.bytes.len(), mime = %clip.mime))]
    async fn transcribe(&self, clip: AudioClip) -> Result<Transcription, ClientError> {
        let part = Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(&clip.mime)
            .map_err(failed)?;
        let form = Form::new().part("audio", part);

        let resp = self
            .client
            .post(join_url(&self.base_url, "/api/transcribe"))
            .multipart(form)
            .send()
            .await
            .map_err(failed)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(failed(ClientError::from_status(status, body)));
        }
        resp.json::<Transcription>().await.map_err(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
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

    #[test]
    fn mime_from_extension() {
        assert_eq!(AudioClip::from_file_name(vec![], "memo.WAV").mime, "audio/wav");
        assert_eq!(AudioClip::from_file_name(vec![], "memo").mime, "audio/webm");
    }

    #[tokio::test]
    async fn uploads_audio_field() {
        let router = Router::new().route(
            "/api/transcribe",
            post(|mut form: Multipart| async move {
                let mut size = 0;
                while let Ok(Some(field)) = form.next_field().await {
                    if field.name() == Some("audio") {
                        size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
                    }
                }
                Json(json!({"text": format!("{size} bytes"), "original": "raw"}))
            }),
        );
        let t = HttpTranscriber::new(serve(router).await, Duration::from_secs(5)).unwrap();
        let result = t.transcribe(AudioClip::webm(vec![0u8; 16])).await.unwrap();
        assert_eq!(result.text, "16 bytes");
        assert_eq!(result.original, "raw");
    }

    #[tokio::test]
    async fn server_error_is_a_transcription_error() {
        let router = Router::new().route(
            "/api/transcribe",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "No audio file provided"})),
                )
            }),
        );
        let t = HttpTranscriber::new(serve(router).await, Duration::from_secs(5)).unwrap();
        let err = t.transcribe(AudioClip::webm(vec![])).await.unwrap_err();
        assert!(matches!(err, ClientError::Transcription(msg) if msg.contains("No audio")));
    }
}

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Future, Stream, StreamExt};
use reqwest::Client;
use tracing::instrument;

use alpha_core::lines::LineBuffer;
use alpha_core::wire::ChatRequest;

use crate::error::ClientError;
use crate::remote::{build_client, join_url};

const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Lines of a chat answer as they arrive. Blank lines are dropped.
pub type FrameLines = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

/// Something that answers a chat request with a stream of frame lines.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn stream(&self, request: &ChatRequest) -> Result<FrameLines, ClientError>;
}

/// Streams answers from the server's `/api/chat` route.
pub struct HttpChat {
    client: Client,
    base_url: String,
}

impl HttpChat {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self {
            // No overall timeout: answers stream for as long as they stream.
            client: build_client(None)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ChatProvider for HttpChat {
    #[instrument(skip(self, request), fields(turns = request.messages.len()))]
    async fn stream(&self, request: &ChatRequest) -> Result<FrameLines, ClientError> {
        let resp = self
            .client
            .post(join_url(&self.base_url, "/api/chat"))
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, body));
        }

        let bytes = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::StreamInterrupted(e.to_string())));
        Ok(Box::pin(LineStream::new(bytes)))
    }
}

/// Splits a byte stream into text lines with [`LineBuffer`]. Emits an error
/// if no data arrives within the idle timeout.
pub struct LineStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>,
    lines: LineBuffer,
    pending: VecDeque<String>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    finished: bool,
}

impl LineStream {
    pub fn new(bytes: impl Stream<Item = Result<Bytes, ClientError>> + Send + 'static) -> Self {
        Self::with_idle_timeout(bytes, STREAM_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(
        bytes: impl Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(bytes),
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            finished: false,
        }
    }
}

impl Stream for LineStream {
    type Item = Result<String, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(line) = self.pending.pop_front() {
            return Poll::Ready(Some(Ok(line)));
        }
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(deadline);

                    let complete = self.lines.push(&bytes);
                    self.pending.extend(complete);
                    if let Some(line) = self.pending.pop_front() {
                        return Poll::Ready(Some(Ok(line)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    let rest = self.lines.finish();
                    self.pending.extend(rest);
                    return Poll::Ready(self.pending.pop_front().map(Ok));
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        self.finished = true;
                        return Poll::Ready(Some(Err(ClientError::StreamInterrupted(format!(
                            "idle timeout after {}s",
                            self.idle_duration.as_secs()
                        )))));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

use alpha_store::StoreError;

/// Failures talking to the Alpha server.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The server answered but reported a degraded store.
    #[error("store degraded: {0}")]
    Degraded(String),
    /// Dictation failed. Shown to the user as-is.
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Degraded(_) => "degraded",
            Self::Transcription(_) => "transcription",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => Self::NotFound(body),
            400..=499 => Self::InvalidRequest(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidResponse(format!("unexpected status {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::NetworkError(e.to_string())
        }
    }
}

impl From<ClientError> for StoreError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotFound(detail) => StoreError::NotFound(detail),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(ClientError::from_status(404, "gone".into()), ClientError::NotFound(_)));
        assert!(matches!(
            ClientError::from_status(400, "bad".into()),
            ClientError::InvalidRequest(_)
        ));
        assert!(matches!(
            ClientError::from_status(503, "down".into()),
            ClientError::ServerError { status: 503, .. }
        ));
    }

    #[test]
    fn store_error_conversion() {
        let e: StoreError = ClientError::NotFound("conversation x".into()).into();
        assert!(e.is_not_found());

        let e: StoreError = ClientError::NetworkError("refused".into()).into();
        assert!(matches!(e, StoreError::Unavailable(_)));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ClientError::Cancelled.error_kind(), "cancelled");
        assert_eq!(
            ClientError::Transcription("empty".into()).error_kind(),
            "transcription"
        );
    }
}

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use alpha_core::InstallationId;
use alpha_settings::AlphaSettings;
use alpha_store::{ContextRepo, ConversationRepo, Database, StoreError};

use crate::handlers;
use crate::upstream::{ChatUpstream, TranscriptionUpstream, Upstream};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Context owner used when a request names none.
    pub installation: InstallationId,
    pub max_audio_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            installation: InstallationId::default(),
            max_audio_bytes: 25 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &AlphaSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            installation: settings.installation_id.clone(),
            max_audio_bytes: settings.server.transcription.max_bytes,
        }
    }
}

/// Open the configured database, if any.
pub fn open_database(settings: &AlphaSettings) -> Result<Option<Database>, StoreError> {
    settings
        .server
        .database_path
        .as_deref()
        .map(|path| Database::open(Path::new(path)))
        .transpose()
}

/// Build the upstream clients from settings.
pub fn upstream_from_settings(
    settings: &AlphaSettings,
) -> Result<Upstream, crate::error::UpstreamError> {
    Upstream::new(
        ChatUpstream::from_settings(&settings.server.chat),
        TranscriptionUpstream::from_settings(&settings.server.transcription),
    )
}

/// Shared application state passed to Axum handlers.
pub struct AppState {
    pub installation: InstallationId,
    pub context: Option<ContextRepo>,
    pub conversations: Option<ConversationRepo>,
    pub upstream: Upstream,
    pub max_audio_bytes: u64,
}

impl AppState {
    pub fn new(config: &ServerConfig, db: Option<Database>, upstream: Upstream) -> Self {
        Self {
            installation: config.installation.clone(),
            context: db.clone().map(ContextRepo::new),
            conversations: db.map(ConversationRepo::new),
            upstream,
            max_audio_bytes: config.max_audio_bytes,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Multipart framing on top of the audio itself.
    let upload_limit = usize::try_from(state.max_audio_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/context",
            get(handlers::get_context).post(handlers::save_context),
        )
        .route(
            "/api/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(handlers::get_conversation)
                .put(handlers::update_conversation)
                .delete(handlers::delete_conversation),
        )
        .route(
            "/api/transcribe",
            post(handlers::transcribe).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/chat", post(handlers::chat))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    db: Option<Database>,
    upstream: Upstream,
) -> Result<ServerHandle, std::io::Error> {
    let state = Arc::new(AppState::new(&config, db, upstream));
    tracing::info!(
        database = state.context.is_some(),
        chat = state.upstream.chat_configured(),
        transcription = state.upstream.transcription_configured(),
        "server components ready"
    );

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Alpha server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
        tracing::info!("Alpha server stopped");
    }
}

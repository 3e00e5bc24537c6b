//! # alpha
//!
//! Command-line entry point: runs the HTTP server, an interactive chat, or
//! one of the offline helpers.

#![deny(unsafe_code)]

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use alpha_client::session::{ChatSession, SessionParts};
use alpha_client::{AudioClip, HttpBackend, HttpChat, HttpTranscriber, Transcriber};
use alpha_core::stream::AssemblyState;
use alpha_core::{transcript, ContextRecord, ConversationId, PromptCompiler};
use alpha_settings::AlphaSettings;
use alpha_store::{
    ContextBackend, ContextStore, ConversationBackend, ConversationStore, LocalCache, Unconfigured,
};
use alpha_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "alpha", about = "Personal assistant chat")]
struct Cli {
    /// Settings file (defaults to ~/.alpha/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chat interactively, streaming answers to stdout.
    Chat {
        /// Server URL, overriding client.serverUrl.
        #[arg(long)]
        server: Option<String>,
    },
    /// Print the system prompt compiled from the current context.
    Prompt,
    /// Print the context record as JSON, or replace it from a JSON file.
    Context {
        #[arg(long)]
        set: Option<PathBuf>,
    },
    /// Clean a dictated transcript read from stdin.
    Clean,
}

fn load_settings(path: Option<&PathBuf>) -> Result<AlphaSettings> {
    let settings = match path {
        Some(path) => alpha_settings::load_settings_from_path(path),
        None => alpha_settings::load_settings(),
    };
    settings.context("Failed to load settings")
}

struct Stores {
    context: ContextStore,
    conversations: ConversationStore,
}

/// Remote backends for the configured server, or [`Unconfigured`] ones that
/// send every operation to the local cache.
fn remotes(
    settings: &AlphaSettings,
) -> Result<(Arc<dyn ContextBackend>, Arc<dyn ConversationBackend>)> {
    let Some(url) = &settings.client.server_url else {
        tracing::info!("no server configured, working from the local cache");
        let context: Arc<dyn ContextBackend> = Arc::new(Unconfigured);
        let conversations: Arc<dyn ConversationBackend> = Arc::new(Unconfigured);
        return Ok((context, conversations));
    };
    let timeout = Duration::from_millis(settings.client.request_timeout_ms);
    let backend = Arc::new(HttpBackend::new(url.clone(), timeout)?);
    let context: Arc<dyn ContextBackend> = backend.clone();
    let conversations: Arc<dyn ConversationBackend> = backend;
    Ok((context, conversations))
}

fn open_stores(settings: &AlphaSettings) -> Result<Stores> {
    let cache_path = PathBuf::from(&settings.client.cache_path);
    let cache = Arc::new(
        LocalCache::open(&cache_path)
            .with_context(|| format!("Failed to open cache: {}", cache_path.display()))?,
    );

    let (context_remote, conversation_remote) = remotes(settings)?;
    Ok(Stores {
        context: ContextStore::new(settings.installation_id.clone(), context_remote, cache.clone()),
        conversations: ConversationStore::new(conversation_remote, cache),
    })
}

async fn serve(settings: &AlphaSettings, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = alpha_server::ServerConfig::from_settings(settings);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let db = alpha_server::open_database(settings).context("Failed to open database")?;
    let upstream = alpha_server::upstream_from_settings(settings)?;
    let handle = alpha_server::start(config, db, upstream)
        .await
        .context("Failed to start server")?;
    tracing::info!(url = %handle.url(), "Alpha server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}

/// Prints only what an update adds to what is already on screen.
struct Printer {
    shown: String,
}

impl Printer {
    fn update(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        match text.strip_prefix(self.shown.as_str()) {
            Some(added) => {
                let _ = write!(out, "{added}");
            }
            None => {
                let _ = write!(out, "\n{text}");
            }
        }
        let _ = out.flush();
        self.shown = text.to_string();
    }
}

async fn chat(settings: &AlphaSettings, server: Option<String>) -> Result<()> {
    let mut settings = settings.clone();
    if server.is_some() {
        settings.client.server_url = server;
    }
    let Some(url) = settings.client.server_url.clone() else {
        bail!("chat needs a server: set client.serverUrl, ALPHA_SERVER_URL or --server");
    };

    let stores = open_stores(&settings)?;
    let timeout = Duration::from_millis(settings.client.request_timeout_ms);
    let transcriber: Arc<dyn Transcriber> = Arc::new(HttpTranscriber::new(url.clone(), timeout)?);
    let session = ChatSession::new(SessionParts {
        context: stores.context,
        conversations: stores.conversations,
        compiler: PromptCompiler::new(settings.profile.clone()),
        chat: Arc::new(HttpChat::new(url)?),
        transcriber: Some(transcriber),
        autosave_delay: Duration::from_millis(settings.client.autosave_delay_ms),
        model: Some(settings.client.model.clone()),
    });
    session.refresh_prompt().await;

    println!(
        "{} is listening. /new /list /open <id> /delete <id> /dictate <file> /send /quit",
        settings.profile.assistant_name
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => continue,
            ("/quit", _) => break,
            ("/new", _) => {
                session.new_chat().await;
                session.refresh_prompt().await;
                println!("Started a new conversation.");
            }
            ("/list", _) => {
                let active = session.active_conversation();
                for c in session.list_conversations().await {
                    let marker = if active.as_ref() == Some(&c.id) { "*" } else { " " };
                    let updated = c.updated_at.with_timezone(&Local).format("%b %-d %H:%M");
                    println!("{marker} {}  {}  ({updated})", c.id, c.title);
                }
            }
            ("/open", id) if !id.is_empty() => {
                match session.open_conversation(&ConversationId::from_raw(id.trim())).await {
                    Ok(()) => {
                        for m in session.messages() {
                            println!("{}: {}", m.role.as_str(), m.content);
                        }
                    }
                    Err(e) => println!("Could not open {id}: {e}"),
                }
            }
            ("/delete", id) if !id.is_empty() => {
                match session.delete_conversation(&ConversationId::from_raw(id.trim())).await {
                    Ok(()) => println!("Deleted {id}."),
                    Err(e) => println!("Could not delete {id}: {e}"),
                }
            }
            ("/dictate", file) if !file.is_empty() => {
                let path = PathBuf::from(file.trim());
                let clip = match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "recording.webm".into());
                        AudioClip::from_file_name(bytes, name)
                    }
                    Err(e) => {
                        println!("Could not read {}: {e}", path.display());
                        continue;
                    }
                };
                match session.dictate(clip).await {
                    Ok(draft) => println!("Draft (send with /send):\n{draft}"),
                    Err(e) => println!("{e}"),
                }
            }
            ("/send", _) => {
                let draft = session.input();
                if draft.trim().is_empty() {
                    println!("Nothing dictated yet.");
                } else {
                    send(&session, &draft).await;
                }
            }
            _ => send(&session, line).await,
        }
    }

    session.flush().await;
    Ok(())
}

/// Submit one turn, printing the answer as it streams. Ctrl+C stops it.
async fn send(session: &ChatSession, text: &str) {
    let mut printer = Printer { shown: String::new() };
    let submit = session.submit(text, |answer| printer.update(answer));
    tokio::pin!(submit);
    let outcome = tokio::select! {
        outcome = &mut submit => outcome,
        _ = tokio::signal::ctrl_c() => {
            session.cancel();
            submit.await
        }
    };
    println!();
    if matches!(outcome.map(|o| o.state), Some(AssemblyState::Cancelled)) {
        println!("(stopped)");
    }
}

async fn prompt(settings: &AlphaSettings) -> Result<()> {
    let stores = open_stores(settings)?;
    let record = stores.context.load().await;
    let compiler = PromptCompiler::new(settings.profile.clone());
    println!("{}", compiler.compile(&record, &Local::now().naive_local()));
    Ok(())
}

async fn context(settings: &AlphaSettings, set: Option<PathBuf>) -> Result<()> {
    let stores = open_stores(settings)?;
    match set {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let record: ContextRecord =
                serde_json::from_str(&raw).context("Context file is not a valid context record")?;
            let origin = stores.context.save(&record).await;
            tracing::info!(?origin, "context saved");
        }
        None => {
            let record = stores.context.load().await;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    Ok(())
}

fn clean() -> Result<()> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("Failed to read stdin")?;
    println!("{}", transcript::clean(&raw));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_ref())?;

    init_telemetry(TelemetryConfig::from_settings(&settings.logging));
    tracing::debug!(installation = %settings.installation_id, "settings loaded");

    match cli.command {
        Command::Serve { host, port } => serve(&settings, host, port).await,
        Command::Chat { server } => chat(&settings, server).await,
        Command::Prompt => prompt(&settings).await,
        Command::Context { set } => context(&settings, set).await,
        Command::Clean => clean(),
    }
}

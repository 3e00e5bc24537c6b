//! HTTP boundary for Alpha: the authoritative store behind `/api/context` and
//! `/api/conversations`, plus proxies to the chat and transcription
//! providers.

#![deny(unsafe_code)]

pub mod error;
pub mod handlers;
pub mod server;
pub mod upstream;

pub use error::{ApiError, UpstreamError};
pub use server::{
    build_router, open_database, start, upstream_from_settings, AppState, ServerConfig,
    ServerHandle,
};
pub use upstream::Upstream;

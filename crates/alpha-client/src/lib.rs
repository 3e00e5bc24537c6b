//! Client side of Alpha: the HTTP remote store, chat streaming, dictation,
//! debounced auto-save and the chat session tying them together.

#![deny(unsafe_code)]

pub mod assembler;
pub mod autosave;
pub mod chat;
pub mod error;
pub mod remote;
pub mod session;
pub mod transcribe;

pub use assembler::{AssemblyOutcome, StreamAssembler};
pub use autosave::{AutoSaver, SaveTarget};
pub use chat::{ChatProvider, FrameLines, HttpChat};
pub use error::ClientError;
pub use remote::HttpBackend;
pub use session::{ChatSession, SessionParts};
pub use transcribe::{AudioClip, HttpTranscriber, Transcriber};

pub mod context;
pub mod conversation;
pub mod ids;
pub mod lines;
pub mod prompt;
pub mod stream;
pub mod transcript;
pub mod wire;

pub use context::ContextRecord;
pub use conversation::{ConversationDraft, ConversationRecord, ConversationUpdate, Message, Role};
pub use ids::{ConversationId, InstallationId, MessageId};
pub use prompt::{PromptCompiler, PromptProfile};

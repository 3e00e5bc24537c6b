pub mod backend;
pub mod cache;
pub mod context_repo;
pub mod context_store;
pub mod conversation_repo;
pub mod conversation_store;
pub mod database;
pub mod error;
pub mod fallback;
pub mod row_helpers;
pub mod schema;

pub use backend::{ContextBackend, ConversationBackend, Unconfigured};
pub use cache::LocalCache;
pub use context_repo::ContextRepo;
pub use context_store::ContextStore;
pub use conversation_repo::ConversationRepo;
pub use conversation_store::ConversationStore;
pub use database::Database;
pub use error::StoreError;
pub use fallback::Origin;

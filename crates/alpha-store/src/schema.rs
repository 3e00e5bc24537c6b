/// SQL DDL for the alpha databases.
/// WAL mode enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

/// Tables a [`crate::Database`] is created with.
pub struct Schema {
    pub name: &'static str,
    pub tables: &'static str,
}

/// Authoritative store behind the HTTP server.
pub const STORE: Schema = Schema {
    name: "store",
    tables: r#"
CREATE TABLE IF NOT EXISTS context (
    owner_id TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    messages TEXT NOT NULL,
    system_prompt TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#,
};

/// Client-side key/value cache.
pub const CACHE: Schema = Schema {
    name: "cache",
    tables: r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#,
};

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

//! Centralized database schema definitions for the post-edit state store.
//!
//! A single SQLite file (`state.db`) holds:
//! 1. site_state: the current site document, one upserted row per logical key.
//! 2. edits: the append-only idempotency ledger.
//! 3. previews: generated diff reports.
//! 4. trace: LLM call records written by the appliers.
//! 5. artifacts: generic registry of files produced by runs.

pub const STATE_DB_NAME: &str = "state.db";
pub const STATE_DB_SCHEMA_VERSION: u32 = 1;

pub const STATE_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const STATE_DB_SCHEMA_SITE_STATE: &str = "
    CREATE TABLE IF NOT EXISTS site_state (
        id TEXT PRIMARY KEY,
        key TEXT UNIQUE NOT NULL,
        schema_version INTEGER NOT NULL,
        value_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

pub const STATE_DB_SCHEMA_EDITS: &str = "
    CREATE TABLE IF NOT EXISTS edits (
        id TEXT PRIMARY KEY,
        scope TEXT NOT NULL,
        prompt TEXT,
        change_set_hash TEXT NOT NULL,
        llm_meta_json TEXT NOT NULL DEFAULT '{}',
        diff_stats_json TEXT NOT NULL, -- includes change_set_hash
        created_at TEXT NOT NULL
    )
";
pub const STATE_DB_INDEX_EDITS_HASH: &str =
    "CREATE INDEX IF NOT EXISTS idx_edits_change_set_hash ON edits(change_set_hash)";

pub const STATE_DB_SCHEMA_PREVIEWS: &str = "
    CREATE TABLE IF NOT EXISTS previews (
        id TEXT PRIMARY KEY,
        old_dir TEXT,
        new_dir TEXT NOT NULL,
        index_path TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";

pub const STATE_DB_SCHEMA_TRACE: &str = "
    CREATE TABLE IF NOT EXISTS trace (
        id TEXT PRIMARY KEY,
        provider TEXT NOT NULL,
        model TEXT NOT NULL,
        request_trunc TEXT NOT NULL,
        response_trunc TEXT NOT NULL,
        duration_ms INTEGER NOT NULL,
        tokens_json TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )
";

pub const STATE_DB_SCHEMA_ARTIFACTS: &str = "
    CREATE TABLE IF NOT EXISTS artifacts (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        path TEXT NOT NULL,
        hash TEXT,
        created_at TEXT NOT NULL
    )
";

/// Statements executed, in order, when the state database is initialized.
pub const STATE_DB_SCHEMA: &[&str] = &[
    STATE_DB_SCHEMA_META,
    STATE_DB_SCHEMA_SITE_STATE,
    STATE_DB_SCHEMA_EDITS,
    STATE_DB_INDEX_EDITS_HASH,
    STATE_DB_SCHEMA_PREVIEWS,
    STATE_DB_SCHEMA_TRACE,
    STATE_DB_SCHEMA_ARTIFACTS,
];

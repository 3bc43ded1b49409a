//! Persistent ledger for the post-edit pipeline.
//!
//! One SQLite file holds the current site document, the append-only edit
//! ledger (the idempotency record), generated previews, LLM trace rows and
//! an artifact registry. Every operation opens its own connection through
//! the [`DbBroker`], which serializes in-process access and writes an audit
//! line.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::PostEditError;
use crate::core::time;
use crate::core::trace;
use crate::site::changeset::ChangeSet;
use crate::site::model::SiteState;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_KEY: &str = "current";
const ACTOR: &str = "postedit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub id: String,
    pub scope: String,
    pub prompt: Option<String>,
    pub change_set_hash: String,
    pub diff_stats: JsonValue,
    pub llm_meta: JsonValue,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRecord {
    pub id: String,
    pub old_dir: Option<String>,
    pub new_dir: String,
    pub index_path: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub request_trunc: String,
    pub response_trunc: String,
    pub duration_ms: i64,
    pub tokens: JsonValue,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    pub kind: String,
    pub path: String,
    pub hash: Option<String>,
    pub created_at: String,
}

/// One LLM attempt to be written to the trace table. Request and response
/// are redacted and truncated by [`StateStore::record_trace`].
#[derive(Debug, Clone)]
pub struct TraceEntry<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub request: &'a str,
    pub response: &'a str,
    pub duration_ms: i64,
    pub tokens: JsonValue,
}

/// Everything written for one applied edit. [`StateStore::commit_edit`]
/// stores it in a single transaction.
#[derive(Debug, Clone)]
pub struct EditCommit<'a> {
    pub state_key: &'a str,
    pub state: &'a SiteState,
    pub scope: &'a str,
    pub prompt: Option<&'a str>,
    pub change_set: &'a ChangeSet,
    pub diff_stats: JsonValue,
    pub llm_meta: JsonValue,
    pub old_dir: Option<&'a Path>,
    pub new_dir: &'a Path,
    pub index_path: &'a Path,
}

pub struct StateStore {
    db_path: PathBuf,
    broker: DbBroker,
}

fn parse_json(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or(JsonValue::Null)
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// `diff_stats` as an object carrying `change_set_hash`.
fn stats_with_hash(diff_stats: JsonValue, hash: &str) -> JsonValue {
    let mut stats = match diff_stats {
        JsonValue::Object(map) => map,
        JsonValue::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    stats.insert("change_set_hash".to_string(), JsonValue::from(hash));
    JsonValue::Object(stats)
}

fn upsert_site_state(conn: &Connection, state: &SiteState, key: &str) -> Result<(), PostEditError> {
    let value_json = serde_json::to_string(&state.to_value()?)?;
    conn.execute(
        "INSERT INTO site_state(id, key, schema_version, value_json, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(key) DO UPDATE SET
             schema_version = excluded.schema_version,
             value_json = excluded.value_json,
             updated_at = excluded.updated_at",
        params![
            time::new_event_id(),
            key,
            state.schema_version,
            value_json,
            time::now_epoch_z()
        ],
    )?;
    Ok(())
}

fn insert_edit(
    conn: &Connection,
    scope: &str,
    prompt: Option<&str>,
    hash: &str,
    diff_stats: JsonValue,
    llm_meta: &JsonValue,
) -> Result<String, PostEditError> {
    let id = time::new_event_id();
    let stats_json = serde_json::to_string(&stats_with_hash(diff_stats, hash))?;
    let meta_json = serde_json::to_string(llm_meta)?;
    conn.execute(
        "INSERT INTO edits(id, scope, prompt, change_set_hash, llm_meta_json, diff_stats_json, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, scope, prompt, hash, meta_json, stats_json, time::now_epoch_z()],
    )?;
    Ok(id)
}

fn insert_preview(
    conn: &Connection,
    old_dir: Option<&Path>,
    new_dir: &Path,
    index_path: &Path,
) -> Result<String, PostEditError> {
    let id = time::new_event_id();
    conn.execute(
        "INSERT INTO previews(id, old_dir, new_dir, index_path, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            old_dir.map(path_text),
            path_text(new_dir),
            path_text(index_path),
            time::now_epoch_z(),
        ],
    )?;
    Ok(id)
}

fn insert_artifact(
    conn: &Connection,
    kind: &str,
    path: &Path,
    hash: Option<&str>,
) -> Result<String, PostEditError> {
    let id = time::new_event_id();
    conn.execute(
        "INSERT INTO artifacts(id, kind, path, hash, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
        params![id, kind, path_text(path), hash, time::now_epoch_z()],
    )?;
    Ok(id)
}

impl StateStore {
    /// Open (and if needed create) the database at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, PostEditError> {
        let db_path = db_path.into();
        let root = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&root)?;
        db::initialize_state_db(&db_path)?;
        Ok(Self {
            broker: DbBroker::new(&root),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn load_site_state(&self, key: &str) -> Result<SiteState, PostEditError> {
        let raw: Option<String> =
            self.broker
                .with_conn(&self.db_path, ACTOR, None, "site_state.load", |conn| {
                    Ok(conn
                        .query_row(
                            "SELECT value_json FROM site_state WHERE key = ?1",
                            params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?)
                })?;

        match raw {
            Some(raw) => SiteState::from_value(serde_json::from_str(&raw)?),
            None => Ok(SiteState::default()),
        }
    }

    pub fn save_site_state(&self, state: &SiteState, key: &str) -> Result<(), PostEditError> {
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "site_state.save", |conn| {
                upsert_site_state(conn, state, key)
            })
    }

    /// Append a ledger row. The change set hash is stored both in its own
    /// column and inside `diff_stats`.
    pub fn record_edit(
        &self,
        scope: &str,
        prompt: Option<&str>,
        change_set: &ChangeSet,
        diff_stats: JsonValue,
        llm_meta: JsonValue,
    ) -> Result<String, PostEditError> {
        let hash = change_set.hash();
        self.broker.with_conn(
            &self.db_path,
            ACTOR,
            Some(hash.as_str()),
            "edits.record",
            |conn| insert_edit(conn, scope, prompt, &hash, diff_stats, &llm_meta),
        )
    }

    /// Save the document and append the preview, ledger and artifact rows
    /// of one applied edit. Either every row lands or none does, so a saved
    /// document always has its ledger entry. Returns the edit id.
    pub fn commit_edit(&self, commit: EditCommit<'_>) -> Result<String, PostEditError> {
        let hash = commit.change_set.hash();
        self.broker.with_conn(
            &self.db_path,
            ACTOR,
            Some(hash.as_str()),
            "edits.commit",
            |conn| {
                let tx = conn.unchecked_transaction()?;
                upsert_site_state(&tx, commit.state, commit.state_key)?;
                insert_preview(&tx, commit.old_dir, commit.new_dir, commit.index_path)?;
                let edit_id = insert_edit(
                    &tx,
                    commit.scope,
                    commit.prompt,
                    &hash,
                    commit.diff_stats,
                    &commit.llm_meta,
                )?;
                insert_artifact(&tx, "build", commit.new_dir, None)?;
                insert_artifact(&tx, "preview", commit.index_path, None)?;
                tx.commit()?;
                Ok(edit_id)
            },
        )
    }

    /// Whether an edit with this change set hash was already recorded.
    pub fn has_change_set(&self, hash: &str) -> Result<bool, PostEditError> {
        if hash.is_empty() {
            return Ok(false);
        }
        self.broker
            .with_conn(&self.db_path, ACTOR, Some(hash), "edits.lookup", |conn| {
                let mut stmt = conn.prepare("SELECT change_set_hash, diff_stats_json FROM edits")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for row in rows {
                    let (column, stats) = row?;
                    if column == hash {
                        return Ok(true);
                    }
                    if parse_json(&stats).get("change_set_hash").and_then(JsonValue::as_str)
                        == Some(hash)
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            })
    }

    /// All edits, newest first.
    pub fn list_edits(&self) -> Result<Vec<EditRecord>, PostEditError> {
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "edits.list", |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, scope, prompt, change_set_hash, diff_stats_json, llm_meta_json, created_at
                     FROM edits ORDER BY rowid DESC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(EditRecord {
                        id: row.get(0)?,
                        scope: row.get(1)?,
                        prompt: row.get(2)?,
                        change_set_hash: row.get(3)?,
                        diff_stats: parse_json(&row.get::<_, String>(4)?),
                        llm_meta: parse_json(&row.get::<_, String>(5)?),
                        created_at: row.get(6)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
    }

    pub fn record_preview(
        &self,
        old_dir: Option<&Path>,
        new_dir: &Path,
        index_path: &Path,
    ) -> Result<String, PostEditError> {
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "previews.record", |conn| {
                insert_preview(conn, old_dir, new_dir, index_path)
            })
    }

    pub fn latest_preview(&self) -> Result<Option<PreviewRecord>, PostEditError> {
        Ok(self.query_previews(Some(1))?.into_iter().next())
    }

    /// All previews, newest first.
    pub fn list_previews(&self) -> Result<Vec<PreviewRecord>, PostEditError> {
        self.query_previews(None)
    }

    fn query_previews(&self, limit: Option<i64>) -> Result<Vec<PreviewRecord>, PostEditError> {
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "previews.list", |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, old_dir, new_dir, index_path, created_at
                     FROM previews ORDER BY rowid DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit.unwrap_or(-1)], |row| {
                    Ok(PreviewRecord {
                        id: row.get(0)?,
                        old_dir: row.get(1)?,
                        new_dir: row.get(2)?,
                        index_path: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
    }

    pub fn record_trace(&self, entry: TraceEntry<'_>) -> Result<String, PostEditError> {
        let id = time::new_event_id();
        let now = time::now_epoch_z();
        let request = trace::scrub_for_trace(entry.request);
        let response = trace::scrub_for_trace(entry.response);
        let tokens_json = serde_json::to_string(&entry.tokens)?;
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "trace.record", |conn| {
                conn.execute(
                    "INSERT INTO trace(id, provider, model, request_trunc, response_trunc, duration_ms, tokens_json, created_at)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id,
                        entry.provider,
                        entry.model,
                        request,
                        response,
                        entry.duration_ms,
                        tokens_json,
                        now,
                    ],
                )?;
                Ok(())
            })?;
        Ok(id)
    }

    /// Most recent trace rows first.
    pub fn list_traces(&self, limit: usize) -> Result<Vec<TraceRecord>, PostEditError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "trace.list", |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, provider, model, request_trunc, response_trunc, duration_ms, tokens_json, created_at
                     FROM trace ORDER BY rowid DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], |row| {
                    Ok(TraceRecord {
                        id: row.get(0)?,
                        provider: row.get(1)?,
                        model: row.get(2)?,
                        request_trunc: row.get(3)?,
                        response_trunc: row.get(4)?,
                        duration_ms: row.get(5)?,
                        tokens: parse_json(&row.get::<_, String>(6)?),
                        created_at: row.get(7)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
    }

    pub fn record_artifact(
        &self,
        kind: &str,
        path: &Path,
        hash: Option<&str>,
    ) -> Result<String, PostEditError> {
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "artifacts.record", |conn| {
                insert_artifact(conn, kind, path, hash)
            })
    }

    /// Artifacts in registration order.
    pub fn list_artifacts(&self) -> Result<Vec<ArtifactRecord>, PostEditError> {
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "artifacts.list", |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, kind, path, hash, created_at FROM artifacts ORDER BY rowid ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(ArtifactRecord {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        path: row.get(2)?,
                        hash: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
    }

    /// Counts per table, for `state show`.
    pub fn summary(&self) -> Result<JsonValue, PostEditError> {
        self.broker
            .with_conn(&self.db_path, ACTOR, None, "state.summary", |conn| {
                let count = |table: &str| -> Result<i64, PostEditError> {
                    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?)
                };
                Ok(json!({
                    "edits": count("edits")?,
                    "previews": count("previews")?,
                    "trace": count("trace")?,
                    "artifacts": count("artifacts")?,
                }))
            })
    }
}

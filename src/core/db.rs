use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

pub fn db_connect(db_path: &str) -> Result<Connection, error::PostEditError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::PostEditError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::PostEditError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::PostEditError::RusqliteError)?;
    Ok(conn)
}

/// Create every table of the state database and stamp its schema version.
/// Safe to call on an existing database.
pub fn initialize_state_db(db_path: &Path) -> Result<(), error::PostEditError> {
    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).map_err(error::PostEditError::IoError)?;
    }
    let root = db_path.parent().unwrap_or_else(|| Path::new("."));

    let broker = DbBroker::new(root);
    broker.with_conn(db_path, "postedit", None, "state.init", |conn| {
        for statement in schemas::STATE_DB_SCHEMA {
            conn.execute(statement, [])?;
        }
        conn.execute(
            "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
             ON CONFLICT(key) DO NOTHING",
            [schemas::STATE_DB_SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    })
}

pub fn stored_schema_version(db_path: &Path) -> Result<Option<u32>, error::PostEditError> {
    let conn = db_connect(&db_path.to_string_lossy())?;
    let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let raw: String = row.get(0)?;
            raw.parse::<u32>().map(Some).map_err(|e| {
                error::PostEditError::MigrationError(format!(
                    "unreadable schema_version '{}': {}",
                    raw, e
                ))
            })
        }
        None => Ok(None),
    }
}

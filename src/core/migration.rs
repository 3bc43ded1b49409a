//! Versioned schema for the serialized site document.
//!
//! Persisted `SiteState` JSON carries a `schema_version`. On load,
//! [`migrate_site_state`] runs every migration whose target is newer than the
//! stored version, in order. Each migration is idempotent and never
//! overwrites a value that is already present in the newer location.

use crate::core::error::PostEditError;
use serde_json::{Map, Value};

/// Current site document schema version.
pub const SITE_STATE_SCHEMA_VERSION: u32 = 2;

/// Migration definition
pub struct Migration {
    pub target_version: u32,
    pub description: &'static str,
    pub up: fn(&mut Map<String, Value>),
}

/// All migrations in chronological order
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            target_version: 1,
            description: "Fold legacy theme.palette/radii/shadow into theme.tokens",
            up: migrate_theme_tokens,
        },
        Migration {
            target_version: 2,
            description: "Rename nav.layout.default_state to default; normalize build.history",
            up: migrate_nav_default_and_history,
        },
    ]
}

pub fn stored_version(doc: &Value) -> u32 {
    doc.get("schema_version")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(0)
}

/// Bring a persisted document up to [`SITE_STATE_SCHEMA_VERSION`].
/// `null` is returned unchanged (the caller falls back to defaults).
pub fn migrate_site_state(doc: Value) -> Result<Value, PostEditError> {
    let mut map = match doc {
        Value::Null => return Ok(Value::Null),
        Value::Object(map) => map,
        other => {
            return Err(PostEditError::MigrationError(format!(
                "site state must be a JSON object, got {}",
                json_kind(&other)
            )));
        }
    };

    let from = stored_version(&Value::Object(map.clone()));
    if from > SITE_STATE_SCHEMA_VERSION {
        return Err(PostEditError::MigrationError(format!(
            "site state schema v{} is newer than supported v{}",
            from, SITE_STATE_SCHEMA_VERSION
        )));
    }

    for migration in all_migrations() {
        if migration.target_version > from {
            tracing::debug!(
                target_version = migration.target_version,
                description = migration.description,
                "migrating site state"
            );
            (migration.up)(&mut map);
        }
    }

    map.insert(
        "schema_version".to_string(),
        Value::from(SITE_STATE_SCHEMA_VERSION),
    );
    Ok(Value::Object(map))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just replaced with an object"),
    }
}

fn fill_missing(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn migrate_theme_tokens(doc: &mut Map<String, Value>) {
    let Some(Value::Object(theme)) = doc.get_mut("theme") else {
        return;
    };

    let legacy_palette = theme.remove("palette");
    let legacy_radii = theme.remove("radii");
    let legacy_shadow = theme.remove("shadow");

    let tokens = object_entry(theme, "tokens");

    if let Some(Value::Object(palette)) = legacy_palette {
        fill_missing(object_entry(tokens, "palette"), &palette);
    }
    if let Some(Value::Object(radii)) = legacy_radii {
        let radius = radii.get("radius").or_else(|| radii.get("base")).cloned();
        if let Some(radius) = radius {
            object_entry(tokens, "shape")
                .entry("radius".to_string())
                .or_insert(radius);
        }
    }
    if let Some(Value::Object(shadow)) = legacy_shadow {
        fill_missing(object_entry(tokens, "shadow"), &shadow);
    }
}

fn migrate_nav_default_and_history(doc: &mut Map<String, Value>) {
    if let Some(Value::Object(nav)) = doc.get_mut("nav")
        && let Some(Value::Object(layout)) = nav.get_mut("layout")
        && let Some(old) = layout.remove("default_state")
    {
        layout.entry("default".to_string()).or_insert(old);
    }

    if let Some(Value::Object(build)) = doc.get_mut("build") {
        let history_ok = build.get("history").is_none_or(Value::is_array);
        if !history_ok {
            build.insert("history".to_string(), Value::Array(Vec::new()));
        }
    }
}

//! Change operations and the hashable change set.
//!
//! A `ChangeSet` is canonicalized on construction: operations are sorted by
//! `(type, page, block_id, canonical payload JSON)`. `hash()` is the SHA-256
//! of the canonical JSON form, so two semantically identical sets hash the
//! same regardless of the order their operations were produced in. That hash
//! is the idempotency key of the edit ledger.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A named subset of the site an edit request may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Css,
    Seo,
    Images,
    Logo,
    Content,
    Nav,
    Head,
}

impl Scope {
    /// Every scope, in planning order.
    pub const ALL: [Scope; 7] = [
        Scope::Css,
        Scope::Seo,
        Scope::Images,
        Scope::Logo,
        Scope::Content,
        Scope::Nav,
        Scope::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Css => "css",
            Scope::Seo => "seo",
            Scope::Images => "images",
            Scope::Logo => "logo",
            Scope::Content => "content",
            Scope::Nav => "nav",
            Scope::Head => "head",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Scope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == wanted)
            .ok_or_else(|| format!("unknown scope '{}'", s))
    }
}

pub mod op {
    pub const CSS_TOKENS_UPDATE: &str = "css.tokens.update";
    pub const CSS_BUNDLE_REWRITE: &str = "css.bundle.rewrite";
    pub const CONTENT_REWRITE: &str = "content.rewrite";
    pub const NAV_LAYOUT_UPDATE: &str = "nav.layout.update";
    pub const SEO_META_PATCH: &str = "seo.meta.patch";
    pub const HEAD_PATCH: &str = "head.patch";
    pub const IMAGES_PLACEHOLDER: &str = "images.placeholder";
    pub const LOGO_PLACEHOLDER: &str = "logo.placeholder";
}

/// One namespaced instruction emitted by the planner. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOperation {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page: Option<String>,
    #[serde(rename = "blockId", default, skip_serializing_if = "Option::is_none")]
    block_id: Option<String>,
}

impl ChangeOperation {
    /// `payload` should be a JSON object; any other value is stored under
    /// the key `value`.
    pub fn new(kind: impl Into<String>, payload: JsonValue) -> Self {
        let payload = match payload {
            JsonValue::Object(map) => map,
            JsonValue::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            kind: kind.into(),
            payload,
            page: None,
            block_id: None,
        }
    }

    pub fn for_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn for_block(mut self, block_id: impl Into<String>) -> Self {
        self.block_id = Some(block_id.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Map<String, JsonValue> {
        &self.payload
    }

    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }

    pub fn block_id(&self) -> Option<&str> {
        self.block_id.as_deref()
    }

    /// Prefix of the type before the first `.` (`css.tokens.update` → `css`).
    pub fn namespace(&self) -> &str {
        self.kind.split('.').next().unwrap_or("")
    }

    pub fn in_scope(&self, scope: Scope) -> bool {
        self.namespace() == scope.as_str()
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(JsonValue::as_str)
    }

    pub fn payload_bool(&self, key: &str) -> bool {
        self.payload
            .get(key)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }

    fn sort_key(&self) -> (&str, &str, &str, String) {
        (
            self.kind.as_str(),
            self.page.as_deref().unwrap_or(""),
            self.block_id.as_deref().unwrap_or(""),
            canonical_json_string(&JsonValue::Object(self.payload.clone())),
        )
    }
}

/// Sort operations deterministically.
pub fn merge_operations(mut operations: Vec<ChangeOperation>) -> Vec<ChangeOperation> {
    operations.sort_by_cached_key(|op| {
        let (kind, page, block, payload) = op.sort_key();
        (kind.to_string(), page.to_string(), block.to_string(), payload)
    });
    operations
}

/// The canonical, hashable collection of operations for one edit request.
/// Deserialization goes through [`ChangeSet::new`], so a decoded set is
/// ordered exactly like a planned one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawChangeSet")]
pub struct ChangeSet {
    targets: Vec<String>,
    operations: Vec<ChangeOperation>,
}

#[derive(Deserialize)]
struct RawChangeSet {
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    operations: Vec<ChangeOperation>,
}

impl From<RawChangeSet> for ChangeSet {
    fn from(raw: RawChangeSet) -> Self {
        ChangeSet::new(raw.targets, raw.operations)
    }
}

impl ChangeSet {
    pub fn new(targets: Vec<String>, operations: Vec<ChangeOperation>) -> Self {
        Self {
            targets,
            operations: merge_operations(operations),
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn operations(&self) -> &[ChangeOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn operations_for(&self, scope: Scope) -> Vec<ChangeOperation> {
        self.operations
            .iter()
            .filter(|op| op.in_scope(scope))
            .cloned()
            .collect()
    }

    pub fn touches(&self, scope: Scope) -> bool {
        self.operations.iter().any(|op| op.in_scope(scope))
    }

    pub fn to_value(&self) -> JsonValue {
        canonicalize_json(&serde_json::json!({
            "targets": self.targets,
            "operations": self.operations,
        }))
    }

    pub fn canonical_json_bytes(&self) -> Vec<u8> {
        canonical_json_string(&self.to_value()).into_bytes()
    }

    pub fn hash(&self) -> String {
        sha256_hex(&self.canonical_json_bytes())
    }
}

/// Rebuild `value` with every object's keys in sorted order.
pub fn canonicalize_json(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut normalized = Map::new();
            for key in keys {
                normalized.insert(key.clone(), canonicalize_json(&map[key]));
            }
            JsonValue::Object(normalized)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

pub fn canonical_json_string(value: &JsonValue) -> String {
    canonicalize_json(value).to_string()
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

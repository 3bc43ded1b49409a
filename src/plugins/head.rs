//! Document head patches (`head.patch`).

use super::{ApplyContext, ApplySummary, ChangeApplier};
use crate::core::error::PostEditError;
use crate::site::changeset::{ChangeOperation, Scope, op};
use crate::site::model::{HeadLink, JsonMap, SiteState};
use serde_json::{Map, Value as JsonValue, json};

pub struct HeadApplier;

/// `brand_first` prefixes the title with the brand once. Any other policy
/// leaves the title alone. Returns whether the title changed.
pub fn apply_title_policy(state: &mut SiteState, policy: &str) -> bool {
    if !policy.trim().eq_ignore_ascii_case("brand_first") {
        return false;
    }
    let Some(brand) = state
        .head
        .brand
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
    else {
        return false;
    };

    let title = state.head.title.trim();
    let new_title = if title.is_empty() {
        brand.to_string()
    } else if title == brand || title.starts_with(&format!("{} | ", brand)) {
        return false;
    } else {
        format!("{} | {}", brand, title)
    };

    if new_title == state.head.title {
        return false;
    }
    state.head.title = new_title;
    true
}

/// Replace every `rel="icon"` link with one pointing at `href`.
pub fn set_favicon(state: &mut SiteState, href: &str) -> bool {
    let before = state.head.links.clone();
    state.head.links.retain(|link| link.rel != "icon");
    state.head.links.push(HeadLink {
        rel: "icon".to_string(),
        href: href.to_string(),
    });
    state.head.links != before
}

fn merge_nested(target: &mut Map<String, JsonValue>, updates: &Map<String, JsonValue>) -> usize {
    let mut updated = 0;
    for (key, value) in updates {
        match value {
            JsonValue::Object(nested) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| JsonValue::Object(Map::new()));
                if !slot.is_object() {
                    *slot = JsonValue::Object(Map::new());
                }
                if let JsonValue::Object(inner) = slot {
                    updated += merge_nested(inner, nested);
                }
            }
            other => {
                if target.get(key) != Some(other) {
                    target.insert(key.clone(), other.clone());
                    updated += 1;
                }
            }
        }
    }
    updated
}

/// Merge `updates` into the head meta map, recursing into objects. Returns
/// the number of leaf values written.
pub fn merge_meta(meta: &mut JsonMap, updates: &Map<String, JsonValue>) -> usize {
    let mut as_json: Map<String, JsonValue> = std::mem::take(meta).into_iter().collect();
    let updated = merge_nested(&mut as_json, updates);
    *meta = as_json.into_iter().collect();
    updated
}

fn append_links(state: &mut SiteState, links: &[JsonValue]) -> usize {
    let mut appended = 0;
    for link in links.iter().filter_map(JsonValue::as_object) {
        let field = |name: &str| link.get(name).and_then(JsonValue::as_str);
        state.head.links.push(HeadLink {
            rel: field("rel").unwrap_or("stylesheet").to_string(),
            href: field("href").unwrap_or_default().to_string(),
        });
        appended += 1;
    }
    appended
}

impl ChangeApplier for HeadApplier {
    fn scope(&self) -> Scope {
        Scope::Head
    }

    fn apply(
        &self,
        state: &mut SiteState,
        operations: &[ChangeOperation],
        _ctx: &ApplyContext<'_>,
    ) -> Result<ApplySummary, PostEditError> {
        let mut patched = 0;
        let mut title_updates = 0;
        let mut favicon_updates = 0;
        let mut meta_updates = 0;
        let mut links_appended = 0;

        for patch in operations.iter().filter(|o| o.kind() == op::HEAD_PATCH) {
            let mut changed = false;

            if let Some(policy) = patch.payload_str("title_policy")
                && apply_title_policy(state, policy)
            {
                title_updates += 1;
                changed = true;
            }

            if let Some(favicon) = patch.payload_str("favicon").filter(|f| !f.is_empty())
                && set_favicon(state, favicon)
            {
                favicon_updates += 1;
                changed = true;
            }

            if let Some(meta) = patch.payload().get("meta").and_then(JsonValue::as_object) {
                let applied = merge_meta(&mut state.head.meta, meta);
                if applied > 0 {
                    meta_updates += applied;
                    changed = true;
                }
            }

            if let Some(links) = patch.payload().get("links").and_then(JsonValue::as_array) {
                let appended = append_links(state, links);
                if appended > 0 {
                    links_appended += appended;
                    changed = true;
                }
            }

            if changed {
                patched += 1;
            }
        }

        let mut summary = ApplySummary::new();
        summary.insert("patched".to_string(), json!(patched));
        summary.insert("title_updates".to_string(), json!(title_updates));
        summary.insert("favicon_updates".to_string(), json!(favicon_updates));
        summary.insert("meta_updates".to_string(), json!(meta_updates));
        summary.insert("links_appended".to_string(), json!(links_appended));
        Ok(summary)
    }
}

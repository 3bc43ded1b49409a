//! Per-page search metadata (`seo.meta.patch`).

use super::llm::Message;
use super::{ApplyContext, ApplySummary, ChangeApplier, ask_json};
use crate::core::error::PostEditError;
use crate::site::changeset::{ChangeOperation, Scope, op};
use crate::site::model::SiteState;
use serde_json::{Value as JsonValue, json};

pub const HINT_CHARS: usize = 120;
pub const DESCRIPTION_CHARS: usize = 300;

pub struct SeoApplier;

fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut at_start = true;
    for ch in word.chars() {
        if ch.is_alphabetic() {
            if at_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_start = false;
        } else {
            out.push(ch);
            at_start = true;
        }
    }
    out
}

/// `"<hint> - tailored for <Focus> page."` with the hint cut to 120 chars.
pub fn fallback_description(hint: &str, page: &str) -> String {
    let hint = hint.trim();
    let base = if hint.is_empty() {
        "Updated SEO description".to_string()
    } else {
        hint.chars().take(HINT_CHARS).collect()
    };
    let focus = page.trim_matches('/');
    let focus = if focus.is_empty() { "home" } else { focus };
    format!("{} - tailored for {} page.", base, title_case(focus))
}

fn description_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {"description": {"type": "string"}},
        "required": ["description"]
    })
}

impl ChangeApplier for SeoApplier {
    fn scope(&self) -> Scope {
        Scope::Seo
    }

    fn apply(
        &self,
        state: &mut SiteState,
        operations: &[ChangeOperation],
        ctx: &ApplyContext<'_>,
    ) -> Result<ApplySummary, PostEditError> {
        let schema = description_schema();
        let mut meta_updated = 0;

        for patch in operations.iter().filter(|o| o.kind() == op::SEO_META_PATCH) {
            let Some(page_key) = patch.page() else {
                continue;
            };
            let hint = patch.payload_str("description_hint").unwrap_or(ctx.prompt);
            let page_title = state
                .find_page(page_key)
                .map(|p| p.title.clone())
                .unwrap_or_default();

            let messages = [
                Message::system(
                    "You write meta descriptions of at most 160 characters. \
                     Reply with JSON {\"description\": \"...\"}.",
                ),
                Message::user(format!(
                    "Page: {} ({})\nGuidance: {}",
                    page_key, page_title, hint
                )),
            ];
            let from_model = ask_json(ctx, "seo", &messages, Some(&schema))?.and_then(|c| {
                c.value
                    .get("description")
                    .and_then(JsonValue::as_str)
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(|d| d.chars().take(DESCRIPTION_CHARS).collect::<String>())
            });
            let description =
                from_model.unwrap_or_else(|| fallback_description(hint, page_key));

            let entry = state.seo.meta.entry(page_key.to_string()).or_default();
            entry.description = description;
            meta_updated += 1;

            if let Some(keywords) = patch.payload().get("keywords").and_then(JsonValue::as_array) {
                let keywords: Vec<String> = keywords
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::to_string)
                    .collect();
                if !keywords.is_empty() {
                    entry.keywords = keywords;
                }
            }
        }

        let mut summary = ApplySummary::new();
        summary.insert("meta_updated".to_string(), json!(meta_updated));
        Ok(summary)
    }
}

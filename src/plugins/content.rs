//! Block copy rewrites (`content.rewrite`).
//!
//! The model is asked for the new text of one block at a time. Without a
//! usable reply, `longer` requests get a fixed extension sentence and every
//! other request leaves the text alone.

use super::llm::Message;
use super::{ApplyContext, ApplySummary, ChangeApplier, ask_text};
use crate::core::error::PostEditError;
use crate::site::changeset::{ChangeOperation, Scope, op};
use crate::site::model::SiteState;
use serde_json::json;

pub const EXTENSION_SENTENCE: &str =
    "We take the time to explain every step, so you always know what comes next.";
pub const CALL_TO_ACTION_TEXT: &str = "Get in touch today to book your appointment.";

pub struct ContentApplier;

/// Local rewrite used when the model gives nothing usable.
pub fn fallback_text(text: &str, longer: bool) -> String {
    let trimmed = text.trim_end();
    if !longer || trimmed.ends_with(EXTENSION_SENTENCE) {
        return text.to_string();
    }
    if trimmed.is_empty() {
        EXTENSION_SENTENCE.to_string()
    } else {
        format!("{} {}", trimmed, EXTENSION_SENTENCE)
    }
}

impl ChangeApplier for ContentApplier {
    fn scope(&self) -> Scope {
        Scope::Content
    }

    fn apply(
        &self,
        state: &mut SiteState,
        operations: &[ChangeOperation],
        ctx: &ApplyContext<'_>,
    ) -> Result<ApplySummary, PostEditError> {
        let mut blocks_rewritten = 0;
        let mut fallback_used = 0;
        let mut cta_added = 0;
        let mut missing = 0;

        for rewrite in operations.iter().filter(|o| o.kind() == op::CONTENT_REWRITE) {
            let (Some(page_key), Some(block_id)) = (rewrite.page(), rewrite.block_id()) else {
                missing += 1;
                continue;
            };
            let Some(block) = state
                .find_page_mut(page_key)
                .and_then(|page| page.find_block_mut(block_id))
            else {
                tracing::debug!(page = page_key, block = block_id, "content target not found");
                missing += 1;
                continue;
            };

            let longer = rewrite.payload_str("length") == Some("longer");
            let call_to_action = rewrite.payload_bool("call_to_action");
            let instruction = rewrite.payload_str("prompt").unwrap_or(ctx.prompt);

            let messages = [
                Message::system(
                    "You rewrite website copy for a small business. Keep the meaning and \
                     language of the original. Reply with the rewritten text only.",
                ),
                Message::user(
                    json!({
                        "text": block.text,
                        "length": if longer { "longer" } else { "default" },
                        "instruction": instruction,
                    })
                    .to_string(),
                ),
            ];

            let new_text = match ask_text(ctx, "content", &messages, Some(0.4))? {
                Some(completion) => completion.text.trim().to_string(),
                None => {
                    fallback_used += 1;
                    fallback_text(&block.text, longer)
                }
            };
            if new_text != block.text {
                block.text = new_text;
                blocks_rewritten += 1;
            }

            if call_to_action && !block.meta.contains_key("call_to_action") {
                block
                    .meta
                    .insert("call_to_action".to_string(), json!(CALL_TO_ACTION_TEXT));
                cta_added += 1;
            }
        }

        let mut summary = ApplySummary::new();
        summary.insert("blocks_rewritten".to_string(), json!(blocks_rewritten));
        summary.insert("fallback_used".to_string(), json!(fallback_used));
        summary.insert("cta_added".to_string(), json!(cta_added));
        if missing > 0 {
            summary.insert("missing_targets".to_string(), json!(missing));
        }
        Ok(summary)
    }
}

//! Theme token and stylesheet updates (`css.tokens.update`, `css.bundle.rewrite`).

use super::llm::Message;
use super::{ApplyContext, ApplySummary, ChangeApplier, ask_text, strip_code_fence};
use crate::core::error::PostEditError;
use crate::site::changeset::{ChangeOperation, Scope, op};
use crate::site::model::{SiteState, ThemeTokens};
use crate::site::render;
use serde_json::{Value as JsonValue, json};

pub struct CssApplier;

/// Merge `{group: {name: value}}` into `tokens`. Returns the number of token
/// values that changed. Unknown groups and non-string values are ignored.
pub fn merge_tokens(tokens: &mut ThemeTokens, update: &JsonValue) -> usize {
    let Some(groups) = update.as_object() else {
        return 0;
    };
    let mut changed = 0;
    for (group_name, values) in groups {
        let (Some(group), Some(values)) = (tokens.group_mut(group_name), values.as_object()) else {
            continue;
        };
        for (name, value) in values {
            let Some(value) = value.as_str() else {
                continue;
            };
            if group.get(name).map(String::as_str) != Some(value) {
                group.insert(name.clone(), value.to_string());
                changed += 1;
            }
        }
    }
    changed
}

fn style_hints(rewrite: Option<&ChangeOperation>, ctx: &ApplyContext<'_>) -> String {
    let base = rewrite
        .and_then(|op| op.payload_str("styleHints"))
        .unwrap_or(ctx.prompt)
        .trim()
        .to_string();
    match ctx.design_directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) if base.is_empty() => directives.to_string(),
        Some(directives) => format!("{}; {}", base, directives),
        None => base,
    }
}

impl ChangeApplier for CssApplier {
    fn scope(&self) -> Scope {
        Scope::Css
    }

    fn apply(
        &self,
        state: &mut SiteState,
        operations: &[ChangeOperation],
        ctx: &ApplyContext<'_>,
    ) -> Result<ApplySummary, PostEditError> {
        let mut tokens_updated = 0;
        for update in operations.iter().filter(|o| o.kind() == op::CSS_TOKENS_UPDATE) {
            if let Some(tokens) = update.payload().get("tokens") {
                tokens_updated += merge_tokens(&mut state.theme.tokens, tokens);
            }
        }
        state.css_bundle.tokens = state.theme.tokens.clone();

        let rewrite = operations
            .iter()
            .find(|o| o.kind() == op::CSS_BUNDLE_REWRITE);
        if let Some(framework) = rewrite
            .and_then(|o| o.payload_str("framework"))
            .filter(|f| !f.trim().is_empty())
        {
            state.css_bundle.framework = framework.to_string();
        }

        let hints = style_hints(rewrite, ctx);
        let mut llm_status = "skipped";
        let mut extra_rules = None;

        if rewrite.is_some() {
            let messages = [
                Message::system(format!(
                    "You write additional CSS rules for a {} site. Use the CSS variables \
                     --color-*, --radius-base and --shadow-*. Reply with CSS only.",
                    state.css_bundle.framework
                )),
                Message::user(format!(
                    "Style intent: {}\nTokens: {}",
                    hints,
                    serde_json::to_string(&state.theme.tokens)?
                )),
            ];
            match ask_text(ctx, "css", &messages, Some(0.2))? {
                Some(completion) => {
                    extra_rules = Some(strip_code_fence(&completion.text).to_string());
                    llm_status = "ok";
                }
                None => llm_status = "fallback",
            }
        }

        state.css_bundle.raw =
            render::css_bundle_text(&hints, &state.theme.tokens, extra_rules.as_deref());

        let mut summary = ApplySummary::new();
        summary.insert("tokens_updated".to_string(), json!(tokens_updated));
        summary.insert("bundle_rewritten".to_string(), json!(true));
        summary.insert("llm".to_string(), json!(llm_status));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_tokens_counts_changes_only() {
        let mut tokens = SiteState::default().theme.tokens;
        let changed = merge_tokens(
            &mut tokens,
            &json!({
                "palette": {"primary": "blue", "background": "#ffffff"},
                "shape": {"radius": "1.25rem"},
                "unknown": {"x": "y"},
                "shadow": {"button": 3}
            }),
        );
        assert_eq!(changed, 2);
        assert_eq!(tokens.palette["primary"], "blue");
        assert_eq!(tokens.shape["radius"], "1.25rem");
        assert!(!tokens.shadow.contains_key("button"));
    }
}

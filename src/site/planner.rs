//! Intent-to-operations planning.
//!
//! `DeltaPlanner` reads the current [`SiteState`], the requested scopes and a
//! free-text prompt, and emits a canonical [`ChangeSet`]. It never mutates
//! state and never fails: unknown scopes fall back to the full list, and
//! prompts that mention nothing recognizable still yield well-formed
//! operations carrying the current values.

use crate::site::changeset::{ChangeOperation, ChangeSet, Scope, merge_operations, op};
use crate::site::model::{SiteState, TokenMap};
use regex::Regex;
use serde_json::{Value as JsonValue, json};
use std::sync::LazyLock;

pub const COLOR_VOCABULARY: [&str; 10] = [
    "blue", "navy", "teal", "green", "purple", "orange", "red", "yellow", "white", "black",
];

pub const ROUNDED_RADIUS: &str = "1.25rem";
pub const PILL_RADIUS: &str = "999px";
pub const ELEVATED_BUTTON_SHADOW: &str = "0 12px 32px rgba(12, 35, 64, 0.18)";

/// Location phrases, checked in order; the first hit wins.
const NAV_LOCATIONS: [(&str, &str); 11] = [
    ("top right", "top-right"),
    ("top-right", "top-right"),
    ("top left", "top-left"),
    ("top-left", "top-left"),
    ("top center", "top-center"),
    ("center", "top-center"),
    ("side left", "side-left"),
    ("left", "side-left"),
    ("side right", "side-right"),
    ("right", "side-right"),
    ("footer", "footer"),
];

const KEYWORD_TRIM: &[char] = &['.', ',', '!', '?', ';', ':'];

static FAVICON_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)favicon\s*:\s*(\S+)").expect("favicon pattern compiles")
});

static CTA_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcta\b").expect("cta pattern compiles")
});

/// Resolve requested scope tokens against the fixed scope list.
///
/// Empty input, `all`, or no recognized token resolves to every scope.
pub fn resolve_targets<S: AsRef<str>>(requested: &[S]) -> Vec<Scope> {
    let tokens: Vec<String> = requested
        .iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    if tokens.is_empty() || tokens.iter().any(|t| t == "all") {
        return Scope::ALL.to_vec();
    }

    let resolved: Vec<Scope> = Scope::ALL
        .into_iter()
        .filter(|scope| tokens.iter().any(|t| t == scope.as_str()))
        .collect();

    if resolved.is_empty() {
        Scope::ALL.to_vec()
    } else {
        resolved
    }
}

pub struct DeltaPlanner<'a> {
    state: &'a SiteState,
    scope: Vec<String>,
    prompt: String,
}

impl<'a> DeltaPlanner<'a> {
    pub fn new<S: AsRef<str>>(state: &'a SiteState, scope: &[S], prompt: Option<&str>) -> Self {
        Self {
            state,
            scope: scope.iter().map(|s| s.as_ref().to_string()).collect(),
            prompt: prompt.unwrap_or_default().to_string(),
        }
    }

    pub fn plan(&self) -> ChangeSet {
        let targets = resolve_targets(self.scope.as_slice());
        let mut operations = Vec::new();

        for scope in &targets {
            match scope {
                Scope::Css => operations.extend(self.plan_css()),
                Scope::Nav => operations.push(self.plan_nav()),
                Scope::Content => operations.extend(self.plan_content()),
                Scope::Seo => operations.extend(self.plan_seo()),
                Scope::Head => operations.push(self.plan_head()),
                Scope::Images => operations.push(placeholder(op::IMAGES_PLACEHOLDER, "image")),
                Scope::Logo => operations.push(placeholder(op::LOGO_PLACEHOLDER, "logo")),
            }
        }

        ChangeSet::new(
            targets.iter().map(|s| s.as_str().to_string()).collect(),
            merge_operations(operations),
        )
    }

    fn lower_prompt(&self) -> String {
        self.prompt.to_lowercase()
    }

    fn mentions(&self, needle: &str) -> bool {
        self.lower_prompt().contains(needle)
    }

    fn plan_css(&self) -> Vec<ChangeOperation> {
        let current = &self.state.theme.tokens;
        let colors = extract_colors(&self.prompt);

        let mut palette: TokenMap = current.palette.clone();
        if let Some(primary) = colors.first() {
            let accent = colors.get(1).unwrap_or(primary);
            let background = if colors.contains(&"white") {
                "white".to_string()
            } else {
                current
                    .palette
                    .get("background")
                    .cloned()
                    .unwrap_or_else(|| "white".to_string())
            };
            palette.insert("primary".to_string(), primary.to_string());
            palette.insert("accent".to_string(), accent.to_string());
            palette.insert("background".to_string(), background);
        }

        let mut shape = current.shape.clone();
        if self.mentions("rounded") {
            shape.insert("radius".to_string(), ROUNDED_RADIUS.to_string());
        }
        if self.mentions("pill") {
            shape.insert("radius".to_string(), PILL_RADIUS.to_string());
        }

        let mut shadow = current.shadow.clone();
        if self.mentions("shadow") || self.mentions("elevated") {
            shadow.insert("button".to_string(), ELEVATED_BUTTON_SHADOW.to_string());
        }

        vec![
            ChangeOperation::new(
                op::CSS_TOKENS_UPDATE,
                json!({
                    "path": "theme.tokens",
                    "tokens": {
                        "palette": palette,
                        "shape": shape,
                        "shadow": shadow,
                    }
                }),
            ),
            ChangeOperation::new(
                op::CSS_BUNDLE_REWRITE,
                json!({
                    "strategy": "llm",
                    "styleHints": self.prompt,
                    "framework": self.state.css_bundle.framework,
                }),
            ),
        ]
    }

    fn plan_nav(&self) -> ChangeOperation {
        let layout = &self.state.nav.layout;
        let prompt = self.lower_prompt();

        let location = NAV_LOCATIONS
            .iter()
            .find(|(phrase, _)| prompt.contains(phrase))
            .map(|(_, location)| location.to_string())
            .or_else(|| layout.location.clone())
            .unwrap_or_else(|| "top-left".to_string());

        let dropdown = ["hover", "click", "none"]
            .into_iter()
            .find(|mode| prompt.contains(mode))
            .map(str::to_string)
            .or_else(|| layout.dropdown.clone())
            .unwrap_or_else(|| "hover".to_string());

        let default = if prompt.contains("open") && !prompt.contains("closed") {
            "open".to_string()
        } else if prompt.contains("closed") {
            "closed".to_string()
        } else {
            layout.default.clone().unwrap_or_else(|| "closed".to_string())
        };

        ChangeOperation::new(
            op::NAV_LAYOUT_UPDATE,
            json!({
                "location": location,
                "dropdown": dropdown,
                "default": default,
            }),
        )
    }

    fn plan_content(&self) -> Vec<ChangeOperation> {
        let prompt = self.lower_prompt();
        let longer = ["long", "extend", "expand"]
            .iter()
            .any(|needle| prompt.contains(needle));
        let call_to_action = prompt.contains("call-to-action")
            || prompt.contains("call to action")
            || CTA_WORD.is_match(&prompt);

        let length = if longer { "longer" } else { "default" };

        self.state
            .pages
            .iter()
            .flat_map(|page| {
                page.blocks.iter().map(move |block| {
                    ChangeOperation::new(
                        op::CONTENT_REWRITE,
                        json!({
                            "length": length,
                            "call_to_action": call_to_action,
                            "prompt": self.prompt,
                        }),
                    )
                    .for_page(page.key())
                    .for_block(block.id.clone())
                })
            })
            .collect()
    }

    fn plan_seo(&self) -> Vec<ChangeOperation> {
        let keywords = extract_keywords(&self.prompt);
        self.state
            .pages
            .iter()
            .map(|page| {
                ChangeOperation::new(
                    op::SEO_META_PATCH,
                    json!({
                        "description_hint": self.prompt,
                        "keywords": keywords,
                    }),
                )
                .for_page(page.key())
            })
            .collect()
    }

    fn plan_head(&self) -> ChangeOperation {
        let title_policy = if self.mentions("brand first") {
            "brand_first"
        } else {
            "site_first"
        };
        let favicon = find_favicon_hint(&self.prompt)
            .map(JsonValue::from)
            .unwrap_or(JsonValue::Null);

        ChangeOperation::new(
            op::HEAD_PATCH,
            json!({
                "title_policy": title_policy,
                "favicon": favicon,
            }),
        )
    }
}

fn placeholder(kind: &str, what: &str) -> ChangeOperation {
    ChangeOperation::new(
        kind,
        json!({ "note": format!("{} operations are recorded but not applied", what) }),
    )
}

/// Colour names from the fixed vocabulary, in vocabulary order.
pub fn extract_colors(prompt: &str) -> Vec<&'static str> {
    let lower = prompt.to_lowercase();
    COLOR_VOCABULARY
        .into_iter()
        .filter(|name| lower.contains(name))
        .collect()
}

/// Lowercased words longer than four characters, de-duplicated in order.
pub fn extract_keywords(prompt: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in prompt.split_whitespace() {
        let word = word.trim_matches(KEYWORD_TRIM).to_lowercase();
        if word.chars().count() > 4 && !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

pub fn find_favicon_hint(prompt: &str) -> Option<String> {
    FAVICON_HINT
        .captures(prompt)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::model::{SiteBlock, SitePage};

    fn two_page_state() -> SiteState {
        let mut state = SiteState::default();
        state.pages = vec![
            SitePage::new("/", "Home").with_block(SiteBlock::new("hero", "Welcome")),
            SitePage::new("/services", "Services")
                .with_block(SiteBlock::new("svc", "We help you recover"))
                .with_block(SiteBlock::new("svc-2", "Manual therapy")),
        ];
        state
    }

    #[test]
    fn test_resolve_targets_fails_open() {
        assert_eq!(resolve_targets::<&str>(&[]), Scope::ALL.to_vec());
        assert_eq!(resolve_targets(&["ALL"]), Scope::ALL.to_vec());
        assert_eq!(resolve_targets(&["banner"]), Scope::ALL.to_vec());
        assert_eq!(
            resolve_targets(&[" head ", "css", "nav"]),
            vec![Scope::Css, Scope::Nav, Scope::Head]
        );
    }

    #[test]
    fn test_colors_follow_vocabulary_order() {
        assert_eq!(extract_colors("White and BLUE please"), vec!["blue", "white"]);
        assert!(extract_colors("make it modern").is_empty());
    }

    #[test]
    fn test_css_palette_and_shape_tokens() {
        let state = two_page_state();
        let set = DeltaPlanner::new(
            &state,
            &["css"],
            Some("Make it modern; blue/white palette; rounded pill buttons with shadow"),
        )
        .plan();

        let ops = set.operations_for(Scope::Css);
        assert_eq!(ops.len(), 2);
        let tokens = &ops
            .iter()
            .find(|o| o.kind() == op::CSS_TOKENS_UPDATE)
            .unwrap()
            .payload()["tokens"];
        assert_eq!(tokens["palette"]["primary"], "blue");
        assert_eq!(tokens["palette"]["accent"], "white");
        assert_eq!(tokens["palette"]["background"], "white");
        assert_eq!(tokens["shape"]["radius"], PILL_RADIUS);
        assert_eq!(tokens["shadow"]["button"], ELEVATED_BUTTON_SHADOW);
    }

    #[test]
    fn test_css_without_colors_keeps_palette() {
        let state = two_page_state();
        let set = DeltaPlanner::new(&state, &["css"], Some("rounded corners")).plan();
        let tokens_op = &set.operations_for(Scope::Css)[1];
        assert_eq!(tokens_op.kind(), op::CSS_TOKENS_UPDATE);
        let tokens = &tokens_op.payload()["tokens"];
        assert_eq!(tokens["palette"]["primary"], "#0d6efd");
        assert!(tokens["palette"].get("accent").is_none());
        assert_eq!(tokens["shape"]["radius"], ROUNDED_RADIUS);
    }

    #[test]
    fn test_nav_phrase_parsing() {
        let state = two_page_state();
        let set = DeltaPlanner::new(
            &state,
            &["nav"],
            Some("navigation top-right with hover dropdowns closed by default"),
        )
        .plan();
        assert_eq!(set.len(), 1);
        let payload = set.operations()[0].payload();
        assert_eq!(payload["location"], "top-right");
        assert_eq!(payload["dropdown"], "hover");
        assert_eq!(payload["default"], "closed");
    }

    #[test]
    fn test_nav_falls_back_to_current_layout() {
        let mut state = two_page_state();
        state.nav.layout.location = Some("footer".to_string());
        state.nav.layout.dropdown = Some("click".to_string());
        let set = DeltaPlanner::new(&state, &["nav"], Some("keep it open")).plan();
        let payload = set.operations()[0].payload();
        assert_eq!(payload["location"], "footer");
        assert_eq!(payload["dropdown"], "click");
        assert_eq!(payload["default"], "open");
    }

    #[test]
    fn test_content_covers_every_block() {
        let state = two_page_state();
        let set = DeltaPlanner::new(
            &state,
            &["content"],
            Some("Make all service descriptions 30% longer and add a call-to-action at the end"),
        )
        .plan();

        assert_eq!(set.len(), state.block_count());
        assert!(!set.touches(Scope::Css));
        assert!(!set.touches(Scope::Nav));
        for rewrite in set.operations() {
            assert_eq!(rewrite.payload()["length"], "longer");
            assert_eq!(rewrite.payload()["call_to_action"], true);
            assert!(rewrite.block_id().is_some());
        }
    }

    #[test]
    fn test_cta_requires_whole_word() {
        let state = two_page_state();
        let set = DeltaPlanner::new(&state, &["content"], Some("fix the tactics")).plan();
        assert_eq!(set.operations()[0].payload()["call_to_action"], false);
        let set = DeltaPlanner::new(&state, &["content"], Some("add a CTA")).plan();
        assert_eq!(set.operations()[0].payload()["call_to_action"], true);
    }

    #[test]
    fn test_keywords_are_stripped_and_deduplicated() {
        assert_eq!(
            extract_keywords("Modern, modern physio; Zurich! clinic: therapy."),
            vec!["modern", "physio", "zurich", "clinic", "therapy"]
        );
    }

    #[test]
    fn test_head_policy_and_favicon() {
        let state = two_page_state();
        let set = DeltaPlanner::new(
            &state,
            &["head"],
            Some("brand first titles, Favicon : /static/icon.png"),
        )
        .plan();
        let payload = set.operations()[0].payload();
        assert_eq!(payload["title_policy"], "brand_first");
        assert_eq!(payload["favicon"], "/static/icon.png");

        let set = DeltaPlanner::new(&state, &["head"], None).plan();
        assert_eq!(set.operations()[0].payload()["title_policy"], "site_first");
        assert!(set.operations()[0].payload()["favicon"].is_null());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let state = two_page_state();
        let prompt = Some("blue theme, longer copy, seo refresh, footer nav");
        let a = DeltaPlanner::new(&state, &["all"], prompt).plan();
        let b = DeltaPlanner::new(&state, &["all"], prompt).plan();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.targets().len(), Scope::ALL.len());
        assert!(a.touches(Scope::Images));
        assert!(a.touches(Scope::Logo));
    }
}

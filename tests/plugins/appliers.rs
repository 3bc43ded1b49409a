use postedit::plugins::content::{CALL_TO_ACTION_TEXT, EXTENSION_SENTENCE};
use postedit::plugins::llm::{LlmError, LlmService, OfflineLlm, ScriptedLlm};
use postedit::plugins::{ApplierRegistry, ApplyContext};
use postedit::site::changeset::Scope;
use postedit::site::model::{HeadLink, NavItem, SiteBlock, SitePage, SiteState};
use postedit::site::planner::DeltaPlanner;
use postedit::site::state_store::StateStore;
use serde_json::json;
use tempfile::{TempDir, tempdir};

fn site() -> SiteState {
    let mut state = SiteState::default();
    state.head.title = "Physio Zurich".to_string();
    state.head.brand = Some("PhysioHeld".to_string());
    state.nav.items = vec![NavItem::new("Home", "index.html")];
    state.pages = vec![
        SitePage::new("/", "Home").with_block(SiteBlock::new("hero", "We help you move.")),
        SitePage::new("/services", "Services").with_block(SiteBlock::new("svc", "Manual therapy.")),
    ];
    state
}

fn open_store() -> (TempDir, StateStore) {
    let tmp = tempdir().unwrap();
    let store = StateStore::open(tmp.path().join("state.db")).unwrap();
    (tmp, store)
}

fn context<'a>(prompt: &'a str, store: &'a StateStore, llm: &'a dyn LlmService) -> ApplyContext<'a> {
    ApplyContext {
        prompt,
        store,
        llm,
        provider: "openai",
        model: "gpt-4.1-mini",
        design_directives: None,
    }
}

/// Plan `scope` for `prompt` and run that scope's applier on `state`.
fn apply(
    state: &mut SiteState,
    scope: Scope,
    prompt: &str,
    store: &StateStore,
    llm: &dyn LlmService,
) -> serde_json::Map<String, serde_json::Value> {
    let change_set = DeltaPlanner::new(state, &[scope.as_str()], Some(prompt)).plan();
    let registry = ApplierRegistry::standard();
    let applier = registry.get(scope).unwrap();
    applier
        .apply(state, &change_set.operations_for(scope), &context(prompt, store, llm))
        .unwrap()
}

#[test]
fn test_css_applier_updates_tokens_and_bundle() {
    let (_tmp, store) = open_store();
    let llm = OfflineLlm::new("openai");
    let mut state = site();

    let summary = apply(&mut state, Scope::Css, "Navy and white, pill buttons", &store, &llm);
    assert_eq!(summary["tokens_updated"], 4);
    assert_eq!(summary["llm"], "fallback");
    assert_eq!(state.theme.tokens.palette["primary"], "navy");
    assert_eq!(state.theme.tokens.palette["accent"], "white");
    assert_eq!(state.theme.tokens.shape["radius"], "999px");
    assert_eq!(state.css_bundle.tokens, state.theme.tokens);
    assert!(state.css_bundle.raw.contains("--color-primary: navy;"));

    let traces = store.list_traces(10).unwrap();
    assert_eq!(traces.len(), 1);
    assert!(traces[0].response_trunc.starts_with("error:"));
}

#[test]
fn test_css_applier_appends_design_directives_to_hints() {
    let (_tmp, store) = open_store();
    let llm = ScriptedLlm::new("openai");
    llm.push_text(".btn-primary { letter-spacing: 0.02em; }");
    let mut state = site();

    let change_set = DeltaPlanner::new(&state, &["css"], Some("calm")).plan();
    let ctx = ApplyContext {
        design_directives: Some("high contrast"),
        ..context("calm", &store, &llm)
    };
    let registry = ApplierRegistry::standard();
    let summary = registry
        .get(Scope::Css)
        .unwrap()
        .apply(&mut state, &change_set.operations_for(Scope::Css), &ctx)
        .unwrap();

    assert_eq!(summary["llm"], "ok");
    assert!(state.css_bundle.raw.starts_with("/* style intent: calm; high contrast */"));
    assert!(state.css_bundle.raw.contains("letter-spacing: 0.02em"));
    assert!(llm.calls()[0][1].content.contains("calm; high contrast"));
}

#[test]
fn test_nav_applier_renders_layout_classes() {
    let (_tmp, store) = open_store();
    let llm = OfflineLlm::new("openai");
    let mut state = site();

    let summary = apply(&mut state, Scope::Nav, "nav on the left, click to open", &store, &llm);
    assert_eq!(summary["layout"]["location"], "side-left");
    assert_eq!(summary["items"], 1);
    assert!(state.nav.html.starts_with("<nav class=\"nav nav-side-left dropdown-click dropdown-open\">"));
    assert!(store.list_traces(10).unwrap().is_empty());
}

#[test]
fn test_content_applier_prefers_model_text() {
    let (_tmp, store) = open_store();
    let llm = ScriptedLlm::new("openai");
    llm.push_text("  We help you move again, step by step.  ")
        .push_failure(LlmError::Unavailable("timeout".to_string()));
    let mut state = site();

    let summary = apply(&mut state, Scope::Content, "longer please, with a CTA", &store, &llm);
    assert_eq!(summary["blocks_rewritten"], 2);
    assert_eq!(summary["fallback_used"], 1);
    assert_eq!(summary["cta_added"], 2);
    assert!(summary.get("missing_targets").is_none());

    let home = &state.pages[0].blocks[0];
    assert_eq!(home.text, "We help you move again, step by step.");
    assert_eq!(home.meta["call_to_action"], CALL_TO_ACTION_TEXT);
    let services = &state.pages[1].blocks[0];
    assert_eq!(services.text, format!("Manual therapy. {}", EXTENSION_SENTENCE));

    assert_eq!(llm.remaining(), 0);
    assert_eq!(store.list_traces(10).unwrap().len(), 2);
}

#[test]
fn test_content_applier_reports_missing_blocks() {
    let (_tmp, store) = open_store();
    let llm = OfflineLlm::new("openai");
    let mut state = site();
    let change_set = DeltaPlanner::new(&state, &["content"], Some("shorter")).plan();
    state.pages[1].blocks.clear();

    let registry = ApplierRegistry::standard();
    let summary = registry
        .get(Scope::Content)
        .unwrap()
        .apply(
            &mut state,
            &change_set.operations_for(Scope::Content),
            &context("shorter", &store, &llm),
        )
        .unwrap();
    assert_eq!(summary["missing_targets"], 1);
    assert_eq!(summary["blocks_rewritten"], 0);
    assert_eq!(state.pages[0].blocks[0].text, "We help you move.");
}

#[test]
fn test_seo_applier_rejects_empty_model_description() {
    let (_tmp, store) = open_store();
    let llm = ScriptedLlm::new("openai");
    llm.push_json(json!({"description": "   "}))
        .push_json(json!({"summary": "wrong shape"}));
    let mut state = site();

    let summary = apply(&mut state, Scope::Seo, "Sports physiotherapy", &store, &llm);
    assert_eq!(summary["meta_updated"], 2);
    assert_eq!(
        state.seo.meta["/"].description,
        "Sports physiotherapy - tailored for Home page."
    );
    assert_eq!(state.seo.meta["/services"].keywords, vec!["sports", "physiotherapy"]);
}

#[test]
fn test_head_applier_applies_brand_and_favicon() {
    let (_tmp, store) = open_store();
    let llm = OfflineLlm::new("openai");
    let mut state = site();
    state.head.links.push(HeadLink {
        rel: "icon".to_string(),
        href: "/favicon.ico".to_string(),
    });

    let prompt = "brand first please, favicon: /img/icon.png";
    let summary = apply(&mut state, Scope::Head, prompt, &store, &llm);
    assert_eq!(summary["patched"], 1);
    assert_eq!(summary["title_updates"], 1);
    assert_eq!(summary["favicon_updates"], 1);
    assert_eq!(state.head.title, "PhysioHeld | Physio Zurich");
    assert_eq!(state.head.links.len(), 1);
    assert_eq!(state.head.links[0].href, "/img/icon.png");

    let again = apply(&mut state, Scope::Head, prompt, &store, &llm);
    assert_eq!(again["patched"], 0);
    assert_eq!(state.head.title, "PhysioHeld | Physio Zurich");
}

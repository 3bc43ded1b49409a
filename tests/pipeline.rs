use postedit::core::config::PostEditConfig;
use postedit::plugins::content::EXTENSION_SENTENCE;
use postedit::plugins::llm::{LlmError, ScriptedLlm};
use postedit::site::pipeline::{OutcomeStatus, PostEditPipeline};
use postedit::site::state_store::DEFAULT_STATE_KEY;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn test_config(root: &Path) -> PostEditConfig {
    PostEditConfig {
        sandbox_dir: root.join("sandbox"),
        domain: "physioheld.ch".to_string(),
        ..PostEditConfig::default()
    }
}

fn seeded_pipeline(root: &Path) -> PostEditPipeline {
    let pipeline = PostEditPipeline::open(test_config(root)).unwrap();
    pipeline
        .seed_pages(&["/".to_string(), "/services".to_string()])
        .unwrap();
    pipeline
}

fn read(dir: &str, file: &str) -> String {
    fs::read_to_string(PathBuf::from(dir).join(file)).unwrap()
}

#[test]
fn test_css_edit_end_to_end() {
    let tmp = tempdir().unwrap();
    let pipeline = seeded_pipeline(tmp.path());

    let outcome = pipeline
        .run(&["css"], Some("Make it blue with rounded buttons"))
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Applied);
    assert_eq!(outcome.change_set.targets(), ["css"]);
    assert_eq!(outcome.change_set_hash.len(), 64);

    let build = outcome.build.expect("build report");
    assert!(build.changed_files.contains(&"assets/css/main.css".to_string()));
    assert!(build.changed_files.contains(&"index.html".to_string()));
    assert!(build.changed_files.contains(&"services.html".to_string()));

    let css = read(&build.output_dir, "assets/css/main.css");
    assert!(css.contains("--color-primary: blue;"));
    assert!(css.contains("--radius-base: 1.25rem;"));
    assert!(css.starts_with("/* style intent: Make it blue with rounded buttons */"));

    let preview = outcome.preview.expect("preview info");
    assert!(Path::new(&preview.path).is_file());

    let state = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    assert_eq!(state.theme.tokens.palette["primary"], "blue");
    assert_eq!(state.build.latest_dist.as_deref(), Some(build.output_dir.as_str()));
    assert_eq!(state.build.history.len(), 1);

    let edits = pipeline.store().list_edits().unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].scope, "css");
    assert_eq!(edits[0].change_set_hash, outcome.change_set_hash);
    assert_eq!(edits[0].diff_stats["change_set_hash"], outcome.change_set_hash);
    assert_eq!(edits[0].diff_stats["results"]["css"]["llm"], "fallback");
    assert_eq!(edits[0].llm_meta["provider"], "openai");

    let kinds: Vec<String> = pipeline
        .store()
        .list_artifacts()
        .unwrap()
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(kinds, vec!["build", "preview"]);
}

#[test]
fn test_repeated_request_is_applied_once() {
    let tmp = tempdir().unwrap();
    let pipeline = seeded_pipeline(tmp.path());
    let prompt = Some("Make it blue with rounded buttons");

    let first = pipeline.run(&["css", "nav"], prompt).unwrap();
    assert_eq!(first.status, OutcomeStatus::Applied);
    let state_after_first = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    let builds_after_first = pipeline.sandbox().list_builds().unwrap();

    let second = pipeline.run(&["nav", "css"], prompt).unwrap();
    assert_eq!(second.status, OutcomeStatus::Duplicate);
    assert_eq!(second.change_set_hash, first.change_set_hash);
    assert_eq!(
        second.preview.as_ref().map(|p| p.path.as_str()),
        first.preview.as_ref().map(|p| p.path.as_str())
    );

    assert_eq!(pipeline.store().list_edits().unwrap().len(), 1);
    assert_eq!(pipeline.store().list_previews().unwrap().len(), 1);
    assert_eq!(pipeline.sandbox().list_builds().unwrap(), builds_after_first);

    let state_after_second = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    for (before, after) in state_after_first
        .pages
        .iter()
        .zip(state_after_second.pages.iter())
    {
        assert!(before.content_hash.is_some());
        assert_eq!(before.content_hash, after.content_hash);
    }
}

#[test]
fn test_content_edit_extends_text_and_adds_call_to_action() {
    let tmp = tempdir().unwrap();
    let pipeline = seeded_pipeline(tmp.path());

    let outcome = pipeline
        .run(&["content"], Some("Make the copy longer and add a CTA"))
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Applied);
    assert_eq!(outcome.change_set.len(), 2);

    let build = outcome.build.unwrap();
    for page in ["index.html", "services.html"] {
        let html = read(&build.output_dir, page);
        assert!(html.contains("call-to-action"), "{} lacks a CTA", page);
        assert!(html.contains(EXTENSION_SENTENCE));
    }

    let state = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    let services = state.find_page("/services").unwrap();
    assert_eq!(
        services.blocks[0].text,
        format!("Services at a glance. {}", EXTENSION_SENTENCE)
    );
}

#[test]
fn test_nav_edit_moves_navigation() {
    let tmp = tempdir().unwrap();
    let pipeline = seeded_pipeline(tmp.path());

    let outcome = pipeline
        .run(&["nav"], Some("Move the navigation to the top right, open on click"))
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Applied);

    let state = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    assert_eq!(state.nav.layout.location.as_deref(), Some("top-right"));
    assert_eq!(state.nav.layout.dropdown.as_deref(), Some("click"));
    assert_eq!(state.nav.layout.default.as_deref(), Some("open"));
    assert!(state.nav.html.contains("nav-top-right"));

    let html = read(&outcome.build.unwrap().output_dir, "services.html");
    assert!(html.contains("nav-top-right"));
    assert!(html.contains("href=\"services.html\""));
}

#[test]
fn test_css_edit_after_nav_edit_keeps_pages_byte_identical() {
    let tmp = tempdir().unwrap();
    let pipeline = seeded_pipeline(tmp.path());

    let nav = pipeline
        .run(&["nav"], Some("Navigation top right"))
        .unwrap()
        .build
        .unwrap();
    let css = pipeline
        .run(&["css"], Some("Switch to a teal palette"))
        .unwrap()
        .build
        .unwrap();

    assert_ne!(nav.output_dir, css.output_dir);
    assert_eq!(css.changed_files, vec!["assets/css/main.css".to_string()]);
    assert_eq!(
        css.unchanged_files,
        vec!["index.html".to_string(), "services.html".to_string()]
    );
    for page in ["index.html", "services.html"] {
        assert_eq!(
            fs::read(PathBuf::from(&nav.output_dir).join(page)).unwrap(),
            fs::read(PathBuf::from(&css.output_dir).join(page)).unwrap()
        );
    }
    assert_ne!(
        read(&nav.output_dir, "assets/css/main.css"),
        read(&css.output_dir, "assets/css/main.css")
    );

    let state = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    assert_eq!(state.build.history.len(), 2);

    let preview = pipeline.store().latest_preview().unwrap().unwrap();
    assert_eq!(preview.old_dir.as_deref(), Some(nav.output_dir.as_str()));
    let report = fs::read_to_string(&preview.index_path).unwrap();
    assert!(report.contains("<h2>assets/css/main.css</h2>"));
    assert!(!report.contains("<h2>index.html</h2>"));
}

#[test]
fn test_empty_store_is_bootstrapped() {
    let tmp = tempdir().unwrap();
    let pipeline = PostEditPipeline::open(test_config(tmp.path())).unwrap();

    let outcome = pipeline.run(&["head"], None).unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Applied);

    let state = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    assert_eq!(state.page_keys(), vec!["/".to_string()]);
    assert_eq!(state.head.title, "Renewed physioheld.ch");
    assert_eq!(state.nav.items[0].href, "index.html");

    let html = read(&outcome.build.unwrap().output_dir, "index.html");
    assert!(html.contains("<title>Renewed physioheld.ch</title>"));
}

#[test]
fn test_unknown_scope_plans_every_scope() {
    let tmp = tempdir().unwrap();
    let pipeline = seeded_pipeline(tmp.path());

    let outcome = pipeline.run(&["colours"], Some("blue")).unwrap();
    assert_eq!(
        outcome.change_set.targets(),
        ["css", "seo", "images", "logo", "content", "nav", "head"]
    );
    let edits = pipeline.store().list_edits().unwrap();
    assert_eq!(edits[0].scope, "css,seo,images,logo,content,nav,head");
}

#[test]
fn test_scripted_model_replies_are_used_and_traced() {
    let tmp = tempdir().unwrap();
    let llm = ScriptedLlm::new("openai");
    llm.push_json(json!({"description": "Physiotherapy in Zurich, without the wait."}))
        .push_failure(LlmError::Provider("rate limited".to_string()));

    let pipeline = PostEditPipeline::with_llm(test_config(tmp.path()), Box::new(llm)).unwrap();
    pipeline
        .seed_pages(&["/".to_string(), "/services".to_string()])
        .unwrap();

    let outcome = pipeline
        .run(&["seo"], Some("Modern physiotherapy in Zurich"))
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Applied);

    let state = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    assert_eq!(
        state.seo.meta["/"].description,
        "Physiotherapy in Zurich, without the wait."
    );
    assert_eq!(
        state.seo.meta["/services"].description,
        "Modern physiotherapy in Zurich - tailored for Services page."
    );
    assert_eq!(
        state.seo.meta["/"].keywords,
        vec!["modern", "physiotherapy", "zurich"]
    );

    let traces = pipeline.store().list_traces(10).unwrap();
    assert_eq!(traces.len(), 2);
    assert!(traces[0].response_trunc.starts_with("error:"));
    assert!(traces[1].response_trunc.contains("without the wait"));
    assert_eq!(traces[1].model, "gpt-4.1-mini");

    let html = read(&outcome.build.unwrap().output_dir, "index.html");
    assert!(html.contains("content=\"Physiotherapy in Zurich, without the wait.\""));
}

#[test]
fn test_scripted_css_rules_are_appended_to_bundle() {
    let tmp = tempdir().unwrap();
    let llm = ScriptedLlm::new("openai");
    llm.push_text("```css\n.hero { padding: 4rem 0; }\n```");

    let pipeline = PostEditPipeline::with_llm(test_config(tmp.path()), Box::new(llm)).unwrap();
    let outcome = pipeline.run(&["css"], Some("More breathing room")).unwrap();

    let css = read(&outcome.build.unwrap().output_dir, "assets/css/main.css");
    assert!(css.trim_end().ends_with(".hero { padding: 4rem 0; }"));
    assert!(!css.contains("```"));

    let edits = pipeline.store().list_edits().unwrap();
    assert_eq!(edits[0].diff_stats["results"]["css"]["llm"], "ok");
}

#[test]
fn test_pages_seeded_after_nav_edit_join_the_navigation() {
    let tmp = tempdir().unwrap();
    let pipeline = seeded_pipeline(tmp.path());
    pipeline.run(&["nav"], Some("Navigation top right")).unwrap();

    let state = pipeline.seed_pages(&["/about".to_string()]).unwrap();
    assert!(state.nav.html.contains("nav-top-right"));
    assert!(state.nav.html.contains("href=\"about.html\""));

    let build = pipeline.run(&["head"], None).unwrap().build.unwrap();
    for page in ["index.html", "services.html", "about.html"] {
        let html = read(&build.output_dir, page);
        assert!(html.contains("href=\"about.html\""), "{} lacks the about link", page);
        assert!(html.contains("nav-top-right"));
    }
}

#[test]
fn test_css_edit_leaves_other_sections_untouched() {
    let tmp = tempdir().unwrap();
    let pipeline = seeded_pipeline(tmp.path());
    let before = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();

    let outcome = pipeline
        .run(
            &["css"],
            Some("Blue theme, nav top right, longer copy with a CTA, brand first"),
        )
        .unwrap();
    assert_eq!(outcome.status, OutcomeStatus::Applied);
    assert_eq!(outcome.change_set.targets(), ["css"]);

    let after = pipeline.store().load_site_state(DEFAULT_STATE_KEY).unwrap();
    assert_ne!(after.theme, before.theme);
    assert_eq!(after.nav, before.nav);
    assert_eq!(after.seo, before.seo);
    assert_eq!(after.head, before.head);
    assert_eq!(after.pages.len(), before.pages.len());
    for (old, new) in before.pages.iter().zip(after.pages.iter()) {
        assert_eq!(old.title, new.title);
        assert_eq!(old.blocks, new.blocks);
    }
}

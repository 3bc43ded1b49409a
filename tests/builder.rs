use postedit::core::sandbox::Sandbox;
use postedit::site::builder::IncrementalBuilder;
use postedit::site::changeset::{ChangeOperation, ChangeSet, op};
use postedit::site::model::{SiteBlock, SitePage, SiteState};
use postedit::site::preview::PreviewGenerator;
use postedit::site::render::STYLESHEET_PATH;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn site() -> SiteState {
    let mut state = SiteState::default();
    state.head.title = "PhysioHeld".to_string();
    state.pages = vec![
        SitePage::new("/", "Home").with_block(SiteBlock::new("hero", "Welcome")),
        SitePage::new("/services", "Services").with_block(SiteBlock::new("svc", "Therapy")),
        SitePage::new("/team/about", "About").with_block(SiteBlock::new("bio", "Since 2009")),
    ];
    state
}

fn content_edit(page: &str, block: &str) -> ChangeSet {
    ChangeSet::new(
        vec!["content".to_string()],
        vec![
            ChangeOperation::new(op::CONTENT_REWRITE, json!({"length": "default"}))
                .for_page(page)
                .for_block(block),
        ],
    )
}

fn names(paths: &[PathBuf], root: &PathBuf) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
        .collect()
}

#[test]
fn test_first_build_renders_everything() {
    let tmp = tempdir().unwrap();
    let builder = IncrementalBuilder::new(Sandbox::open(tmp.path()).unwrap());
    let mut state = site();

    let result = builder.build(&mut state, &content_edit("/", "hero")).unwrap();
    assert_eq!(
        names(&result.changed_files, &result.output_dir),
        vec![STYLESHEET_PATH, "index.html", "services.html", "team/about.html"]
    );
    assert!(result.unchanged_files.is_empty());
    assert!(state.pages.iter().all(|p| p.content_hash.is_some()));

    let nested = fs::read_to_string(result.output_dir.join("team/about.html")).unwrap();
    assert!(nested.contains("href=\"../assets/css/main.css\""));
    let home = fs::read_to_string(result.output_dir.join("index.html")).unwrap();
    assert!(home.contains("href=\"assets/css/main.css\""));
    assert_eq!(state.pages[0].rendered.as_deref(), Some(home.as_str()));
}

#[test]
fn test_second_build_only_renders_dirty_pages() {
    let tmp = tempdir().unwrap();
    let builder = IncrementalBuilder::new(Sandbox::open(tmp.path()).unwrap());
    let mut state = site();
    let first = builder.build(&mut state, &content_edit("/", "hero")).unwrap();
    let services_hash = state.pages[1].content_hash.clone();

    state.pages[1].blocks[0].text = "Manual therapy".to_string();
    let second = builder
        .build(&mut state, &content_edit("/services", "svc"))
        .unwrap();

    assert_ne!(first.output_dir, second.output_dir);
    assert_eq!(
        names(&second.changed_files, &second.output_dir),
        vec!["services.html"]
    );
    assert_eq!(
        names(&second.unchanged_files, &second.output_dir),
        vec![STYLESHEET_PATH, "index.html", "team/about.html"]
    );
    assert_ne!(state.pages[1].content_hash, services_hash);

    for page in ["index.html", "team/about.html", STYLESHEET_PATH] {
        assert_eq!(
            fs::read(first.output_dir.join(page)).unwrap(),
            fs::read(second.output_dir.join(page)).unwrap(),
            "{} changed",
            page
        );
    }

    assert_eq!(state.build.history.len(), 2);
    assert_eq!(
        state.build.latest_dist.as_deref(),
        Some(second.output_dir.to_string_lossy().as_ref())
    );
}

#[test]
fn test_head_edit_dirties_every_page() {
    let tmp = tempdir().unwrap();
    let builder = IncrementalBuilder::new(Sandbox::open(tmp.path()).unwrap());
    let mut state = site();
    builder.build(&mut state, &content_edit("/", "hero")).unwrap();

    state.head.title = "PhysioHeld Zurich".to_string();
    let head = ChangeSet::new(
        vec!["head".to_string()],
        vec![ChangeOperation::new(op::HEAD_PATCH, json!({"title_policy": "site_first"}))],
    );
    let result = builder.build(&mut state, &head).unwrap();
    assert_eq!(
        names(&result.unchanged_files, &result.output_dir),
        vec![STYLESHEET_PATH]
    );
    assert_eq!(result.changed_files.len(), 3);
}

#[test]
fn test_missing_previous_build_falls_back_to_render() {
    let tmp = tempdir().unwrap();
    let builder = IncrementalBuilder::new(Sandbox::open(tmp.path()).unwrap());
    let mut state = site();
    state.build.latest_dist = Some(tmp.path().join("gone").to_string_lossy().to_string());

    let result = builder.build(&mut state, &content_edit("/", "hero")).unwrap();
    assert_eq!(result.changed_files.len(), 4);
}

#[test]
fn test_preview_between_builds_lists_only_changed_files() {
    let tmp = tempdir().unwrap();
    let sandbox = Sandbox::open(tmp.path()).unwrap();
    let builder = IncrementalBuilder::new(sandbox.clone());
    let mut state = site();
    let first = builder.build(&mut state, &content_edit("/", "hero")).unwrap();

    state.pages[0].blocks[0].text = "Welcome back".to_string();
    let second = builder.build(&mut state, &content_edit("/", "hero")).unwrap();

    let preview = PreviewGenerator::new(sandbox)
        .generate(Some(&first.output_dir), &second.output_dir)
        .unwrap();
    let report = fs::read_to_string(&preview.index_path).unwrap();
    assert!(report.contains("<h2>index.html</h2>"));
    assert!(!report.contains("<h2>services.html</h2>"));
    assert!(report.contains("Welcome back"));
    assert!(report.contains("class=\"del\""));
    assert!(report.contains("class=\"add\""));
}

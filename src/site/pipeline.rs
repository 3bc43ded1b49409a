//! Orchestration of one edit request.
//!
//! ```text
//! Init → Planned → Skipped
//!              └→ Applied → Built → Previewed → Persisted → Done
//! ```
//!
//! Nothing is persisted unless every stage up to `Previewed` succeeded. A
//! change set whose hash is already in the ledger, or that has no
//! operations, ends in `Skipped` without touching the store or the disk.

use crate::core::config::PostEditConfig;
use crate::core::error::PostEditError;
use crate::core::sandbox::Sandbox;
use crate::plugins::llm::{LlmService, OfflineLlm};
use crate::plugins::{ApplierRegistry, ApplyContext, ApplySummary};
use crate::site::builder::IncrementalBuilder;
use crate::site::changeset::ChangeSet;
use crate::site::model::{NavItem, SiteBlock, SiteState};
use crate::site::planner::DeltaPlanner;
use crate::site::preview::PreviewGenerator;
use crate::site::state_store::{DEFAULT_STATE_KEY, EditCommit, StateStore};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::path::PathBuf;

pub const HOME_BLOCK_ID: &str = "hero";
pub const HOME_BLOCK_TEXT: &str = "Welcome to the renewed site";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Planned,
    Skipped,
    Applied,
    Built,
    Previewed,
    Persisted,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Init => "init",
            PipelineStage::Planned => "planned",
            PipelineStage::Skipped => "skipped",
            PipelineStage::Applied => "applied",
            PipelineStage::Built => "built",
            PipelineStage::Previewed => "previewed",
            PipelineStage::Persisted => "persisted",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Applied,
    /// The plan produced no operations
    NoChanges,
    /// The change set hash is already in the ledger
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewInfo {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub output_dir: String,
    pub changed_files: Vec<String>,
    pub unchanged_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub status: OutcomeStatus,
    pub change_set: ChangeSet,
    pub change_set_hash: String,
    pub preview: Option<PreviewInfo>,
    pub build: Option<BuildReport>,
}

pub struct PostEditPipeline {
    config: PostEditConfig,
    sandbox: Sandbox,
    store: StateStore,
    llm: Box<dyn LlmService>,
    registry: ApplierRegistry,
}

fn enter(stage: PipelineStage) {
    tracing::info!(stage = %stage, "pipeline stage");
}

impl PostEditPipeline {
    /// Open the sandbox and state store named by `config`, with no model
    /// client (every applier uses its local fallback).
    pub fn open(config: PostEditConfig) -> Result<Self, PostEditError> {
        let llm = Box::new(OfflineLlm::new(config.llm_provider.clone()));
        Self::with_llm(config, llm)
    }

    pub fn with_llm(
        config: PostEditConfig,
        llm: Box<dyn LlmService>,
    ) -> Result<Self, PostEditError> {
        let sandbox = Sandbox::open(config.sandbox_dir.clone())?;
        let store = StateStore::open(sandbox.state_db_path())?;
        Ok(Self {
            config,
            sandbox,
            store,
            llm,
            registry: ApplierRegistry::standard(),
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn config(&self) -> &PostEditConfig {
        &self.config
    }

    /// Give an empty document a home page, a nav entry and a title.
    pub fn bootstrap(&self, state: &mut SiteState) {
        tracing::info!(domain = %self.config.domain, "bootstrapping empty site state");
        let home = state.ensure_page("/", Some("/"), Some("Home"));
        if home.blocks.is_empty() {
            home.blocks
                .push(SiteBlock::new(HOME_BLOCK_ID, HOME_BLOCK_TEXT).with_meta("heading", "Welcome"));
        }
        if state.nav.items.is_empty() {
            state.nav.items.push(NavItem::new("Home", "index.html"));
        }
        if state.head.title.trim().is_empty() {
            state.head.title = format!("Renewed {}", self.config.domain);
        }
        if !self.config.css_framework.trim().is_empty() {
            state.css_bundle.framework = self.config.css_framework.clone();
        }
    }

    /// Add pages (one intro block each) to the stored document.
    pub fn seed_pages(&self, paths: &[String]) -> Result<SiteState, PostEditError> {
        let mut state = self.store.load_site_state(DEFAULT_STATE_KEY)?;
        if state.pages.is_empty() {
            self.bootstrap(&mut state);
        }
        let mut nav_grew = false;
        for path in paths {
            let title = seed_title(path);
            let page = state.ensure_page(path, None, Some(title.as_str()));
            if page.blocks.is_empty() {
                page.blocks.push(
                    SiteBlock::new("intro", format!("{} at a glance.", title))
                        .with_meta("heading", title.clone()),
                );
            }
            let href = crate::site::render::page_filename(page);
            if !state.nav.items.iter().any(|item| item.href == href) {
                state.nav.items.push(NavItem::new(title, href));
                nav_grew = true;
            }
        }
        // A nav edit caches its markup; keep it in step with the items.
        if nav_grew && !state.nav.html.trim().is_empty() {
            state.nav.html = crate::site::render::render_nav(&state.nav);
        }
        self.store.save_site_state(&state, DEFAULT_STATE_KEY)?;
        Ok(state)
    }

    pub fn run<S: AsRef<str>>(
        &self,
        scope: &[S],
        prompt: Option<&str>,
    ) -> Result<PipelineOutcome, PostEditError> {
        enter(PipelineStage::Init);
        let mut state = self.store.load_site_state(DEFAULT_STATE_KEY)?;
        if state.pages.is_empty() {
            self.bootstrap(&mut state);
        }

        let change_set = DeltaPlanner::new(&state, scope, prompt).plan();
        let hash = change_set.hash();
        tracing::info!(
            stage = %PipelineStage::Planned,
            hash = %hash,
            targets = ?change_set.targets(),
            operations = change_set.len(),
            "change set planned"
        );

        let skip = if change_set.is_empty() {
            Some(OutcomeStatus::NoChanges)
        } else if self.store.has_change_set(&hash)? {
            Some(OutcomeStatus::Duplicate)
        } else {
            None
        };
        if let Some(status) = skip {
            tracing::info!(stage = %PipelineStage::Skipped, hash = %hash, reason = ?status, "nothing to apply");
            return self.skipped(status, change_set, hash, &state);
        }

        let results = self.apply(&mut state, &change_set, prompt.unwrap_or_default())?;
        enter(PipelineStage::Applied);

        let previous_dir = state.build.latest_dist.clone().map(PathBuf::from);
        let build = IncrementalBuilder::new(self.sandbox.clone()).build(&mut state, &change_set)?;
        tracing::info!(
            stage = %PipelineStage::Built,
            output_dir = %build.output_dir.display(),
            changed = build.changed_files.len(),
            reused = build.unchanged_files.len(),
            "build complete"
        );

        let preview = PreviewGenerator::new(self.sandbox.clone())
            .generate(previous_dir.as_deref(), &build.output_dir)?;
        tracing::info!(
            stage = %PipelineStage::Previewed,
            preview_id = %preview.preview_id,
            index = %preview.index_path.display(),
            "preview ready"
        );

        let changed_files = build.relative(&build.changed_files);
        let unchanged_files = build.relative(&build.unchanged_files);
        let diff_stats = json!({
            "changed_files": changed_files,
            "unchanged_files": unchanged_files,
            "operations": change_set.len(),
            "results": results,
            "change_set_hash": hash,
        });
        let llm_meta = json!({
            "provider": self.config.llm_provider,
            "model": self.config.resolved_model(),
        });

        let scope_label = change_set.targets().join(",");
        let persisted = self.store.commit_edit(EditCommit {
            state_key: DEFAULT_STATE_KEY,
            state: &state,
            scope: &scope_label,
            prompt,
            change_set: &change_set,
            diff_stats,
            llm_meta,
            old_dir: previous_dir.as_deref(),
            new_dir: &build.output_dir,
            index_path: &preview.index_path,
        });
        if let Err(err) = persisted {
            tracing::error!(
                build_dir = %build.output_dir.display(),
                preview = %preview.index_path.display(),
                error = %err,
                "persisting the edit failed; build and preview directories are left in place"
            );
            return Err(err);
        }
        enter(PipelineStage::Persisted);

        enter(PipelineStage::Done);
        Ok(PipelineOutcome {
            status: OutcomeStatus::Applied,
            change_set,
            change_set_hash: hash,
            preview: Some(PreviewInfo {
                id: preview.preview_id,
                path: preview.index_path.to_string_lossy().to_string(),
            }),
            build: Some(BuildReport {
                output_dir: build.output_dir.to_string_lossy().to_string(),
                changed_files,
                unchanged_files,
            }),
        })
    }

    fn apply(
        &self,
        state: &mut SiteState,
        change_set: &ChangeSet,
        prompt: &str,
    ) -> Result<serde_json::Map<String, JsonValue>, PostEditError> {
        let model = self.config.resolved_model();
        let ctx = ApplyContext {
            prompt,
            store: &self.store,
            llm: &*self.llm,
            provider: &self.config.llm_provider,
            model: &model,
            design_directives: self.config.design_directives.as_deref(),
        };

        let mut results = serde_json::Map::new();
        for applier in self.registry.ordered() {
            let operations = change_set.operations_for(applier.scope());
            if operations.is_empty() {
                continue;
            }
            let summary: ApplySummary = applier.apply(state, &operations, &ctx)?;
            tracing::debug!(scope = %applier.scope(), operations = operations.len(), "applier finished");
            results.insert(applier.scope().to_string(), JsonValue::Object(summary));
        }
        Ok(results)
    }

    fn skipped(
        &self,
        status: OutcomeStatus,
        change_set: ChangeSet,
        hash: String,
        state: &SiteState,
    ) -> Result<PipelineOutcome, PostEditError> {
        let preview = self.store.latest_preview()?.map(|p| PreviewInfo {
            id: p.id,
            path: p.index_path,
        });
        let build = state.build.latest_dist.as_ref().map(|dir| BuildReport {
            output_dir: dir.clone(),
            changed_files: Vec::new(),
            unchanged_files: Vec::new(),
        });
        enter(PipelineStage::Done);
        Ok(PipelineOutcome {
            status,
            change_set,
            change_set_hash: hash,
            preview,
            build,
        })
    }
}

/// `/physio-therapy` → `Physio Therapy`.
fn seed_title(path: &str) -> String {
    let slug = path
        .trim_matches('/')
        .trim_end_matches(".html")
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if slug.is_empty() {
        return "Home".to_string();
    }
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

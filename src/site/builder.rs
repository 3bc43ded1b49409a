//! Incremental static build.
//!
//! Each build writes a fresh `newsite-<timestamp>` directory. Pages touched
//! by the change set are re-rendered; every other page is copied verbatim
//! from the previous build, so untouched files stay byte-identical.

use crate::core::error::PostEditError;
use crate::core::sandbox::Sandbox;
use crate::core::time;
use crate::site::changeset::{ChangeSet, sha256_hex};
use crate::site::model::{BuildHistoryEntry, SiteState};
use crate::site::render::{self, STYLESHEET_PATH};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct BuildResult {
    pub output_dir: PathBuf,
    pub changed_files: Vec<PathBuf>,
    pub unchanged_files: Vec<PathBuf>,
    pub css_path: Option<PathBuf>,
}

impl BuildResult {
    /// `paths` relative to the output directory, as display strings.
    pub fn relative(&self, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| {
                p.strip_prefix(&self.output_dir)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }
}

enum Stylesheet {
    /// Copied unchanged from the previous build
    Reused(PathBuf),
    Written(PathBuf),
    Absent,
}

pub struct IncrementalBuilder {
    sandbox: Sandbox,
}

impl IncrementalBuilder {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn build(
        &self,
        state: &mut SiteState,
        change_set: &ChangeSet,
    ) -> Result<BuildResult, PostEditError> {
        let stamp = time::build_stamp();
        let output_dir = self.sandbox.build_dir(&stamp);
        fs::create_dir_all(&output_dir)?;

        let previous_dir = state
            .build
            .latest_dist
            .as_deref()
            .map(PathBuf::from)
            .filter(|p| p.is_dir());

        let dirty = dirty_pages(state, change_set);
        let mut changed_files = Vec::new();
        let mut unchanged_files = Vec::new();

        let stylesheet = self.write_stylesheet(state, change_set, previous_dir.as_deref(), &output_dir)?;
        let css_path = match stylesheet {
            Stylesheet::Reused(path) => {
                unchanged_files.push(path.clone());
                Some(path)
            }
            Stylesheet::Written(path) => {
                changed_files.push(path.clone());
                Some(path)
            }
            Stylesheet::Absent => None,
        };

        for idx in 0..state.pages.len() {
            let filename = render::page_filename(&state.pages[idx]);
            let target = output_dir.join(&filename);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let page = &state.pages[idx];
            let is_dirty = dirty.contains(&page.path) || dirty.contains(&page.url);
            let previous_file = previous_dir
                .as_ref()
                .map(|dir| dir.join(&filename))
                .filter(|p| p.is_file());

            match previous_file {
                Some(previous) if !is_dirty => {
                    fs::copy(&previous, &target)?;
                    unchanged_files.push(target);
                }
                _ => {
                    let html = render::render_page(state, page);
                    let page = &mut state.pages[idx];
                    page.content_hash = Some(sha256_hex(html.as_bytes()));
                    fs::write(&target, &html)?;
                    page.rendered = Some(html);
                    changed_files.push(target);
                }
            }
        }

        let dir_str = output_dir.to_string_lossy().to_string();
        state.build.latest_dist = Some(dir_str.clone());
        state.build.history.push(BuildHistoryEntry {
            dir: dir_str,
            timestamp: stamp,
        });

        tracing::debug!(
            output_dir = %output_dir.display(),
            changed = changed_files.len(),
            reused = unchanged_files.len(),
            "build written"
        );

        Ok(BuildResult {
            output_dir,
            changed_files,
            unchanged_files,
            css_path,
        })
    }

    fn write_stylesheet(
        &self,
        state: &SiteState,
        change_set: &ChangeSet,
        previous_dir: Option<&Path>,
        output_dir: &Path,
    ) -> Result<Stylesheet, PostEditError> {
        let target = output_dir.join(STYLESHEET_PATH);
        let has_css_op = change_set
            .operations()
            .iter()
            .any(|op| op.kind().starts_with("css."));

        if !has_css_op
            && let Some(previous) = previous_dir
                .map(|dir| dir.join(STYLESHEET_PATH))
                .filter(|p| p.is_file())
        {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&previous, &target)?;
            return Ok(Stylesheet::Reused(target));
        }

        if !has_css_op && state.pages.is_empty() {
            return Ok(Stylesheet::Absent);
        }

        let css = if state.css_bundle.raw.trim().is_empty() {
            render::css_from_tokens(&state.theme.tokens)
        } else {
            state.css_bundle.raw.clone()
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, css)?;
        Ok(Stylesheet::Written(target))
    }
}

/// Page keys that must be re-rendered for `change_set`.
pub fn dirty_pages(state: &SiteState, change_set: &ChangeSet) -> BTreeSet<String> {
    let mut dirty = BTreeSet::new();
    for op in change_set.operations() {
        match op.namespace() {
            "content" | "seo" => {
                if let Some(page) = op.page() {
                    dirty.insert(page.to_string());
                }
            }
            "head" | "nav" => {
                for page in &state.pages {
                    dirty.insert(page.key().to_string());
                }
            }
            _ => {}
        }
    }
    dirty
}

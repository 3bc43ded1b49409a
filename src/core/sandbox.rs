//! Sandbox root for one deployment of the post-edit pipeline.
//!
//! Every component that touches the filesystem receives a [`Sandbox`]
//! explicitly. The layout under the root is fixed:
//!
//! - `state.db`: state store (site document, ledger, previews, traces, artifacts)
//! - `broker.events.jsonl`: database audit log
//! - `newsite-<timestamp>/`: one directory per build
//! - `preview/<uuid>/index.html`: one directory per diff report

use crate::core::error::PostEditError;
use crate::core::schemas;
use std::fs;
use std::path::{Path, PathBuf};

pub const BUILD_DIR_PREFIX: &str = "newsite-";
pub const PREVIEW_DIR_NAME: &str = "preview";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    /// Absolute or caller-relative path to the sandbox root directory
    pub root: PathBuf,
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed and return the sandbox.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PostEditError> {
        let sandbox = Self::new(root);
        fs::create_dir_all(&sandbox.root).map_err(PostEditError::IoError)?;
        Ok(sandbox)
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.root.join(schemas::STATE_DB_NAME)
    }

    pub fn preview_root(&self) -> PathBuf {
        self.root.join(PREVIEW_DIR_NAME)
    }

    /// Directory for a build started at `stamp`. If a directory with that
    /// name already exists a numeric suffix is appended.
    pub fn build_dir(&self, stamp: &str) -> PathBuf {
        let base = self.root.join(format!("{}{}", BUILD_DIR_PREFIX, stamp));
        if !base.exists() {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = self.root.join(format!("{}{}-{}", BUILD_DIR_PREFIX, stamp, n));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }

    /// All build directories currently in the sandbox, sorted by name.
    pub fn list_builds(&self) -> Result<Vec<PathBuf>, PostEditError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut builds = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(PostEditError::IoError)? {
            let entry = entry.map_err(PostEditError::IoError)?;
            let path = entry.path();
            let is_build = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BUILD_DIR_PREFIX));
            if is_build && path.is_dir() {
                builds.push(path);
            }
        }
        builds.sort();
        Ok(builds)
    }

    /// Path of `path` relative to the sandbox root, for display.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

//! HTML diff reports between two builds.
//!
//! The report is presentation only; nothing reads it back. Files are compared
//! line by line with a longest-common-subsequence diff and shown with three
//! lines of context around each change.

use crate::core::error::PostEditError;
use crate::core::sandbox::Sandbox;
use crate::site::render::escape_html;
use std::collections::BTreeSet;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONTEXT_LINES: usize = 3;

/// Largest LCS table (old lines times new lines, after trimming the common
/// prefix and suffix) built for one file. Bigger changes are shown as a
/// block of removed lines followed by a block of added lines.
pub const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewResult {
    pub preview_id: String,
    pub index_path: PathBuf,
    pub old_dir: Option<PathBuf>,
    pub new_dir: PathBuf,
}

pub struct PreviewGenerator {
    sandbox: Sandbox,
}

impl PreviewGenerator {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn generate(
        &self,
        old_dir: Option<&Path>,
        new_dir: &Path,
    ) -> Result<PreviewResult, PostEditError> {
        let preview_id = uuid::Uuid::new_v4().simple().to_string();
        let target_dir = self.sandbox.preview_root().join(&preview_id);
        fs::create_dir_all(&target_dir)?;
        let index_path = target_dir.join("index.html");

        let body = match old_dir.filter(|dir| dir.is_dir()) {
            Some(old) => diff_directories(old, new_dir)?,
            None => list_new_build(new_dir)?,
        };
        fs::write(&index_path, wrap_html(&body))?;

        Ok(PreviewResult {
            preview_id,
            index_path,
            old_dir: old_dir.map(Path::to_path_buf),
            new_dir: new_dir.to_path_buf(),
        })
    }
}

/// Every regular file under `dir`, relative and `/`-separated, sorted.
pub fn list_files(dir: &Path) -> Result<Vec<String>, PostEditError> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), PostEditError> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if path.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>, PostEditError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}

fn diff_directories(old_dir: &Path, new_dir: &Path) -> Result<String, PostEditError> {
    let all: BTreeSet<String> = list_files(old_dir)?
        .into_iter()
        .chain(list_files(new_dir)?)
        .collect();

    let mut body = String::from(
        "<h1>Preview Diff</h1>\n<p>Comparing the previous build with the new build.</p>\n",
    );
    let mut differing = 0;
    for relative in &all {
        let old_lines = read_lines(&old_dir.join(relative))?;
        let new_lines = read_lines(&new_dir.join(relative))?;
        if old_lines == new_lines {
            continue;
        }
        differing += 1;
        let _ = writeln!(body, "<h2>{}</h2>", escape_html(relative));
        body.push_str(&diff_table(&old_lines, &new_lines));
    }

    if differing == 0 {
        body.push_str("<p>No differences detected: builds are identical.</p>\n");
    }
    Ok(body)
}

fn list_new_build(new_dir: &Path) -> Result<String, PostEditError> {
    let mut body = String::from(
        "<h1>New Build</h1>\n<p>No previous build found. Listing files in the generated directory.</p>\n<ul>\n",
    );
    for relative in list_files(new_dir)? {
        let _ = writeln!(body, "  <li>{}</li>", escape_html(&relative));
    }
    body.push_str("</ul>\n");
    Ok(body)
}

fn wrap_html(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"/><title>Preview</title>\
         <style>body{{font-family:Inter,sans-serif;margin:2rem;}}table{{border-collapse:collapse;}}\
         td,th{{border:1px solid #ccc;padding:0.25rem 0.5rem;font-family:monospace;white-space:pre-wrap;}}\
         tr.del{{background:#fde8e8;}}tr.add{{background:#e6f6e6;}}tr.gap td{{text-align:center;color:#888;}}\
         </style></head>\n<body>\n{}\n</body>\n</html>\n",
        body
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine {
    /// Line numbers (0-based) in old and new
    Same(usize, usize),
    Removed(usize),
    Added(usize),
}

/// Line-level LCS diff. Common prefix and suffix are peeled off before the
/// quadratic table is built; a middle larger than [`MAX_LCS_CELLS`] is
/// reported as removed-then-added without a table.
pub fn diff_lines<T: PartialEq>(old: &[T], new: &[T]) -> Vec<DiffLine> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];
    let (n, m) = (old_mid.len(), new_mid.len());

    let mut out: Vec<DiffLine> = (0..prefix).map(|i| DiffLine::Same(i, i)).collect();
    if n.saturating_mul(m) > MAX_LCS_CELLS {
        out.extend((0..n).map(|i| DiffLine::Removed(prefix + i)));
        out.extend((0..m).map(|j| DiffLine::Added(prefix + j)));
        out.extend((0..suffix).map(|k| DiffLine::Same(old.len() - suffix + k, new.len() - suffix + k)));
        return out;
    }

    // lcs[i][j] = LCS length of old_mid[i..] and new_mid[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old_mid[i] == new_mid[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old_mid[i] == new_mid[j] {
            out.push(DiffLine::Same(prefix + i, prefix + j));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push(DiffLine::Removed(prefix + i));
            i += 1;
        } else {
            out.push(DiffLine::Added(prefix + j));
            j += 1;
        }
    }
    out.extend((i..n).map(|i| DiffLine::Removed(prefix + i)));
    out.extend((j..m).map(|j| DiffLine::Added(prefix + j)));
    out.extend((0..suffix).map(|k| DiffLine::Same(old.len() - suffix + k, new.len() - suffix + k)));
    out
}

/// Indices into `diff` that fall within `context` lines of a change.
fn visible_rows(diff: &[DiffLine], context: usize) -> Vec<bool> {
    let mut visible = vec![false; diff.len()];
    for (idx, line) in diff.iter().enumerate() {
        if !matches!(line, DiffLine::Same(..)) {
            let start = idx.saturating_sub(context);
            let end = (idx + context + 1).min(diff.len());
            visible[start..end].iter_mut().for_each(|v| *v = true);
        }
    }
    visible
}

pub fn diff_table(old: &[String], new: &[String]) -> String {
    let diff = diff_lines(old, new);
    let visible = visible_rows(&diff, CONTEXT_LINES);

    let mut html = String::from(
        "<table class=\"diff\">\n<thead><tr><th></th><th>previous</th><th></th><th>new</th></tr></thead>\n<tbody>\n",
    );
    let mut gap_open = false;
    for (line, show) in diff.iter().zip(visible) {
        if !show {
            if !gap_open {
                html.push_str("<tr class=\"gap\"><td colspan=\"4\">…</td></tr>\n");
                gap_open = true;
            }
            continue;
        }
        gap_open = false;
        let _ = match *line {
            DiffLine::Same(a, b) => writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                a + 1,
                escape_html(&old[a]),
                b + 1,
                escape_html(&new[b])
            ),
            DiffLine::Removed(a) => writeln!(
                html,
                "<tr class=\"del\"><td>{}</td><td>{}</td><td></td><td></td></tr>",
                a + 1,
                escape_html(&old[a])
            ),
            DiffLine::Added(b) => writeln!(
                html,
                "<tr class=\"add\"><td></td><td></td><td>{}</td><td>{}</td></tr>",
                b + 1,
                escape_html(&new[b])
            ),
        };
    }
    html.push_str("</tbody>\n</table>\n");
    html
}

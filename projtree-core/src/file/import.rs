use crate::file::ignore::{is_always_excluded, IgnoreMatcher, IGNORE_FILE_NAMES};
use crate::file::tree::{escapes_root, normalize_path, PathTree};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One file from a directory picker or drag-drop, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub path: String,
    pub content: String,
}

impl ImportEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Builds a tree from a flat entry list. Root-level ignore files found among
/// the entries are merged and applied; VCS metadata and the ignore files
/// themselves never make it into the tree.
pub fn import_entries(entries: Vec<ImportEntry>) -> Result<PathTree> {
    let ignore_sources: Vec<&str> = IGNORE_FILE_NAMES
        .iter()
        .filter_map(|name| {
            entries
                .iter()
                .find(|entry| normalize_path(&entry.path) == *name)
                .map(|entry| entry.content.as_str())
        })
        .collect();

    let matcher = if ignore_sources.is_empty() {
        IgnoreMatcher::empty()
    } else {
        IgnoreMatcher::new(ignore_sources).context("Failed to compile ignore rules")?
    };

    let mut tree = PathTree::new();
    let mut skipped = 0usize;
    for entry in entries.iter() {
        let path = normalize_path(&entry.path);
        if path.is_empty()
            || escapes_root(&path)
            || is_always_excluded(&path)
            || matcher.is_ignored(&path, false)
        {
            skipped += 1;
            continue;
        }
        tree.insert_file(path, entry.content.clone());
    }

    info!(
        files = tree.files.len(),
        skipped, "Imported project entries"
    );
    Ok(tree)
}

/// Reads every UTF-8 file under `root` into import entries. Files that are
/// not valid UTF-8 are skipped with a warning; the VCS directory is never
/// descended into.
pub fn read_directory(root: &Path) -> Result<Vec<ImportEntry>> {
    if !root.is_dir() {
        anyhow::bail!("Directory not found: {}", root.display());
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for result in walker {
        let entry = result.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?;
        let relative = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read file: {}", entry.path().display()))?;
        match String::from_utf8(bytes) {
            Ok(content) => entries.push(ImportEntry::new(relative, content)),
            Err(_) => warn!(path = %relative, "Skipping non UTF-8 file"),
        }
    }

    debug!(count = entries.len(), root = %root.display(), "Read directory");
    Ok(entries)
}

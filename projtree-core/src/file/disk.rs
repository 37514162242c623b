//! Writes the difference between the baseline and the live tree back to a
//! real directory.
//!
//! Deletions always run before writes. A path is removed from disk when it
//! is tombstoned or when the baseline has it and the live tree no longer
//! does (the source of a move). Removed and rewritten paths may share names.
//! The pass is best-effort; the first failing operation aborts it and nothing
//! already written is rolled back.

use crate::file::import::{import_entries, read_directory};
use crate::file::store::VirtualFilesystem;
use crate::file::tree::{ancestors, PathTree};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// The operations the reconciler needs from a directory on the host.
#[async_trait::async_trait(?Send)]
pub trait DirectoryHandle {
    /// Human readable location, used in logs and errors.
    fn describe(&self) -> String;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn read_tree(&self) -> Result<PathTree>;

    async fn create_dir_all(&self, path: &str) -> Result<()>;

    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Removes a file, or a directory and everything in it.
    async fn remove(&self, path: &str) -> Result<()>;
}

/// A directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Path escapes the project directory: {path}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait(?Send)]
impl DirectoryHandle for LocalDirectory {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let real = self.resolve(path)?;
        fs::try_exists(&real)
            .await
            .with_context(|| format!("Failed to stat: {path}"))
    }

    async fn read_tree(&self) -> Result<PathTree> {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || read_directory(&root))
            .await
            .context("Directory walk panicked")??;
        import_entries(entries)
    }

    async fn create_dir_all(&self, path: &str) -> Result<()> {
        let real = self.resolve(path)?;
        fs::create_dir_all(&real)
            .await
            .with_context(|| format!("Failed to create directory: {path}"))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let real = self.resolve(path)?;
        fs::write(&real, content)
            .await
            .with_context(|| format!("Failed to write file: {path}"))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let real = self.resolve(path)?;
        let metadata = fs::metadata(&real)
            .await
            .with_context(|| format!("Failed to get metadata for: {path}"))?;

        if metadata.is_dir() {
            fs::remove_dir_all(&real)
                .await
                .with_context(|| format!("Failed to delete directory: {path}"))
        } else {
            fs::remove_file(&real)
                .await
                .with_context(|| format!("Failed to delete file: {path}"))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub deleted: Vec<String>,
    pub created_dirs: Vec<String>,
    pub written: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.created_dirs.is_empty() && self.written.is_empty()
    }
}

/// Reads `handle` and links it as the project (baseline and live tree).
pub async fn sync_from(vfs: &mut VirtualFilesystem, handle: &dyn DirectoryHandle) -> Result<()> {
    let tree = handle
        .read_tree()
        .await
        .with_context(|| format!("Failed to read project from {}", handle.describe()))?;
    vfs.sync(tree);
    Ok(())
}

/// Applies tombstones and new or modified files to `handle`, then promotes
/// the live tree to the new baseline.
pub async fn reconcile(
    vfs: &mut VirtualFilesystem,
    handle: &dyn DirectoryHandle,
) -> Result<ReconcileReport> {
    let empty = PathTree::new();
    let original = vfs.original().unwrap_or(&empty);
    let current = vfs.current();
    let mut report = ReconcileReport::default();

    let mut removals: BTreeSet<&str> = vfs.deleted().all_paths();
    removals.extend(
        original
            .all_paths()
            .into_iter()
            .filter(|path| !current.path_exists(path) && !current.is_dir(path)),
    );

    // Sorted, so a removed directory is visited before its children and the
    // children can be skipped.
    for path in removals {
        if !original.path_exists(path) && !original.is_dir(path) {
            continue;
        }
        if ancestors(path).any(|a| report.deleted.iter().any(|d| d == a)) {
            continue;
        }
        if !handle.exists(path).await? {
            debug!(%path, "Removed path already absent");
            continue;
        }
        handle
            .remove(path)
            .await
            .with_context(|| format!("Failed to apply deletion of {path}"))?;
        debug!(%path, "Deleted from disk");
        report.deleted.push(path.to_string());
    }

    for dir in &current.dirs {
        if original.dirs.contains(dir) && !report.deleted.iter().any(|d| covers(d, dir)) {
            continue;
        }
        handle.create_dir_all(dir).await?;
        report.created_dirs.push(dir.clone());
    }

    for (path, content) in &current.files {
        let unchanged = original.files.get(path) == Some(content)
            && !report.deleted.iter().any(|d| covers(d, path));
        if unchanged {
            continue;
        }
        if let Some((parent, _)) = path.rsplit_once('/') {
            handle.create_dir_all(parent).await?;
        }
        handle.write_file(path, content).await?;
        debug!(%path, "Wrote file");
        report.written.push(path.clone());
    }

    info!(
        target_dir = %handle.describe(),
        deleted = report.deleted.len(),
        created_dirs = report.created_dirs.len(),
        written = report.written.len(),
        "Applied project to disk"
    );

    vfs.mark_applied();
    Ok(report)
}

/// True when removing `removed` also removed `path`.
fn covers(removed: &str, path: &str) -> bool {
    path == removed || path.starts_with(&format!("{removed}/"))
}

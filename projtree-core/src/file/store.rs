use crate::file::tree::{ancestors, escapes_root, normalize_path, PathTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

/// Rejections for user-issued commands. The store is unchanged when one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("Path is empty")]
    EmptyPath,

    #[error("Path leaves the project root: {path}")]
    OutsideProject { path: String },

    #[error("{path} conflicts with an existing file or directory at {conflict}")]
    Conflict { path: String, conflict: String },
}

/// The in-memory project: the live tree, the baseline it is diffed against,
/// tombstones for deleted entries and the paths excluded from model context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualFilesystem {
    current: PathTree,
    original: Option<PathTree>,
    deleted: PathTree,
    excluded_paths: BTreeSet<String>,
}

impl VirtualFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &PathTree {
        &self.current
    }

    pub fn original(&self) -> Option<&PathTree> {
        self.original.as_ref()
    }

    pub fn deleted(&self) -> &PathTree {
        &self.deleted
    }

    pub fn excluded_paths(&self) -> &BTreeSet<String> {
        &self.excluded_paths
    }

    pub fn is_linked(&self) -> bool {
        self.original.is_some()
    }

    /// Makes `tree` both the live tree and the diff baseline.
    pub fn sync(&mut self, tree: PathTree) {
        info!(files = tree.files.len(), dirs = tree.dirs.len(), "Syncing project");
        self.original = Some(tree.clone());
        self.current = tree;
        self.deleted = PathTree::new();
        self.excluded_paths.clear();
    }

    /// Drops the linked project entirely.
    pub fn unlink(&mut self) {
        info!("Unlinking project");
        *self = Self::default();
    }

    pub fn create_file(&mut self, path: &str, content: &str) -> Result<(), ValidationError> {
        let path = Self::validated(path)?;
        if self.current.path_exists(&path) {
            return Err(ValidationError::AlreadyExists { path });
        }
        if let Some(conflict) = self.current.file_conflict(&path) {
            return Err(ValidationError::Conflict {
                conflict: conflict.to_string(),
                path,
            });
        }

        self.current = self.current.create_file(&path, content);
        info!(%path, "Created file");
        Ok(())
    }

    pub fn create_folder(&mut self, path: &str) -> Result<(), ValidationError> {
        let path = Self::validated(path)?;
        if self.current.path_exists(&path) {
            return Err(ValidationError::AlreadyExists { path });
        }
        if let Some(conflict) = self.current.folder_conflict(&path) {
            return Err(ValidationError::Conflict {
                conflict: conflict.to_string(),
                path,
            });
        }

        self.current = self.current.create_folder(&path);
        info!(%path, "Created folder");
        Ok(())
    }

    /// Replaces the content of an existing file (a user edit).
    pub fn update_file(&mut self, path: &str, content: &str) -> Result<(), ValidationError> {
        let path = Self::validated(path)?;
        if !self.current.is_file(&path) {
            return Err(ValidationError::NotFound { path });
        }
        self.current = self.current.create_file(&path, content);
        Ok(())
    }

    /// Deletes a path the user has already confirmed, recording tombstones.
    pub fn delete_path(&mut self, path: &str) -> Result<(), ValidationError> {
        let path = Self::validated(path)?;
        let removed = self.current.extract_subtree(&path);
        if removed.is_empty() {
            return Err(ValidationError::NotFound { path });
        }

        self.deleted.merge(&removed);
        self.current = self.current.delete_path(&path);
        info!(%path, files = removed.files.len(), "Deleted path");
        Ok(())
    }

    pub fn move_path(&mut self, old_path: &str, new_path: &str) -> Result<(), ValidationError> {
        let old_path = Self::validated(old_path)?;
        let new_path = Self::validated(new_path)?;
        if !self.current.is_file(&old_path) && !self.current.is_dir(&old_path) {
            return Err(ValidationError::NotFound { path: old_path });
        }
        if self.current.path_exists(&new_path) {
            return Err(ValidationError::AlreadyExists { path: new_path });
        }
        let conflict = ancestors(&new_path)
            .find(|a| self.current.is_file(a))
            .map(str::to_string);
        if let Some(conflict) = conflict {
            return Err(ValidationError::Conflict {
                conflict,
                path: new_path,
            });
        }

        self.current = self.current.move_path(&old_path, &new_path);
        info!(from = %old_path, to = %new_path, "Moved path");
        Ok(())
    }

    /// Discards every change since the last sync. Exclusions are kept.
    pub fn revert(&mut self) {
        self.current = self.original.clone().unwrap_or_default();
        self.deleted = PathTree::new();
        info!("Reverted to baseline");
    }

    /// Flips the exclusion of a file, or of a directory and everything under
    /// it. The new state is decided by whether `path` itself is excluded.
    pub fn toggle_exclusion(&mut self, path: &str) {
        let path = normalize_path(path);
        let exclude = !self.excluded_paths.contains(&path);

        if !self.current.is_dir(&path) {
            if exclude {
                self.excluded_paths.insert(path);
            } else {
                self.excluded_paths.remove(&path);
            }
            return;
        }

        if exclude {
            let descendants: Vec<String> = self
                .current
                .descendant_files(&path)
                .map(|(p, _)| p.clone())
                .chain(self.current.descendant_dirs(&path).cloned())
                .collect();
            self.excluded_paths.insert(path);
            self.excluded_paths.extend(descendants);
        } else {
            let prefix = format!("{path}/");
            self.excluded_paths
                .retain(|excluded| *excluded != path && !excluded.starts_with(&prefix));
        }
    }

    /// True when `path` or one of its ancestors is excluded.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.contains(path)
            || ancestors(path).any(|ancestor| self.excluded_paths.contains(ancestor))
    }

    /// The live tree minus excluded paths, as sent to the model.
    pub fn context_tree(&self) -> PathTree {
        self.current.filtered(|path| !self.is_excluded(path))
    }

    /// Replaces the live tree and tombstones with the outcome of a tool-call
    /// batch in a single step.
    pub fn commit(&mut self, current: PathTree, deleted: PathTree) {
        self.current = current;
        self.deleted = deleted;
    }

    /// Promotes the live tree to the baseline after it has been written out.
    pub fn mark_applied(&mut self) {
        self.original = Some(self.current.clone());
        self.deleted = PathTree::new();
    }

    fn validated(path: &str) -> Result<String, ValidationError> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        if escapes_root(&path) {
            return Err(ValidationError::OutsideProject { path });
        }
        Ok(path)
    }
}

//! Path-indexed project tree and the pure operations over it.
//!
//! A `PathTree` stores file contents keyed by `/`-separated relative path and
//! a set of directory paths. Every operation here takes `&self` and returns a
//! new tree; callers decide when to commit the result.
//!
//! Directory-ness is structural: a path is a directory if it is listed in
//! `dirs` or if any file lives beneath it (`path + "/"` prefix). Delete and
//! move rely on this so that a directory only implied by a file's ancestry
//! still behaves as a unit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTree {
    pub files: BTreeMap<String, String>,
    pub dirs: BTreeSet<String>,
}

/// Strips leading `/` and `./`, trailing `/` and empty segments so tool and
/// user supplied paths land on the same keys.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// True when a `..` segment would take `path` outside the project root.
pub fn escapes_root(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

/// Proper ancestors of `path`, shortest first: `a/b/c` yields `a`, `a/b`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(index, _)| &path[..index])
}

fn descendant_prefix(path: &str) -> String {
    format!("{path}/")
}

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut tree = Self::new();
        for (path, content) in files {
            tree.insert_file(path.into(), content.into());
        }
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// True when `path` is an explicit directory or has at least one file
    /// beneath it.
    pub fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(path) || self.has_descendant_files(path)
    }

    /// A path exists when it is a file key or an explicit directory key.
    pub fn path_exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    fn has_descendant_files(&self, path: &str) -> bool {
        let prefix = descendant_prefix(path);
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    /// Files strictly beneath `path`.
    pub fn descendant_files<'a>(
        &'a self,
        path: &str,
    ) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
        let prefix = descendant_prefix(path);
        self.files
            .range(prefix.clone()..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
    }

    /// Directories strictly beneath `path`.
    pub fn descendant_dirs<'a>(&'a self, path: &str) -> impl Iterator<Item = &'a String> + 'a {
        let prefix = descendant_prefix(path);
        self.dirs
            .range(prefix.clone()..)
            .take_while(move |key| key.starts_with(&prefix))
    }

    /// The path that blocks writing a file at `path`: `path` itself when it
    /// is a directory, or the first ancestor that is a file.
    pub fn file_conflict<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_dir(path) {
            return Some(path);
        }
        ancestors(path).find(|ancestor| self.is_file(ancestor))
    }

    /// The path that blocks creating a directory at `path`.
    pub fn folder_conflict<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_file(path) {
            return Some(path);
        }
        ancestors(path).find(|ancestor| self.is_file(ancestor))
    }

    pub(crate) fn insert_file(&mut self, path: String, content: String) {
        for ancestor in ancestors(&path) {
            if !self.dirs.contains(ancestor) {
                self.dirs.insert(ancestor.to_string());
            }
        }
        self.files.insert(path, content);
    }

    pub(crate) fn insert_folder(&mut self, path: &str) {
        for ancestor in ancestors(path) {
            if !self.dirs.contains(ancestor) {
                self.dirs.insert(ancestor.to_string());
            }
        }
        self.dirs.insert(path.to_string());
    }

    pub(crate) fn remove_path(&mut self, path: &str) {
        if self.files.remove(path).is_some() {
            return;
        }

        self.dirs.remove(path);
        let prefix = descendant_prefix(path);
        self.files.retain(|key, _| !key.starts_with(&prefix));
        self.dirs.retain(|key| !key.starts_with(&prefix));
    }

    /// Inserts or overwrites a file, adding every missing ancestor directory.
    #[must_use]
    pub fn create_file(&self, path: &str, content: &str) -> Self {
        let mut tree = self.clone();
        tree.insert_file(path.to_string(), content.to_string());
        tree
    }

    /// Adds `path` and its ancestors to `dirs`. Idempotent.
    #[must_use]
    pub fn create_folder(&self, path: &str) -> Self {
        let mut tree = self.clone();
        tree.insert_folder(path);
        tree
    }

    /// Removes a file, or a directory together with everything beneath it.
    /// Unknown paths are a no-op.
    #[must_use]
    pub fn delete_path(&self, path: &str) -> Self {
        let mut tree = self.clone();
        tree.remove_path(path);
        tree
    }

    /// Moves a file, or re-roots a whole directory subtree from `source` to
    /// `dest` preserving contents. A source that is neither a file nor a
    /// directory leaves the tree unchanged.
    #[must_use]
    pub fn move_path(&self, source: &str, dest: &str) -> Self {
        let mut tree = self.clone();

        if let Some(content) = tree.files.remove(source) {
            tree.insert_file(dest.to_string(), content);
            return tree;
        }

        if !self.is_dir(source) {
            return tree;
        }

        let prefix = descendant_prefix(source);
        let rebase = |path: &str| format!("{dest}/{}", &path[prefix.len()..]);

        let moved_dirs: Vec<String> = self.descendant_dirs(source).map(|d| rebase(d)).collect();
        let moved_files: Vec<(String, String)> = self
            .descendant_files(source)
            .map(|(path, content)| (rebase(path), content.clone()))
            .collect();

        tree.remove_path(source);
        tree.insert_folder(dest);
        for dir in moved_dirs {
            tree.insert_folder(&dir);
        }
        for (path, content) in moved_files {
            tree.insert_file(path, content);
        }
        tree
    }

    /// The subtree rooted at `path`: the single file entry for a file, or the
    /// directory plus all descendants. Empty when `path` is unknown.
    #[must_use]
    pub fn extract_subtree(&self, path: &str) -> Self {
        let mut subtree = Self::new();

        if let Some(content) = self.files.get(path) {
            subtree.files.insert(path.to_string(), content.clone());
            return subtree;
        }

        if self.dirs.contains(path) {
            subtree.dirs.insert(path.to_string());
        }
        subtree.dirs.extend(self.descendant_dirs(path).cloned());
        subtree.files.extend(
            self.descendant_files(path)
                .map(|(key, content)| (key.clone(), content.clone())),
        );
        subtree
    }

    /// Merges `other` into `self`: files key-wise (other wins), dirs unioned.
    pub fn merge(&mut self, other: &PathTree) {
        self.files.extend(
            other
                .files
                .iter()
                .map(|(path, content)| (path.clone(), content.clone())),
        );
        self.dirs.extend(other.dirs.iter().cloned());
    }

    #[must_use]
    pub fn union(&self, other: &PathTree) -> Self {
        let mut tree = self.clone();
        tree.merge(other);
        tree
    }

    /// Keeps only the paths for which `keep` returns true.
    #[must_use]
    pub fn filtered<F>(&self, keep: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        Self {
            files: self
                .files
                .iter()
                .filter(|(path, _)| keep(path))
                .map(|(path, content)| (path.clone(), content.clone()))
                .collect(),
            dirs: self.dirs.iter().filter(|dir| keep(dir)).cloned().collect(),
        }
    }

    /// Every file and directory path, sorted.
    pub fn all_paths(&self) -> BTreeSet<&str> {
        self.files
            .keys()
            .map(String::as_str)
            .chain(self.dirs.iter().map(String::as_str))
            .collect()
    }
}

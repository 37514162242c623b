use crate::file::store::VirtualFilesystem;
use crate::file::tree::PathTree;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a path in the display tree compares with the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Deleted,
    Created,
    Modified,
    Unchanged,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiffStatus::Deleted => "deleted",
            DiffStatus::Created => "created",
            DiffStatus::Modified => "modified",
            DiffStatus::Unchanged => "unchanged",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathChange {
    pub path: String,
    pub status: DiffStatus,
}

impl VirtualFilesystem {
    /// Tombstones overlaid with the live tree; only used for rendering.
    pub fn display_tree(&self) -> PathTree {
        self.deleted().union(self.current())
    }

    pub fn status(&self, path: &str) -> DiffStatus {
        let deleted = self.deleted();
        if deleted.path_exists(path) {
            return DiffStatus::Deleted;
        }

        let empty = PathTree::new();
        let original = self.original().unwrap_or(&empty);
        if !original.is_file(path) && !original.is_dir(path) {
            return DiffStatus::Created;
        }

        let current = self.current().files.get(path);
        let baseline = original.files.get(path);
        if current.is_some() && current != baseline {
            return DiffStatus::Modified;
        }

        DiffStatus::Unchanged
    }

    /// Every path of the display tree that is not unchanged, sorted.
    pub fn changes(&self) -> Vec<PathChange> {
        self.display_tree()
            .all_paths()
            .into_iter()
            .filter_map(|path| {
                let status = self.status(path);
                (status != DiffStatus::Unchanged).then(|| PathChange {
                    path: path.to_string(),
                    status,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked() -> VirtualFilesystem {
        let mut fs = VirtualFilesystem::new();
        fs.sync(PathTree::from_files([
            ("src/a.txt", "hello"),
            ("src/b.txt", "world"),
        ]));
        fs
    }

    #[test]
    fn test_status_classification() {
        let mut fs = linked();
        fs.create_file("src/c.txt", "new").unwrap();
        fs.update_file("src/b.txt", "changed").unwrap();
        fs.delete_path("src/a.txt").unwrap();

        assert_eq!(fs.status("src/a.txt"), DiffStatus::Deleted);
        assert_eq!(fs.status("src/b.txt"), DiffStatus::Modified);
        assert_eq!(fs.status("src/c.txt"), DiffStatus::Created);
        assert_eq!(fs.status("src"), DiffStatus::Unchanged);
    }

    #[test]
    fn test_edit_back_to_original_is_unchanged() {
        let mut fs = linked();
        fs.update_file("src/a.txt", "tmp").unwrap();
        fs.update_file("src/a.txt", "hello").unwrap();
        assert_eq!(fs.status("src/a.txt"), DiffStatus::Unchanged);
    }

    #[test]
    fn test_everything_is_created_without_baseline() {
        let mut fs = VirtualFilesystem::new();
        fs.create_file("a.txt", "a").unwrap();
        assert_eq!(fs.status("a.txt"), DiffStatus::Created);
    }

    #[test]
    fn test_display_tree_and_changes() {
        let mut fs = linked();
        fs.delete_path("src/a.txt").unwrap();
        fs.create_folder("docs").unwrap();

        let display = fs.display_tree();
        assert!(display.is_file("src/a.txt"));
        assert!(display.dirs.contains("docs"));

        let changes = fs.changes();
        assert_eq!(
            changes,
            vec![
                PathChange {
                    path: "docs".to_string(),
                    status: DiffStatus::Created
                },
                PathChange {
                    path: "src/a.txt".to_string(),
                    status: DiffStatus::Deleted
                },
            ]
        );
    }
}

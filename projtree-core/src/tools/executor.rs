//! Applies model-issued function calls to a snapshot of the project.
//!
//! Execution never mutates the store: every call takes the live tree and the
//! tombstones by reference and hands back new ones. A batch threads the
//! trees from one call into the next, and the caller commits the final pair
//! in one step.

use crate::ai::types::{ToolResultData, ToolUseData};
use crate::file::store::VirtualFilesystem;
use crate::file::tree::{ancestors, PathTree};
use crate::tools::call::{CallError, FunctionCall};
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};
use tracing::{info, warn};

/// The result of one call plus the trees it produced. On failure the trees
/// are the unchanged inputs.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub result: Result<String, CallError>,
    pub current: PathTree,
    pub deleted: PathTree,
}

impl CallOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

pub fn execute_function_call(
    name: &str,
    arguments: Option<&Value>,
    current: &PathTree,
    deleted: &PathTree,
) -> CallOutcome {
    let applied = FunctionCall::parse(name, arguments).and_then(|call| apply(call, current, deleted));

    match applied {
        Ok((message, current, deleted)) => CallOutcome {
            result: Ok(message),
            current,
            deleted,
        },
        Err(error) => CallOutcome {
            result: Err(error),
            current: current.clone(),
            deleted: deleted.clone(),
        },
    }
}

fn apply(
    call: FunctionCall,
    current: &PathTree,
    deleted: &PathTree,
) -> Result<(String, PathTree, PathTree), CallError> {
    match call {
        FunctionCall::WriteFile { path, content } => {
            if let Some(conflict) = current.file_conflict(&path) {
                return Err(CallError::Conflict {
                    conflict: conflict.to_string(),
                    path,
                });
            }
            let message = match current.files.get(&path) {
                Some(previous) => {
                    let (added, removed) = line_stats(previous, &content);
                    format!("Updated {path} (+{added} -{removed} lines)")
                }
                None => format!("Created {path} ({} lines)", content.lines().count()),
            };
            Ok((message, current.create_file(&path, &content), deleted.clone()))
        }
        FunctionCall::CreateFolder { path } => {
            if let Some(conflict) = current.folder_conflict(&path) {
                return Err(CallError::Conflict {
                    conflict: conflict.to_string(),
                    path,
                });
            }
            let message = format!("Created folder {path}");
            Ok((message, current.create_folder(&path), deleted.clone()))
        }
        FunctionCall::Move {
            source_path,
            destination_path,
        } => {
            let source_is_file = current.is_file(&source_path);
            let blocked = if source_is_file {
                current.is_dir(&destination_path)
            } else {
                current.is_dir(&source_path) && current.is_file(&destination_path)
            };
            let conflict = if blocked {
                Some(destination_path.as_str())
            } else {
                ancestors(&destination_path).find(|a| current.is_file(a))
            };
            if let Some(conflict) = conflict {
                return Err(CallError::Conflict {
                    conflict: conflict.to_string(),
                    path: destination_path.clone(),
                });
            }

            let message = format!("Moved {source_path} to {destination_path}");
            Ok((
                message,
                current.move_path(&source_path, &destination_path),
                deleted.clone(),
            ))
        }
        FunctionCall::DeletePath { path } => {
            let removed = current.extract_subtree(&path);
            if removed.is_empty() {
                return Err(CallError::NotFound { path });
            }
            let mut tombstones = deleted.clone();
            tombstones.merge(&removed);
            let message = format!("Deleted {path}");
            Ok((message, current.delete_path(&path), tombstones))
        }
        FunctionCall::Unknown { name } => Err(CallError::UnknownFunction { name }),
    }
}

fn line_stats(before: &str, after: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(before, after);
    diff.iter_all_changes()
        .fold((0, 0), |(added, removed), change| match change.tag() {
            ChangeTag::Insert => (added + 1, removed),
            ChangeTag::Delete => (added, removed + 1),
            ChangeTag::Equal => (added, removed),
        })
}

/// One executed call from a model turn, ready to be reported back.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub tool_use_id: String,
    pub name: String,
    pub result: Result<String, CallError>,
}

impl CallRecord {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    /// The structured response object sent to the model.
    pub fn response(&self) -> Value {
        match &self.result {
            Ok(message) => json!({ "success": true, "message": message }),
            Err(error) => json!({ "success": false, "error": error.to_string() }),
        }
    }

    pub fn to_tool_result(&self) -> ToolResultData {
        ToolResultData {
            tool_use_id: self.tool_use_id.clone(),
            name: self.name.clone(),
            content: self.response().to_string(),
            is_error: !self.success(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<CallRecord>,
    pub current: PathTree,
    pub deleted: PathTree,
}

/// Runs `calls` in order, each against the trees produced by the previous
/// call.
pub fn execute_batch(calls: &[ToolUseData], current: &PathTree, deleted: &PathTree) -> BatchOutcome {
    let mut current = current.clone();
    let mut deleted = deleted.clone();
    let mut records = Vec::with_capacity(calls.len());

    for call in calls {
        let outcome = execute_function_call(&call.name, call.arguments.as_ref(), &current, &deleted);
        match &outcome.result {
            Ok(message) => info!(tool_name = %call.name, %message, "Function call succeeded"),
            Err(error) => warn!(tool_name = %call.name, %error, "Function call failed"),
        }

        records.push(CallRecord {
            tool_use_id: call.id.clone(),
            name: call.name.clone(),
            result: outcome.result,
        });
        current = outcome.current;
        deleted = outcome.deleted;
    }

    BatchOutcome {
        records,
        current,
        deleted,
    }
}

/// Executes a batch against the store and commits the final trees at once.
pub fn apply_batch(fs: &mut VirtualFilesystem, calls: &[ToolUseData]) -> Vec<CallRecord> {
    let outcome = execute_batch(calls, fs.current(), fs.deleted());
    fs.commit(outcome.current, outcome.deleted);
    outcome.records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str, arguments: Value) -> ToolUseData {
        ToolUseData {
            id: id.to_string(),
            name: name.to_string(),
            arguments: Some(arguments),
        }
    }

    fn project() -> PathTree {
        PathTree::from_files([("src/a.txt", "hello")])
    }

    #[test]
    fn test_write_file_overwrites() {
        let tree = project();
        let outcome = execute_function_call(
            "writeFile",
            Some(&json!({"path": "src/a.txt", "content": "hello\nworld"})),
            &tree,
            &PathTree::new(),
        );
        assert!(outcome.success());
        assert_eq!(outcome.current.files["src/a.txt"], "hello\nworld");
        assert_eq!(tree.files["src/a.txt"], "hello");
    }

    #[test]
    fn test_write_file_onto_directory_conflicts() {
        let outcome = execute_function_call(
            "writeFile",
            Some(&json!({"path": "src", "content": "x"})),
            &project(),
            &PathTree::new(),
        );
        assert!(matches!(outcome.result, Err(CallError::Conflict { .. })));
        assert_eq!(outcome.current, project());
    }

    #[test]
    fn test_delete_missing_path_fails() {
        let outcome = execute_function_call(
            "deletePath",
            Some(&json!({"path": "nope.txt"})),
            &project(),
            &PathTree::new(),
        );
        assert_eq!(
            outcome.result,
            Err(CallError::NotFound {
                path: "nope.txt".to_string()
            })
        );
    }

    #[test]
    fn test_delete_records_tombstone() {
        let outcome = execute_function_call(
            "deletePath",
            Some(&json!({"path": "src"})),
            &project(),
            &PathTree::new(),
        );
        assert!(outcome.success());
        assert!(outcome.current.files.is_empty());
        assert_eq!(outcome.deleted.files["src/a.txt"], "hello");
    }

    #[test]
    fn test_move_overwrites_existing_file() {
        let tree = project().create_file("b.txt", "old");
        let outcome = execute_function_call(
            "move",
            Some(&json!({"sourcePath": "src/a.txt", "destinationPath": "b.txt"})),
            &tree,
            &PathTree::new(),
        );
        assert!(outcome.success());
        assert_eq!(outcome.current.files["b.txt"], "hello");
        assert!(!outcome.current.is_file("src/a.txt"));
    }

    #[test]
    fn test_move_directory_scenario() {
        let tree = PathTree::from_files([("src/a.txt", "a"), ("src/b.txt", "b")]);
        let outcome = execute_function_call(
            "move",
            Some(&json!({"sourcePath": "src", "destinationPath": "lib"})),
            &tree,
            &PathTree::new(),
        );
        assert!(outcome.success());
        let keys: Vec<&str> = outcome.current.files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["lib/a.txt", "lib/b.txt"]);
        assert!(outcome.current.dirs.contains("lib"));
        assert!(!outcome.current.dirs.contains("src"));
    }

    #[test]
    fn test_unknown_and_missing_arguments() {
        let outcome = execute_function_call("format", Some(&json!({})), &project(), &PathTree::new());
        assert!(matches!(outcome.result, Err(CallError::UnknownFunction { .. })));

        let outcome = execute_function_call("writeFile", None, &project(), &PathTree::new());
        assert!(matches!(outcome.result, Err(CallError::MissingArguments { .. })));
    }

    #[test]
    fn test_batch_sees_cumulative_state() {
        let calls = vec![
            call("1", "writeFile", json!({"path": "src/b.txt", "content": "x"})),
            call("2", "deletePath", json!({"path": "src/a.txt"})),
            call("3", "move", json!({"sourcePath": "src/b.txt", "destinationPath": "src/c.txt"})),
            call("4", "deletePath", json!({"path": "src/b.txt"})),
        ];

        let outcome = execute_batch(&calls, &project(), &PathTree::new());
        let successes: Vec<bool> = outcome.records.iter().map(CallRecord::success).collect();
        assert_eq!(successes, vec![true, true, true, false]);

        assert_eq!(outcome.current.files.len(), 1);
        assert_eq!(outcome.current.files["src/c.txt"], "x");
        assert_eq!(outcome.deleted.files["src/a.txt"], "hello");
    }

    #[test]
    fn test_apply_batch_commits_once() {
        let mut fs = VirtualFilesystem::new();
        fs.sync(project());

        let records = apply_batch(
            &mut fs,
            &[
                call("1", "writeFile", json!({"path": "src/b.txt", "content": "x"})),
                call("2", "deletePath", json!({"path": "src/a.txt"})),
            ],
        );
        assert!(records.iter().all(CallRecord::success));

        let keys: Vec<&str> = fs.current().files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["src/b.txt"]);
        assert_eq!(fs.deleted().files["src/a.txt"], "hello");
    }

    #[test]
    fn test_parent_segments_rejected_without_blocking_batch() {
        let mut fs = VirtualFilesystem::new();
        fs.sync(project());

        let records = apply_batch(
            &mut fs,
            &[
                call("1", "writeFile", json!({"path": "../escape.txt", "content": "x"})),
                call("2", "writeFile", json!({"path": "b.txt", "content": "b"})),
            ],
        );
        assert!(matches!(records[0].result, Err(CallError::InvalidPath { .. })));
        assert!(records[1].success());

        let keys: Vec<&str> = fs.current().files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b.txt", "src/a.txt"]);
        assert!(!fs.current().dirs.contains(".."));
    }

    #[test]
    fn test_tool_result_shape() {
        let record = CallRecord {
            tool_use_id: "call_9".to_string(),
            name: "deletePath".to_string(),
            result: Err(CallError::NotFound {
                path: "x".to_string(),
            }),
        };
        let result = record.to_tool_result();
        assert!(result.is_error);
        assert_eq!(result.name, "deletePath");

        let body: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Path not found: x");
    }

    #[test]
    fn test_line_stats() {
        assert_eq!(line_stats("a\nb\n", "a\nc\nd\n"), (2, 1));
    }
}

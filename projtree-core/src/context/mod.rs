//! Renders the project into the text injected ahead of the user's latest
//! turn while coder mode is active.
//!
//! The output has two sections: a tree drawing of every directory and file,
//! then one delimited block per file. It is meant to be read by the model and
//! by humans debugging a request; nothing parses it back.

pub mod file_tree;

use crate::file::store::VirtualFilesystem;
use crate::file::tree::PathTree;

pub use file_tree::render_tree;

const TREE_HEADER: &str = "Project structure:";
const FILES_HEADER: &str = "Project files:";

pub fn begin_marker(path: &str) -> String {
    format!("----- BEGIN FILE: {path} -----")
}

pub fn end_marker(path: &str) -> String {
    format!("----- END FILE: {path} -----")
}

/// Serializes an already filtered tree. Deterministic for equal trees.
pub fn serialize_tree(tree: &PathTree) -> String {
    let mut output = String::new();
    output.push_str(TREE_HEADER);
    output.push('\n');
    output.push_str(&render_tree(tree));

    output.push('\n');
    output.push_str(FILES_HEADER);
    output.push('\n');
    for (path, content) in &tree.files {
        output.push('\n');
        output.push_str(&begin_marker(path));
        output.push('\n');
        output.push_str(content);
        if !content.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&end_marker(path));
        output.push('\n');
    }
    output
}

/// The model-facing context for a linked project, excluded paths removed.
/// `None` when no project is linked.
pub fn build_project_context(fs: &VirtualFilesystem) -> Option<String> {
    if !fs.is_linked() {
        return None;
    }
    Some(serialize_tree(&fs.context_tree()))
}

use std::collections::BTreeMap;

use crate::file::tree::PathTree;

#[derive(Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
}

impl TrieNode {
    fn insert_path(&mut self, components: &[&str]) {
        let Some((first, rest)) = components.split_first() else {
            return;
        };
        self.children
            .entry(first.to_string())
            .or_default()
            .insert_path(rest);
    }

    fn render(&self, output: &mut String, prefix: &str) {
        let last_index = self.children.len().saturating_sub(1);

        for (index, (name, child)) in self.children.iter().enumerate() {
            let is_last = index == last_index;
            let connector = if is_last { "└── " } else { "├── " };

            output.push_str(prefix);
            output.push_str(connector);
            output.push_str(name);
            output.push('\n');

            let child_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            child.render(output, &child_prefix);
        }
    }
}

/// Draws every directory and file of `tree` with box-drawing connectors,
/// siblings sorted by name.
pub fn render_tree(tree: &PathTree) -> String {
    let mut root = TrieNode::default();

    for path in tree.all_paths() {
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        root.insert_path(&components);
    }

    let mut result = String::new();
    root.render(&mut result, "");
    result
}

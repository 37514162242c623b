use crate::ai::types::ToolDefinition;
use crate::tools::call::{CREATE_FOLDER, DELETE_PATH, MOVE, WRITE_FILE};
use serde_json::{json, Value};

fn string_params(params: &[(&str, &str)]) -> Value {
    let properties: serde_json::Map<String, Value> = params
        .iter()
        .map(|(name, description)| {
            (
                name.to_string(),
                json!({ "type": "string", "description": description }),
            )
        })
        .collect();
    let required: Vec<&str> = params.iter().map(|(name, _)| *name).collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// The four project operations declared to the model in coder mode.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: WRITE_FILE.to_string(),
            description: "Create a new file or completely overwrite an existing file. Parent directories are created as needed.".to_string(),
            input_schema: string_params(&[
                ("path", "Path of the file relative to the project root"),
                ("content", "Complete content to write to the file"),
            ]),
        },
        ToolDefinition {
            name: CREATE_FOLDER.to_string(),
            description: "Create a directory (and any missing parent directories)".to_string(),
            input_schema: string_params(&[(
                "path",
                "Path of the directory relative to the project root",
            )]),
        },
        ToolDefinition {
            name: MOVE.to_string(),
            description: "Move or rename a file or directory. Existing files at the destination are overwritten.".to_string(),
            input_schema: string_params(&[
                ("sourcePath", "Current path of the file or directory"),
                ("destinationPath", "New path of the file or directory"),
            ]),
        },
        ToolDefinition {
            name: DELETE_PATH.to_string(),
            description: "Delete a file, or a directory and everything in it".to_string(),
            input_schema: string_params(&[(
                "path",
                "Path of the file or directory to delete",
            )]),
        },
    ]
}

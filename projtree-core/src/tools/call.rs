use crate::file::tree::{escapes_root, normalize_path};
use serde_json::Value;
use thiserror::Error;

pub const WRITE_FILE: &str = "writeFile";
pub const CREATE_FOLDER: &str = "createFolder";
pub const MOVE: &str = "move";
pub const DELETE_PATH: &str = "deletePath";

/// Failures reported back to the model as structured tool results. None of
/// these end the turn.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Missing arguments for function: {function}")]
    MissingArguments { function: String },

    #[error("Missing required parameter '{parameter}' for function: {function}")]
    MissingParameter { function: String, parameter: String },

    #[error("Parameter '{parameter}' is not a valid path")]
    InvalidPath { parameter: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("{path} conflicts with an existing file or directory at {conflict}")]
    Conflict { path: String, conflict: String },
}

/// The closed set of operations the model can invoke on the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCall {
    WriteFile { path: String, content: String },
    CreateFolder { path: String },
    Move { source_path: String, destination_path: String },
    DeletePath { path: String },
    Unknown { name: String },
}

impl FunctionCall {
    /// Decodes a call. Missing arguments are rejected before the name is
    /// looked at; an unrecognised name decodes to `Unknown`.
    pub fn parse(name: &str, arguments: Option<&Value>) -> Result<Self, CallError> {
        let Some(arguments) = arguments.filter(|a| !a.is_null()) else {
            return Err(CallError::MissingArguments {
                function: name.to_string(),
            });
        };

        let call = match name {
            WRITE_FILE => FunctionCall::WriteFile {
                path: required_path(name, arguments, "path")?,
                content: required_str(name, arguments, "content")?.to_string(),
            },
            CREATE_FOLDER => FunctionCall::CreateFolder {
                path: required_path(name, arguments, "path")?,
            },
            MOVE => FunctionCall::Move {
                source_path: required_path(name, arguments, "sourcePath")?,
                destination_path: required_path(name, arguments, "destinationPath")?,
            },
            DELETE_PATH => FunctionCall::DeletePath {
                path: required_path(name, arguments, "path")?,
            },
            other => FunctionCall::Unknown {
                name: other.to_string(),
            },
        };
        Ok(call)
    }

    pub fn name(&self) -> &str {
        match self {
            FunctionCall::WriteFile { .. } => WRITE_FILE,
            FunctionCall::CreateFolder { .. } => CREATE_FOLDER,
            FunctionCall::Move { .. } => MOVE,
            FunctionCall::DeletePath { .. } => DELETE_PATH,
            FunctionCall::Unknown { name } => name,
        }
    }
}

fn required_str<'a>(function: &str, arguments: &'a Value, parameter: &str) -> Result<&'a str, CallError> {
    arguments
        .get(parameter)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CallError::MissingParameter {
            function: function.to_string(),
            parameter: parameter.to_string(),
        })
}

fn required_path(function: &str, arguments: &Value, parameter: &str) -> Result<String, CallError> {
    let path = normalize_path(required_str(function, arguments, parameter)?);
    if path.is_empty() || escapes_root(&path) {
        return Err(CallError::InvalidPath {
            parameter: parameter.to_string(),
        });
    }
    Ok(path)
}

//! Error taxonomy surfaced to callers of the editor
//!
//! Internal plumbing uses `anyhow` with context; everything that crosses the
//! editor boundary is converted into an [`EditorError`].

use std::io;
use std::path::Path;
use thiserror::Error;

/// Failures reported back to the agent driving the editor.
#[derive(Error, Debug)]
pub enum EditorError {
    /// A command was issued without one of its required arguments.
    #[error("Parameter `{parameter}` is required for command: {command}.")]
    MissingParameter { command: String, parameter: String },

    /// An argument was present but unusable.
    #[error("Invalid `{parameter}` parameter: {value}.{}", hint_suffix(.hint))]
    InvalidParameter {
        parameter: String,
        value: String,
        hint: Option<String>,
    },

    #[error("No replacement was performed, old_str `{old_str}` did not appear verbatim in {path}.")]
    NoMatch { old_str: String, path: String },

    #[error(
        "No replacement was performed. Multiple occurrences of old_str `{old_str}` in lines {lines:?}. Please ensure it is unique."
    )]
    AmbiguousMatch { old_str: String, lines: Vec<usize> },

    #[error("No edit history found for {path}.")]
    NoHistory { path: String },

    /// Generic operation failure (I/O, unrecognized command, ...).
    #[error("{0}")]
    Tool(String),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!(" {}", h),
        None => String::new(),
    }
}

impl EditorError {
    pub fn missing(command: &str, parameter: &str) -> Self {
        EditorError::MissingParameter {
            command: command.to_string(),
            parameter: parameter.to_string(),
        }
    }

    pub fn invalid(parameter: &str, value: impl ToString, hint: impl Into<String>) -> Self {
        EditorError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            hint: Some(hint.into()),
        }
    }
}

impl From<anyhow::Error> for EditorError {
    fn from(err: anyhow::Error) -> Self {
        // Keep an already-typed error intact when it travelled through anyhow
        match err.downcast::<EditorError>() {
            Ok(typed) => typed,
            Err(err) => {
                let hint = err
                    .chain()
                    .find_map(|cause| cause.downcast_ref::<io::Error>())
                    .and_then(io_hint);
                match hint {
                    Some(h) => EditorError::Tool(format!("{:#}\n\n{}", err, h)),
                    None => EditorError::Tool(format!("{:#}", err)),
                }
            }
        }
    }
}

pub type EditorResult<T> = std::result::Result<T, EditorError>;

/// Check if an IO error is a permission denied error
pub fn is_permission_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

/// Check if an IO error is a "not found" error
pub fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

fn io_hint(err: &io::Error) -> Option<String> {
    if is_permission_denied(err) {
        Some(
            "Possible fixes:\n\
             1. Check file permissions with `ls -l`\n\
             2. Make sure the parent directory is writable, temporary files are created next to the target"
                .to_string(),
        )
    } else if is_not_found(err) {
        Some(
            "Possible fixes:\n\
             1. Check the path is correct and absolute\n\
             2. The file may have been moved or deleted since the last command"
                .to_string(),
        )
    } else {
        None
    }
}

/// Build the suggestion shown when a relative path is supplied
pub fn relative_path_hint(path: &Path) -> String {
    let suggested = std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| Path::new("/").join(path));
    format!(
        "The path should be an absolute path, starting with `/`. Maybe you meant {}?",
        suggested.display()
    )
}

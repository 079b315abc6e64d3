//! Request and command representation
//!
//! Requests arrive as loosely-typed JSON objects ([`ToolRequest`]). The
//! command name is resolved to a [`CommandKind`] when the request is parsed,
//! and the request is turned into the closed [`Command`] enum once its
//! path has been validated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::EditorError;

pub const TOOL_NAME: &str = "agentedit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    View,
    Create,
    StrReplace,
    Insert,
    UndoEdit,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::View,
        CommandKind::Create,
        CommandKind::StrReplace,
        CommandKind::Insert,
        CommandKind::UndoEdit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::View => "view",
            CommandKind::Create => "create",
            CommandKind::StrReplace => "str_replace",
            CommandKind::Insert => "insert",
            CommandKind::UndoEdit => "undo_edit",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = CommandKind::ALL.iter().map(|k| k.as_str()).collect();
                EditorError::Tool(format!(
                    "Unrecognized command {}. The allowed commands for the {} tool are: {}",
                    s,
                    TOOL_NAME,
                    allowed.join(", ")
                ))
            })
    }
}

/// A request as sent by the agent, before per-command validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub command: String,
    pub path: String,
    #[serde(default)]
    pub file_text: Option<String>,
    #[serde(default)]
    pub view_range: Option<Vec<i64>>,
    #[serde(default)]
    pub old_str: Option<String>,
    #[serde(default)]
    pub new_str: Option<String>,
    #[serde(default)]
    pub insert_line: Option<i64>,
    #[serde(default)]
    pub enable_linting: bool,
}

impl ToolRequest {
    /// Parse one JSON request
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        serde_json::from_str(json)
            .map_err(|e| EditorError::Tool(format!("Malformed request: {}", e)))
    }

    pub fn kind(&self) -> Result<CommandKind, EditorError> {
        self.command.parse()
    }

    /// Check required arguments and build the typed command
    pub fn into_command(self) -> Result<Command, EditorError> {
        let kind = self.kind()?;
        let path = PathBuf::from(&self.path);

        match kind {
            CommandKind::View => Ok(Command::View {
                path,
                view_range: self.view_range,
            }),
            CommandKind::Create => {
                let file_text = self
                    .file_text
                    .ok_or_else(|| EditorError::missing(kind.as_str(), "file_text"))?;
                Ok(Command::Create { path, file_text })
            }
            CommandKind::StrReplace => {
                let old_str = self
                    .old_str
                    .ok_or_else(|| EditorError::missing(kind.as_str(), "old_str"))?;
                Ok(Command::StrReplace {
                    path,
                    old_str,
                    // An absent new_str deletes the matched text
                    new_str: self.new_str.unwrap_or_default(),
                    enable_linting: self.enable_linting,
                })
            }
            CommandKind::Insert => {
                let insert_line = self
                    .insert_line
                    .ok_or_else(|| EditorError::missing(kind.as_str(), "insert_line"))?;
                let new_str = self
                    .new_str
                    .ok_or_else(|| EditorError::missing(kind.as_str(), "new_str"))?;
                Ok(Command::Insert {
                    path,
                    insert_line,
                    new_str,
                    enable_linting: self.enable_linting,
                })
            }
            CommandKind::UndoEdit => Ok(Command::UndoEdit { path }),
        }
    }
}

/// One fully-specified editor command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    View {
        path: PathBuf,
        view_range: Option<Vec<i64>>,
    },
    Create {
        path: PathBuf,
        file_text: String,
    },
    StrReplace {
        path: PathBuf,
        old_str: String,
        new_str: String,
        enable_linting: bool,
    },
    Insert {
        path: PathBuf,
        insert_line: i64,
        new_str: String,
        enable_linting: bool,
    },
    UndoEdit {
        path: PathBuf,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::View { .. } => CommandKind::View,
            Command::Create { .. } => CommandKind::Create,
            Command::StrReplace { .. } => CommandKind::StrReplace,
            Command::Insert { .. } => CommandKind::Insert,
            Command::UndoEdit { .. } => CommandKind::UndoEdit,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            Command::View { path, .. }
            | Command::Create { path, .. }
            | Command::StrReplace { path, .. }
            | Command::Insert { path, .. }
            | Command::UndoEdit { path } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in CommandKind::ALL {
            assert_eq!(kind.as_str().parse::<CommandKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unrecognized_command() {
        let err = "delete".parse::<CommandKind>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unrecognized command delete"));
        assert!(msg.contains("view, create, str_replace, insert, undo_edit"));
    }

    #[test]
    fn test_parse_view_request() {
        let req = ToolRequest::from_json(r#"{"command":"view","path":"/tmp/a","view_range":[1,-1]}"#)
            .unwrap();
        assert_eq!(
            req.into_command().unwrap(),
            Command::View {
                path: PathBuf::from("/tmp/a"),
                view_range: Some(vec![1, -1]),
            }
        );
    }

    #[test]
    fn test_missing_parameters() {
        let req = ToolRequest::from_json(r#"{"command":"create","path":"/tmp/a"}"#).unwrap();
        assert!(matches!(
            req.into_command(),
            Err(EditorError::MissingParameter { ref parameter, .. }) if parameter == "file_text"
        ));

        let req = ToolRequest::from_json(r#"{"command":"insert","path":"/tmp/a","new_str":"x"}"#)
            .unwrap();
        assert!(matches!(
            req.into_command(),
            Err(EditorError::MissingParameter { ref parameter, .. }) if parameter == "insert_line"
        ));

        let req = ToolRequest::from_json(r#"{"command":"str_replace","path":"/tmp/a"}"#).unwrap();
        assert!(matches!(
            req.into_command(),
            Err(EditorError::MissingParameter { ref command, .. }) if command == "str_replace"
        ));
    }

    #[test]
    fn test_str_replace_defaults_new_str() {
        let req = ToolRequest::from_json(r#"{"command":"str_replace","path":"/tmp/a","old_str":"x"}"#)
            .unwrap();
        match req.into_command().unwrap() {
            Command::StrReplace { new_str, enable_linting, .. } => {
                assert_eq!(new_str, "");
                assert!(!enable_linting);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ToolRequest::from_json("{not json"),
            Err(EditorError::Tool(_))
        ));
    }
}

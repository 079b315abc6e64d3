//! agentedit: a line-oriented file editor driven by structured requests
//!
//! The library exposes the editor engine for the `agentedit` binary and for
//! integration and property tests. The binary is at src/main.rs.

pub mod cli;
pub mod command;
pub mod config;
pub mod disk_space;
pub mod editor;
pub mod error;
pub mod file_access;
pub mod formatter;
pub mod history;
pub mod linter;
pub mod listing;
pub mod logger;

// Re-export commonly used types for convenience
pub use command::{Command, CommandKind, ToolRequest};
pub use config::Config;
pub use editor::{Editor, ToolResult};
pub use error::{EditorError, EditorResult};
pub use file_access::{FileAccess, LineReader};
pub use formatter::OutputFormatter;
pub use history::{HistoryStore, Snapshot, SnapshotMetadata};
pub use linter::{CommandLinter, LintResult, Linter};
pub use listing::{DirectoryLister, FindLister, Listing};

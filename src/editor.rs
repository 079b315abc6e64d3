//! Command engine
//!
//! An [`Editor`] validates each request against the filesystem, hands the
//! actual reading and rewriting to [`FileAccess`], records undo snapshots in
//! its [`HistoryStore`] and renders the text shown back to the agent.
//!
//! Mutations follow one order: capture a snapshot, rewrite the file, push the
//! snapshot. A failed rewrite drops the snapshot (and its backing file) and
//! leaves both the target and the history untouched.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::command::{Command, CommandKind, ToolRequest};
use crate::config::{self, Config};
use crate::error::{EditorError, EditorResult, relative_path_hint};
use crate::file_access::FileAccess;
use crate::formatter::{DIRECTORY_CONTENT_TRUNCATED_NOTICE, OutputFormatter};
use crate::history::HistoryStore;
use crate::linter::{self, CommandLinter, Linter};
use crate::listing::{self, DirectoryLister, FindLister};

pub const DEFAULT_SNIPPET_CONTEXT_WINDOW: usize = 4;

const REVIEW_NOTICE: &str =
    "Review the changes and make sure they are as expected. Edit the file again if necessary.";
const INSERT_REVIEW_NOTICE: &str = "Review the changes and make sure they are as expected (correct indentation, no duplicate lines, etc). Edit the file again if necessary.";

/// Outcome of one command, serialized as one JSON object per response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub path: String,
    pub prev_exist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
}

impl ToolResult {
    fn new(path: &Path, output: String) -> Self {
        Self {
            output,
            error: None,
            path: path.display().to_string(),
            prev_exist: true,
            old_content: None,
            new_content: None,
        }
    }

    pub fn from_error(path: &str, err: &EditorError) -> Self {
        Self {
            output: String::new(),
            error: Some(err.to_string()),
            path: path.to_string(),
            prev_exist: !path.is_empty() && Path::new(path).exists(),
            old_content: None,
            new_content: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub struct Editor {
    files: FileAccess,
    history: HistoryStore,
    formatter: OutputFormatter,
    snippet_context_window: usize,
    lister: Box<dyn DirectoryLister>,
    linter: Option<Box<dyn Linter>>,
}

impl Editor {
    /// Editor with default settings, a scoped history directory and no linter
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            files: FileAccess::default(),
            history: HistoryStore::new()?,
            formatter: OutputFormatter::default(),
            snippet_context_window: DEFAULT_SNIPPET_CONTEXT_WINDOW,
            lister: Box::new(FindLister::default()),
            linter: None,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let settings = &config.editor;

        let history = match &config.history.dir {
            Some(dir) => HistoryStore::with_directory(config::expand_home(dir))?,
            None => HistoryStore::new()?,
        }
        .with_max_disk_usage(config.history.max_disk_usage_percent);

        let linter: Option<Box<dyn Linter>> = match &config.lint.command {
            Some(command) => match CommandLinter::new(command, config.lint.args.clone()) {
                Ok(linter) => Some(Box::new(linter)),
                Err(e) => {
                    tracing::warn!(error = %format!("{:#}", e), "linting disabled");
                    None
                }
            },
            None => None,
        };

        tracing::debug!(
            history = %history.dir().display(),
            chunk_size_kb = settings.chunk_size_kb,
            in_memory_threshold_kb = settings.in_memory_threshold_kb,
            "editor configured"
        );

        Ok(Self {
            files: FileAccess::new(
                settings.chunk_size_bytes(),
                settings.in_memory_threshold_bytes(),
            ),
            history,
            formatter: OutputFormatter::new(settings.max_response_len, settings.tab_size),
            snippet_context_window: settings.snippet_context_window,
            lister: Box::new(FindLister::new(Duration::from_secs(config.shell.timeout_secs))),
            linter,
        })
    }

    pub fn with_file_access(mut self, files: FileAccess) -> Self {
        self.files = files;
        self
    }

    pub fn with_formatter(mut self, formatter: OutputFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = history;
        self
    }

    pub fn with_snippet_context_window(mut self, lines: usize) -> Self {
        self.snippet_context_window = lines;
        self
    }

    pub fn with_lister(mut self, lister: Box<dyn DirectoryLister>) -> Self {
        self.lister = lister;
        self
    }

    pub fn with_linter(mut self, linter: Box<dyn Linter>) -> Self {
        self.linter = Some(linter);
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Run one request; failures are reported inside the result
    pub fn handle(&mut self, request: ToolRequest) -> ToolResult {
        let path = request.path.clone();
        let command = request.command.clone();

        match self.try_handle(request) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(command = %command, path = %path, error = %err, "command failed");
                ToolResult::from_error(&path, &err)
            }
        }
    }

    /// Parse and run one JSON request
    pub fn handle_json(&mut self, json: &str) -> ToolResult {
        match ToolRequest::from_json(json) {
            Ok(request) => self.handle(request),
            Err(err) => {
                tracing::warn!(error = %err, "rejected request");
                ToolResult::from_error("", &err)
            }
        }
    }

    fn try_handle(&mut self, request: ToolRequest) -> EditorResult<ToolResult> {
        let kind = request.kind()?;
        validate_path(kind, Path::new(&request.path))?;
        let command = request.into_command()?;
        self.dispatch(command)
    }

    /// Validate and run an already-typed command
    pub fn execute(&mut self, command: Command) -> EditorResult<ToolResult> {
        validate_path(command.kind(), command.path())?;
        self.dispatch(command)
    }

    fn dispatch(&mut self, command: Command) -> EditorResult<ToolResult> {
        match command {
            Command::View { path, view_range } => self.view(&path, view_range.as_deref()),
            Command::Create { path, file_text } => self.create(&path, &file_text),
            Command::StrReplace {
                path,
                old_str,
                new_str,
                enable_linting,
            } => {
                if old_str == new_str {
                    return Err(EditorError::invalid(
                        "new_str",
                        &new_str,
                        "No replacement was performed. `new_str` and `old_str` must be different.",
                    ));
                }
                if old_str.is_empty() {
                    return Err(EditorError::invalid(
                        "old_str",
                        "",
                        "No replacement was performed. `old_str` must not be empty.",
                    ));
                }
                self.str_replace(&path, &old_str, &new_str, enable_linting)
            }
            Command::Insert {
                path,
                insert_line,
                new_str,
                enable_linting,
            } => self.insert(&path, insert_line, &new_str, enable_linting),
            Command::UndoEdit { path } => self.undo_edit(&path),
        }
    }

    fn view(&self, path: &Path, view_range: Option<&[i64]>) -> EditorResult<ToolResult> {
        // An empty range means the whole file
        let view_range = view_range.filter(|range| !range.is_empty());

        if path.is_dir() {
            if let Some(range) = view_range {
                return Err(EditorError::invalid(
                    "view_range",
                    format!("{:?}", range),
                    "The `view_range` parameter is not allowed when `path` points to a directory.",
                ));
            }
            return self.view_directory(path);
        }

        let description = path.display().to_string();
        let output = match view_range {
            None => self.render_lines(path, None, None, &description, 1)?,
            Some(range) => {
                let (start, end) = self.check_view_range(path, range)?;
                self.render_lines(path, Some(start), end, &description, start)?
            }
        };

        tracing::info!(path = %path.display(), range = ?view_range, "viewed file");
        Ok(ToolResult::new(path, output))
    }

    /// Resolve `[start, end]` against the file, `-1` meaning the last line
    fn check_view_range(&self, path: &Path, range: &[i64]) -> EditorResult<(usize, Option<usize>)> {
        let shown = format!("{:?}", range);
        let &[start, end] = range else {
            return Err(EditorError::invalid(
                "view_range",
                shown,
                "It should be a list of two integers.",
            ));
        };

        let num_lines = self.files.count_lines(path)? as i64;

        if start < 1 || start > num_lines {
            return Err(EditorError::invalid(
                "view_range",
                shown,
                format!(
                    "Its first element `{}` should be within the range of lines of the file: [1, {}].",
                    start, num_lines
                ),
            ));
        }

        if end > num_lines {
            return Err(EditorError::invalid(
                "view_range",
                shown,
                format!(
                    "Its second element `{}` should be smaller than the number of lines in the file: `{}`.",
                    end, num_lines
                ),
            ));
        }

        if end != -1 && end < start {
            return Err(EditorError::invalid(
                "view_range",
                shown,
                format!(
                    "Its second element `{}` should be greater than or equal to the first element `{}`.",
                    end, start
                ),
            ));
        }

        let end = if end == -1 { None } else { Some(end as usize) };
        Ok((start as usize, end))
    }

    fn view_directory(&self, path: &Path) -> EditorResult<ToolResult> {
        let hidden = listing::count_hidden_entries(path)?;
        let listing = self.lister.list(path)?;
        let stdout = self
            .formatter
            .maybe_truncate(&listing.stdout, DIRECTORY_CONTENT_TRUNCATED_NOTICE);

        if !listing.stderr.is_empty() {
            return Ok(ToolResult {
                error: Some(listing.stderr),
                ..ToolResult::new(path, stdout)
            });
        }

        let mut output = format!(
            "Here's the files and directories up to 2 levels deep in {}, excluding hidden items:\n{}",
            path.display(),
            stdout
        );
        if hidden > 0 {
            output.push_str(&format!(
                "\n\n{} hidden files/directories in this directory are excluded. You can use 'ls -la {}' to see them.",
                hidden,
                path.display()
            ));
        }

        tracing::info!(path = %path.display(), hidden, "listed directory");
        Ok(ToolResult::new(path, output))
    }

    fn create(&mut self, path: &Path, file_text: &str) -> EditorResult<ToolResult> {
        self.files.write_file(path, file_text)?;

        // The created content is the first history entry for this path
        let snapshot = match self.history.capture(path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let _ = fs::remove_file(path);
                return Err(e.into());
            }
        };
        self.history.push(path, snapshot);

        tracing::info!(path = %path.display(), bytes = file_text.len(), "created file");
        Ok(ToolResult {
            prev_exist: false,
            new_content: Some(file_text.to_string()),
            ..ToolResult::new(path, format!("File created successfully at: {}", path.display()))
        })
    }

    fn str_replace(
        &mut self,
        path: &Path,
        old_str: &str,
        new_str: &str,
        enable_linting: bool,
    ) -> EditorResult<ToolResult> {
        let old_str = self.formatter.expand_tabs(old_str);
        let new_str = self.formatter.expand_tabs(new_str);

        let occurrences = self.files.find_literal(path, &old_str)?;
        if occurrences.is_empty() {
            return Err(no_match(old_str, path));
        }
        if occurrences.len() > 1 {
            return Err(EditorError::AmbiguousMatch {
                old_str,
                lines: occurrences,
            });
        }
        let line = occurrences[0];

        let snapshot = self.history.capture(path)?;
        if !self.files.replace_literal(path, &old_str, &new_str)? {
            // The file changed between the scan and the rewrite
            return Err(no_match(old_str, path));
        }
        self.history.push(path, snapshot);

        // The edit has landed, nothing below may fail the command
        let window = self.snippet_context_window;
        let start = line.saturating_sub(window).max(1);
        let end = line + window + new_str.matches('\n').count();
        let old_end = line + window + old_str.matches('\n').count();
        let (snippet, old_content, new_content) = self.describe_edit(path, start, end, old_end);

        let mut output = format!("The file {} has been edited. ", path.display());
        output.push_str(&self.formatter.make_output_from_text(
            &snippet,
            &format!("a snippet of {}", path.display()),
            start,
        ));
        if enable_linting {
            self.append_lint_report(&mut output, path);
        }
        output.push_str(REVIEW_NOTICE);

        tracing::info!(path = %path.display(), line, "replaced text");
        Ok(ToolResult {
            old_content: Some(old_content),
            new_content: Some(new_content),
            ..ToolResult::new(path, output)
        })
    }

    fn insert(
        &mut self,
        path: &Path,
        insert_line: i64,
        new_str: &str,
        enable_linting: bool,
    ) -> EditorResult<ToolResult> {
        let num_lines = self.files.count_lines(path)?;
        let insert_line = usize::try_from(insert_line)
            .ok()
            .filter(|line| *line <= num_lines)
            .ok_or_else(|| {
                EditorError::invalid(
                    "insert_line",
                    insert_line,
                    format!("It should be within the range of lines of the file: [0, {}]", num_lines),
                )
            })?;

        let new_str = self.formatter.expand_tabs(new_str);

        let snapshot = self.history.capture(path)?;
        self.files.insert_text(path, insert_line, &new_str)?;
        self.history.push(path, snapshot);

        let window = self.snippet_context_window;
        let start = insert_line.saturating_sub(window).max(1);
        let end = insert_line + window + new_str.split('\n').count();
        let (snippet, old_content, new_content) =
            self.describe_edit(path, start, end, insert_line + window);

        let mut output = format!("The file {} has been edited. ", path.display());
        output.push_str(&self.formatter.make_output_from_text(
            &snippet,
            "a snippet of the edited file",
            start,
        ));
        if enable_linting {
            self.append_lint_report(&mut output, path);
        }
        output.push_str(INSERT_REVIEW_NOTICE);

        tracing::info!(path = %path.display(), insert_line, "inserted text");
        Ok(ToolResult {
            old_content: Some(old_content),
            new_content: Some(new_content),
            ..ToolResult::new(path, output)
        })
    }

    fn undo_edit(&mut self, path: &Path) -> EditorResult<ToolResult> {
        let snapshot = self.history.pop(path)?;

        // Any failure before the restore lands puts the snapshot back
        let current = match self.preview(path) {
            Ok(current) => current,
            Err(e) => {
                self.history.push(path, snapshot);
                return Err(e);
            }
        };
        if let Err(e) = self.files.restore_from(path, snapshot.backing_path()) {
            self.history.push(path, snapshot);
            return Err(e.into());
        }
        let id = snapshot.metadata().id.clone();
        drop(snapshot);

        let (restored, listing) = self.describe_restore(path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "could not render restored file");
            (String::new(), String::new())
        });

        tracing::info!(path = %path.display(), snapshot = %id, "undid last edit");
        Ok(ToolResult {
            old_content: Some(current),
            new_content: Some(restored),
            ..ToolResult::new(
                path,
                format!("Last edit to {} undone successfully. {}", path.display(), listing),
            )
        })
    }

    fn render_lines(
        &self,
        path: &Path,
        start: Option<usize>,
        end: Option<usize>,
        description: &str,
        first_line: usize,
    ) -> EditorResult<String> {
        let lines = self
            .files
            .read_lines(path, start, end)?
            .map(|line| line.map(|(_, text)| text));
        Ok(self.formatter.make_output(lines, description, first_line)?)
    }

    /// Lines `[start, end]` of `path` joined with `\n`, decoded lossily
    fn read_window(&self, path: &Path, start: usize, end: usize) -> anyhow::Result<String> {
        let lines = self
            .files
            .read_lines_lossy(path, Some(start), Some(end))?
            .map(|line| line.map(|(_, text)| text))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(lines.join("\n"))
    }

    /// `(snippet, old_content, new_content)` for an edit that already landed
    ///
    /// Reporting never fails the command: a read error is logged and leaves
    /// the affected parts empty.
    fn describe_edit(
        &self,
        path: &Path,
        start: usize,
        end: usize,
        old_end: usize,
    ) -> (String, String, String) {
        let described = self.read_window(path, start, end).and_then(|snippet| {
            let (old_content, new_content) = self.edit_contents(path, start, old_end, &snippet)?;
            Ok((snippet, old_content, new_content))
        });
        described.unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "could not render edit");
            (String::new(), String::new(), String::new())
        })
    }

    /// `(content, cat -n listing)` of a file just restored by undo
    fn describe_restore(&self, path: &Path) -> anyhow::Result<(String, String)> {
        let restored = if self.files.fits_in_memory(path)? {
            self.files.read_text_lossy(path)?
        } else {
            self.files.read_head(path, self.formatter.max_response_len())?.0
        };
        let lines = self
            .files
            .read_lines_lossy(path, None, None)?
            .map(|line| line.map(|(_, text)| text));
        let listing = self
            .formatter
            .make_output(lines, &path.display().to_string(), 1)?;
        Ok((restored, listing))
    }

    /// Whole file for small files, a bounded prefix otherwise
    fn preview(&self, path: &Path) -> EditorResult<String> {
        if self.files.fits_in_memory(path)? {
            return Ok(self.files.read_text(path)?);
        }
        let (head, _) = self
            .files
            .read_head(path, self.formatter.max_response_len())?;
        Ok(head)
    }

    /// `(old_content, new_content)` of the edit just recorded for `path`
    ///
    /// Small files report both versions in full. Above the in-memory
    /// threshold only the edited windows are reported: `[start, old_end]` of
    /// the snapshot and the already rendered new snippet.
    fn edit_contents(
        &self,
        path: &Path,
        start: usize,
        old_end: usize,
        new_snippet: &str,
    ) -> anyhow::Result<(String, String)> {
        let snapshot = self
            .history
            .latest(path)
            .ok_or_else(|| anyhow::anyhow!("No edit history found for {}.", path.display()))?;

        if snapshot.metadata().size < self.files.in_memory_threshold()
            && self.files.fits_in_memory(path)?
        {
            return Ok((
                self.files.read_text_lossy(snapshot.backing_path())?,
                self.files.read_text_lossy(path)?,
            ));
        }

        tracing::debug!(path = %path.display(), "large file, reporting edited windows only");
        let old_window = self.read_window(snapshot.backing_path(), start, old_end)?;
        Ok((old_window, new_snippet.to_string()))
    }

    fn append_lint_report(&self, output: &mut String, path: &Path) {
        if let Some(report) = self.lint_report(path) {
            output.push('\n');
            output.push_str(&report);
            output.push('\n');
        }
    }

    /// Lint the latest edit of `path`; `None` when no linter is configured
    fn lint_report(&self, path: &Path) -> Option<String> {
        let Some(linter) = self.linter.as_deref() else {
            tracing::debug!(path = %path.display(), "linting requested without a linter");
            return None;
        };
        let snapshot = self.history.latest(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        // The edit has already landed, so a broken linter only degrades the report
        match linter::run_linting(linter, snapshot.backing_path(), path, &file_name) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "linting failed");
                Some(format!("Linting failed: {:#}", e))
            }
        }
    }
}

/// Check that the path/command combination is valid
fn validate_path(kind: CommandKind, path: &Path) -> EditorResult<()> {
    if !path.is_absolute() {
        return Err(EditorError::invalid("path", path.display(), relative_path_hint(path)));
    }

    let exists = path.exists();
    if kind == CommandKind::Create && exists {
        return Err(EditorError::invalid(
            "path",
            path.display(),
            format!(
                "File already exists at: {}. Cannot overwrite files using command `create`.",
                path.display()
            ),
        ));
    }
    if kind != CommandKind::Create && !exists {
        return Err(EditorError::invalid(
            "path",
            path.display(),
            format!("The path {} does not exist. Please provide a valid path.", path.display()),
        ));
    }
    if kind != CommandKind::View && path.is_dir() {
        return Err(EditorError::invalid(
            "path",
            path.display(),
            format!(
                "The path {} is a directory and only the `view` command can be used on directories.",
                path.display()
            ),
        ));
    }

    Ok(())
}

fn no_match(old_str: String, path: &Path) -> EditorError {
    EditorError::NoMatch {
        old_str,
        path: path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linter::LintResult;
    use crate::listing::Listing;
    use tempfile::TempDir;

    struct StaticLister(Listing);

    impl DirectoryLister for StaticLister {
        fn list(&self, _dir: &Path) -> anyhow::Result<Listing> {
            Ok(self.0.clone())
        }
    }

    /// Flags every line containing "TODO"
    struct TodoLinter;

    impl Linter for TodoLinter {
        fn lint(&self, path: &Path) -> anyhow::Result<Vec<LintResult>> {
            let text = fs::read_to_string(path)?;
            Ok(text
                .lines()
                .enumerate()
                .filter(|(_, line)| line.contains("TODO"))
                .map(|(i, _)| LintResult {
                    line: i + 1,
                    column: 1,
                    message: "unresolved TODO".to_string(),
                })
                .collect())
        }
    }

    fn setup() -> (Editor, TempDir) {
        (Editor::new().unwrap(), TempDir::new().unwrap())
    }

    fn request(command: &str, path: &Path) -> ToolRequest {
        ToolRequest {
            command: command.to_string(),
            path: path.display().to_string(),
            file_text: None,
            view_range: None,
            old_str: None,
            new_str: None,
            insert_line: None,
            enable_linting: false,
        }
    }

    fn create(editor: &mut Editor, path: &Path, text: &str) -> ToolResult {
        editor.handle(ToolRequest {
            file_text: Some(text.to_string()),
            ..request("create", path)
        })
    }

    fn replace(editor: &mut Editor, path: &Path, old: &str, new: &str) -> ToolResult {
        editor.handle(ToolRequest {
            old_str: Some(old.to_string()),
            new_str: Some(new.to_string()),
            ..request("str_replace", path)
        })
    }

    fn insert(editor: &mut Editor, path: &Path, line: i64, text: &str) -> ToolResult {
        editor.handle(ToolRequest {
            insert_line: Some(line),
            new_str: Some(text.to_string()),
            ..request("insert", path)
        })
    }

    fn view_range(editor: &mut Editor, path: &Path, range: Vec<i64>) -> ToolResult {
        editor.handle(ToolRequest {
            view_range: Some(range),
            ..request("view", path)
        })
    }

    fn error_of(result: &ToolResult) -> &str {
        result.error.as_deref().expect("expected an error result")
    }

    #[test]
    fn test_create_then_view() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");

        let result = create(&mut editor, &file, "hello\nworld\n");
        assert!(!result.is_error(), "{:?}", result.error);
        assert!(!result.prev_exist);
        assert_eq!(result.output, format!("File created successfully at: {}", file.display()));
        assert_eq!(result.new_content.as_deref(), Some("hello\nworld\n"));

        let result = editor.handle(request("view", &file));
        assert_eq!(
            result.output,
            format!(
                "Here's the result of running `cat -n` on {}:\n     1\thello\n     2\tworld\n",
                file.display()
            )
        );
    }

    #[test]
    fn test_str_replace_unique_match() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        create(&mut editor, &file, "hello\nworld\n");

        let result = replace(&mut editor, &file, "world", "earth");
        assert!(!result.is_error(), "{:?}", result.error);
        assert_eq!(fs::read_to_string(&file).unwrap(), "hello\nearth\n");
        assert!(result
            .output
            .starts_with(&format!("The file {} has been edited. ", file.display())));
        assert!(result.output.contains(&format!("a snippet of {}", file.display())));
        assert!(result.output.contains("     2\tearth"));
        assert!(result.output.ends_with(REVIEW_NOTICE));
        assert_eq!(result.old_content.as_deref(), Some("hello\nworld\n"));
        assert_eq!(result.new_content.as_deref(), Some("hello\nearth\n"));
        assert_eq!(editor.history().depth(&file), 2);
    }

    #[test]
    fn test_str_replace_no_match_leaves_file_untouched() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "alpha\nbeta\n").unwrap();

        let result = replace(&mut editor, &file, "gamma", "delta");
        assert_eq!(
            error_of(&result),
            format!(
                "No replacement was performed, old_str `gamma` did not appear verbatim in {}.",
                file.display()
            )
        );
        assert_eq!(fs::read_to_string(&file).unwrap(), "alpha\nbeta\n");
        assert_eq!(editor.history().depth(&file), 0);
    }

    #[test]
    fn test_str_replace_ambiguous_lists_lines() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "x = 1\ny = 2\nx = 1\n").unwrap();

        let result = replace(&mut editor, &file, "x = 1", "x = 3");
        let err = error_of(&result);
        assert!(err.contains("Multiple occurrences of old_str `x = 1` in lines [1, 3]"), "{}", err);
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1\ny = 2\nx = 1\n");
        assert_eq!(editor.history().depth(&file), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1, "temp file left behind");
    }

    #[test]
    fn test_str_replace_rejects_identical_and_empty() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "same\n").unwrap();

        let result = replace(&mut editor, &file, "same", "same");
        assert_eq!(
            error_of(&result),
            "Invalid `new_str` parameter: same. No replacement was performed. `new_str` and `old_str` must be different."
        );

        let result = replace(&mut editor, &file, "", "x");
        assert!(error_of(&result).starts_with("Invalid `old_str` parameter"));
        assert_eq!(fs::read_to_string(&file).unwrap(), "same\n");
    }

    #[test]
    fn test_str_replace_missing_new_str_deletes() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "keep drop keep\n").unwrap();

        let result = editor.handle(ToolRequest {
            old_str: Some(" drop".to_string()),
            ..request("str_replace", &file)
        });
        assert!(!result.is_error(), "{:?}", result.error);
        assert_eq!(fs::read_to_string(&file).unwrap(), "keep keep\n");
    }

    #[test]
    fn test_str_replace_expands_tabs_in_arguments() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.py");
        fs::write(&file, "def f():\n        return 1\n").unwrap();

        let result = replace(&mut editor, &file, "\treturn 1", "\treturn 2");
        assert!(!result.is_error(), "{:?}", result.error);
        assert_eq!(fs::read_to_string(&file).unwrap(), "def f():\n        return 2\n");
    }

    #[test]
    fn test_insert_and_undo_restore_exact_bytes() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a\nb\nc").unwrap();

        let result = insert(&mut editor, &file, 1, "mid");
        assert!(!result.is_error(), "{:?}", result.error);
        assert_eq!(fs::read_to_string(&file).unwrap(), "a\nmid\nb\nc");
        assert!(result.output.contains("a snippet of the edited file"));
        assert!(result.output.contains("     2\tmid"));
        assert!(result.output.ends_with(INSERT_REVIEW_NOTICE));

        let result = editor.handle(request("undo_edit", &file));
        assert!(!result.is_error(), "{:?}", result.error);
        assert_eq!(fs::read_to_string(&file).unwrap(), "a\nb\nc");
        assert!(result
            .output
            .starts_with(&format!("Last edit to {} undone successfully. ", file.display())));
        assert_eq!(result.old_content.as_deref(), Some("a\nmid\nb\nc"));
        assert_eq!(result.new_content.as_deref(), Some("a\nb\nc"));
        assert_eq!(editor.history().depth(&file), 0);
    }

    #[test]
    fn test_insert_at_start_and_end() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "one\ntwo\n").unwrap();

        insert(&mut editor, &file, 0, "zero");
        assert_eq!(fs::read_to_string(&file).unwrap(), "zero\none\ntwo\n");

        insert(&mut editor, &file, 3, "three");
        assert_eq!(fs::read_to_string(&file).unwrap(), "zero\none\ntwo\nthree\n");
    }

    #[test]
    fn test_insert_out_of_range() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a\nb\nc").unwrap();

        for line in [-1, 4] {
            let result = insert(&mut editor, &file, line, "x");
            assert_eq!(
                error_of(&result),
                format!(
                    "Invalid `insert_line` parameter: {}. It should be within the range of lines of the file: [0, 3]",
                    line
                )
            );
        }
        assert_eq!(fs::read_to_string(&file).unwrap(), "a\nb\nc");
        assert_eq!(editor.history().depth(&file), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1, "temp file left behind");
    }

    #[test]
    fn test_insert_expands_tabs_only_in_new_text() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "\told\n").unwrap();

        insert(&mut editor, &file, 1, "\tnew");
        assert_eq!(fs::read_to_string(&file).unwrap(), "\told\n        new\n");
    }

    #[test]
    fn test_non_utf8_file_is_not_edited() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("latin1.txt");
        let original: &[u8] = b"caf\xe9\nold\n";
        fs::write(&file, original).unwrap();

        let result = replace(&mut editor, &file, "old", "new");
        assert!(error_of(&result).contains("is not valid UTF-8 text"), "{}", error_of(&result));
        assert_eq!(fs::read(&file).unwrap(), original);
        assert_eq!(editor.history().depth(&file), 0);

        let result = insert(&mut editor, &file, 2, "x");
        assert!(error_of(&result).contains("is not valid UTF-8 text"), "{}", error_of(&result));
        assert_eq!(fs::read(&file).unwrap(), original);
        assert_eq!(editor.history().depth(&file), 0);

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1, "temp file left behind");
        assert_eq!(fs::read_dir(editor.history().dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_view_range_validation() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        let text: String = (1..=10).map(|i| format!("line {}\n", i)).collect();
        fs::write(&file, &text).unwrap();

        let result = view_range(&mut editor, &file, vec![5, 3]);
        assert_eq!(
            error_of(&result),
            "Invalid `view_range` parameter: [5, 3]. Its second element `3` should be greater than or equal to the first element `5`."
        );

        let result = view_range(&mut editor, &file, vec![0, 3]);
        assert!(error_of(&result)
            .contains("Its first element `0` should be within the range of lines of the file: [1, 10]."));

        let result = view_range(&mut editor, &file, vec![2, 11]);
        assert!(error_of(&result).contains(
            "Its second element `11` should be smaller than the number of lines in the file: `10`."
        ));

        let result = view_range(&mut editor, &file, vec![1, 2, 3]);
        assert!(error_of(&result).contains("It should be a list of two integers."));

        assert_eq!(fs::read_to_string(&file).unwrap(), text);
    }

    #[test]
    fn test_view_range_window() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        let text: String = (1..=10).map(|i| format!("line {}\n", i)).collect();
        fs::write(&file, &text).unwrap();

        let result = view_range(&mut editor, &file, vec![3, 4]);
        assert!(result.output.ends_with("     3\tline 3\n     4\tline 4\n"));

        let result = view_range(&mut editor, &file, vec![9, -1]);
        assert!(result.output.ends_with("     9\tline 9\n    10\tline 10\n"));
    }

    #[test]
    fn test_view_directory() {
        let (editor, dir) = setup();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        let listing = Listing {
            stdout: format!("{0}\n{0}/a.txt", dir.path().display()),
            stderr: String::new(),
        };
        let mut editor = editor.with_lister(Box::new(StaticLister(listing)));

        let result = editor.handle(request("view", dir.path()));
        assert!(!result.is_error(), "{:?}", result.error);
        assert!(result.output.starts_with(&format!(
            "Here's the files and directories up to 2 levels deep in {}, excluding hidden items:\n",
            dir.path().display()
        )));
        assert!(result.output.contains("/a.txt"));
        assert!(result
            .output
            .contains("1 hidden files/directories in this directory are excluded."));

        let result = view_range(&mut editor, dir.path(), vec![1, 2]);
        assert!(error_of(&result).contains("is not allowed when `path` points to a directory"));
    }

    #[test]
    fn test_view_directory_reports_listing_errors_inline() {
        let (editor, dir) = setup();
        let listing = Listing {
            stdout: String::new(),
            stderr: "find: permission denied".to_string(),
        };
        let mut editor = editor.with_lister(Box::new(StaticLister(listing)));

        let result = editor.handle(request("view", dir.path()));
        assert_eq!(result.error.as_deref(), Some("find: permission denied"));
        assert!(result.output.is_empty());
    }

    #[test]
    fn test_path_validation() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "x\n").unwrap();

        let result = editor.handle(request("view", Path::new("relative.txt")));
        assert!(error_of(&result).contains("The path should be an absolute path, starting with `/`."));

        let result = create(&mut editor, &file, "y");
        assert!(error_of(&result).contains(&format!(
            "File already exists at: {}. Cannot overwrite files using command `create`.",
            file.display()
        )));

        let missing = dir.path().join("missing.txt");
        let result = editor.handle(request("view", &missing));
        assert!(error_of(&result).contains("does not exist. Please provide a valid path."));

        let result = replace(&mut editor, dir.path(), "a", "b");
        assert!(error_of(&result).contains("only the `view` command can be used on directories"));
    }

    #[test]
    fn test_missing_parameter_and_unknown_command() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("new.txt");

        let result = editor.handle(request("create", &file));
        assert_eq!(error_of(&result), "Parameter `file_text` is required for command: create.");
        assert!(!file.exists());

        let result = editor.handle_json(&format!(
            r#"{{"command":"delete","path":"{}"}}"#,
            file.display()
        ));
        assert!(error_of(&result).starts_with("Unrecognized command delete."));
    }

    #[test]
    fn test_undo_without_history() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");
        fs::write(&file, "x").unwrap();

        let result = editor.handle(request("undo_edit", &file));
        assert_eq!(
            error_of(&result),
            format!("No edit history found for {}.", file.display())
        );
    }

    #[test]
    fn test_undo_stack_unwinds_in_order() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");

        create(&mut editor, &file, "v0\n");
        replace(&mut editor, &file, "v0", "v1");
        replace(&mut editor, &file, "v1", "v2");
        assert_eq!(editor.history().depth(&file), 3);

        editor.handle(request("undo_edit", &file));
        assert_eq!(fs::read_to_string(&file).unwrap(), "v1\n");
        editor.handle(request("undo_edit", &file));
        assert_eq!(fs::read_to_string(&file).unwrap(), "v0\n");

        // Undo after create keeps the created content
        let result = editor.handle(request("undo_edit", &file));
        assert!(!result.is_error());
        assert_eq!(fs::read_to_string(&file).unwrap(), "v0\n");

        let result = editor.handle(request("undo_edit", &file));
        assert!(result.is_error());
    }

    #[test]
    fn test_large_file_reports_windows_only() {
        let dir = TempDir::new().unwrap();
        let mut editor = Editor::new()
            .unwrap()
            .with_file_access(FileAccess::streaming(64));
        let file = dir.path().join("big.txt");
        let text: String = (1..=100).map(|i| format!("line {}\n", i)).collect();
        fs::write(&file, &text).unwrap();

        let result = replace(&mut editor, &file, "line 50\n", "LINE 50\n");
        assert!(!result.is_error(), "{:?}", result.error);

        let old = result.old_content.unwrap();
        let new = result.new_content.unwrap();
        assert!(old.starts_with("line 46\n"));
        assert!(old.contains("line 50"));
        assert!(!old.contains("line 1\n"));
        assert!(new.contains("LINE 50"));
        assert!(!new.contains("line 10\n"));
        assert_eq!(fs::read_to_string(&file).unwrap(), text.replace("line 50\n", "LINE 50\n"));
    }

    #[test]
    fn test_linting_reports_new_issues() {
        let (editor, dir) = setup();
        let mut editor = editor.with_linter(Box::new(TodoLinter));
        let file = dir.path().join("a.py");
        fs::write(&file, "x = 1\n").unwrap();

        let result = editor.handle(ToolRequest {
            old_str: Some("x = 1".to_string()),
            new_str: Some("x = 2  # TODO".to_string()),
            enable_linting: true,
            ..request("str_replace", &file)
        });
        assert!(result
            .output
            .contains("Linting issues found in the changes:\n- Line 1, Column 1: unresolved TODO"));

        let result = editor.handle(ToolRequest {
            insert_line: Some(1),
            new_str: Some("y = 3".to_string()),
            enable_linting: true,
            ..request("insert", &file)
        });
        assert!(result.output.contains("No linting issues found in the changes."));
    }

    #[test]
    fn test_linting_skipped_without_linter() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.py");
        fs::write(&file, "x = 1\n").unwrap();

        let result = editor.handle(ToolRequest {
            old_str: Some("x = 1".to_string()),
            new_str: Some("x = 2".to_string()),
            enable_linting: true,
            ..request("str_replace", &file)
        });
        assert!(!result.is_error());
        assert!(!result.output.contains("Linting"));
    }

    #[test]
    fn test_execute_typed_command() {
        let (mut editor, dir) = setup();
        let file = dir.path().join("a.txt");

        editor
            .execute(Command::Create {
                path: file.clone(),
                file_text: "one\n".to_string(),
            })
            .unwrap();
        let err = editor
            .execute(Command::Create {
                path: file.clone(),
                file_text: "two\n".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, EditorError::InvalidParameter { ref parameter, .. } if parameter == "path"));
    }

    #[test]
    fn test_result_serialization_omits_absent_fields() {
        let result = ToolResult::new(Path::new("/tmp/x"), "ok".to_string());
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"output":"ok","path":"/tmp/x","prev_exist":true}"#);
    }
}

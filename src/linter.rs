//! Linting of edits
//!
//! The linter itself is an external program. Only diagnostics introduced by
//! an edit are reported: those on lines the edit touched, or messages the
//! file did not produce before.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{DiffTag, TextDiff};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

/// `file:line:column: message`, the format most linters can emit
static DIAGNOSTIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>.+?):(?P<line>\d+):(?P<col>\d+):\s*(?P<msg>.+)$")
        .expect("diagnostic pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintResult {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub trait Linter {
    /// Lint one file
    fn lint(&self, path: &Path) -> Result<Vec<LintResult>>;

    /// Diagnostics of `new` that the change from `old` introduced
    fn lint_file_diff(&self, old: &Path, new: &Path) -> Result<Vec<LintResult>> {
        let before = self.lint(old)?;
        let after = self.lint(new)?;
        let touched = changed_lines(old, new)?;
        let known: HashSet<&str> = before.iter().map(|r| r.message.as_str()).collect();

        Ok(after
            .into_iter()
            .filter(|r| touched.contains(&r.line) || !known.contains(r.message.as_str()))
            .collect())
    }
}

/// Lines of `new` (1-indexed) that differ from `old`
pub fn changed_lines(old: &Path, new: &Path) -> Result<BTreeSet<usize>> {
    let old_text =
        fs::read_to_string(old).with_context(|| format!("Failed to read file: {}", old.display()))?;
    let new_text =
        fs::read_to_string(new).with_context(|| format!("Failed to read file: {}", new.display()))?;

    let diff = TextDiff::from_lines(&old_text, &new_text);
    let mut lines = BTreeSet::new();
    for op in diff.ops() {
        match op.tag() {
            DiffTag::Equal => {}
            // A deletion touches the line that now follows it
            DiffTag::Delete => {
                lines.insert(op.new_range().start + 1);
            }
            DiffTag::Insert | DiffTag::Replace => {
                lines.extend(op.new_range().map(|i| i + 1));
            }
        }
    }
    Ok(lines)
}

/// Runs an external linter and parses `file:line:column: message` output
#[derive(Debug, Clone)]
pub struct CommandLinter {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLinter {
    pub fn new(command: &str, args: Vec<String>) -> Result<Self> {
        let program =
            which::which(command).with_context(|| format!("Linter `{}` not found in PATH", command))?;
        Ok(Self { program, args })
    }
}

impl Linter for CommandLinter {
    fn lint(&self, path: &Path) -> Result<Vec<LintResult>> {
        // Linters exit non-zero when they report issues, so the status is ignored
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run linter {}", self.program.display()))?;

        Ok(parse_diagnostics(&String::from_utf8_lossy(&output.stdout)))
    }
}

pub fn parse_diagnostics(output: &str) -> Vec<LintResult> {
    output
        .lines()
        .filter_map(|line| {
            let caps = DIAGNOSTIC_RE.captures(line)?;
            Some(LintResult {
                line: caps["line"].parse().ok()?,
                column: caps["col"].parse().ok()?,
                message: caps["msg"].trim().to_string(),
            })
        })
        .collect()
}

/// Lint the change from `before` to `after` and describe the outcome
///
/// Both versions are copied into a scratch directory as `old.<name>` and
/// `new.<name>` so linters that key off the extension still work.
pub fn run_linting(linter: &dyn Linter, before: &Path, after: &Path, file_name: &str) -> Result<String> {
    let scratch = tempfile::TempDir::new().context("Failed to create lint directory")?;
    let old_copy = scratch.path().join(format!("old.{}", file_name));
    let new_copy = scratch.path().join(format!("new.{}", file_name));

    fs::copy(before, &old_copy).with_context(|| format!("Failed to copy {}", before.display()))?;
    fs::copy(after, &new_copy).with_context(|| format!("Failed to copy {}", after.display()))?;

    let results = linter.lint_file_diff(&old_copy, &new_copy)?;
    Ok(format_lint_results(&results))
}

pub fn format_lint_results(results: &[LintResult]) -> String {
    if results.is_empty() {
        return "No linting issues found in the changes.".to_string();
    }

    let mut output = vec!["Linting issues found in the changes:".to_string()];
    for r in results {
        output.push(format!("- Line {}, Column {}: {}", r.line, r.column, r.message));
    }
    output.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Flags every line containing "TODO"
    struct TodoLinter;

    impl Linter for TodoLinter {
        fn lint(&self, path: &Path) -> Result<Vec<LintResult>> {
            let text = fs::read_to_string(path)?;
            Ok(text
                .lines()
                .enumerate()
                .filter_map(|(i, line)| {
                    line.find("TODO").map(|col| LintResult {
                        line: i + 1,
                        column: col + 1,
                        message: format!("todo left in code: {}", line.trim()),
                    })
                })
                .collect())
        }
    }

    #[test]
    fn test_parse_diagnostics() {
        let out = "/tmp/new.x.py:3:7: F821 undefined name 'foo'\nnot a diagnostic\nsrc/a.rs:10:1:   trailing space\n";
        let results = parse_diagnostics(out);
        assert_eq!(
            results,
            vec![
                LintResult {
                    line: 3,
                    column: 7,
                    message: "F821 undefined name 'foo'".to_string()
                },
                LintResult {
                    line: 10,
                    column: 1,
                    message: "trailing space".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_changed_lines() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::write(&old, "a\nb\nc\n").unwrap();
        fs::write(&new, "a\nB\nc\nd\n").unwrap();

        let lines: Vec<usize> = changed_lines(&old, &new).unwrap().into_iter().collect();
        assert_eq!(lines, vec![2, 4]);
    }

    #[test]
    fn test_lint_file_diff_reports_only_new_issues() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        fs::write(&old, "x = 1  # TODO old\ny = 2\n").unwrap();
        fs::write(&new, "x = 1  # TODO old\ny = 3  # TODO new\n").unwrap();

        let results = TodoLinter.lint_file_diff(&old, &new).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].line, 2);
    }

    #[test]
    fn test_run_linting_formats_results() {
        let dir = TempDir::new().unwrap();
        let before = dir.path().join("before.py");
        let after = dir.path().join("after.py");
        fs::write(&before, "a\n").unwrap();
        fs::write(&after, "a\n# TODO\n").unwrap();

        let text = run_linting(&TodoLinter, &before, &after, "f.py").unwrap();
        assert!(text.starts_with("Linting issues found in the changes:"));
        assert!(text.contains("- Line 2, Column 3: todo left in code: # TODO"));

        let text = run_linting(&TodoLinter, &before, &before, "f.py").unwrap();
        assert_eq!(text, "No linting issues found in the changes.");
    }

    #[test]
    fn test_missing_linter_program() {
        assert!(CommandLinter::new("definitely-not-a-real-linter-xyz", Vec::new()).is_err());
    }
}

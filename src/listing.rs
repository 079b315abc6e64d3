//! Directory listing used by `view` on a directory
//!
//! Listing is delegated to `find`, run with a timeout. Its stderr is handed
//! back to the caller inline rather than raised as an error.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Raw output of a listing run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub stdout: String,
    pub stderr: String,
}

/// Lists a directory up to two levels deep, hidden entries excluded
pub trait DirectoryLister {
    fn list(&self, dir: &Path) -> Result<Listing>;
}

/// [`DirectoryLister`] backed by the `find` utility
#[derive(Debug, Clone)]
pub struct FindLister {
    timeout: Duration,
}

impl Default for FindLister {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl FindLister {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl DirectoryLister for FindLister {
    fn list(&self, dir: &Path) -> Result<Listing> {
        let find = which::which("find").context("The `find` utility is required to list directories")?;

        // Output goes to files so a chatty child can never block on a full pipe
        let mut stdout_file = tempfile::tempfile().context("Failed to create temp file")?;
        let mut stderr_file = tempfile::tempfile().context("Failed to create temp file")?;

        let mut child = Command::new(&find)
            .arg("-L")
            .arg(dir)
            .args(["-maxdepth", "2"])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone()?))
            .stderr(Stdio::from(stderr_file.try_clone()?))
            .spawn()
            .with_context(|| format!("Failed to run {}", find.display()))?;

        let started = Instant::now();
        loop {
            if child.try_wait().context("Failed to wait for find")?.is_some() {
                break;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(dir = %dir.display(), "directory listing timed out");
                return Ok(Listing {
                    stdout: String::new(),
                    stderr: format!(
                        "Listing {} timed out after {} seconds",
                        dir.display(),
                        self.timeout.as_secs()
                    ),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }

        let stdout = read_back(&mut stdout_file)?;
        let stderr = read_back(&mut stderr_file)?;

        let mut entries: Vec<&str> = stdout
            .lines()
            .filter(|line| !is_hidden_below(dir, Path::new(line)))
            .collect();
        entries.sort_unstable();

        Ok(Listing {
            stdout: entries.join("\n"),
            stderr: stderr.trim_end().to_string(),
        })
    }
}

fn read_back(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Whether any component of `entry` below `dir` is a dotfile
fn is_hidden_below(dir: &Path, entry: &Path) -> bool {
    match entry.strip_prefix(dir) {
        Ok(rel) => rel.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        }),
        Err(_) => false,
    }
}

/// Number of hidden entries directly inside `dir`
pub fn count_hidden_entries(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))? {
        if entry?.file_name().to_string_lossy().starts_with('.') {
            count += 1;
        }
    }
    Ok(count)
}

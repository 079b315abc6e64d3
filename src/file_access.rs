//! Line-indexed, bounded-memory file access
//!
//! Every primitive here reads the target in fixed-size chunks so peak memory
//! stays independent of file size. Files below the in-memory threshold take a
//! whole-buffer fast path with identical observable behavior.
//!
//! Rewrites always go through a temp file created next to the target and are
//! persisted with an atomic rename. The temp file is removed on every other
//! exit path when its `NamedTempFile` handle is dropped.

use anyhow::{Context, Result, bail};
use memchr::{memchr_iter, memmem};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024; // 1MB
pub const DEFAULT_IN_MEMORY_THRESHOLD: u64 = 1024 * 1024; // 1MB

/// Tunables for chunked file access
#[derive(Debug, Clone)]
pub struct FileAccess {
    chunk_size: usize,
    in_memory_threshold: u64,
}

impl Default for FileAccess {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_IN_MEMORY_THRESHOLD)
    }
}

/// A piece of the scanned stream: either unmatched bytes or one occurrence
/// of the needle.
enum Piece<'a> {
    Text(&'a [u8]),
    Match,
}

impl FileAccess {
    pub fn new(chunk_size: usize, in_memory_threshold: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            in_memory_threshold,
        }
    }

    /// Access that never takes the in-memory fast path
    pub fn streaming(chunk_size: usize) -> Self {
        Self::new(chunk_size, 0)
    }

    pub fn in_memory_threshold(&self) -> u64 {
        self.in_memory_threshold
    }

    /// Check if a file is small enough for whole-buffer processing
    pub fn fits_in_memory(&self, path: &Path) -> Result<bool> {
        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;
        Ok(metadata.len() < self.in_memory_threshold)
    }

    /// Count lines in one pass. A trailing line without a terminator still
    /// counts; an empty file has zero lines.
    pub fn count_lines(&self, path: &Path) -> Result<usize> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

        let mut chunk = vec![0u8; self.chunk_size];
        let mut count = 0;
        let mut last_byte = None;

        loop {
            let n = read_chunk(&mut file, &mut chunk)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            if n == 0 {
                break;
            }
            count += memchr_iter(b'\n', &chunk[..n]).count();
            last_byte = Some(chunk[n - 1]);
        }

        match last_byte {
            Some(b) if b != b'\n' => Ok(count + 1),
            _ => Ok(count),
        }
    }

    /// Lazily read lines `[start, end]` (1-indexed, inclusive)
    ///
    /// Lines before `start` are skipped without being retained and iteration
    /// stops once `end` has been produced.
    pub fn read_lines(
        &self,
        path: &Path,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Result<LineReader> {
        self.open_lines(path, start, end, false)
    }

    /// Like [`read_lines`](Self::read_lines), but bytes that are not valid
    /// UTF-8 are replaced with U+FFFD instead of ending iteration
    pub fn read_lines_lossy(
        &self,
        path: &Path,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Result<LineReader> {
        self.open_lines(path, start, end, true)
    }

    fn open_lines(
        &self,
        path: &Path,
        start: Option<usize>,
        end: Option<usize>,
        lossy: bool,
    ) -> Result<LineReader> {
        let file =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        let mut reader = BufReader::with_capacity(self.chunk_size.min(64 * 1024), file);

        let start = start.unwrap_or(1).max(1);
        skip_lines(&mut reader, start - 1)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        Ok(LineReader {
            reader,
            path: path.to_path_buf(),
            next_line: start,
            end,
            buf: Vec::new(),
            lossy,
            done: false,
        })
    }

    /// Line numbers on which each occurrence of `needle` begins
    ///
    /// Occurrences are non-overlapping and scanned left to right, so the
    /// result has one entry per occurrence (a line holding two matches is
    /// listed twice). The needle may span several lines.
    pub fn find_literal(&self, path: &Path, needle: &str) -> Result<Vec<usize>> {
        if needle.is_empty() {
            bail!("Cannot search for an empty string in {}", path.display());
        }

        if self.fits_in_memory(path)? {
            tracing::debug!(path = %path.display(), "find_literal: in-memory fast path");
            let data =
                fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
            return Ok(literal_lines_in(&data, needle.as_bytes()));
        }

        self.find_literal_chunked(path, needle, self.chunk_size)
    }

    /// Chunked scan with an explicit chunk size, regardless of file size
    pub fn find_literal_chunked(
        &self,
        path: &Path,
        needle: &str,
        chunk_size: usize,
    ) -> Result<Vec<usize>> {
        if needle.is_empty() {
            bail!("Cannot search for an empty string in {}", path.display());
        }

        let file =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

        let needle_lines = memchr_iter(b'\n', needle.as_bytes()).count();
        let mut line = 1;
        let mut lines = Vec::new();

        scan_literal(file, needle.as_bytes(), chunk_size, |piece| {
            match piece {
                Piece::Text(text) => line += memchr_iter(b'\n', text).count(),
                Piece::Match => {
                    lines.push(line);
                    line += needle_lines;
                }
            }
            Ok(())
        })
        .with_context(|| format!("Failed to scan file: {}", path.display()))?;

        Ok(lines)
    }

    /// Replace every occurrence of `old` with `new`
    ///
    /// The rewritten content is persisted over `path` only when at least one
    /// replacement happened; otherwise the file is left untouched. Returns
    /// whether a replacement occurred.
    pub fn replace_literal(&self, path: &Path, old: &str, new: &str) -> Result<bool> {
        if old.is_empty() {
            bail!("Cannot replace an empty string in {}", path.display());
        }

        if self.fits_in_memory(path)? {
            tracing::debug!(path = %path.display(), "replace_literal: in-memory fast path");
            let data =
                fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
            let mut validator = Utf8Validator::default();
            validator
                .feed(&data)
                .and_then(|_| validator.finish())
                .with_context(|| format!("Failed to rewrite file: {}", path.display()))?;
            if memmem::find(&data, old.as_bytes()).is_none() {
                return Ok(false);
            }
            let replaced = replace_all_in(&data, old.as_bytes(), new.as_bytes());
            self.write_bytes(path, &replaced)?;
            return Ok(true);
        }

        self.replace_literal_chunked(path, old, new, self.chunk_size)
    }

    /// Streaming replacement with an explicit chunk size
    pub fn replace_literal_chunked(
        &self,
        path: &Path,
        old: &str,
        new: &str,
        chunk_size: usize,
    ) -> Result<bool> {
        if old.is_empty() {
            bail!("Cannot replace an empty string in {}", path.display());
        }

        let input =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        let mut temp_file = temp_sibling(path)?;
        let mut validator = Utf8Validator::default();
        let mut replaced = false;

        // Write using a separate block to ensure writer is dropped before persist
        {
            let mut writer = BufWriter::new(temp_file.as_file_mut());

            scan_literal(input, old.as_bytes(), chunk_size, |piece| {
                match piece {
                    Piece::Text(text) => {
                        validator.feed(text)?;
                        writer.write_all(text)?;
                    }
                    Piece::Match => {
                        validator.feed(old.as_bytes())?;
                        writer.write_all(new.as_bytes())?;
                        replaced = true;
                    }
                }
                Ok(())
            })
            .and_then(|_| validator.finish())
            .with_context(|| format!("Failed to rewrite file: {}", path.display()))?;

            writer.flush().context("Failed to flush temp file")?;
        }

        if !replaced {
            // temp_file is removed on drop
            return Ok(false);
        }

        persist_over(temp_file, path)?;
        Ok(true)
    }

    /// Insert `text` as whole lines after line `after_line` (0 means before
    /// the first line). Whether the file ends with a newline is preserved.
    pub fn insert_text(&self, path: &Path, after_line: usize, text: &str) -> Result<()> {
        let input =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        let mut reader = BufReader::with_capacity(self.chunk_size.min(64 * 1024), input);
        let mut temp_file = temp_sibling(path)?;
        let mut validator = Utf8Validator::default();
        let not_text = || format!("Failed to rewrite file: {}", path.display());

        {
            let mut writer = BufWriter::new(temp_file.as_file_mut());
            let mut line = Vec::new();
            let mut copied = 0;
            let mut terminated = true;

            while copied < after_line {
                line.clear();
                let n = reader
                    .read_until(b'\n', &mut line)
                    .with_context(|| format!("Failed to read file: {}", path.display()))?;
                if n == 0 {
                    break;
                }
                validator.feed(&line).with_context(not_text)?;
                writer.write_all(&line)?;
                terminated = line.last() == Some(&b'\n');
                copied += 1;
            }

            if !terminated {
                writer.write_all(b"\n")?;
            }
            writer.write_all(text.as_bytes())?;

            let has_rest = !reader
                .fill_buf()
                .with_context(|| format!("Failed to read file: {}", path.display()))?
                .is_empty();

            if has_rest {
                writer.write_all(b"\n")?;
                loop {
                    let rest = reader.fill_buf().with_context(|| {
                        format!("Failed to copy remaining lines of {}", path.display())
                    })?;
                    if rest.is_empty() {
                        break;
                    }
                    validator.feed(rest).with_context(not_text)?;
                    writer.write_all(rest)?;
                    let n = rest.len();
                    reader.consume(n);
                }
            } else if copied > 0 && terminated {
                writer.write_all(b"\n")?;
            }
            validator.finish().with_context(not_text)?;

            writer.flush().context("Failed to flush temp file")?;
        }

        persist_over(temp_file, path)
    }

    /// Atomically write `text` to `path`
    pub fn write_file(&self, path: &Path, text: &str) -> Result<()> {
        self.write_bytes(path, text.as_bytes())
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut temp_file = temp_sibling(path)?;
        temp_file
            .write_all(bytes)
            .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
        persist_over(temp_file, path)
    }

    /// Atomically replace the content of `path` with the bytes of `source`
    pub fn restore_from(&self, path: &Path, source: &Path) -> Result<()> {
        let mut input = File::open(source)
            .with_context(|| format!("Failed to open snapshot: {}", source.display()))?;
        let mut temp_file = temp_sibling(path)?;
        io::copy(&mut input, temp_file.as_file_mut())
            .with_context(|| format!("Failed to copy snapshot into {}", path.display()))?;
        persist_over(temp_file, path)
    }

    /// Read at most `max_bytes` from the start of a file
    ///
    /// Returns the text (cut at a character boundary) and whether the file
    /// was longer than the limit.
    pub fn read_head(&self, path: &Path, max_bytes: usize) -> Result<(String, bool)> {
        let file =
            File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        let mut buf = Vec::with_capacity(max_bytes.min(self.chunk_size));
        file.take(max_bytes as u64 + 1)
            .read_to_end(&mut buf)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let truncated = buf.len() > max_bytes;
        buf.truncate(max_bytes);

        let text = match String::from_utf8(buf) {
            Ok(text) => text,
            Err(e) => {
                let valid = e.utf8_error().valid_up_to();
                if !truncated || e.utf8_error().error_len().is_some() {
                    bail!("File is not valid UTF-8 text: {}", path.display());
                }
                let mut bytes = e.into_bytes();
                bytes.truncate(valid);
                // Cut inside a multi-byte character at the limit
                String::from_utf8(bytes)
                    .with_context(|| format!("File is not valid UTF-8 text: {}", path.display()))?
            }
        };

        Ok((text, truncated))
    }

    /// Read a whole file as text
    pub fn read_text(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
    }

    /// Read a whole file, replacing invalid UTF-8 with U+FFFD
    pub fn read_text_lossy(&self, path: &Path) -> Result<String> {
        let data =
            fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}

/// Lazy `(line_number, line_text)` iterator produced by [`FileAccess::read_lines`]
pub struct LineReader {
    reader: BufReader<File>,
    path: PathBuf,
    next_line: usize,
    end: Option<usize>,
    buf: Vec<u8>,
    lossy: bool,
    done: bool,
}

impl Iterator for LineReader {
    type Item = Result<(usize, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(end) = self.end {
            if self.next_line > end {
                self.done = true;
                return None;
            }
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                }
                let line_number = self.next_line;
                self.next_line += 1;
                if self.lossy {
                    let text = String::from_utf8_lossy(&self.buf).into_owned();
                    return Some(Ok((line_number, text)));
                }
                match String::from_utf8(std::mem::take(&mut self.buf)) {
                    Ok(text) => Some(Ok((line_number, text))),
                    Err(_) => {
                        self.done = true;
                        Some(Err(anyhow::anyhow!(
                            "Line {} of {} is not valid UTF-8 text",
                            line_number,
                            self.path.display()
                        )))
                    }
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(anyhow::Error::new(e)
                    .context(format!("Failed to read line from {}", self.path.display()))))
            }
        }
    }
}

/// Fill `buf` as far as one read allows, retrying on interruption
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Incremental UTF-8 check over a byte stream split at arbitrary points
///
/// A character cut by a chunk boundary is held in `pending` until the next
/// piece completes it.
#[derive(Default)]
struct Utf8Validator {
    pending: Vec<u8>,
    newlines: usize,
}

impl Utf8Validator {
    fn feed(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !self.pending.is_empty() {
            let Some((&first, rest)) = bytes.split_first() else {
                return Ok(());
            };
            self.pending.push(first);
            bytes = rest;
            match std::str::from_utf8(&self.pending) {
                Ok(_) => self.pending.clear(),
                Err(e) if e.error_len().is_some() => return Err(self.invalid()),
                Err(_) => {}
            }
        }

        match std::str::from_utf8(bytes) {
            Ok(_) => {
                self.newlines += memchr_iter(b'\n', bytes).count();
                Ok(())
            }
            Err(e) => {
                let valid = e.valid_up_to();
                self.newlines += memchr_iter(b'\n', &bytes[..valid]).count();
                if e.error_len().is_some() {
                    return Err(self.invalid());
                }
                self.pending.extend_from_slice(&bytes[valid..]);
                Ok(())
            }
        }
    }

    /// Fails when the stream ended inside a character
    fn finish(&self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    fn invalid(&self) -> anyhow::Error {
        anyhow::anyhow!("Line {} is not valid UTF-8 text", self.newlines + 1)
    }
}

/// Advance past `count` line terminators without retaining the skipped bytes
fn skip_lines<R: BufRead>(reader: &mut R, mut count: usize) -> io::Result<()> {
    while count > 0 {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(());
        }

        let mut consumed = available.len();
        for pos in memchr_iter(b'\n', available) {
            count -= 1;
            if count == 0 {
                consumed = pos + 1;
                break;
            }
        }
        reader.consume(consumed);
    }
    Ok(())
}

/// Split a stream into unmatched text and needle occurrences
///
/// The window keeps `needle.len() - 1` trailing bytes across chunk
/// boundaries: a match starting earlier than that would already fit in the
/// window, so none is missed and none is reported twice.
fn scan_literal<R: Read>(
    mut reader: R,
    needle: &[u8],
    chunk_size: usize,
    mut sink: impl FnMut(Piece<'_>) -> Result<()>,
) -> Result<()> {
    debug_assert!(!needle.is_empty());

    let finder = memmem::Finder::new(needle);
    let keep = needle.len() - 1;
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut window: Vec<u8> = Vec::with_capacity(chunk.len() + keep);

    loop {
        let n = read_chunk(&mut reader, &mut chunk)?;
        let eof = n == 0;
        window.extend_from_slice(&chunk[..n]);

        let mut written = 0;
        while let Some(pos) = finder.find(&window[written..]) {
            let start = written + pos;
            sink(Piece::Text(&window[written..start]))?;
            sink(Piece::Match)?;
            written = start + needle.len();
        }

        if eof {
            sink(Piece::Text(&window[written..]))?;
            return Ok(());
        }

        let safe = written.max(window.len().saturating_sub(keep));
        sink(Piece::Text(&window[written..safe]))?;
        window.drain(..safe);
    }
}

/// Whole-buffer counterpart of the chunked scan
fn literal_lines_in(data: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut lines = Vec::new();
    let mut line = 1;
    let mut cursor = 0;

    for pos in memmem::find_iter(data, needle) {
        line += memchr_iter(b'\n', &data[cursor..pos]).count();
        lines.push(line);
        cursor = pos;
    }

    lines
}

fn replace_all_in(data: &[u8], old: &[u8], new: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut cursor = 0;
    for pos in memmem::find_iter(data, old) {
        out.extend_from_slice(&data[cursor..pos]);
        out.extend_from_slice(new);
        cursor = pos + old.len();
    }
    out.extend_from_slice(&data[cursor..]);
    out
}

/// Create a temp file in the same directory as `path` (for atomic rename)
fn temp_sibling(path: &Path) -> Result<NamedTempFile> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );

    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent_dir)
        .with_context(|| format!("Failed to create temp file in {}", parent_dir.display()))
}

/// Atomic rename: temp file becomes the actual file
fn persist_over(temp_file: NamedTempFile, path: &Path) -> Result<()> {
    // Keep the target's permissions, temp files are created owner-only
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp_file.path(), metadata.permissions())
            .with_context(|| format!("Failed to copy permissions of {}", path.display()))?;
    }

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to persist temp file to {}", path.display()))?;
    Ok(())
}

//! `cat -n` style rendering of file content under an output ceiling

use anyhow::Result;

pub const DEFAULT_MAX_RESPONSE_LEN: usize = 16000;
pub const DEFAULT_TAB_SIZE: usize = 8;

pub const FILE_CONTENT_TRUNCATED_NOTICE: &str = "<response clipped><NOTE>Only part of this file has been shown because the output limit was reached. \
Search inside the file with `grep -n` to find the line numbers you need, then use `view_range` to view them.</NOTE>";

pub const DIRECTORY_CONTENT_TRUNCATED_NOTICE: &str = "<response clipped><NOTE>Only part of this directory listing has been shown because the output limit was reached. \
Use `ls -la` on a narrower directory to see the rest.</NOTE>";

/// Renders file content the way `cat -n` does, within an output ceiling
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    max_response_len: usize,
    tab_size: usize,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESPONSE_LEN, DEFAULT_TAB_SIZE)
    }
}

impl OutputFormatter {
    pub fn new(max_response_len: usize, tab_size: usize) -> Self {
        Self {
            max_response_len,
            tab_size: tab_size.max(1),
        }
    }

    pub fn max_response_len(&self) -> usize {
        self.max_response_len
    }

    pub fn expand_tabs(&self, text: &str) -> String {
        expand_tabs(text, self.tab_size)
    }

    /// Cut `content` at the output ceiling and append `notice` if it was cut
    pub fn maybe_truncate(&self, content: &str, notice: &str) -> String {
        match content.char_indices().nth(self.max_response_len) {
            Some((idx, _)) => format!("{}{}", &content[..idx], notice),
            None => content.to_string(),
        }
    }

    /// Number a lazily produced sequence of lines starting at `start_line`
    ///
    /// Stops pulling lines as soon as the output ceiling is reached, so a
    /// huge file is never read past what can be shown.
    pub fn make_output<I>(&self, lines: I, description: &str, start_line: usize) -> Result<String>
    where
        I: IntoIterator<Item = Result<String>>,
    {
        let mut output = format!("Here's the result of running `cat -n` on {}:\n", description);
        let mut budget = self.max_response_len;
        let mut line_number = start_line;
        let mut first = true;

        for line in lines {
            let line = line?;
            if !first {
                output.push('\n');
            }
            first = false;

            let rendered = format!("{:6}\t{}", line_number, self.expand_tabs(&line));
            let len = rendered.chars().count();
            if len > budget {
                let cut = rendered
                    .char_indices()
                    .nth(budget)
                    .map(|(idx, _)| idx)
                    .unwrap_or(rendered.len());
                output.push_str(&rendered[..cut]);
                output.push('\n');
                output.push_str(FILE_CONTENT_TRUNCATED_NOTICE);
                break;
            }

            budget -= len;
            output.push_str(&rendered);
            line_number += 1;
        }

        output.push('\n');
        Ok(output)
    }

    /// Same as [`make_output`](Self::make_output) for text already in memory
    pub fn make_output_from_text(&self, text: &str, description: &str, start_line: usize) -> String {
        // Infallible source, the Result is always Ok
        self.make_output(text.split('\n').map(|l| Ok(l.to_string())), description, start_line)
            .unwrap_or_default()
    }
}

/// Replace tabs with spaces up to the next multiple of `tab_size`; the
/// column resets at every line break.
pub fn expand_tabs(text: &str, tab_size: usize) -> String {
    if !text.contains('\t') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for c in text.chars() {
        match c {
            '\t' => {
                let pad = tab_size - (column % tab_size);
                out.extend(std::iter::repeat_n(' ', pad));
                column += pad;
            }
            '\n' | '\r' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "

License: MIT
Rust Edition: 2024"
);

#[derive(Parser)]
#[command(name = "agentedit")]
#[command(about = "Line-oriented file editor driven by structured requests")]
#[command(long_about = "agentedit is a file editing tool meant to be driven by an automated agent.

It exposes five commands over files on the local filesystem and keeps a
per-file undo history for the lifetime of the process. Large files are
streamed, so memory use does not grow with file size.

COMMANDS (sent as JSON requests):
  view         Show a file with line numbers, or list a directory
  create       Create a new file
  str_replace  Replace one unique occurrence of a string
  insert       Insert text after a given line
  undo_edit    Revert the last edit made to a file

EXAMPLES:
  agentedit serve
  agentedit run '{\"command\":\"view\",\"path\":\"/tmp/a.txt\"}'
  agentedit run '{\"command\":\"insert\",\"path\":\"/tmp/a.txt\",\"insert_line\":1,\"new_str\":\"mid\"}'
  echo '{\"command\":\"view\",\"path\":\"/tmp\"}' | agentedit run -")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_version = LONG_VERSION)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file to use instead of ~/.agentedit/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write debug logs regardless of the config file
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON requests from stdin, one per line
    #[command(long_about = "Read one JSON request per line from stdin and write one JSON result per line to stdout.

The undo history is kept for the whole session, so `undo_edit` can revert
edits made by earlier requests. The session ends at end of input.

RESULT FIELDS:
  output       Text to show to the agent
  error        Error message (absent on success)
  path         Path the request referred to
  prev_exist   Whether the file existed before the request
  old_content  Content before the edit (edited region only for large files)
  new_content  Content after the edit (edited region only for large files)")]
    Serve,

    /// Execute a single request and print its output
    #[command(long_about = "Execute a single JSON request and print its output text.

Errors are printed to stderr and the exit status is 1. Pass `-` to read the
request from stdin. Undo history does not outlive the command, use `serve`
for multi-step sessions.")]
    Run {
        /// JSON request, or `-` for stdin
        #[arg(value_name = "REQUEST")]
        request: String,
    },

    /// Show configuration file location
    #[command(long_about = "Show where the configuration file lives, creating it with defaults if missing.

CONFIGURATION OPTIONS:
  [editor]
    snippet_context_window = 4    # Context lines around an edit
    max_response_len = 16000      # Max characters of file content per response
    tab_size = 8                  # Tab stop width
    in_memory_threshold_kb = 1024 # Smaller files are edited in memory
    chunk_size_kb = 1024          # Streaming read buffer size

  [history]
    dir = \"/path\"                 # Snapshot directory (optional)
    max_disk_usage_percent = 60   # Max % of free space per snapshot

  [lint]
    command = \"flake8\"            # Linter program (optional)
    args = []                     # Extra linter arguments

  [shell]
    timeout_secs = 120            # Directory listing timeout

  [logging]
    debug = false                 # Write ~/.agentedit/agentedit.log

EXAMPLES:
  agentedit config                Show the config file path
  agentedit config --show         Print the current configuration")]
    Config {
        /// Print the configuration file contents
        #[arg(long = "show")]
        show: bool,
    },
}

#[derive(Debug)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub debug: bool,
    pub action: Action,
}

#[derive(Debug, PartialEq)]
pub enum Action {
    Serve,
    Run { request: String },
    Config { show: bool },
}

pub fn parse_args() -> Result<Args> {
    from_cli(Cli::parse())
}

fn from_cli(cli: Cli) -> Result<Args> {
    let action = match cli.command {
        Commands::Serve => Action::Serve,
        Commands::Run { request } => Action::Run {
            request: resolve_request(request)?,
        },
        Commands::Config { show } => Action::Config { show },
    };

    Ok(Args {
        config: cli.config,
        debug: cli.debug,
        action,
    })
}

/// `-` reads the request from stdin
fn resolve_request(request: String) -> Result<String> {
    if request != "-" {
        return Ok(request);
    }

    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read request from stdin")?;
    Ok(buf)
}

use agentedit::cli::{Action, Args, parse_args};
use agentedit::{Editor, ToolResult, config, logger};
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let Args {
        config: config_override,
        debug,
        action,
    } = parse_args()?;

    let config_path = match config_override {
        Some(path) => path,
        None => config::config_file_path()?,
    };

    if let Action::Config { show } = action {
        show_config(&config_path, show)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = config::load_config_from(&config_path)?;
    logger::init_debug_logging(debug || config.logging.debug)?;
    let mut editor = Editor::from_config(&config)?;

    match action {
        Action::Serve => {
            serve(&mut editor)?;
            Ok(ExitCode::SUCCESS)
        }
        Action::Run { request } => Ok(run_once(&mut editor, &request)),
        Action::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// One JSON request per input line, one JSON result per output line
fn serve(editor: &mut Editor) -> Result<()> {
    tracing::info!("serving requests from stdin");
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut handled = 0usize;

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read request from stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let result = editor.handle_json(&line);
        serde_json::to_writer(&mut stdout, &result).context("Failed to encode result")?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
        handled += 1;
    }

    tracing::info!(handled, "input closed, session finished");
    Ok(())
}

/// Exit status is 1 when the request failed
fn run_once(editor: &mut Editor, request: &str) -> ExitCode {
    let result = editor.handle_json(request.trim());
    print_result(&result);

    if result.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_result(result: &ToolResult) {
    if !result.output.is_empty() {
        println!("{}", result.output);
    }

    if let Some(error) = &result.error {
        if use_color() {
            eprintln!("{} {}", "Error:".red().bold(), error.red());
        } else {
            eprintln!("Error: {}", error);
        }
    }
}

fn use_color() -> bool {
    // https://no-color.org/
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    io::stderr().is_terminal()
}

fn show_config(config_path: &Path, show: bool) -> Result<()> {
    // Creates the default file when missing and validates it
    config::load_config_from(config_path)?;

    println!("Configuration file: {}", config_path.display());
    println!("Log file: {}", logger::get_current_log_path().display());

    if show {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        println!("\n{}", contents);
    }

    Ok(())
}

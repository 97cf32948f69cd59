use crate::changeset::{AssetInfo, ChangeKind};
use crate::constants::MAX_FILES_TO_SHOW;
use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

#[macro_export]
macro_rules! warning {
    // format string literal (with or without inline formatting)
    ($fmt:literal $(, $($arg:tt)*)?) => {{
        use colored::Colorize;
        use std::io::{self, Write};
        let _ = writeln!(io::stderr(), "{}", format!($fmt $(, $($arg)*)?).yellow());
    }};
    // arbitrary expression (non-literal)
    ($expr:expr) => {{
        use colored::Colorize;
        use std::io::{self, Write};
        let _ = writeln!(io::stderr(), "{}", format!("{}", $expr).yellow());
    }};
}

#[macro_export]
macro_rules! error {
    // format string literal (with or without inline formatting)
    ($fmt:literal $(, $($arg:tt)*)?) => {{
        use colored::Colorize;
        use std::io::{self, Write};
        let _ = writeln!(io::stderr(), "{}", format!($fmt $(, $($arg)*)?).red());
    }};
    // arbitrary expression (non-literal)
    ($expr:expr) => {{
        use colored::Colorize;
        use std::io::{self, Write};
        let _ = writeln!(io::stderr(), "{}", format!("{}", $expr).red());
    }};
}

#[macro_export]
macro_rules! status {
    // format string literal (with or without inline formatting)
    ($fmt:literal $(, $($arg:tt)*)?) => {{
        use colored::Colorize;
        use std::io::{self, Write};
        let _ = writeln!(io::stdout(), "{}", format!($fmt $(, $($arg)*)?).green());
    }};
    // arbitrary expression (non-literal)
    ($expr:expr) => {{
        use colored::Colorize;
        use std::io::{self, Write};
        let _ = writeln!(io::stdout(), "{}", format!("{}", $expr).green());
    }};
}

#[macro_export]
macro_rules! info {
    () => {{
        use std::io::{self, Write};
        let _ = writeln!(io::stdout());
    }};
    // format string literal (with or without inline formatting or args)
    ($fmt:literal $(, $($arg:tt)*)?) => {{
        use std::io::{self, Write};
        let _ = writeln!(io::stdout(), $fmt $(, $($arg)*)?);
    }};
    // arbitrary expression (non-literal)
    ($expr:expr) => {{
        use std::io::{self, Write};
        let _ = writeln!(io::stdout(), "{}", $expr);
    }};
}

/// one display line for a change, e.g. "S  R old.png → new.png"
pub fn describe(asset: &AssetInfo) -> String {
    let entry = &asset.entry;
    let path = asset.project_path.as_deref().unwrap_or(&entry.path);
    let kind = entry.kind.status_char();
    match (&entry.original_path, entry.kind) {
        (Some(from), ChangeKind::Renamed) => {
            format!("{} {kind} {from} → {path}", entry.stage_marker())
        }
        (Some(to), _) => format!("{} {kind} {path} (→ {to})", entry.stage_marker()),
        (None, _) => format!("{} {kind} {path}", entry.stage_marker()),
    }
}

/// print the change list, marking entries staged by this tool
pub fn print_changes<F>(assets: &[AssetInfo], is_owned: F)
where
    F: Fn(&str) -> bool,
{
    use colored::Colorize;

    if assets.is_empty() {
        status!("no changes");
        return;
    }

    for asset in assets.iter().take(MAX_FILES_TO_SHOW) {
        let line = describe(asset);
        if asset.entry.is_staged && !is_owned(&asset.entry.path) {
            // staged by something else
            info!("{}", line.yellow());
        } else if asset.entry.is_staged {
            info!("{}", line.green());
        } else {
            info!(line);
        }
    }

    if assets.len() > MAX_FILES_TO_SHOW {
        let remaining = assets.len() - MAX_FILES_TO_SHOW;
        info!("(+{} more)", remaining);
    }
}

/// steady-ticking spinner on stderr; hidden when stderr is not a terminal
pub fn spinner(message: &str) -> ProgressBar {
    use std::io::IsTerminal;

    let spinner = if std::io::stderr().is_terminal() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn first_char(option: &str) -> Result<char> {
    option
        .chars()
        .next()
        .context("prompt options cannot be empty strings")
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

pub fn prompt(options: &[&str]) -> Result<String> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
        terminal::{disable_raw_mode, enable_raw_mode},
    };
    use std::io::{self, Write};

    if options.is_empty() {
        bail!("prompt requires at least one option");
    }

    // build prompt string like "[Y]ES/[n]o/[m]aybe"
    let mut prompt_parts = Vec::with_capacity(options.len());
    let mut valid_chars = Vec::with_capacity(options.len());
    for opt in options {
        let first = first_char(opt)?;
        let rest = &opt[first.len_utf8()..];
        prompt_parts.push(format!("[{first}]{rest}"));
        valid_chars.push(lower(first));
    }

    // print the prompt
    print!("{} ? ", prompt_parts.join("/"));
    let _ = io::stdout().flush();

    // enable raw mode for single-character input
    enable_raw_mode().context("this command requires an interactive terminal")?;

    loop {
        // read a key event
        if let Ok(Event::Key(KeyEvent {
            code, modifiers, ..
        })) = event::read()
        {
            match code {
                KeyCode::Esc => {
                    disable_raw_mode().ok();
                    info!("^C");
                    std::process::exit(1);
                }
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    disable_raw_mode().ok();
                    info!("^C");
                    std::process::exit(1);
                }
                // enter picks the first option
                KeyCode::Enter => {
                    disable_raw_mode().ok();
                    info!(options[0]);
                    break Ok(valid_chars[0].to_string());
                }
                KeyCode::Char(c) => {
                    let c = lower(c);
                    if let Some(idx) = valid_chars.iter().position(|&ch| ch == c) {
                        disable_raw_mode().ok();
                        info!(options[idx]);
                        break Ok(c.to_string());
                    }
                }
                _ => {}
            }
        }
    }
}

/// show a result the user has to acknowledge; skipped without a terminal
pub fn acknowledge(message: &str) -> Result<()> {
    use std::io::IsTerminal;

    for line in message.lines() {
        status!(line);
    }
    if std::io::stdin().is_terminal() && std::io::stdout().is_terminal() {
        prompt(&["ok"])?;
    }
    Ok(())
}

pub fn edit_one_line(line: &str) -> Result<String> {
    use rustyline::DefaultEditor;

    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;

    // show the prompt and pre-filled text
    if let Ok(edited) = editor.readline_with_initial("? ", (line, "")) {
        Ok(edited.trim().to_string())
    } else {
        info!("^C");
        std::process::exit(1);
    }
}

pub fn edit_multi_line(text: &str) -> Result<String> {
    use std::env;
    use std::fs;
    use std::io::Write;
    use std::process::Command;
    use tempfile::Builder;

    let editor = env::var("EDITOR").context("EDITOR not set")?;

    let mut temp_file = Builder::new()
        .prefix("COMMIT_EDITMSG")
        .suffix(".txt")
        .tempfile()
        .context("failed to create temporary file")?;
    temp_file
        .write_all(text.as_bytes())
        .context("failed to write to temporary file")?;
    temp_file
        .flush()
        .context("failed to flush temporary file")?;
    let temp_path = temp_file.path().to_owned();

    // run the editor via shell to properly handle arguments in EDITOR
    let quoted = shlex::try_quote(&temp_path.to_string_lossy())
        .context("temporary file path cannot be quoted")?
        .to_string();
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{editor} {quoted}"))
        .status()
        .with_context(|| format!("failed to run editor: {editor}"))?;
    if !status.success() {
        bail!("editor exited with {status}");
    }

    // temp_file is removed when it goes out of scope
    Ok(fs::read_to_string(&temp_path)
        .unwrap_or_default()
        .trim()
        .to_string())
}

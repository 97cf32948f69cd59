mod backend;
mod changeset;
mod cli;
mod config;
mod constants;
mod error;
mod git;
mod history;
mod ownership;
mod paths;
mod process;
mod resolver;
mod scheduler;
mod session;
mod store;
mod ui;

use crate::backend::GitBackend;
use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::constants::{MAX_HISTORY_TO_SHOW, TICK_INTERVAL};
use crate::git::Git;
use crate::history::CommitHistory;
use crate::ownership::OwnershipTracker;
use crate::paths::PathTranslator;
use crate::process::Invoker;
use crate::resolver::SelectionOnly;
use crate::scheduler::{Scheduler, State};
use crate::session::{Notification, Session};
use anyhow::{Result, bail};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

type GitSession = Session<GitBackend>;

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let settings = Settings::from_cli(&cli);
    init_tracing(&settings);

    let command = cli.command.unwrap_or(Command::Status { paths: Vec::new() });
    // clean does the same work explicitly; history only reads
    let auto_clean =
        settings.auto_clean && !matches!(command, Command::Clean | Command::History { .. });
    let mut session = open_session(&settings, auto_clean);

    match command {
        Command::Status { paths } => status(&mut session, &paths),
        Command::Stage { paths } => {
            open(&mut session)?;
            let paths = to_repo_paths(&session, &paths)?;
            session.stage(&paths);
            settle(&mut session, "staging")
        }
        Command::Unstage { paths } => {
            open(&mut session)?;
            let paths = to_repo_paths(&session, &paths)?;
            session.unstage(&paths);
            settle(&mut session, "unstaging")
        }
        Command::Commit {
            message,
            push,
            long,
        } => commit(&mut session, message, push, long),
        Command::Push => {
            open(&mut session)?;
            session.push();
            settle(&mut session, "pushing")
        }
        Command::History { mine } => {
            open(&mut session)?;
            history(&session, mine)
        }
        Command::Clean => {
            open(&mut session)?;
            match session.clean() {
                0 => status!("nothing staged outside this tool"),
                _ => settle(&mut session, "unstaging")?,
            }
            Ok(())
        }
        Command::Interactive => interactive(&mut session),
    }
}

fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.log_level()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_session(settings: &Settings, auto_clean: bool) -> GitSession {
    let translator = PathTranslator::new(Invoker::new(settings.git.as_str()), &settings.project_root);
    translator.set_context(&settings.context);

    // the root is found by the first background scan, which also loads the
    // state kept for it
    let backend = GitBackend::new(Git::new(translator));
    Session::new(
        Scheduler::new(Arc::new(backend)),
        OwnershipTracker::in_memory(),
        CommitHistory::in_memory(),
        auto_clean,
    )
    .with_data_dir(settings.data_dir.clone())
}

/// first scan, including the auto-clean it may trigger
fn open(session: &mut GitSession) -> Result<()> {
    session.open();
    settle(session, "scanning")?;
    if session.repository_missing() {
        bail!("not inside a git repository");
    }
    Ok(())
}

/// tick until idle behind a spinner, then report what happened
fn settle(session: &mut GitSession, message: &str) -> Result<()> {
    let spinner = ui::spinner(message);
    session.run_until_idle(TICK_INTERVAL, |s| {
        spinner.set_message(format!("{message} ({})", state_label(s.state())));
    });
    spinner.finish_and_clear();
    report(session)
}

fn report(session: &mut GitSession) -> Result<()> {
    for notification in session.take_notifications() {
        match notification {
            Notification::Notice(message) => status!(message),
            Notification::Confirm(message) => ui::acknowledge(&message)?,
        }
    }
    Ok(())
}

fn state_label(state: State) -> &'static str {
    match state {
        State::Idle => "waiting",
        State::ScanInFlight => "scanning",
        State::OperationInFlight => "running git",
    }
}

fn to_repo_paths(session: &GitSession, paths: &[String]) -> Result<Vec<String>> {
    let translator = session.backend().git().translator();
    let mut repo_paths = Vec::with_capacity(paths.len());
    for path in paths {
        repo_paths.push(translator.require_repo_path(path)?);
    }
    Ok(repo_paths)
}

fn status(session: &mut GitSession, paths: &[String]) -> Result<()> {
    open(session)?;
    if !paths.is_empty() {
        let selection = to_repo_paths(session, paths)?;
        session.set_selection(Some(&selection), &SelectionOnly);
        settle(session, "scanning")?;
        if session.repository_missing() {
            bail!("not inside a git repository");
        }
    }

    let changes = session.changes();
    status!(
        "{} staged, {} with unstaged changes",
        changes.staged_paths().len(),
        changes.unstaged_paths().len()
    );
    ui::print_changes(session.assets().assets(), |p| session.ownership().contains(p));
    Ok(())
}

fn commit(session: &mut GitSession, message: Option<String>, push: bool, long: bool) -> Result<()> {
    open(session)?;
    if session.changes().staged_paths().is_empty() {
        bail!("nothing staged to commit");
    }

    let message = match message {
        Some(message) => message,
        None => {
            let initial = session.history().latest().unwrap_or_default().to_string();
            if long {
                ui::edit_multi_line(&initial)?
            } else {
                status!("commit message:");
                ui::edit_one_line(initial.lines().next().unwrap_or_default())?
            }
        }
    };
    if message.trim().is_empty() {
        bail!("commit message is empty");
    }

    session.commit(&message, push);
    settle(session, if push { "committing and pushing" } else { "committing" })
}

fn history(session: &GitSession, mine: bool) -> Result<()> {
    let saved = session.history().messages();
    if !saved.is_empty() {
        status!("saved messages:");
        for message in saved.iter().take(MAX_HISTORY_TO_SHOW) {
            info!("  {}", message.lines().next().unwrap_or_default());
        }
    }

    let git = session.backend().git();
    let identity = if mine {
        let identity = git.identity()?;
        if identity.is_empty() {
            bail!("git user.name / user.email are not configured");
        }
        Some(identity)
    } else {
        None
    };

    let spinner = ui::spinner("reading log");
    let subjects = git.recent_subjects(MAX_HISTORY_TO_SHOW, identity.as_ref());
    spinner.finish_and_clear();

    let subjects = subjects?;
    if subjects.is_empty() {
        status!("no commits");
        return Ok(());
    }
    status!("recent commits:");
    for subject in subjects {
        info!("  {}", subject);
    }
    Ok(())
}

/// raw mode for the duration of a key poll
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        crossterm::terminal::disable_raw_mode().ok();
    }
}

enum Key {
    Refresh,
    StageAll,
    UnstageAll,
    Commit { push: bool },
    Push,
    Quit,
}

fn next_key() -> Result<Option<Key>> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

    let _raw = RawMode::enable()?;
    if !event::poll(TICK_INTERVAL)? {
        return Ok(None);
    }
    let Event::Key(key) = event::read()? else {
        return Ok(None);
    };
    if key.kind != KeyEventKind::Press {
        return Ok(None);
    }
    Ok(match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Key::Quit),
        KeyCode::Esc | KeyCode::Char('q') => Some(Key::Quit),
        KeyCode::Char('r') => Some(Key::Refresh),
        KeyCode::Char('a') => Some(Key::StageAll),
        KeyCode::Char('u') => Some(Key::UnstageAll),
        KeyCode::Char('c') => Some(Key::Commit { push: false }),
        KeyCode::Char('C') => Some(Key::Commit { push: true }),
        KeyCode::Char('p') => Some(Key::Push),
        _ => None,
    })
}

fn redraw(session: &GitSession) -> Result<()> {
    use crossterm::{cursor::MoveTo, execute, terminal::Clear, terminal::ClearType};

    execute!(std::io::stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
    let changes = session.changes();
    status!(
        "{} staged, {} with unstaged changes [{}]",
        changes.staged_paths().len(),
        changes.unstaged_paths().len(),
        if session.is_busy() {
            state_label(session.state())
        } else {
            "idle"
        }
    );
    ui::print_changes(session.assets().assets(), |p| session.ownership().contains(p));
    info!();
    info!("[r]efresh [a] stage all [u] unstage all [c]ommit [C]ommit+push [p]ush [q]uit");
    Ok(())
}

fn interactive(session: &mut GitSession) -> Result<()> {
    if !std::io::stdin().is_terminal() || !std::io::stdout().is_terminal() {
        bail!("interactive terminal required");
    }

    session.open();
    let mut dirty = true;
    let mut was_busy = true;
    loop {
        dirty |= session.tick(Instant::now());
        if was_busy != session.is_busy() {
            was_busy = session.is_busy();
            dirty = true;
        }

        if dirty {
            redraw(session)?;
            dirty = false;
        }
        for notification in session.take_notifications() {
            match notification {
                Notification::Notice(message) => status!(message),
                Notification::Confirm(message) => {
                    ui::acknowledge(&message)?;
                    dirty = true;
                }
            }
        }
        if session.repository_missing() {
            bail!("not inside a git repository");
        }

        match next_key()? {
            None => {}
            Some(Key::Quit) => break,
            Some(Key::Refresh) => {
                // the repository may have been created or moved meanwhile
                session.backend().git().translator().invalidate();
                session.refresh();
            }
            Some(Key::StageAll) => session.stage_all(),
            Some(Key::UnstageAll) => session.unstage_all(),
            Some(Key::Push) => session.push(),
            Some(Key::Commit { push }) => {
                // one operation at a time; wait for the index to settle first
                if session.is_busy() {
                    warning!("busy, try again when idle");
                    continue;
                }
                let initial = session.history().latest().unwrap_or_default().to_string();
                status!("commit message:");
                let message = ui::edit_one_line(initial.lines().next().unwrap_or_default())?;
                session.commit(&message, push);
                dirty = true;
            }
        }
    }
    Ok(())
}

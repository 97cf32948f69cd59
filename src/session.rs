//! One tool "window" over a repository.
//!
//! The session owns the scheduler and everything background results are
//! applied to: the ownership set, the commit history, the asset list and the
//! notification queue. All of that is mutated from [`Session::tick`] only.
//!
//! Persisted state is keyed on the repository root, which is only known once
//! a background scan has found it. With a data dir set, ownership and history
//! are loaded when the first scan of a repository comes back.

use crate::changeset::{AssetList, ChangeSet};
use crate::constants::{HISTORY_FILE, OWNERSHIP_FILE};
use crate::history::CommitHistory;
use crate::ownership::OwnershipTracker;
use crate::paths::{asset_for_meta, is_meta, is_under, meta_path};
use crate::resolver::{DependencyGraph, filter_relevant, relevant_closure};
use crate::scheduler::{
    Backend, Operation, Outcome, ScanResult, Scheduler, SchedulerEvent, State, Task,
};
use crate::store::repo_state_dir;
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// transient status line
    Notice(String),
    /// commit and push results; the user acknowledges these
    Confirm(String),
}

impl Notification {
    pub fn message(&self) -> &str {
        match self {
            Self::Notice(message) | Self::Confirm(message) => message,
        }
    }
}

pub struct Session<B: Backend> {
    scheduler: Scheduler<B>,
    ownership: OwnershipTracker,
    history: CommitHistory,
    assets: AssetList,
    changes: ChangeSet,
    relevant: Option<BTreeSet<String>>,
    notifications: VecDeque<Notification>,
    auto_clean: bool,
    auto_clean_done: bool,
    scanned: bool,
    data_dir: Option<PathBuf>,
    /// repository the persisted state was loaded for
    state_root: Option<PathBuf>,
}

impl<B: Backend> Session<B> {
    pub fn new(
        scheduler: Scheduler<B>,
        ownership: OwnershipTracker,
        history: CommitHistory,
        auto_clean: bool,
    ) -> Self {
        Self {
            scheduler,
            ownership,
            history,
            assets: AssetList::new(),
            changes: ChangeSet::default(),
            relevant: None,
            notifications: VecDeque::new(),
            auto_clean,
            auto_clean_done: false,
            scanned: false,
            data_dir: None,
            state_root: None,
        }
    }

    /// keep ownership and history in per-repository files under `data_dir`
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// start the first scan; auto-clean runs when it completes
    pub fn open(&mut self) {
        self.scheduler.request_scan(true);
    }

    pub fn backend(&self) -> &B {
        self.scheduler.backend()
    }

    pub fn state(&self) -> State {
        self.scheduler.state()
    }

    pub fn is_busy(&self) -> bool {
        self.scheduler.is_busy()
    }

    /// true once a scan has come back without a repository
    pub fn repository_missing(&self) -> bool {
        self.scanned && self.changes.repository.is_none()
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn assets(&self) -> &AssetList {
        &self.assets
    }

    pub fn ownership(&self) -> &OwnershipTracker {
        &self.ownership
    }

    pub fn history(&self) -> &CommitHistory {
        &self.history
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    /// narrow the view to a selection and what it depends on; None shows
    /// every change in the project
    pub fn set_selection<G: DependencyGraph + ?Sized>(
        &mut self,
        selection: Option<&[String]>,
        graph: &G,
    ) {
        let relevant = selection.map(|paths| relevant_closure(paths, graph));
        // a new selection may sit in another repository
        self.scheduler.backend().invalidate_root();
        self.scheduler.set_relevant(relevant);
        self.scheduler.request_scan(true);
    }

    pub fn refresh(&mut self) {
        self.scheduler.request_scan(false);
    }

    pub fn stage(&mut self, paths: &[String]) {
        let paths = self.with_sidecars(paths);
        if !paths.is_empty() {
            self.scheduler.request(Operation::Stage(paths));
        }
    }

    pub fn unstage(&mut self, paths: &[String]) {
        let paths = self.with_sidecars(paths);
        if !paths.is_empty() {
            self.scheduler.request(Operation::Unstage(paths));
        }
    }

    /// stage every visible entry with unstaged changes
    pub fn stage_all(&mut self) {
        let paths: Vec<String> = self
            .assets
            .assets()
            .iter()
            .filter(|a| a.entry.is_unstaged)
            .map(|a| a.entry.path.clone())
            .collect();
        self.stage(&paths);
    }

    /// unstage every visible entry this tool staged
    pub fn unstage_all(&mut self) {
        let paths: Vec<String> = self
            .assets
            .assets()
            .iter()
            .filter(|a| a.entry.is_staged && self.ownership.contains(&a.entry.path))
            .map(|a| a.entry.path.clone())
            .collect();
        self.unstage(&paths);
    }

    pub fn commit(&mut self, message: &str, push: bool) {
        let message = message.trim();
        if message.is_empty() {
            self.notify(Notification::Notice("commit message is empty".into()));
            return;
        }
        let message = message.to_string();
        self.scheduler.request(if push {
            Operation::CommitAndPush(message)
        } else {
            Operation::Commit(message)
        });
    }

    pub fn push(&mut self) {
        self.scheduler.request(Operation::Push);
    }

    /// unstage everything staged by something other than this tool
    pub fn clean(&mut self) -> usize {
        let foreign = self.ownership.foreign(&self.changes.staged_paths());
        let count = foreign.len();
        if count > 0 {
            self.scheduler.request(Operation::Unstage(foreign));
        }
        count
    }

    /// poll background work and apply whatever finished; returns true when
    /// anything visible changed
    pub fn tick(&mut self, now: Instant) -> bool {
        let events = self.scheduler.tick(now);
        let changed = !events.is_empty();
        for event in events {
            self.apply(event);
        }
        changed
    }

    /// tick until nothing is running, queued or debounced
    pub fn run_until_idle(&mut self, interval: Duration, mut on_tick: impl FnMut(&Self)) {
        loop {
            self.tick(Instant::now());
            if !self.is_busy() {
                return;
            }
            on_tick(self);
            thread::sleep(interval);
        }
    }

    fn apply(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::ScanCompleted {
                result,
                clear_first,
            } => self.apply_scan(result, clear_first),
            SchedulerEvent::OperationCompleted { operation, outcome } => {
                self.apply_outcome(operation, outcome)
            }
            SchedulerEvent::Failed { task, message } => {
                let text = match &task {
                    Task::Scan => format!("scan failed: {message}"),
                    Task::Operation(operation) => format!("{} failed: {message}", operation.name()),
                };
                self.notify(match task {
                    Task::Operation(
                        Operation::Commit(_) | Operation::CommitAndPush(_) | Operation::Push,
                    ) => {
                        Notification::Confirm(text)
                    }
                    _ => Notification::Notice(text),
                });
            }
        }
    }

    fn apply_scan(&mut self, result: ScanResult, clear_first: bool) {
        let ScanResult { changes, relevant } = result;
        self.scanned = true;

        let Some(root) = changes.repository.clone() else {
            self.assets.clear();
            self.changes = changes;
            self.relevant = None;
            return;
        };
        self.load_state(&root);

        let staged = changes.staged_paths();
        let pruned = self.ownership.prune(&staged);
        if !pruned.is_empty() {
            tracing::debug!("forgot {} owned paths that are no longer staged", pruned.len());
        }

        if self.auto_clean && !self.auto_clean_done {
            self.auto_clean_done = true;
            let foreign = self.ownership.foreign(&staged);
            if !foreign.is_empty() {
                self.notify(Notification::Notice(format!(
                    "unstaging {} paths staged outside this tool",
                    foreign.len()
                )));
                self.scheduler.request(Operation::Unstage(foreign));
            }
        }

        if clear_first {
            self.assets.clear();
        }
        let visible = match &relevant {
            Some(relevant) => filter_relevant(&changes.entries, relevant),
            None => changes.entries.clone(),
        };
        let backend = self.scheduler.backend();
        self.assets
            .reconcile(&visible, |p| backend.project_path(p), SystemTime::now());
        self.changes = changes;
        self.relevant = relevant;
    }

    fn apply_outcome(&mut self, operation: Operation, outcome: Outcome) {
        match outcome {
            Outcome::Staged(report) => {
                // only what git accepted counts as ours, file by file
                let staged = self.files_under(&report.succeeded);
                self.ownership.add(staged);
                if !report.is_complete() {
                    tracing::warn!("failed to stage: {}", report.failed.join(", "));
                }
                self.notify(Notification::Notice(report.summary("staged")));
            }
            Outcome::Unstaged(report) => {
                let unstaged: Vec<String> = self
                    .ownership
                    .paths()
                    .iter()
                    .filter(|owned| report.succeeded.iter().any(|spec| is_under(owned, spec)))
                    .cloned()
                    .collect();
                self.ownership.remove(&unstaged);
                if !report.is_complete() {
                    tracing::warn!("failed to unstage: {}", report.failed.join(", "));
                }
                self.notify(Notification::Notice(report.summary("unstaged")));
            }
            Outcome::Committed { summary, push } => {
                if let Operation::Commit(message) | Operation::CommitAndPush(message) = &operation {
                    self.history.record(message);
                }
                let text = match push {
                    None => summary,
                    Some(Ok(pushed)) if pushed.is_empty() => format!("{summary}\npushed"),
                    Some(Ok(pushed)) => format!("{summary}\n{pushed}"),
                    Some(Err(e)) => format!("{summary}\npush failed: {e}"),
                };
                self.notify(Notification::Confirm(text));
            }
            Outcome::Pushed(output) if output.is_empty() => {
                self.notify(Notification::Confirm("pushed".into()));
            }
            Outcome::Pushed(output) => self.notify(Notification::Confirm(output)),
        }
    }

    /// swap in the persisted state of a repository the first time it is seen
    fn load_state(&mut self, root: &Path) {
        let Some(data_dir) = &self.data_dir else {
            return;
        };
        if self.state_root.as_deref() == Some(root) {
            return;
        }
        let dir = repo_state_dir(data_dir, root);
        tracing::debug!("loading state for {} from {}", root.display(), dir.display());
        self.ownership = OwnershipTracker::load(&dir.join(OWNERSHIP_FILE));
        self.history = CommitHistory::load(&dir.join(HISTORY_FILE));
        self.state_root = Some(root.to_path_buf());
    }

    /// the changed files a set of pathspecs covers; a directory pathspec
    /// stands for every entry under it
    fn files_under(&self, pathspecs: &[String]) -> BTreeSet<String> {
        let mut files = BTreeSet::new();
        for spec in pathspecs {
            let mut matched = false;
            for entry in self.changes.entries.iter().filter(|e| is_under(&e.path, spec)) {
                files.insert(entry.path.clone());
                matched = true;
            }
            if !matched {
                files.insert(spec.clone());
            }
        }
        files
    }

    fn notify(&mut self, notification: Notification) {
        tracing::debug!("notification: {}", notification.message());
        self.notifications.push_back(notification);
    }

    /// add the sidecar of each asset (or the asset of each sidecar) when it
    /// has a change of its own
    fn with_sidecars(&self, paths: &[String]) -> Vec<String> {
        let mut expanded: Vec<String> = Vec::with_capacity(paths.len() * 2);
        for path in paths {
            let partner = if is_meta(path) {
                asset_for_meta(path).map(str::to_string)
            } else {
                Some(meta_path(path))
            };
            for candidate in std::iter::once(path.clone()).chain(
                partner
                    .into_iter()
                    .filter(|p| self.changes.contains_path(p)),
            ) {
                if !expanded.contains(&candidate) {
                    expanded.push(candidate);
                }
            }
        }
        expanded
    }
}

//! Single-flight runner for everything that touches git state.
//!
//! At most one background task (a scan or an operation) runs at a time.
//! Requests made while a task is running are coalesced: one queued scan
//! (with a sticky clear flag) and one pending operation. The owner calls
//! [`Scheduler::tick`] on each UI tick; results come back as events and are
//! applied by the caller, never by the background task.

use crate::changeset::ChangeSet;
use crate::constants::FOLLOW_UP_SCAN_DELAY;
use crate::error::{Result, StagerError};
use crate::process::BatchReport;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// the work the scheduler hands to background threads
pub trait Backend: Send + Sync + 'static {
    /// scan, then widen `relevant` with moves found in the result
    fn scan(&self, relevant: Option<&BTreeSet<String>>) -> Result<ScanResult>;
    fn stage(&self, paths: &[String]) -> Result<BatchReport>;
    fn unstage(&self, paths: &[String]) -> Result<BatchReport>;
    fn commit(&self, message: &str) -> Result<String>;
    fn push(&self) -> Result<String>;

    /// project-relative form of a repository path, for display
    fn project_path(&self, repo_path: &str) -> Option<String> {
        Some(repo_path.to_string())
    }

    /// forget the cached repository root so the next scan looks it up again
    fn invalidate_root(&self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub changes: ChangeSet,
    /// the selection's relevant paths after move resolution; None means everything
    pub relevant: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Stage(Vec<String>),
    Unstage(Vec<String>),
    Commit(String),
    CommitAndPush(String),
    Push,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stage(_) => "stage",
            Self::Unstage(_) => "unstage",
            Self::Commit(_) => "commit",
            Self::CommitAndPush(_) => "commit and push",
            Self::Push => "push",
        }
    }

    fn is_index_change(&self) -> bool {
        matches!(self, Self::Stage(_) | Self::Unstage(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Staged(BatchReport),
    Unstaged(BatchReport),
    Committed {
        summary: String,
        /// only set for commit-and-push; Err holds the push failure message
        push: Option<std::result::Result<String, String>>,
    },
    Pushed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Scan,
    Operation(Operation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    ScanCompleted {
        result: ScanResult,
        clear_first: bool,
    },
    OperationCompleted {
        operation: Operation,
        outcome: Outcome,
    },
    Failed {
        task: Task,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    ScanInFlight,
    OperationInFlight,
}

enum TaskOutput {
    Scan(Result<ScanResult>),
    Operation(Result<Outcome>),
}

struct InFlight {
    task: Task,
    clear_first: bool,
    receiver: Receiver<TaskOutput>,
}

pub struct Scheduler<B: Backend> {
    backend: Arc<B>,
    in_flight: Option<InFlight>,
    // Some(clear_first) when a scan is waiting
    queued_scan: Option<bool>,
    pending_operation: Option<Operation>,
    follow_up_at: Option<Instant>,
    follow_up_delay: Duration,
    relevant: Option<BTreeSet<String>>,
}

impl<B: Backend> Scheduler<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            in_flight: None,
            queued_scan: None,
            pending_operation: None,
            follow_up_at: None,
            follow_up_delay: FOLLOW_UP_SCAN_DELAY,
            relevant: None,
        }
    }

    pub fn with_follow_up_delay(mut self, delay: Duration) -> Self {
        self.follow_up_delay = delay;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn state(&self) -> State {
        match &self.in_flight {
            None => State::Idle,
            Some(InFlight {
                task: Task::Scan, ..
            }) => State::ScanInFlight,
            Some(_) => State::OperationInFlight,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// true while anything is running, queued, or waiting on the debounce
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
            || self.queued_scan.is_some()
            || self.pending_operation.is_some()
            || self.follow_up_at.is_some()
    }

    /// relevant paths used by subsequent scans; None shows everything
    pub fn set_relevant(&mut self, relevant: Option<BTreeSet<String>>) {
        self.relevant = relevant;
    }

    pub fn request_scan(&mut self, clear_first: bool) {
        if self.is_idle() {
            self.start_scan(clear_first);
        } else {
            let sticky = self.queued_scan.unwrap_or(false) || clear_first;
            tracing::debug!("scan queued (clear first: {sticky})");
            self.queued_scan = Some(sticky);
        }
    }

    pub fn request(&mut self, operation: Operation) {
        if self.is_idle() {
            self.start_operation(operation);
            return;
        }
        self.pending_operation = Some(match self.pending_operation.take() {
            None => operation,
            Some(pending) => coalesce(pending, operation),
        });
        tracing::debug!("operation queued behind running task");
    }

    /// poll the running task and start whatever is due; call once per UI tick
    pub fn tick(&mut self, now: Instant) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();

        if let Some(flight) = &self.in_flight {
            let output = match flight.receiver.try_recv() {
                Ok(output) => Some(output),
                Err(TryRecvError::Empty) => return events,
                Err(TryRecvError::Disconnected) => None,
            };
            if let Some(flight) = self.in_flight.take() {
                events.push(self.complete(flight, output, now));
            }
        }

        self.drain(now);
        events
    }

    fn complete(
        &mut self,
        flight: InFlight,
        output: Option<TaskOutput>,
        now: Instant,
    ) -> SchedulerEvent {
        let InFlight {
            task, clear_first, ..
        } = flight;

        if let Task::Operation(operation) = &task {
            if operation.is_index_change() {
                // rapid stage/unstage clicks share one rescan
                self.follow_up_at = Some(now + self.follow_up_delay);
            } else {
                self.queued_scan = Some(self.queued_scan.unwrap_or(false));
            }
        }

        let (task, error) = match (output, task) {
            (Some(TaskOutput::Scan(Ok(result))), _) => {
                return SchedulerEvent::ScanCompleted {
                    result,
                    clear_first,
                };
            }
            (Some(TaskOutput::Operation(Ok(outcome))), Task::Operation(operation)) => {
                return SchedulerEvent::OperationCompleted { operation, outcome };
            }
            (Some(TaskOutput::Scan(Err(e)) | TaskOutput::Operation(Err(e))), task) => (task, e),
            // the task thread died without reporting back
            (_, task) => (task, StagerError::BackgroundPanic),
        };

        let message = error.user_message();
        tracing::warn!("background task failed: {message}");
        SchedulerEvent::Failed { task, message }
    }

    fn drain(&mut self, now: Instant) {
        if !self.is_idle() {
            return;
        }
        if let Some(clear_first) = self.queued_scan.take() {
            self.start_scan(clear_first);
        } else if let Some(operation) = self.pending_operation.take() {
            self.start_operation(operation);
        } else if self.follow_up_at.is_some_and(|at| now >= at) {
            self.start_scan(false);
        }
    }

    fn start_scan(&mut self, clear_first: bool) {
        // an explicit scan covers any debounced one
        self.follow_up_at = None;
        let backend = Arc::clone(&self.backend);
        let relevant = self.relevant.clone();
        tracing::debug!("starting scan");
        self.spawn(Task::Scan, clear_first, move || {
            TaskOutput::Scan(backend.scan(relevant.as_ref()))
        });
    }

    fn start_operation(&mut self, operation: Operation) {
        let backend = Arc::clone(&self.backend);
        let work = operation.clone();
        tracing::debug!("starting {}", operation.name());
        self.spawn(Task::Operation(operation), false, move || {
            TaskOutput::Operation(run_operation(backend.as_ref(), work))
        });
    }

    fn spawn<F>(&mut self, task: Task, clear_first: bool, work: F)
    where
        F: FnOnce() -> TaskOutput + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("stager-task".to_string())
            .spawn(move || {
                // the receiver may be gone if the scheduler was dropped
                let _ = sender.send(work());
            });
        if let Err(e) = spawned {
            // leave the receiver disconnected so the next tick reports a failure
            tracing::warn!("failed to spawn background task: {e}");
        }
        self.in_flight = Some(InFlight {
            task,
            clear_first,
            receiver,
        });
    }
}

fn run_operation<B: Backend>(backend: &B, operation: Operation) -> Result<Outcome> {
    match operation {
        Operation::Stage(paths) => backend.stage(&paths).map(Outcome::Staged),
        Operation::Unstage(paths) => backend.unstage(&paths).map(Outcome::Unstaged),
        Operation::Commit(message) => Ok(Outcome::Committed {
            summary: backend.commit(&message)?,
            push: None,
        }),
        Operation::CommitAndPush(message) => {
            let summary = backend.commit(&message)?;
            let push = backend.push().map_err(|e| e.user_message());
            Ok(Outcome::Committed {
                summary,
                push: Some(push),
            })
        }
        Operation::Push => backend.push().map(Outcome::Pushed),
    }
}

/// fold a newer request into the pending one; only path lists of the same
/// kind can be merged, otherwise the newer request wins
fn coalesce(pending: Operation, newer: Operation) -> Operation {
    match (pending, newer) {
        (Operation::Stage(mut paths), Operation::Stage(more)) => {
            merge_paths(&mut paths, more);
            Operation::Stage(paths)
        }
        (Operation::Unstage(mut paths), Operation::Unstage(more)) => {
            merge_paths(&mut paths, more);
            Operation::Unstage(paths)
        }
        (pending, newer) => {
            tracing::warn!(
                "dropping pending {} in favour of {}",
                pending.name(),
                newer.name()
            );
            newer
        }
    }
}

fn merge_paths(paths: &mut Vec<String>, more: Vec<String>) {
    for path in more {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
}

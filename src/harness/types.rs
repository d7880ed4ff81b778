use std::time::Duration;
use thiserror::Error;

use crate::config;
use crate::diff::DiffOptions;
use crate::outcome::TestRunResult;
use crate::report::SinkError;

/// Configuration for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overwrite existing baselines with this run's captures
    pub update: bool,

    /// Maximum actors in flight; 1 keeps side effects in declaration order
    pub concurrency: usize,

    /// Per-capture timeout
    pub capture_timeout: Option<Duration>,

    /// Deadline for the whole run, measured from its start
    pub run_timeout: Option<Duration>,

    /// Diff engine tuning
    pub diff: DiffOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            update: false,
            concurrency: cfg.run.concurrency,
            capture_timeout: cfg.run.capture_timeout,
            run_timeout: cfg.run.run_timeout,
            diff: DiffOptions::default().threshold(cfg.diff.threshold),
        }
    }
}

impl RunOptions {
    pub fn update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn capture_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.capture_timeout = timeout;
        self
    }

    pub fn run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn diff(mut self, diff: DiffOptions) -> Self {
        self.diff = diff;
        self
    }
}

/// Progress update during a run
#[derive(Debug, Clone)]
pub enum RunProgress {
    /// An actor's capture is about to start
    Started { actor: String },
    /// An actor reached a terminal state
    Finished(TestRunResult),
}

/// Per-actor pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Pending,
    Captured,
    Compared,
    Done,
    Failed,
}

impl ActorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActorState::Done | ActorState::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: ActorState) -> bool {
        use ActorState::*;
        matches!(
            (self, next),
            (Pending, Captured) | (Pending, Failed) | (Captured, Compared) | (Captured, Failed) | (Compared, Done)
        )
    }
}

/// Errors that end a run
#[derive(Debug, Error)]
pub enum RunError {
    /// The report could not be delivered and no actor completed
    #[error("Report delivery failed with no completed actors: {0}")]
    Sink(#[from] SinkError),

    /// The artifact root could not be prepared
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Result type for run operations
pub type RunResult<T> = Result<T, RunError>;

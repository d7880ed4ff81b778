//! Types for per-actor test results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::PixelBuffer;
use crate::diff::Comparison;
use crate::store::ArtifactRef;

/// Classification of one actor in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// No usable baseline existed (or an update was forced); the capture became the baseline
    New,
    /// Capture matches the baseline
    Match,
    /// Capture differs from the baseline
    Mismatch,
    /// The actor could not be captured or compared
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::New => "new",
            Status::Match => "match",
            Status::Mismatch => "mismatch",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why an actor failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The capture provider returned an error
    Capture,
    /// The capture exceeded its timeout or the run deadline
    Timeout,
    /// Baseline and capture have different dimensions
    DimensionMismatch,
    /// Reading or writing an artifact failed
    Io,
}

/// Result of the baseline/diff step for one actor.
///
/// Constructors keep the invariants: a percentage exists only for
/// `Match`/`Mismatch`, and a diff image exists only for `Mismatch`.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    status: Status,
    mismatch_percentage: Option<f64>,
    diff_image: Option<PixelBuffer>,
}

impl DiffOutcome {
    /// The capture was stored as the new baseline
    pub fn new_baseline() -> Self {
        Self {
            status: Status::New,
            mismatch_percentage: None,
            diff_image: None,
        }
    }

    /// Classify a finished comparison; the highlight is kept only on mismatch
    pub fn from_comparison(cmp: Comparison) -> Self {
        if cmp.is_match() {
            Self {
                status: Status::Match,
                mismatch_percentage: Some(cmp.mismatch_percentage),
                diff_image: None,
            }
        } else {
            Self {
                status: Status::Mismatch,
                mismatch_percentage: Some(cmp.mismatch_percentage),
                diff_image: Some(cmp.highlight),
            }
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn mismatch_percentage(&self) -> Option<f64> {
        self.mismatch_percentage
    }

    pub fn diff_image(&self) -> Option<&PixelBuffer> {
        self.diff_image.as_ref()
    }
}

/// What the aggregator records for one actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunResult {
    /// Actor name
    pub actor: String,

    /// Actor category
    pub category: String,

    pub status: Status,

    /// Present for `Match` and `Mismatch` only
    pub mismatch_percentage: Option<f64>,

    /// Latest capture, present whenever the capture was persisted
    pub current: Option<ArtifactRef>,

    /// Highlight overlay, present for `Mismatch` only
    pub diff: Option<ArtifactRef>,

    /// Failure classification, present for `Failed` only
    pub failure: Option<FailureKind>,

    /// Human-readable failure reason
    pub error: Option<String>,
}

impl TestRunResult {
    /// A successful (non-failed) result
    pub fn completed(
        actor: impl Into<String>,
        category: impl Into<String>,
        outcome: &DiffOutcome,
        current: ArtifactRef,
        diff: Option<ArtifactRef>,
    ) -> Self {
        Self {
            actor: actor.into(),
            category: category.into(),
            status: outcome.status(),
            mismatch_percentage: outcome.mismatch_percentage(),
            current: Some(current),
            diff,
            failure: None,
            error: None,
        }
    }

    /// A failed result
    pub fn failed(
        actor: impl Into<String>,
        category: impl Into<String>,
        current: Option<ArtifactRef>,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            category: category.into(),
            status: Status::Failed,
            mismatch_percentage: None,
            current,
            diff: None,
            failure: Some(kind),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }
}

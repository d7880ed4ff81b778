//! screentest - visual regression testing for captured screenshots.
//!
//! This crate provides:
//! - A capture provider abstraction with directory-backed and scripted sources
//! - An on-disk baseline/current/diff artifact store with atomic writes
//! - A perceptual (YIQ) pixel diff engine with anti-aliasing detection
//! - A bounded-concurrency orchestrator tolerant of per-actor failures
//! - A result aggregator producing a categorized report model
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use screentest::{Actor, ActorSet, BaselineStore, DirectorySource, Orchestrator, RunOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let actors = ActorSet::new(vec![Actor::new("Desktop_Star", "Desktop Hits")])?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(DirectorySource::new("./renders")),
//!     BaselineStore::new("./screentest"),
//!     RunOptions::default(),
//! );
//! let model = orchestrator.run(&actors).await?;
//! println!("success: {}", model.is_success());
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod capture;
pub mod codec;
pub mod config;
pub mod diff;
pub mod harness;
pub mod outcome;
pub mod report;
pub mod store;

// Re-export actor types
pub use actor::{Actor, ActorError, ActorSet, RunFile};

// Re-export capture providers
pub use capture::{
    CaptureError, CaptureOutcome, CaptureProvider, CaptureResult, DirectorySource, MockFramebuffer, MockProvider,
};

// Re-export the diff engine
pub use diff::{Comparison, DiffError, DiffOptions, compare};

// Re-export orchestration and aggregation
pub use harness::{
    ActorState, Aggregator, CategoryGroup, Orchestrator, ReportModel, RunError, RunOptions, RunProgress, RunVerdict,
    default_is_primary,
};

// Re-export results, storage and sinks
pub use outcome::{DiffOutcome, FailureKind, Status, TestRunResult};
pub use report::{JsonReportSink, ReportSink, SinkError, deliver};
pub use store::{ArtifactKind, ArtifactRef, BaselineDecision, BaselineRecord, BaselineStore, StoreError};

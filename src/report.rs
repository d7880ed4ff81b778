//! Report sinks: consumers of the finished report model.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::harness::ReportModel;
use crate::store::{self, StoreError};

/// Errors raised while delivering a report
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The sink refused the model
    #[error("Report rejected: {0}")]
    Rejected(String),
}

/// Anything that turns a finished run into an artifact for people
pub trait ReportSink {
    fn consume(&self, model: &ReportModel) -> Result<(), SinkError>;
}

/// Writes the report model as pretty-printed JSON
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonReportSink {
    fn consume(&self, model: &ReportModel) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(model)?;
        store::write_atomic(&self.path, json.as_bytes())?;
        info!(path = %self.path.display(), "report written");
        Ok(())
    }
}

/// Hand `model` to `sink`. A sink failure is returned only when no actor
/// completed; with at least one completed actor it is logged and swallowed.
pub fn deliver(model: &ReportModel, sink: &dyn ReportSink) -> Result<(), SinkError> {
    match sink.consume(model) {
        Ok(()) => Ok(()),
        Err(err) if model.completed() > 0 => {
            warn!(error = %err, completed = model.completed(), "report delivery failed");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{Aggregator, default_is_primary};
    use crate::outcome::{DiffOutcome, FailureKind, TestRunResult};
    use crate::store::{ArtifactKind, ArtifactRef};

    struct BrokenSink;

    impl ReportSink for BrokenSink {
        fn consume(&self, _model: &ReportModel) -> Result<(), SinkError> {
            Err(SinkError::Rejected("disk full".to_string()))
        }
    }

    fn model_with(results: Vec<TestRunResult>) -> ReportModel {
        let agg = Aggregator::default();
        for r in results {
            agg.record(r);
        }
        agg.finalize(default_is_primary)
    }

    #[test]
    fn test_json_sink_writes_model() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path().join("report.json"));
        let model = model_with(vec![TestRunResult::completed(
            "Desktop_Star",
            "Desktop Hits",
            &DiffOutcome::new_baseline(),
            ArtifactRef::new(ArtifactKind::Current, "Desktop_Star"),
            None,
        )]);

        sink.consume(&model).unwrap();
        let written: ReportModel = serde_json::from_slice(&std::fs::read(sink.path()).unwrap()).unwrap();
        assert_eq!(written, model);
        assert_eq!(written.hero.as_deref(), Some("Desktop_Star"));
    }

    #[test]
    fn test_sink_failure_survivable_with_completed_actor() {
        let model = model_with(vec![
            TestRunResult::failed("A", "x", None, FailureKind::Capture, "boom"),
            TestRunResult::completed(
                "B",
                "x",
                &DiffOutcome::new_baseline(),
                ArtifactRef::new(ArtifactKind::Current, "B"),
                None,
            ),
        ]);
        assert!(deliver(&model, &BrokenSink).is_ok());
    }

    #[test]
    fn test_sink_failure_fatal_without_completed_actors() {
        let model = model_with(vec![TestRunResult::failed("A", "x", None, FailureKind::Timeout, "slow")]);
        assert!(matches!(deliver(&model, &BrokenSink), Err(SinkError::Rejected(_))));

        let empty = model_with(vec![]);
        assert!(deliver(&empty, &BrokenSink).is_err());
    }
}

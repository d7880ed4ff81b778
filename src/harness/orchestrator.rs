//! Drives every actor through capture, baseline decision, diff and record.
//!
//! Up to `concurrency` actor pipelines are in flight at once. Pipelines are
//! started in declaration order; captures run on the blocking pool and the
//! comparison step runs there too once the capture is back. A failure in one
//! actor is folded into that actor's result and never stops the run.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use super::aggregator::{Aggregator, ReportModel, default_is_primary};
use super::types::{ActorState, RunOptions, RunProgress, RunResult};
use crate::actor::{Actor, ActorSet};
use crate::capture::{CaptureError, CaptureOutcome, CaptureProvider, CaptureResult};
use crate::diff::{self, DiffError};
use crate::outcome::{DiffOutcome, FailureKind, Status, TestRunResult};
use crate::report::{self, ReportSink};
use crate::store::{ArtifactRef, BaselineDecision, BaselineStore};

type PrimaryPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub struct Orchestrator {
    provider: Arc<dyn CaptureProvider>,
    store: Arc<BaselineStore>,
    options: RunOptions,
    is_primary: PrimaryPredicate,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CaptureProvider>, store: BaselineStore, options: RunOptions) -> Self {
        Self {
            provider,
            store: Arc::new(store),
            options,
            is_primary: Arc::new(default_is_primary),
        }
    }

    /// Replace the predicate used to pick the report's hero category
    pub fn primary<F>(mut self, is_primary: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.is_primary = Arc::new(is_primary);
        self
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every actor and return the finalized report model
    pub async fn run(&self, actors: &ActorSet) -> RunResult<ReportModel> {
        self.run_with_progress(actors, |_| {}).await
    }

    /// Run every actor, notifying `on_progress` as actors start and finish.
    ///
    /// Notifications follow completion order, which is only deterministic
    /// when `concurrency` is 1.
    pub async fn run_with_progress<F>(&self, actors: &ActorSet, on_progress: F) -> RunResult<ReportModel>
    where
        F: Fn(&RunProgress),
    {
        self.store.ensure_layout()?;

        let deadline = self.options.run_timeout.and_then(|t| Instant::now().checked_add(t));
        let aggregator = Aggregator::new(actors);
        info!(
            actors = actors.len(),
            concurrency = self.options.concurrency,
            update = self.options.update,
            source = self.provider.source_type(),
            "run started"
        );

        let mut pipelines = stream::iter(actors.iter().cloned())
            .map(|actor| {
                on_progress(&RunProgress::Started {
                    actor: actor.name.clone(),
                });
                self.run_actor(actor, deadline)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some(result) = pipelines.next().await {
            on_progress(&RunProgress::Finished(result.clone()));
            aggregator.record(result);
        }

        let is_primary = Arc::clone(&self.is_primary);
        let model = aggregator.finalize(move |category| is_primary(category));
        info!(
            new = model.count(Status::New),
            matched = model.count(Status::Match),
            mismatched = model.count(Status::Mismatch),
            failed = model.count(Status::Failed),
            verdict = ?model.verdict(),
            "run finished"
        );
        Ok(model)
    }

    /// Run every actor, then hand the model to `sink`.
    ///
    /// A sink failure is fatal only when no actor completed; otherwise it is
    /// logged and the model is still returned.
    pub async fn run_and_report(&self, actors: &ActorSet, sink: &dyn ReportSink) -> RunResult<ReportModel> {
        let model = self.run(actors).await?;
        report::deliver(&model, sink)?;
        Ok(model)
    }

    async fn run_actor(&self, actor: Arc<Actor>, deadline: Option<Instant>) -> TestRunResult {
        let span = info_span!("actor", name = %actor.name);
        async move {
            let mut lifecycle = Lifecycle::new(&actor.name);

            let capture = match self.capture(&actor, deadline).await {
                Ok(capture) => capture,
                Err(err) => {
                    lifecycle.advance(ActorState::Failed);
                    let kind = if err.is_timeout() {
                        FailureKind::Timeout
                    } else {
                        FailureKind::Capture
                    };
                    warn!(error = %err, "capture failed");
                    self.discard_stale_diff(&actor.name);
                    return TestRunResult::failed(&actor.name, &actor.category, None, kind, err.to_string());
                }
            };
            lifecycle.advance(ActorState::Captured);

            let store = Arc::clone(&self.store);
            let options = self.options.clone();
            let span = Span::current();
            let worker_actor = Arc::clone(&actor);
            let settled = tokio::task::spawn_blocking(move || {
                span.in_scope(|| settle(&store, &worker_actor, capture, &options, lifecycle))
            })
            .await;

            let result = match settled {
                Ok(result) => result,
                Err(join) => {
                    warn!(error = %join, "comparison worker aborted");
                    TestRunResult::failed(
                        &actor.name,
                        &actor.category,
                        None,
                        FailureKind::Io,
                        format!("comparison worker aborted: {join}"),
                    )
                }
            };
            match result.mismatch_percentage {
                Some(pct) => info!(status = %result.status, mismatch = pct, "actor finished"),
                None => info!(status = %result.status, "actor finished"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Capture on the blocking pool, bounded by the per-capture timeout and
    /// the run deadline, whichever comes first. A timeout too large to land
    /// on the clock imposes no bound.
    async fn capture(&self, actor: &Arc<Actor>, deadline: Option<Instant>) -> CaptureOutcome<CaptureResult> {
        let started = Instant::now();
        if deadline.is_some_and(|d| started >= d) {
            return Err(CaptureError::DeadlineExceeded);
        }
        let capture_deadline = self.options.capture_timeout.and_then(|t| started.checked_add(t));
        let limit = match (deadline, capture_deadline) {
            (Some(run), Some(capture)) => Some(run.min(capture)),
            (run, capture) => run.or(capture),
        };

        let provider = Arc::clone(&self.provider);
        let target = Arc::clone(actor);
        let task = tokio::task::spawn_blocking(move || provider.capture(&target));

        let joined = match limit {
            Some(at) => match tokio::time::timeout_at(at, task).await {
                Ok(joined) => joined,
                Err(_) => return Err(CaptureError::Timeout(at - started)),
            },
            None => task.await,
        };
        let result = joined.map_err(|e| CaptureError::Backend(format!("capture task failed: {e}")))??;
        debug!(width = result.width(), height = result.height(), "captured");
        Ok(result)
    }

    fn discard_stale_diff(&self, actor: &str) {
        if let Err(err) = self.store.clear_diff(actor) {
            warn!(error = %err, "could not remove stale diff");
        }
    }
}

/// Tracks one actor's pipeline state and logs transitions
struct Lifecycle {
    actor: String,
    state: ActorState,
}

impl Lifecycle {
    fn new(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            state: ActorState::Pending,
        }
    }

    fn advance(&mut self, next: ActorState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?} for {}",
            self.state,
            next,
            self.actor
        );
        debug!(from = ?self.state, to = ?next, "state");
        self.state = next;
    }
}

/// Persist the capture, apply the baseline policy, diff, and persist the
/// overlay. Runs synchronously on a blocking worker.
fn settle(
    store: &BaselineStore,
    actor: &Actor,
    capture: CaptureResult,
    options: &RunOptions,
    mut lifecycle: Lifecycle,
) -> TestRunResult {
    let fail = |lifecycle: &mut Lifecycle, current: Option<ArtifactRef>, kind: FailureKind, error: String| {
        lifecycle.advance(ActorState::Failed);
        warn!(%error, "actor failed");
        if let Err(err) = store.clear_diff(&actor.name) {
            warn!(error = %err, "could not remove stale diff");
        }
        TestRunResult::failed(&actor.name, &actor.category, current, kind, error)
    };

    let current = match store.write_current(&actor.name, &capture.image) {
        Ok(current) => current,
        Err(err) => return fail(&mut lifecycle, None, FailureKind::Io, err.to_string()),
    };

    let decision = match store.decide(&actor.name, &capture.image, options.update) {
        Ok(decision) => decision,
        Err(err) => return fail(&mut lifecycle, Some(current), FailureKind::Io, err.to_string()),
    };

    let outcome = match decision {
        BaselineDecision::Created => {
            debug!(update = options.update, "baseline written");
            DiffOutcome::new_baseline()
        }
        BaselineDecision::Compare(record) => match diff::compare(&record.image, &capture.image, &options.diff) {
            Ok(cmp) => {
                debug!(
                    differing = cmp.differing_pixels,
                    antialiased = cmp.antialiased_pixels,
                    total = cmp.total_pixels,
                    "compared"
                );
                DiffOutcome::from_comparison(cmp)
            }
            Err(err @ DiffError::DimensionMismatch { .. }) => {
                return fail(&mut lifecycle, Some(current), FailureKind::DimensionMismatch, err.to_string());
            }
        },
    };

    let diff_ref = match outcome.diff_image() {
        Some(image) => match store.write_diff(&actor.name, image) {
            Ok(diff_ref) => Some(diff_ref),
            Err(err) => return fail(&mut lifecycle, Some(current), FailureKind::Io, err.to_string()),
        },
        None => {
            if let Err(err) = store.clear_diff(&actor.name) {
                warn!(error = %err, "could not remove stale diff");
            }
            None
        }
    };

    lifecycle.advance(ActorState::Compared);
    let result = TestRunResult::completed(&actor.name, &actor.category, &outcome, current, diff_ref);
    lifecycle.advance(ActorState::Done);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MockFramebuffer, MockProvider};
    use crate::store::ArtifactKind;
    use std::time::Duration;

    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn orchestrator(provider: MockProvider, root: &std::path::Path, options: RunOptions) -> Orchestrator {
        Orchestrator::new(Arc::new(provider), BaselineStore::new(root), options)
    }

    fn options() -> RunOptions {
        RunOptions::default()
            .concurrency(1)
            .capture_timeout(None)
            .run_timeout(None)
    }

    #[tokio::test]
    async fn test_capture_failure_does_not_abort_run() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .failing("Broken", "page crashed")
            .frame("Fine", MockFramebuffer::with_color(4, 4, WHITE));
        let actors = ActorSet::new(vec![Actor::new("Broken", "Desktop"), Actor::new("Fine", "Desktop")]).unwrap();

        let model = orchestrator(provider, dir.path(), options()).run(&actors).await.unwrap();

        let broken = model.result("Broken").unwrap();
        assert_eq!(broken.status, Status::Failed);
        assert_eq!(broken.failure, Some(FailureKind::Capture));
        assert_eq!(broken.current, None);
        assert_eq!(model.result("Fine").unwrap().status, Status::New);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_actor_and_keeps_current() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path());
        store.write("Grown", MockFramebuffer::with_color(4, 4, WHITE).image()).unwrap();

        let provider = MockProvider::new().frame("Grown", MockFramebuffer::with_color(4, 6, WHITE));
        let actors = ActorSet::new(vec![Actor::new("Grown", "Mobile")]).unwrap();
        let model = orchestrator(provider, dir.path(), options()).run(&actors).await.unwrap();

        let grown = model.result("Grown").unwrap();
        assert_eq!(grown.status, Status::Failed);
        assert_eq!(grown.failure, Some(FailureKind::DimensionMismatch));
        assert_eq!(grown.mismatch_percentage, None);
        assert_eq!(grown.current, Some(ArtifactRef::new(ArtifactKind::Current, "Grown")));
        assert!(store.path(ArtifactKind::Current, "Grown").is_file());
        assert!(!store.path(ArtifactKind::Diff, "Grown").exists());
    }

    #[tokio::test]
    async fn test_capture_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().delayed("Slow", Duration::from_millis(400), MockFramebuffer::new(2, 2));
        let actors = ActorSet::new(vec![Actor::new("Slow", "Desktop")]).unwrap();
        let opts = options().capture_timeout(Some(Duration::from_millis(50)));

        let model = orchestrator(provider, dir.path(), opts).run(&actors).await.unwrap();
        let slow = model.result("Slow").unwrap();
        assert_eq!(slow.status, Status::Failed);
        assert_eq!(slow.failure, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_progress_notifications_follow_declaration_order_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new()
            .frame("A", MockFramebuffer::new(2, 2))
            .frame("B", MockFramebuffer::new(2, 2));
        let actors = ActorSet::new(vec![Actor::new("A", "x"), Actor::new("B", "x")]).unwrap();

        let events = std::sync::Mutex::new(Vec::new());
        orchestrator(provider, dir.path(), options())
            .run_with_progress(&actors, |p| {
                let line = match p {
                    RunProgress::Started { actor } => format!("start {actor}"),
                    RunProgress::Finished(r) => format!("done {} {}", r.actor, r.status),
                };
                events.lock().unwrap().push(line);
            })
            .await
            .unwrap();

        assert_eq!(
            events.into_inner().unwrap(),
            ["start A", "done A new", "start B", "done B new"]
        );
    }

    #[tokio::test]
    async fn test_oversized_timeouts_impose_no_bound() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::new().frame("A", MockFramebuffer::new(2, 2));
        let actors = ActorSet::new(vec![Actor::new("A", "x")]).unwrap();
        let huge = Some(Duration::from_secs(u64::MAX / 2));

        let opts = options().capture_timeout(huge).run_timeout(huge);
        let model = orchestrator(provider, dir.path(), opts).run(&actors).await.unwrap();
        assert_eq!(model.result("A").unwrap().status, Status::New);
    }

    #[tokio::test]
    async fn test_corrupt_baseline_fails_actor_with_io_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::open(dir.path()).unwrap();
        std::fs::write(store.path(ArtifactKind::Baseline, "Corrupt"), b"not a png").unwrap();

        let provider = MockProvider::new()
            .frame("Corrupt", MockFramebuffer::with_color(4, 4, WHITE))
            .frame("Next", MockFramebuffer::with_color(4, 4, WHITE));
        let actors = ActorSet::new(vec![Actor::new("Corrupt", "Desktop"), Actor::new("Next", "Desktop")]).unwrap();
        let model = orchestrator(provider, dir.path(), options()).run(&actors).await.unwrap();

        let corrupt = model.result("Corrupt").unwrap();
        assert_eq!(corrupt.status, Status::Failed);
        assert_eq!(corrupt.failure, Some(FailureKind::Io));
        assert_eq!(corrupt.mismatch_percentage, None);
        assert_eq!(corrupt.current, Some(ArtifactRef::new(ArtifactKind::Current, "Corrupt")));
        assert!(store.path(ArtifactKind::Current, "Corrupt").is_file());
        assert_eq!(model.result("Next").unwrap().status, Status::New);
    }

    #[tokio::test]
    async fn test_capture_failure_removes_previous_diff() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::open(dir.path()).unwrap();
        store.write_diff("Broken", MockFramebuffer::new(2, 2).image()).unwrap();
        let stale = store.path(ArtifactKind::Diff, "Broken");
        assert!(stale.is_file());

        let provider = MockProvider::new().failing("Broken", "page crashed");
        let actors = ActorSet::new(vec![Actor::new("Broken", "Desktop")]).unwrap();
        let model = orchestrator(provider, dir.path(), options()).run(&actors).await.unwrap();

        assert_eq!(model.result("Broken").unwrap().status, Status::Failed);
        assert!(!stale.exists());
    }
}

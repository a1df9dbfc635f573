//! Sequential driver over the configured adapters.

use std::time::{Duration, Instant};

use tracing::info;

use crate::sources::{IngestContext, IngestReport, RunQuery, SourceAdapter};

/// Outcome of one adapter within a run.
#[derive(Debug, Clone)]
pub struct SourceRun {
    pub source: String,
    pub report: IngestReport,
    pub elapsed: Duration,
}

/// Run every adapter once, in order, one at a time.
///
/// Adapters contain their own failures, so one broken source never stops
/// the ones after it.
pub async fn run_all(
    ctx: &IngestContext,
    adapters: &[Box<dyn SourceAdapter>],
    query: &RunQuery,
) -> Vec<SourceRun> {
    info!(sources = adapters.len(), "Starting ingest run");
    let started = Instant::now();
    let mut runs = Vec::with_capacity(adapters.len());

    for adapter in adapters {
        info!(source = %adapter.id(), "Running source");
        let source_started = Instant::now();
        let report = adapter.run(ctx, query).await;
        runs.push(SourceRun {
            source: adapter.id().to_string(),
            report,
            elapsed: source_started.elapsed(),
        });
    }

    let mut total = IngestReport::default();
    for run in &runs {
        total.merge(&run.report);
    }
    let aborted = runs.iter().filter(|r| r.report.aborted).count();

    info!(
        sources = runs.len(),
        aborted,
        seen = total.seen,
        filtered = total.filtered,
        saved = total.saved,
        save_failed = total.save_failed,
        with_image = total.with_image,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Ingest run complete"
    );

    runs
}

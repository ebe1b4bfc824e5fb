//! Bounded-concurrency per-record fan-out with deterministic fan-in.

use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::{debug, warn};

use super::StepOutput;
use crate::context::StepContext;
use crate::core::Record;
use crate::errors::{ListingflowError, Result, TransientSourceError};

/// Error recorded on records abandoned or never issued after cancellation.
pub const CANCELLED: &str = "cancelled";

enum Outcome {
    Done(Record, Result<Record>),
    Abandoned(Record),
}

/// Runs `work` for every active record, at most `max_concurrency` at a time.
///
/// Inactive records pass through untouched. A source error, transient or
/// fatal, marks its record failed and the step goes on; the failure
/// threshold decides whether the step as a whole fails. Any other error
/// aborts the step.
/// Once the run token is cancelled no further record is issued, in-flight
/// calls are abandoned, and the affected records are failed as
/// [`CANCELLED`]. The output is sorted by discovery index.
pub async fn fan_out<F, Fut>(input: &[Record], ctx: &StepContext<'_>, work: F) -> Result<StepOutput>
where
    F: Fn(Record) -> Fut + Sync,
    Fut: Future<Output = Result<Record>> + Send,
{
    let stamp = ctx.stamp();
    let token = ctx.token();
    let limit = ctx.options().max_concurrency.max(1);

    let mut records = Vec::with_capacity(input.len());
    let mut pending = Vec::new();
    for record in input {
        if record.is_active() {
            pending.push(record.clone());
        } else {
            records.push(record.clone());
        }
    }
    let attempted = pending.len();
    debug!(step = %stamp.step, attempted, limit, "Fanning out");

    let work = &work;
    let outcomes: Vec<Outcome> = stream::iter(pending)
        .map(|record| async move {
            if token.is_cancelled() {
                return Outcome::Abandoned(record);
            }
            let original = record.clone();
            tokio::select! {
                result = work(record) => Outcome::Done(original, result),
                () = token.cancelled() => Outcome::Abandoned(original),
            }
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    let mut failed = 0;
    let mut abandoned = 0;
    for outcome in outcomes {
        match outcome {
            Outcome::Done(_, Ok(record)) => records.push(record),
            Outcome::Done(mut original, Err(ListingflowError::Source(err))) => {
                let transient = err.is_transient();
                let err = TransientSourceError::new(&stamp.step, original.id().as_str(), err.to_string());
                warn!(step = %stamp.step, url = %original.url(), transient, error = %err, "Record failed");
                original.fail(&stamp, err.message);
                failed += 1;
                records.push(original);
            }
            Outcome::Done(_, Err(err)) => return Err(err),
            Outcome::Abandoned(mut original) => {
                original.fail(&stamp, CANCELLED);
                abandoned += 1;
                records.push(original);
            }
        }
    }
    records.sort_by_key(Record::discovery_index);

    let output = StepOutput::new(records).with_failures(attempted, failed);
    if abandoned > 0 {
        warn!(step = %stamp.step, abandoned, "Step interrupted by cancellation");
        Ok(output.interrupted())
    } else {
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RunContext, RunOptions, SearchTarget};
    use crate::core::{fields, RecordStatus, StepStamp};
    use crate::errors::SourceError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn run_context(max_concurrency: usize) -> RunContext {
        RunContext::new(SearchTarget::Keyword("aspirin".into()), "tester")
            .with_options(RunOptions::default().with_max_concurrency(max_concurrency))
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::discovered("aspirin", "static", &format!("https://shop{i}.ch/p"), i))
            .collect()
    }

    #[tokio::test]
    async fn test_output_is_sorted_by_discovery_index() {
        let run = run_context(4);
        let ctx = StepContext::new(&run, "page_type", 5);
        let stamp = ctx.stamp();
        let input = records(8);

        let output = fan_out(&input, &ctx, |mut record| {
            let stamp = stamp.clone();
            async move {
                // Later records finish first.
                let delay = 20 - u64::try_from(record.discovery_index()).unwrap_or(0) * 2;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                record.derive(fields::PAGE_TYPE, json!("product"), &stamp)?;
                Ok::<_, ListingflowError>(record)
            }
        })
        .await
        .unwrap();

        let order: Vec<usize> = output.records.iter().map(Record::discovery_index).collect();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
        assert!(output.complete);
        assert!(input.iter().all(|r| r.derived(fields::PAGE_TYPE).is_none()));
    }

    #[tokio::test]
    async fn test_transient_errors_fail_single_records() {
        let run = run_context(2);
        let ctx = StepContext::new(&run, "relevance", 9);
        let input = records(4);

        let output = fan_out(&input, &ctx, |record| async move {
            if record.discovery_index() == 2 {
                Err(ListingflowError::from(SourceError::transient("model", "503")))
            } else {
                Ok(record)
            }
        })
        .await
        .unwrap();

        assert_eq!(output.failures.map(|f| (f.attempted, f.failed)), Some((4, 1)));
        assert!(output.records[2].failed_by("relevance"));
        assert_eq!(output.records.iter().filter(|r| r.is_active()).count(), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_fail_single_records() {
        let run = run_context(2);
        let ctx = StepContext::new(&run, "structured_extraction", 3);
        let input = records(5);

        let output = fan_out(&input, &ctx, |record| async move {
            if record.discovery_index() == 1 {
                Err(ListingflowError::from(SourceError::fatal("fetcher", "HTTP 404")))
            } else {
                Ok(record)
            }
        })
        .await
        .unwrap();

        assert!(output.complete);
        assert_eq!(output.failures.map(|f| (f.attempted, f.failed)), Some((5, 1)));
        assert!(output.records[1].failed_by("structured_extraction"));
        assert_eq!(output.records.iter().filter(|r| r.is_active()).count(), 4);
    }

    #[tokio::test]
    async fn test_field_ownership_error_aborts() {
        let run = run_context(2);
        let ctx = StepContext::new(&run, "relevance", 9);
        let stamp = ctx.stamp();
        let err = fan_out(&records(3), &ctx, |mut record| {
            let stamp = stamp.clone();
            async move {
                record.derive(fields::PAGE_TYPE, json!("product"), &StepStamp::new("page_type", 5))?;
                record.derive(fields::PAGE_TYPE, json!("other"), &stamp)?;
                Ok::<_, ListingflowError>(record)
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), "FIELD_OWNERSHIP");
    }

    #[tokio::test]
    async fn test_inactive_records_are_not_issued() {
        let run = run_context(2);
        let ctx = StepContext::new(&run, "suspicion", 11);
        let mut input = records(3);
        input[1].exclude(&crate::core::StepStamp::new("country_filter", 4), "blacklisted domain");
        let calls = AtomicUsize::new(0);

        let output = fan_out(&input, &ctx, |record| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, ListingflowError>(record) }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(output.records[1], input[1]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_issuing() {
        let run = run_context(1);
        let ctx = StepContext::new(&run, "structured_extraction", 3);
        let token = run.token().clone();

        let output = fan_out(&records(5), &ctx, |record| {
            let token = token.clone();
            async move {
                if record.discovery_index() == 1 {
                    token.cancel("operator abort");
                }
                Ok::<_, ListingflowError>(record)
            }
        })
        .await
        .unwrap();

        assert!(!output.complete);
        let cancelled = output
            .records
            .iter()
            .filter(|r| matches!(r.status(), RecordStatus::Failed { error, .. } if error == CANCELLED))
            .count();
        assert_eq!(cancelled, 3);
        assert_eq!(output.failures.map(|f| f.failed), Some(0));
    }
}

//! Bounded-concurrency fan-out.
//!
//! Targets are processed in consecutive chunks of `max_outbound_per_request`.
//! Every target in a chunk gets its own task; the engine waits for all tasks it
//! launched in that chunk before starting the next one, so peak outbound
//! concurrency never exceeds the chunk size.
//!
//! The batch is all-or-nothing: the first failed target fails the request and no
//! further chunks start. The whole run races against the request deadline and the
//! inbound cancellation token; whichever fires first decides the outcome and the
//! remaining tasks are aborted.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{ConcurrencyBudget, TimeoutBudget};
use crate::fanout::types::{
    FailureReason, FanoutError, FanoutResult, TargetOutcome, TargetResponse,
};
use crate::fanout::upstream::Upstream;
use crate::observability::metrics;

/// Executes fan-outs with fixed budgets.
pub struct FanoutEngine<U> {
    upstream: Arc<U>,
    concurrency: ConcurrencyBudget,
    timeouts: TimeoutBudget,
}

impl<U: Upstream> FanoutEngine<U> {
    pub fn new(upstream: U, concurrency: ConcurrencyBudget, timeouts: TimeoutBudget) -> Self {
        Self {
            upstream: Arc::new(upstream),
            concurrency,
            timeouts,
        }
    }

    pub fn concurrency(&self) -> &ConcurrencyBudget {
        &self.concurrency
    }

    /// Fetch every target, returning all responses in input order or the first failure.
    ///
    /// Cancelling `cancel` aborts all outbound work and yields `FanoutError::Cancelled`.
    pub async fn execute(
        &self,
        targets: &[String],
        cancel: &CancellationToken,
    ) -> Result<FanoutResult, FanoutError> {
        let max = self.concurrency.max_targets_per_request;
        if targets.len() > max {
            return Err(FanoutError::TooManyTargets {
                got: targets.len(),
                max,
            });
        }
        if targets.is_empty() {
            return Ok(FanoutResult::default());
        }

        metrics::record_targets_per_request(targets.len());

        let deadline = Instant::now() + self.timeouts.request_timeout;
        let batch = cancel.child_token();
        // Fires on every exit path so no outbound task outlives the batch.
        let _batch_guard = batch.clone().drop_guard();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(targets = targets.len(), "Fan-out cancelled by caller");
                Err(FanoutError::Cancelled)
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(
                    targets = targets.len(),
                    timeout = ?self.timeouts.request_timeout,
                    "Fan-out exceeded request timeout"
                );
                Err(FanoutError::RequestTimeout(self.timeouts.request_timeout))
            }
            result = self.run_chunks(targets, deadline, &batch) => result,
        }
    }

    async fn run_chunks(
        &self,
        targets: &[String],
        deadline: Instant,
        batch: &CancellationToken,
    ) -> Result<FanoutResult, FanoutError> {
        let chunk_size = self.concurrency.max_outbound_per_request.max(1);
        let mut responses: Vec<Option<TargetResponse>> =
            (0..targets.len()).map(|_| None).collect();

        for (chunk_index, chunk) in targets.chunks(chunk_size).enumerate() {
            let first_index = chunk_index * chunk_size;
            let chunk_token = batch.child_token();
            let mut tasks = JoinSet::new();

            for (offset, url) in chunk.iter().enumerate() {
                tasks.spawn(fetch_target(
                    Arc::clone(&self.upstream),
                    first_index + offset,
                    url.clone(),
                    self.timeouts,
                    deadline,
                    chunk_token.clone(),
                ));
            }

            // Drain exactly what was launched; the last chunk may be short.
            let launched = tasks.len();
            tracing::trace!(chunk = chunk_index, launched, "Chunk launched");

            let mut first_failure: Option<FanoutError> = None;
            for _ in 0..launched {
                let Some(joined) = tasks.join_next().await else {
                    break;
                };
                let failure = match joined {
                    Ok((index, TargetOutcome::Success(response))) => {
                        responses[index] = Some(response);
                        continue;
                    }
                    Ok((_, TargetOutcome::Failure { url, reason })) => {
                        FanoutError::Target { url, reason }
                    }
                    Err(e) => FanoutError::Internal(format!("outbound task failed: {e}")),
                };
                if first_failure.is_none() {
                    // Siblings stop early; they still report and are still drained.
                    chunk_token.cancel();
                    first_failure = Some(failure);
                }
            }

            if let Some(failure) = first_failure {
                return Err(self.classify_failure(failure, deadline));
            }
        }

        Ok(FanoutResult {
            responses: responses.into_iter().flatten().collect(),
        })
    }

    /// A target timeout that coincides with the request deadline is a request timeout.
    fn classify_failure(&self, failure: FanoutError, deadline: Instant) -> FanoutError {
        if failure.is_target_timeout() && Instant::now() >= deadline {
            return FanoutError::RequestTimeout(self.timeouts.request_timeout);
        }
        if let FanoutError::Target { url, reason } = &failure {
            tracing::warn!(url = %url, reason = %reason, "Target failed, abandoning batch");
        }
        failure
    }
}

async fn fetch_target<U: Upstream>(
    upstream: Arc<U>,
    index: usize,
    url: String,
    timeouts: TimeoutBudget,
    request_deadline: Instant,
    cancel: CancellationToken,
) -> (usize, TargetOutcome) {
    let started = Instant::now();
    let deadline = (Instant::now() + timeouts.target_timeout).min(request_deadline);

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FailureReason::Cancelled),
        fetched = tokio::time::timeout_at(deadline, upstream.fetch(&url)) => {
            fetched.unwrap_or(Err(FailureReason::Timeout))
        }
    };

    let outcome = match result {
        Ok(response) => {
            metrics::record_outbound("success", started.elapsed());
            tracing::debug!(url = %url, status = response.http_status_code, "Target responded");
            TargetOutcome::Success(response)
        }
        Err(reason) => {
            metrics::record_outbound(reason.as_label(), started.elapsed());
            TargetOutcome::Failure { url, reason }
        }
    };
    (index, outcome)
}

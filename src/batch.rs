use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::task::{Id as TaskId, JoinSet};

use crate::error::FrameQaError;
use crate::gate::ConcurrencyGate;
use crate::outcome::{Answer, Failure, ItemResult, Outcome};
use crate::sink::ResultSink;
use crate::work::WorkItem;

/// The per-item remote call the dispatcher fans out.
#[async_trait]
pub trait ItemCall: Send + Sync {
    /// Local precondition checked before a permit is taken. A failure here
    /// becomes the item's result and the remote call is never attempted.
    async fn precheck(&self, _item: &WorkItem) -> Result<(), FrameQaError> {
        Ok(())
    }

    async fn call(&self, item: &WorkItem) -> Result<Answer, FrameQaError>;
}

/// Summary of one dispatcher run.
#[derive(Debug)]
pub struct BatchReport {
    /// One result per input item, in input order.
    pub results: Vec<ItemResult>,
    pub succeeded: usize,
    pub failed: usize,
    /// Results that could not be handed to the sink. Still present in `results`.
    pub persist_errors: usize,
    pub elapsed_ms: u64,
}

/// Runs one call per work item with at most `gate.max_concurrent()` in flight.
///
/// - Every item gets exactly one result; failures (including panics) are
///   converted at the item boundary and never abort siblings
/// - No retries, no per-call timeout beyond the transport's
/// - Results come back in input order regardless of completion order
pub struct BatchDispatcher {
    call: Arc<dyn ItemCall>,
    gate: Arc<ConcurrencyGate>,
}

impl BatchDispatcher {
    pub fn new(call: Arc<dyn ItemCall>, gate: Arc<ConcurrencyGate>) -> Self {
        Self { call, gate }
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    /// Run the batch and return the results without persisting them.
    pub async fn run(&self, items: Vec<WorkItem>) -> Vec<ItemResult> {
        self.execute(items, None).await.results
    }

    /// Run the batch, handing each result to `sink` as soon as it completes.
    pub async fn run_into(&self, items: Vec<WorkItem>, sink: &dyn ResultSink) -> BatchReport {
        self.execute(items, Some(sink)).await
    }

    async fn execute(&self, items: Vec<WorkItem>, sink: Option<&dyn ResultSink>) -> BatchReport {
        let start = Instant::now();
        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();

        tracing::info!(
            items = items.len(),
            max_concurrent = self.gate.max_concurrent(),
            "dispatching batch"
        );

        let mut set = JoinSet::new();
        // Task ID → input index, for attributing panics
        let mut task_index: HashMap<TaskId, usize> = HashMap::new();

        for (idx, item) in items.into_iter().enumerate() {
            let call = self.call.clone();
            let gate = self.gate.clone();
            let abort_handle = set.spawn(async move {
                let result = process_item(call.as_ref(), &gate, &item).await;
                (idx, result)
            });
            task_index.insert(abort_handle.id(), idx);
        }

        let mut slots: Vec<Option<ItemResult>> = ids.iter().map(|_| None).collect();
        let mut persist_errors = 0;

        while let Some(joined) = set.join_next().await {
            let (idx, result) = match joined {
                Ok(done) => done,
                Err(join_err) => {
                    let Some(&idx) = task_index.get(&join_err.id()) else {
                        tracing::error!("unattributable item task failure: {join_err}");
                        continue;
                    };
                    tracing::error!(id = %ids[idx], "item task panicked: {join_err}");
                    let failure = Failure {
                        error: format!("task panicked: {join_err}"),
                        reason: "panic".to_string(),
                    };
                    let result = ItemResult {
                        id: ids[idx].clone(),
                        outcome: Outcome::Failed(failure),
                        latency_ms: start.elapsed().as_millis() as u64,
                    };
                    (idx, result)
                }
            };

            // Persist failure must never lose the in-memory result
            if let Some(sink) = sink
                && let Err(e) = sink.write(&result).await
            {
                tracing::warn!(id = %result.id, "failed to persist result: {e}");
                persist_errors += 1;
            }
            slots[idx] = Some(result);
        }

        let results: Vec<ItemResult> = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| {
                    let err = FrameQaError::Other("item task did not report a result".to_string());
                    ItemResult::failed(id, &err, 0)
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let report = BatchReport {
            failed: results.len() - succeeded,
            succeeded,
            persist_errors,
            elapsed_ms: start.elapsed().as_millis() as u64,
            results,
        };

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            persist_errors = report.persist_errors,
            elapsed_ms = report.elapsed_ms,
            "batch complete"
        );
        report
    }
}

async fn process_item(call: &dyn ItemCall, gate: &ConcurrencyGate, item: &WorkItem) -> ItemResult {
    let start = Instant::now();

    if let Err(e) = call.precheck(item).await {
        tracing::warn!(id = %item.id, reason = e.reason(), "skipping item: {e}");
        return ItemResult::failed(item.id.clone(), &e, start.elapsed().as_millis() as u64);
    }

    let outcome = call_with_permit(call, gate, item).await;

    let latency_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(answer) => {
            tracing::info!(id = %item.id, latency_ms, "item completed");
            ItemResult::answered(item.id.clone(), answer, latency_ms)
        }
        Err(e) => {
            tracing::error!(
                id = %item.id,
                provider = e.provider().unwrap_or("-"),
                reason = e.reason(),
                "item failed: {e}"
            );
            ItemResult::failed(item.id.clone(), &e, latency_ms)
        }
    }
}

async fn call_with_permit(
    call: &dyn ItemCall,
    gate: &ConcurrencyGate,
    item: &WorkItem,
) -> Result<Answer, FrameQaError> {
    let _permit = gate.acquire().await?;
    call.call(item).await
}

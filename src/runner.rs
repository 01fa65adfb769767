//! Chunked fan-out of invocations, one model at a time.

use std::future::Future;
use std::sync::Arc;

use hdrhistogram::Histogram;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::infer::{invoke, InferenceResult};
use crate::model::{InferParams, LlmBackend, PromptRecord};

/// Submit independent tasks, then wait for every one of them.
pub struct Dispatcher<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T: Send + 'static> Dispatcher<T> {
    pub fn new() -> Self {
        Self { handles: Vec::new() }
    }

    /// Start `task` immediately; returns its position in the eventual `await_all` output.
    pub fn submit<F>(&mut self, task: F) -> usize
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.handles.push(tokio::spawn(task));
        self.handles.len() - 1
    }

    pub fn in_flight(&self) -> usize {
        self.handles.len()
    }

    /// Barrier: resolves once every submitted task has finished, in submission order.
    pub async fn await_all(&mut self) -> Vec<Result<T, JoinError>> {
        let mut out = Vec::with_capacity(self.handles.len());
        for handle in self.handles.drain(..) {
            out.push(handle.await);
        }
        out
    }
}

impl<T: Send + 'static> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct RunOutcome {
    pub results: Vec<InferenceResult>,
    pub errors: usize,
}

/// Latency distribution for one model, in milliseconds.
struct ModelStats {
    hist: Histogram<u64>,
    errors: usize,
}

impl ModelStats {
    fn new() -> anyhow::Result<Self> {
        Ok(Self { hist: Histogram::new(3)?, errors: 0 })
    }

    fn observe(&mut self, model_id: &str, result: &InferenceResult) {
        metrics::counter!("bakeoff_invocations_total", "model" => model_id.to_string()).increment(1);
        if result.is_error() {
            self.errors += 1;
            metrics::counter!("bakeoff_invocation_errors_total", "model" => model_id.to_string()).increment(1);
        }
        if let Some(secs) = result.elapsed_seconds {
            metrics::histogram!("bakeoff_invocation_seconds", "model" => model_id.to_string()).record(secs);
            self.hist.record((secs * 1000.0).round().max(0.0) as u64).ok();
        }
    }

    fn log(&self, model_id: &str) {
        info!(
            model = model_id,
            timed = self.hist.len(),
            errors = self.errors,
            p50_ms = self.hist.value_at_quantile(0.50),
            p95_ms = self.hist.value_at_quantile(0.95),
            "model finished"
        );
    }
}

/// Ask every model every prompt. Models run one after another; within a model,
/// prompts go out `batch_size` at a time and each chunk completes before the next starts.
/// Always yields `model_ids.len() * records.len()` results.
pub async fn run<B: LlmBackend>(
    backend: Arc<B>,
    model_ids: &[String],
    records: &[PromptRecord],
    params: &InferParams,
    batch_size: usize,
) -> anyhow::Result<RunOutcome> {
    anyhow::ensure!(batch_size > 0, "batch size must be at least 1");
    let mut outcome = RunOutcome {
        results: Vec::with_capacity(model_ids.len() * records.len()),
        errors: 0,
    };

    for model_id in model_ids {
        info!(model = %model_id, prompts = records.len(), batch_size, "starting model");
        let mut stats = ModelStats::new()?;

        for (n, chunk) in records.chunks(batch_size).enumerate() {
            let mut dispatcher = Dispatcher::new();
            for record in chunk {
                let backend = backend.clone();
                let model_id = model_id.clone();
                let record = record.clone();
                let params = params.clone();
                dispatcher.submit(async move { invoke(backend.as_ref(), &model_id, &record, &params).await });
            }
            tracing::debug!(model = %model_id, chunk = n, in_flight = dispatcher.in_flight(), "chunk dispatched");

            for (record, joined) in chunk.iter().zip(dispatcher.await_all().await) {
                let result = joined.unwrap_or_else(|e| {
                    warn!(model = %model_id, prompt = %record.user_prompt, error = %e, "invocation task aborted");
                    InferenceResult::failed(model_id, record, format!("task aborted: {e}"))
                });
                stats.observe(model_id, &result);
                outcome.results.push(result);
            }
        }

        stats.log(model_id);
        outcome.errors += stats.errors;
    }

    if outcome.errors > 0 {
        warn!(errors = outcome.errors, total = outcome.results.len(), "some invocations failed");
    }
    Ok(outcome)
}

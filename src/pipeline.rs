//! End-to-end run: dataset in, wide CSV and latency summary out.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::config::RunConfig;
use crate::dataset::{load_dataset, prompt_records};
use crate::model::LlmBackend;
use crate::output::{reorder_responses, write_csv};
use crate::report::{summarize, write_summary, LatencySummary};
use crate::runner;
use crate::table::Table;

#[derive(Debug)]
pub struct RunReport {
    pub results_path: PathBuf,
    pub summary_path: PathBuf,
    pub invocations: usize,
    pub errors: usize,
    pub table: Table,
    pub latency: LatencySummary,
}

pub async fn run<B: LlmBackend>(cfg: &RunConfig, backend: Arc<B>) -> anyhow::Result<RunReport> {
    let dataset_path = cfg.dataset_path();
    let dataset = load_dataset(&dataset_path).with_context(|| format!("load dataset {:?}", dataset_path))?;
    if let Some(col) = cfg.reference_response_column.as_deref() {
        anyhow::ensure!(dataset.has_column(col), "reference response column {col:?} not in dataset");
    }
    if dataset.is_empty() {
        warn!(path = %dataset_path.display(), "dataset has no rows; outputs will be empty");
    }
    let records = prompt_records(&dataset, &cfg.user_prompt_column, cfg.system_prompt_column.as_deref())?;

    let outcome = runner::run(backend, &cfg.models, &records, &cfg.inference, cfg.batch_size()).await?;

    let keys = cfg.join_keys();
    let wide = aggregate(&outcome.results, &cfg.models, &keys, &dataset).context("aggregate results")?;

    let extra: Vec<&str> = cfg.reference_response_column.as_deref().into_iter().collect();
    let table = reorder_responses(&wide, &cfg.user_prompt_column, &extra);
    let results_path = cfg.all_results_path();
    write_csv(&table, &results_path)?;

    let latency = summarize(&table, cfg.latency_markers.as_slice());
    let summary_path = cfg.latency_summary_path();
    write_summary(&summary_path, &latency)?;

    info!(
        invocations = outcome.results.len(),
        errors = outcome.errors,
        rows = table.len(),
        "run complete"
    );
    Ok(RunReport {
        results_path,
        summary_path,
        invocations: outcome.results.len(),
        errors: outcome.errors,
        table,
        latency,
    })
}

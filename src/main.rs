use bakeoff::config::{Cli, RunConfig};
use bakeoff::model::openai::OpenAiBackend;
use bakeoff::pipeline;
use clap::Parser;
use dotenvy::dotenv;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};


#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
dotenv().ok();
let cli = Cli::parse();


// logs
let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
fmt().with_env_filter(filter).init();


// config
let cfg = RunConfig::load(&cli.config)?.apply_overrides(&cli);
let metrics = match cfg.metrics_path() {
Some(path) => Some((PrometheusBuilder::new().install_recorder()?, path)),
None => None,
};


// endpoint
let api_key = cfg.endpoint.api_key();
if api_key.is_none() {
tracing::warn!(var = %cfg.endpoint.api_key_env, "no API key set; calling endpoint unauthenticated");
}
let backend = OpenAiBackend::new(&cfg.endpoint.base_url, api_key, cfg.endpoint.timeout())?;


tracing::info!(url = backend.url(), models = cfg.models.len(), batch_size = cfg.batch_size(), "starting run");
let report = pipeline::run(&cfg, Arc::new(backend)).await?;


if let Some((handle, path)) = metrics {
bakeoff::util::ensure_parent_dir(&path)?;
std::fs::write(&path, handle.render())?;
tracing::info!(path = %path.display(), "metrics snapshot written");
}


tracing::info!(results = %report.results_path.display(), summary = %report.summary_path.display(), errors = report.errors, "done");
Ok(())
}

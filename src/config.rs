use crate::model::InferParams;
use crate::report::DEFAULT_LATENCY_MARKERS;
use crate::validate::Validator;
use anyhow::{Context, Result};
use clap::Parser;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process flags; everything else lives in the JSON run configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "bakeoff", version, about = "Run a prompt dataset against several hosted chat models")]
pub struct Cli {
    #[arg(long, env = "BAKEOFF_CONFIG", default_value = "bakeoff.json")]
    pub config: PathBuf,
    #[arg(long, env = "BAKEOFF_BATCH_SIZE")]
    pub batch_size: Option<usize>,
    #[arg(long, env = "BAKEOFF_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://host/v1`.
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the API key from the configured variable; absent means unauthenticated.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

/// Loaded once at start-up and passed by reference; never mutated after `load`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub dataset_subdir: Option<PathBuf>,
    pub dataset_file: String,
    pub user_prompt_column: String,
    #[serde(default)]
    pub system_prompt_column: Option<String>,
    /// Pre-existing answers in the dataset, kept next to the model responses.
    #[serde(default)]
    pub reference_response_column: Option<String>,
    pub inference: InferParams,
    pub models: Vec<String>,
    /// Defaults to the number of logical CPUs.
    #[serde(default)]
    pub parallel_batch_size: Option<usize>,
    pub output_dir: PathBuf,
    #[serde(default = "default_latency_summary_file")]
    pub latency_summary_file: String,
    #[serde(default = "default_all_results_file")]
    pub all_results_file: String,
    #[serde(default = "default_latency_markers")]
    pub latency_markers: Vec<String>,
    #[serde(default)]
    pub metrics_file: Option<String>,
    pub endpoint: EndpointConfig,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_latency_summary_file() -> String {
    "latency_summary.txt".to_string()
}

fn default_all_results_file() -> String {
    "all_results.csv".to_string()
}

fn default_latency_markers() -> Vec<String> {
    DEFAULT_LATENCY_MARKERS.iter().map(|m| m.to_string()).collect()
}

static VALIDATOR: OnceCell<Validator> = OnceCell::new();

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = crate::util::read_to_string(path)?;
        let value: serde_json::Value =
            serde_json::from_str(&text).with_context(|| format!("parse config {:?}", path))?;
        Self::from_value(value).with_context(|| format!("invalid config {:?}", path))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let validator = VALIDATOR.get_or_try_init(Validator::for_run_config)?;
        let value = validator.validate_and_fix(value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Flags win over the file.
    pub fn apply_overrides(mut self, cli: &Cli) -> Self {
        if let Some(n) = cli.batch_size.filter(|n| *n > 0) {
            self.parallel_batch_size = Some(n);
        }
        if let Some(dir) = &cli.output_dir {
            self.output_dir = dir.clone();
        }
        self
    }

    pub fn batch_size(&self) -> usize {
        self.parallel_batch_size.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn dataset_path(&self) -> PathBuf {
        let mut p = self.data_dir.clone();
        if let Some(sub) = &self.dataset_subdir {
            p.push(sub);
        }
        p.join(&self.dataset_file)
    }

    pub fn all_results_path(&self) -> PathBuf {
        self.output_dir.join(&self.all_results_file)
    }

    pub fn latency_summary_path(&self) -> PathBuf {
        self.output_dir.join(&self.latency_summary_file)
    }

    pub fn metrics_path(&self) -> Option<PathBuf> {
        self.metrics_file.as_ref().map(|f| self.output_dir.join(f))
    }

    pub fn join_keys(&self) -> Vec<String> {
        crate::aggregate::join_keys(&self.user_prompt_column, self.system_prompt_column.as_deref())
    }
}

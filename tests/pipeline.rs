use bakeoff::config::RunConfig;
use bakeoff::dataset::read_csv;
use bakeoff::model::{ChatMessage, ChatReply, InferParams, LlmBackend, Role};
use bakeoff::pipeline;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct FakeBackend {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl LlmBackend for FakeBackend {
    async fn chat(&self, model_id: &str, messages: &[ChatMessage], _p: &InferParams) -> anyhow::Result<ChatReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = messages.iter().find(|m| m.role == Role::User).unwrap().content.clone();
        // Simulate a backend error for one (model, prompt) pair to exercise error handling
        if model_id == "beta" && user == "fail" {
            anyhow::bail!("backend failure for test prompt");
        }
        let system = messages.iter().find(|m| m.role == Role::System).map(|m| m.content.clone());
        let text = match system {
            Some(s) => format!("{model_id} [{s}] {user}"),
            None => format!("{model_id} {user}"),
        };
        Ok(ChatReply {
            choices: vec![Some(String::new()), Some(text), Some("ignored".into())],
            prompt_tokens: Some(user.len() as u64),
            completion_tokens: Some(3),
            latency_ms: Some(100.0 * user.len() as f64),
        })
    }
}

fn write_dataset(dir: &Path, name: &str, contents: &str) {
    std::fs::create_dir_all(dir.join("data")).unwrap();
    std::fs::write(dir.join("data").join(name), contents).unwrap();
}

fn config(dir: &Path, dataset: &str, models: &[&str], extra: serde_json::Value) -> RunConfig {
    let mut v = json!({
        "data_dir": dir.join("data").to_str().unwrap(),
        "dataset_file": dataset,
        "user_prompt_column": "prompt",
        "inference": {"temperature": 0.0, "max_tokens": 64},
        "models": models,
        "parallel_batch_size": 2,
        "output_dir": dir.join("out").to_str().unwrap(),
        "endpoint": {"base_url": "http://unused.invalid/v1"}
    });
    for (k, val) in extra.as_object().unwrap() {
        v[k] = val.clone();
    }
    RunConfig::from_value(v).unwrap()
}

#[tokio::test]
async fn single_model_without_system_prompt() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "prompts.csv", "prompt\nhello\nworld!\n");
    let cfg = config(dir.path(), "prompts.csv", &["alpha"], json!({}));
    let backend = Arc::new(FakeBackend::default());

    let report = pipeline::run(&cfg, backend.clone()).await.unwrap();

    assert_eq!(report.invocations, 2);
    assert_eq!(report.errors, 0);
    assert_eq!(report.table.len(), 2);
    let cols = report.table.columns();
    assert_eq!(cols.iter().filter(|c| c.ends_with("-response")).count(), 1);
    assert_eq!(cols.iter().filter(|c| c.ends_with("-time_taken_in_seconds")).count(), 1);
    assert_eq!(&cols[..2], &["prompt".to_string(), "alpha-response".to_string()]);
    assert_eq!(report.table.cell(0, "alpha-response"), Some("alpha hello"));
    assert_eq!(report.table.cell(1, "alpha-time_taken_in_seconds"), Some("0.6"));
    assert_eq!(report.table.cell(1, "alpha-prompt_tokens"), Some("6"));

    let summary = std::fs::read_to_string(&report.summary_path).unwrap();
    assert_eq!(summary, "[p50, p95] for alpha-time_taken_in_seconds=[0.55, 0.595]\n");
}

#[tokio::test]
async fn one_failed_invocation_keeps_its_row() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "prompts.csv", "prompt\nok\nfail\n");
    let cfg = config(dir.path(), "prompts.csv", &["alpha", "beta"], json!({}));

    let report = pipeline::run(&cfg, Arc::new(FakeBackend::default())).await.unwrap();

    assert_eq!(report.invocations, 4);
    assert_eq!(report.errors, 1);
    assert_eq!(report.table.len(), 2);
    assert_eq!(report.table.cell(1, "prompt"), Some("fail"));
    assert_eq!(report.table.cell(1, "beta-response"), None);
    assert_eq!(report.table.cell(1, "beta-time_taken_in_seconds"), None);
    assert!(report.table.cell(1, "beta-error").unwrap().contains("backend failure"));
    assert_eq!(report.table.cell(1, "alpha-response"), Some("alpha fail"));
    assert_eq!(report.table.cell(0, "beta-response"), Some("beta ok"));
}

#[tokio::test]
async fn reference_responses_are_kept_and_moved_next_to_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(
        dir.path(),
        "prompts.csv",
        "id,prompt,gold,gold_latency\n1,a,A,0.5\n2,bb,,\n3,ccc,C,1.5\n",
    );
    let cfg = config(
        dir.path(),
        "prompts.csv",
        &["alpha", "beta"],
        json!({"reference_response_column": "gold"}),
    );

    let report = pipeline::run(&cfg, Arc::new(FakeBackend::default())).await.unwrap();
    let t = &report.table;

    assert_eq!(t.len(), 3);
    assert_eq!(
        &t.columns()[..4],
        &["prompt", "alpha-response", "beta-response", "gold"].map(String::from)
    );
    assert!(t.has_column("id"));
    assert_eq!(t.cell(0, "gold"), Some("A"));
    assert_eq!(t.cell(1, "gold"), None);
    assert_eq!(t.cell(2, "gold_latency"), Some("1.5"));

    let summary = std::fs::read_to_string(&report.summary_path).unwrap();
    assert!(summary.contains("[p50, p95] for gold_latency=[1.0, 1.45]"));
    assert!(summary.contains("for alpha-time_taken_in_seconds="));
    assert!(summary.contains("for beta-time_taken_in_seconds="));
}

#[tokio::test]
async fn system_prompt_is_sent_and_used_as_a_join_key() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "prompts.tsv", "prompt\tsys\nq1\tbe terse\nq1\t\n");
    let cfg = config(dir.path(), "prompts.tsv", &["alpha"], json!({"system_prompt_column": "sys"}));
    assert_eq!(cfg.join_keys(), vec!["prompt".to_string(), "sys".to_string()]);

    let report = pipeline::run(&cfg, Arc::new(FakeBackend::default())).await.unwrap();
    let t = &report.table;

    assert_eq!(t.len(), 2);
    assert_eq!(t.cell(0, "alpha-response"), Some("alpha [be terse] q1"));
    assert_eq!(t.cell(1, "alpha-response"), Some("alpha q1"));
}

#[tokio::test]
async fn written_results_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "prompts.csv", "prompt,note\n\"a, with comma\",x\n\"multi\nline\",y\nfail,z\n");
    let cfg = config(dir.path(), "prompts.csv", &["alpha", "beta"], json!({}));

    let report = pipeline::run(&cfg, Arc::new(FakeBackend::default())).await.unwrap();
    let reread = read_csv(&report.results_path).unwrap();

    assert_eq!(reread.len(), report.table.len());
    let responses = |cols: &[String]| -> BTreeSet<String> {
        cols.iter().filter(|c| c.ends_with("response")).cloned().collect()
    };
    assert_eq!(responses(reread.columns()), responses(report.table.columns()));
    assert_eq!(reread.cell(1, "prompt"), Some("multi\nline"));
}

#[tokio::test]
async fn unsupported_dataset_format_fails_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "prompts.json", "[]");
    let cfg = config(dir.path(), "prompts.json", &["alpha"], json!({}));
    let backend = Arc::new(FakeBackend::default());

    let err = pipeline::run(&cfg, backend.clone()).await.unwrap_err();

    assert!(format!("{err:#}").contains("unsupported dataset format"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn missing_prompt_column_fails_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "prompts.csv", "question\nhi\n");
    let cfg = config(dir.path(), "prompts.csv", &["alpha"], json!({}));
    let backend = Arc::new(FakeBackend::default());

    assert!(pipeline::run(&cfg, backend.clone()).await.is_err());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_prompt_row_keeps_its_reference_columns() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "prompts.csv", "id,prompt,gold\n1,a,A\n2,,B\n");
    let cfg = config(dir.path(), "prompts.csv", &["alpha"], json!({"reference_response_column": "gold"}));

    let report = pipeline::run(&cfg, Arc::new(FakeBackend::default())).await.unwrap();
    let t = &report.table;

    assert_eq!(t.len(), 2);
    assert_eq!(t.cell(1, "prompt"), None);
    assert_eq!(t.cell(1, "alpha-response"), Some("alpha "));
    assert_eq!(t.cell(1, "gold"), Some("B"));
    assert_eq!(t.cell(1, "id"), Some("2"));
}

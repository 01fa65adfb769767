//! Reshape flat per-invocation results into the wide, one-row-per-prompt table.

use tracing::{debug, info};

use crate::infer::InferenceResult;
use crate::table::{JoinError, Row, Table};

/// Column-name prefix left behind when a missing system-prompt column gets stringified.
pub const UNSET_COLUMN_TOKEN: &str = "None";

/// Per-model fields, in the order they appear in the wide table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelField {
    Response,
    TimeTaken,
    PromptTokens,
    CompletionTokens,
    Error,
}

impl ModelField {
    pub const ALL: [ModelField; 5] = [
        ModelField::Response,
        ModelField::TimeTaken,
        ModelField::PromptTokens,
        ModelField::CompletionTokens,
        ModelField::Error,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            ModelField::Response => "response",
            ModelField::TimeTaken => "time_taken_in_seconds",
            ModelField::PromptTokens => "prompt_tokens",
            ModelField::CompletionTokens => "completion_tokens",
            ModelField::Error => "error",
        }
    }

    /// `<model>-<suffix>`
    pub fn column(self, model_id: &str) -> String {
        format!("{model_id}-{}", self.suffix())
    }

    fn value(self, r: &InferenceResult) -> Option<String> {
        match self {
            ModelField::Response => r.completion.clone(),
            ModelField::TimeTaken => r.elapsed_seconds.map(|s| s.to_string()),
            ModelField::PromptTokens => r.prompt_tokens.map(|n| n.to_string()),
            ModelField::CompletionTokens => r.completion_tokens.map(|n| n.to_string()),
            ModelField::Error => r.error.clone(),
        }
    }
}

/// Key columns for every join: the user-prompt column, plus the system-prompt column when configured.
pub fn join_keys(user_column: &str, system_column: Option<&str>) -> Vec<String> {
    std::iter::once(user_column)
        .chain(system_column)
        .map(str::to_string)
        .collect()
}

/// One table for `model_id`: join keys, then that model's fields.
pub fn model_table(results: &[InferenceResult], model_id: &str, keys: &[String]) -> Table {
    let mut columns = keys.to_vec();
    columns.extend(ModelField::ALL.iter().map(|f| f.column(model_id)));
    let mut table = Table::new(columns);
    for r in results.iter().filter(|r| r.model_id == model_id) {
        let mut row: Row = Vec::with_capacity(keys.len() + ModelField::ALL.len());
        // an empty prompt is a missing cell in the dataset too
        row.push((!r.user_prompt.is_empty()).then(|| r.user_prompt.clone()));
        if keys.len() > 1 {
            row.push(r.system_prompt.clone());
        }
        row.extend(ModelField::ALL.iter().map(|f| f.value(r)));
        table.push_row(row);
    }
    table
}

/// Inner-join every model's table on `keys`, then left-join `dataset` to carry its
/// reference columns along.
pub fn aggregate(
    results: &[InferenceResult],
    model_ids: &[String],
    keys: &[String],
    dataset: &Table,
) -> Result<Table, JoinError> {
    let mut tables = model_ids.iter().map(|m| model_table(results, m, keys));
    let mut merged = tables.next().ok_or(JoinError::NoModels)?;
    for table in tables {
        merged = merged.inner_join(&table, keys)?;
    }
    debug!(rows = merged.len(), models = model_ids.len(), "per-model tables merged");

    let mut wide = merged.left_join(dataset, keys)?;
    if keys.len() == 1 {
        let dropped = wide.drop_columns_with_prefix(UNSET_COLUMN_TOKEN);
        if !dropped.is_empty() {
            debug!(?dropped, "dropped unset system-prompt columns");
        }
    }
    info!(rows = wide.len(), columns = wide.columns().len(), "results aggregated");
    Ok(wide)
}

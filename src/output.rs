//! Final column ordering and CSV serialization of the wide table.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::table::Table;

pub const RESPONSE_SUFFIX: &str = "response";

/// Move every response column (name ends in `response`, or listed in `extra`) to sit
/// right after `user_column`, keeping their relative order. Other columns keep theirs.
pub fn reorder_responses(table: &Table, user_column: &str, extra: &[&str]) -> Table {
    let is_response =
        |c: &str| c != user_column && (c.ends_with(RESPONSE_SUFFIX) || extra.contains(&c));
    let responses: Vec<String> = table.columns().iter().filter(|c| is_response(c.as_str())).cloned().collect();
    let mut order: Vec<String> = Vec::with_capacity(table.columns().len());
    for column in table.columns().iter().filter(|c| !is_response(c.as_str())) {
        order.push(column.clone());
        if column == user_column {
            order.extend(responses.iter().cloned());
        }
    }
    if !table.has_column(user_column) {
        order.extend(responses);
    }
    // `order` is a permutation of the existing columns by construction.
    table.select(&order).unwrap_or_else(|| table.clone())
}

/// Write `table` as comma-separated text with a header row and no index column.
pub fn write_csv(table: &Table, path: &Path) -> anyhow::Result<()> {
    crate::util::ensure_parent_dir(path)?;
    let mut w = csv::Writer::from_path(path).with_context(|| format!("create {:?}", path))?;
    w.write_record(table.columns())?;
    for row in table.rows() {
        w.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
    }
    w.flush()?;
    info!(path = %path.display(), rows = table.len(), columns = table.columns().len(), "results written");
    Ok(())
}

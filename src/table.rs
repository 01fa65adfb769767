//! Row-oriented string table used for the dataset and the wide results file.
//!
//! Cells are `Option<String>`; an empty cell on input is stored as `None` so that
//! "missing" has one representation everywhere.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("join key `{column}` missing from {table} table")]
    MissingKey { table: String, column: String },
    #[error("column `{0}` exists on both sides of a join")]
    DuplicateColumn(String),
    #[error("no per-model tables to join")]
    NoModels,
}

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    /// Rows shorter than the header are padded with missing cells, longer ones truncated.
    pub fn push_row(&mut self, mut row: Row) {
        if row.len() > self.columns.len() {
            warn!(
                row = self.rows.len(),
                cells = row.len(),
                columns = self.columns.len(),
                "row wider than header; extra cells discarded"
            );
        }
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Iterate one column's cells top to bottom.
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = Option<&'a str>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| r[idx].as_deref()))
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?[idx].as_deref()
    }

    /// Remove every column in which no row has a value.
    pub fn drop_empty_columns(&mut self) -> Vec<String> {
        let keep: Vec<bool> = (0..self.columns.len())
            .map(|i| self.rows.iter().any(|r| r[i].is_some()))
            .collect();
        let dropped = self
            .columns
            .iter()
            .zip(&keep)
            .filter(|(_, k)| !**k)
            .map(|(c, _)| c.clone())
            .collect();
        self.retain_columns(&keep);
        dropped
    }

    /// Remove every column whose name starts with `prefix`.
    pub fn drop_columns_with_prefix(&mut self, prefix: &str) -> Vec<String> {
        let keep: Vec<bool> = self.columns.iter().map(|c| !c.starts_with(prefix)).collect();
        let dropped = self
            .columns
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect();
        self.retain_columns(&keep);
        dropped
    }

    fn retain_columns(&mut self, keep: &[bool]) {
        let filter = |cells: Vec<Option<String>>| -> Row {
            cells
                .into_iter()
                .zip(keep)
                .filter_map(|(c, k)| k.then_some(c))
                .collect()
        };
        let columns = std::mem::take(&mut self.columns);
        self.columns = columns
            .into_iter()
            .zip(keep)
            .filter_map(|(c, k)| k.then_some(c))
            .collect();
        self.rows = std::mem::take(&mut self.rows).into_iter().map(filter).collect();
    }

    /// Rearrange columns into `order`, which must be a permutation of the current columns.
    pub fn select(&self, order: &[String]) -> Option<Table> {
        if order.len() != self.columns.len() {
            return None;
        }
        let idx: Vec<usize> = order
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Option<_>>()?;
        let rows = self
            .rows
            .iter()
            .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Some(Table { columns: order.to_vec(), rows })
    }

    /// Inner join on `keys`: one output row per matching (left, right) pair, left order first.
    pub fn inner_join(&self, right: &Table, keys: &[String]) -> Result<Table, JoinError> {
        self.join(right, keys, false)
    }

    /// Left join on `keys`: unmatched left rows keep missing cells for the right columns.
    pub fn left_join(&self, right: &Table, keys: &[String]) -> Result<Table, JoinError> {
        self.join(right, keys, true)
    }

    fn join(&self, right: &Table, keys: &[String], keep_unmatched: bool) -> Result<Table, JoinError> {
        let left_keys = key_indices(self, keys, "left")?;
        let right_keys = key_indices(right, keys, "right")?;

        let right_extra: Vec<usize> = (0..right.columns.len())
            .filter(|i| !right_keys.contains(i))
            .collect();
        let mut columns = self.columns.clone();
        for &i in &right_extra {
            let name = &right.columns[i];
            if self.has_column(name) {
                return Err(JoinError::DuplicateColumn(name.clone()));
            }
            columns.push(name.clone());
        }

        let mut index: HashMap<Vec<Option<&str>>, Vec<usize>> = HashMap::new();
        for (n, row) in right.rows.iter().enumerate() {
            index.entry(project(row, &right_keys)).or_default().push(n);
        }

        let mut out = Table::new(columns);
        for row in &self.rows {
            match index.get(&project(row, &left_keys)) {
                Some(matches) => {
                    for &m in matches {
                        let mut joined = row.clone();
                        joined.extend(right_extra.iter().map(|&i| right.rows[m][i].clone()));
                        out.rows.push(joined);
                    }
                }
                None if keep_unmatched => {
                    let mut joined = row.clone();
                    joined.resize(out.columns.len(), None);
                    out.rows.push(joined);
                }
                None => {}
            }
        }
        Ok(out)
    }
}

fn key_indices(table: &Table, keys: &[String], side: &str) -> Result<Vec<usize>, JoinError> {
    keys.iter()
        .map(|k| {
            table.column_index(k).ok_or_else(|| JoinError::MissingKey {
                table: side.to_string(),
                column: k.clone(),
            })
        })
        .collect()
}

fn project<'a>(row: &'a Row, idx: &[usize]) -> Vec<Option<&'a str>> {
    idx.iter().map(|&i| row[i].as_deref()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[Option<&str>]]) -> Table {
        let mut t = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for r in rows {
            t.push_row(r.iter().map(|c| c.map(str::to_string)).collect());
        }
        t
    }

    #[test]
    fn drops_fully_empty_columns_only() {
        let mut t = table(&["a", "b", "c"], &[&[Some("1"), None, None], &[Some("2"), None, Some("x")]]);
        let dropped = t.drop_empty_columns();
        assert_eq!(dropped, vec!["b".to_string()]);
        assert_eq!(t.columns(), &["a".to_string(), "c".to_string()]);
        assert_eq!(t.cell(1, "c"), Some("x"));
    }

    #[test]
    fn inner_join_drops_unmatched_rows() {
        let l = table(&["k", "x"], &[&[Some("a"), Some("1")], &[Some("b"), Some("2")]]);
        let r = table(&["k", "y"], &[&[Some("b"), Some("3")]]);
        let j = l.inner_join(&r, &["k".to_string()]).unwrap();
        assert_eq!(j.len(), 1);
        assert_eq!(j.cell(0, "y"), Some("3"));
    }

    #[test]
    fn left_join_keeps_unmatched_rows_and_missing_keys_match() {
        let l = table(&["k", "s"], &[&[Some("a"), None], &[Some("b"), Some("sys")]]);
        let r = table(&["k", "s", "ref"], &[&[Some("a"), None, Some("gold")]]);
        let keys = ["k".to_string(), "s".to_string()];
        let j = l.left_join(&r, &keys).unwrap();
        assert_eq!(j.len(), 2);
        assert_eq!(j.cell(0, "ref"), Some("gold"));
        assert_eq!(j.cell(1, "ref"), None);
    }

    #[test]
    fn join_reports_missing_key_and_duplicate_columns() {
        let l = table(&["k", "x"], &[]);
        let r = table(&["other"], &[]);
        assert_eq!(
            l.inner_join(&r, &["k".to_string()]),
            Err(JoinError::MissingKey { table: "right".into(), column: "k".into() })
        );
        let r = table(&["k", "x"], &[]);
        assert_eq!(
            l.inner_join(&r, &["k".to_string()]),
            Err(JoinError::DuplicateColumn("x".into()))
        );
    }

    #[test]
    fn push_row_pads_short_rows_and_truncates_long_ones() {
        let mut t = table(&["a", "b"], &[]);
        t.push_row(vec![Some("1".into())]);
        t.push_row(vec![Some("1".into()), Some("2".into()), Some("3".into())]);
        assert_eq!(t.rows()[0], vec![Some("1".to_string()), None]);
        assert_eq!(t.rows()[1].len(), 2);
        assert_eq!(t.cell(1, "b"), Some("2"));
    }

    #[test]
    fn select_requires_a_permutation() {
        let t = table(&["a", "b"], &[&[Some("1"), Some("2")]]);
        let s = t.select(&["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(s.rows()[0], vec![Some("2".to_string()), Some("1".to_string())]);
        assert!(t.select(&["a".to_string()]).is_none());
    }
}

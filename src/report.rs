//! p50/p95 latency summary over every latency-bearing column.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::table::Table;

/// Substrings that mark a column as holding latencies.
pub const DEFAULT_LATENCY_MARKERS: [&str; 2] = ["time_taken", "latency"];

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLatency {
    pub column: String,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencySummary {
    pub columns: Vec<ColumnLatency>,
}

impl LatencySummary {
    /// One line per column: `[p50, p95] for <column>=[<p50>, <p95>]`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for c in &self.columns {
            let _ = writeln!(out, "[p50, p95] for {}=[{:?}, {:?}]", c.column, c.p50, c.p95);
        }
        out
    }
}

/// Quantile `q` in `[0, 1]` by linear interpolation between closest ranks.
/// `sorted` must be ascending and non-empty.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Summarize every column whose name contains one of `markers`.
pub fn summarize<S: AsRef<str>>(table: &Table, markers: &[S]) -> LatencySummary {
    let mut summary = LatencySummary::default();
    for column in table.columns() {
        if !markers.iter().any(|m| column.contains(m.as_ref())) {
            continue;
        }
        let mut values: Vec<f64> = table
            .column_values(column)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            warn!(column = %column, "no numeric latencies; skipped");
            continue;
        }
        values.sort_by(f64::total_cmp);
        summary.columns.push(ColumnLatency {
            column: column.clone(),
            p50: quantile(&values, 0.50),
            p95: quantile(&values, 0.95),
        });
    }
    summary
}

/// Overwrite `path` with the rendered summary.
pub fn write_summary(path: &Path, summary: &LatencySummary) -> anyhow::Result<()> {
    crate::util::ensure_parent_dir(path)?;
    std::fs::write(path, summary.render()).with_context(|| format!("write latency summary {:?}", path))?;
    info!(path = %path.display(), columns = summary.columns.len(), "latency summary written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn quantile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.5), 2.5);
        assert!((quantile(&v, 0.95) - 3.85).abs() < 1e-12);
        assert_eq!(quantile(&[7.0], 0.95), 7.0);
    }

    #[test]
    fn p50_never_exceeds_p95() {
        let mut rng = rand::thread_rng();
        for len in 1..50 {
            for _ in 0..20 {
                let mut v: Vec<f64> = (0..len).map(|_| rng.gen_range(0.0..30.0)).collect();
                v.sort_by(f64::total_cmp);
                let (p50, p95) = (quantile(&v, 0.50), quantile(&v, 0.95));
                assert!(p50 <= p95, "p50 {p50} > p95 {p95} for {v:?}");
                assert!(v[0] <= p50 && p95 <= v[len - 1]);
            }
        }
    }

    #[test]
    fn summarizes_only_latency_columns_and_skips_missing() {
        let mut t = Table::new(vec!["prompt".into(), "m-time_taken_in_seconds".into(), "ref_latency".into()]);
        t.push_row(vec![Some("a".into()), Some("1.0".into()), None]);
        t.push_row(vec![Some("b".into()), None, None]);
        t.push_row(vec![Some("c".into()), Some("3.0".into()), None]);
        let s = summarize(&t, &DEFAULT_LATENCY_MARKERS);
        assert_eq!(s.columns.len(), 1);
        let c = &s.columns[0];
        assert_eq!(c.column, "m-time_taken_in_seconds");
        assert_eq!(c.p50, 2.0);
        assert!(c.p50 <= c.p95);
        assert_eq!(s.render(), "[p50, p95] for m-time_taken_in_seconds=[2.0, 2.9]\n");
    }
}

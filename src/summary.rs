//! Per-group descriptive summaries feeding the plotting layer.

use indexmap::IndexMap;

use crate::data::{Column, DataTable};
use crate::error::Result;

/// Compute n, mean, sd and se of `response` for every combination of
/// `group_cols`, in deterministic (sorted) group order.
pub fn group_summary(
    table: &DataTable,
    group_cols: &[&str],
    response: &str,
) -> Result<DataTable> {
    let values = table.numeric(response)?;
    let keys: Vec<&[String]> = group_cols
        .iter()
        .map(|c| table.categorical(c))
        .collect::<Result<_>>()?;

    let mut groups: IndexMap<Vec<String>, Vec<f64>> = IndexMap::new();
    for row in 0..table.n_rows() {
        let key: Vec<String> = keys.iter().map(|k| k[row].clone()).collect();
        groups.entry(key).or_default().push(values[row]);
    }
    groups.sort_keys();

    let n_groups = groups.len();
    let mut key_cols: Vec<Vec<String>> = vec![Vec::with_capacity(n_groups); group_cols.len()];
    let mut ns = Vec::with_capacity(n_groups);
    let mut means = Vec::with_capacity(n_groups);
    let mut sds = Vec::with_capacity(n_groups);
    let mut ses = Vec::with_capacity(n_groups);

    for (key, obs) in &groups {
        for (i, part) in key.iter().enumerate() {
            key_cols[i].push(part.clone());
        }
        let n = obs.len() as f64;
        let mean = obs.iter().sum::<f64>() / n;
        let sd = if obs.len() > 1 {
            (obs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        ns.push(n);
        means.push(mean);
        sds.push(sd);
        ses.push(sd / n.sqrt());
    }

    let mut pairs: Vec<(String, Column)> = group_cols
        .iter()
        .zip(key_cols)
        .map(|(name, col)| (name.to_string(), Column::Categorical(col)))
        .collect();
    pairs.push(("n".to_string(), Column::Numeric(ns)));
    pairs.push(("mean".to_string(), Column::Numeric(means)));
    pairs.push(("sd".to_string(), Column::Numeric(sds)));
    pairs.push(("se".to_string(), Column::Numeric(ses)));

    DataTable::from_columns(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_group_summary_means_and_sd() {
        let table = DataTable::from_columns(vec![
            (
                "population".to_string(),
                Column::Categorical(vec![
                    "a".into(),
                    "a".into(),
                    "b".into(),
                    "b".into(),
                    "b".into(),
                ]),
            ),
            (
                "rate".to_string(),
                Column::Numeric(vec![2.0, 4.0, 1.0, 2.0, 3.0]),
            ),
        ])
        .unwrap();

        let summary = group_summary(&table, &["population"], "rate").unwrap();
        assert_eq!(summary.n_rows(), 2);
        assert_eq!(summary.categorical("population").unwrap(), &["a", "b"]);
        assert_eq!(summary.numeric("n").unwrap(), &[2.0, 3.0]);
        assert_relative_eq!(summary.numeric("mean").unwrap()[0], 3.0);
        assert_relative_eq!(summary.numeric("mean").unwrap()[1], 2.0);
        assert_relative_eq!(summary.numeric("sd").unwrap()[0], 2.0_f64.sqrt());
        assert_relative_eq!(summary.numeric("sd").unwrap()[1], 1.0);
        assert_relative_eq!(
            summary.numeric("se").unwrap()[1],
            1.0 / 3.0_f64.sqrt()
        );
    }

    #[test]
    fn test_two_factor_groups_sorted() {
        let table = DataTable::from_columns(vec![
            (
                "temp".to_string(),
                Column::Categorical(vec!["25".into(), "15".into(), "25".into(), "15".into()]),
            ),
            (
                "pop".to_string(),
                Column::Categorical(vec!["b".into(), "a".into(), "a".into(), "b".into()]),
            ),
            (
                "y".to_string(),
                Column::Numeric(vec![1.0, 2.0, 3.0, 4.0]),
            ),
        ])
        .unwrap();

        let summary = group_summary(&table, &["temp", "pop"], "y").unwrap();
        assert_eq!(summary.n_rows(), 4);
        assert_eq!(
            summary.categorical("temp").unwrap(),
            &["15", "15", "25", "25"]
        );
        assert_eq!(summary.categorical("pop").unwrap(), &["a", "b", "a", "b"]);
    }
}

//! Derived response columns.
//!
//! Three transforms cover the study: a weighted score-frequency index
//! computed row-wise from class-count columns, the trapezoidal area under a
//! disease-progress curve collapsed per experimental unit, and a log(x + 1)
//! transform for count responses.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data::{Column, DataTable};
use crate::error::{PhytostatError, Result};

/// One derivation step, applied after reshaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DerivedStep {
    /// Row-wise weighted composite from score-class count columns, scaled to
    /// [0, 100]: 100 * sum(w_i * n_i) / (max(w) * sum(n_i)).
    WeightedIndex {
        class_cols: Vec<String>,
        weights: Vec<f64>,
        out: String,
    },
    /// Collapse long time-course rows into one area per group by the
    /// trapezoid rule. Time labels carry a prefix ("day14" -> 14.0).
    Audpc {
        time_col: String,
        time_prefix: String,
        value_col: String,
        group_cols: Vec<String>,
        out: String,
    },
    /// Natural log of x + 1.
    Log1p { col: String, out: String },
}

pub fn apply(table: &DataTable, step: &DerivedStep) -> Result<DataTable> {
    match step {
        DerivedStep::WeightedIndex {
            class_cols,
            weights,
            out,
        } => weighted_index(table, class_cols, weights, out),
        DerivedStep::Audpc {
            time_col,
            time_prefix,
            value_col,
            group_cols,
            out,
        } => audpc(table, time_col, time_prefix, value_col, group_cols, out),
        DerivedStep::Log1p { col, out } => log1p(table, col, out),
    }
}

fn weighted_index(
    table: &DataTable,
    class_cols: &[String],
    weights: &[f64],
    out: &str,
) -> Result<DataTable> {
    if class_cols.len() != weights.len() {
        return Err(PhytostatError::Config(format!(
            "weighted index: {} class columns but {} weights",
            class_cols.len(),
            weights.len()
        )));
    }
    let max_weight = weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(max_weight > 0.0) {
        return Err(PhytostatError::Config(
            "weighted index needs a positive maximum weight".to_string(),
        ));
    }
    let counts: Vec<&[f64]> = class_cols
        .iter()
        .map(|c| table.numeric(c))
        .collect::<Result<_>>()?;

    let mut index = Vec::with_capacity(table.n_rows());
    for row in 0..table.n_rows() {
        let total: f64 = counts.iter().map(|c| c[row]).sum();
        let weighted: f64 = counts
            .iter()
            .zip(weights)
            .map(|(c, w)| c[row] * w)
            .sum();
        // all class counts zero leaves the index undefined
        if total == 0.0 {
            return Err(PhytostatError::InvalidValue {
                row: row + 1,
                message: "every score-class count is zero".to_string(),
            });
        }
        index.push(100.0 * weighted / (max_weight * total));
    }
    table.with_column(out, Column::Numeric(index))
}

fn parse_time(label: &str, prefix: &str, column: &str, row: usize) -> Result<f64> {
    let digits = label.strip_prefix(prefix).unwrap_or(label);
    digits
        .parse::<f64>()
        .map_err(|_| PhytostatError::NumericParse {
            row: row + 1,
            column: column.to_string(),
            value: label.to_string(),
        })
}

fn audpc(
    table: &DataTable,
    time_col: &str,
    time_prefix: &str,
    value_col: &str,
    group_cols: &[String],
    out: &str,
) -> Result<DataTable> {
    let labels = table.categorical(time_col)?;
    let values = table.numeric(value_col)?;
    let keys: Vec<&[String]> = group_cols
        .iter()
        .map(|c| table.categorical(c))
        .collect::<Result<_>>()?;

    let mut groups: IndexMap<Vec<String>, Vec<(f64, f64)>> = IndexMap::new();
    for row in 0..table.n_rows() {
        let key: Vec<String> = keys.iter().map(|k| k[row].clone()).collect();
        let time = parse_time(&labels[row], time_prefix, time_col, row)?;
        groups.entry(key).or_default().push((time, values[row]));
    }
    groups.sort_keys();

    let mut key_values: Vec<Vec<String>> = vec![Vec::new(); group_cols.len()];
    let mut areas = Vec::with_capacity(groups.len());
    for (key, mut points) in groups {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.len() < 2 {
            return Err(PhytostatError::Config(format!(
                "AUDPC needs at least two time points per unit, got {}",
                points.len()
            )));
        }
        let area: f64 = points
            .windows(2)
            .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
            .sum();
        for (i, k) in key.into_iter().enumerate() {
            key_values[i].push(k);
        }
        areas.push(area);
    }

    let mut pairs: Vec<(String, Column)> = group_cols
        .iter()
        .zip(key_values)
        .map(|(name, vals)| (name.clone(), Column::Categorical(vals)))
        .collect();
    pairs.push((out.to_string(), Column::Numeric(areas)));
    DataTable::from_columns(pairs)
}

fn log1p(table: &DataTable, col: &str, out: &str) -> Result<DataTable> {
    let values = table.numeric(col)?;
    let transformed: Vec<f64> = values.iter().map(|x| (x + 1.0).ln()).collect();
    table.with_column(out, Column::Numeric(transformed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn score_table() -> DataTable {
        DataTable::from_columns(vec![
            (
                "isolate".to_string(),
                Column::Categorical(vec!["i1".to_string(), "i2".to_string()]),
            ),
            ("score0".to_string(), Column::Numeric(vec![10.0, 0.0])),
            ("score1".to_string(), Column::Numeric(vec![0.0, 0.0])),
            ("score2".to_string(), Column::Numeric(vec![0.0, 0.0])),
            ("score3".to_string(), Column::Numeric(vec![0.0, 10.0])),
        ])
        .unwrap()
    }

    #[test]
    fn weighted_index_spans_zero_to_hundred() {
        let step = DerivedStep::WeightedIndex {
            class_cols: vec![
                "score0".to_string(),
                "score1".to_string(),
                "score2".to_string(),
                "score3".to_string(),
            ],
            weights: vec![0.0, 1.0, 2.0, 3.0],
            out: "ppi".to_string(),
        };
        let derived = apply(&score_table(), &step).unwrap();
        let ppi = derived.numeric("ppi").unwrap();
        assert_relative_eq!(ppi[0], 0.0);
        assert_relative_eq!(ppi[1], 100.0);
    }

    #[test]
    fn audpc_matches_trapezoid_by_hand() {
        let table = DataTable::from_columns(vec![
            (
                "unit".to_string(),
                Column::Categorical(vec!["u1".to_string(); 3]),
            ),
            (
                "day".to_string(),
                Column::Categorical(vec![
                    "day7".to_string(),
                    "day14".to_string(),
                    "day21".to_string(),
                ]),
            ),
            (
                "severity".to_string(),
                Column::Numeric(vec![10.0, 30.0, 50.0]),
            ),
        ])
        .unwrap();
        let step = DerivedStep::Audpc {
            time_col: "day".to_string(),
            time_prefix: "day".to_string(),
            value_col: "severity".to_string(),
            group_cols: vec!["unit".to_string()],
            out: "audpc".to_string(),
        };
        let derived = apply(&table, &step).unwrap();
        // 7*(10+30)/2 + 7*(30+50)/2 = 140 + 280
        assert_relative_eq!(derived.numeric("audpc").unwrap()[0], 420.0);
        assert_eq!(derived.n_rows(), 1);
    }

    #[test]
    fn audpc_ignores_row_order() {
        let table = DataTable::from_columns(vec![
            (
                "unit".to_string(),
                Column::Categorical(vec!["u1".to_string(); 3]),
            ),
            (
                "day".to_string(),
                Column::Categorical(vec![
                    "day21".to_string(),
                    "day7".to_string(),
                    "day14".to_string(),
                ]),
            ),
            (
                "severity".to_string(),
                Column::Numeric(vec![50.0, 10.0, 30.0]),
            ),
        ])
        .unwrap();
        let step = DerivedStep::Audpc {
            time_col: "day".to_string(),
            time_prefix: "day".to_string(),
            value_col: "severity".to_string(),
            group_cols: vec!["unit".to_string()],
            out: "audpc".to_string(),
        };
        let derived = apply(&table, &step).unwrap();
        assert_relative_eq!(derived.numeric("audpc").unwrap()[0], 420.0);
    }

    #[test]
    fn log1p_of_zero_is_zero() {
        let table = DataTable::from_columns(vec![(
            "spores".to_string(),
            Column::Numeric(vec![0.0, std::f64::consts::E - 1.0]),
        )])
        .unwrap();
        let step = DerivedStep::Log1p {
            col: "spores".to_string(),
            out: "log_spores".to_string(),
        };
        let derived = apply(&table, &step).unwrap();
        let logs = derived.numeric("log_spores").unwrap();
        assert_relative_eq!(logs[0], 0.0);
        assert_relative_eq!(logs[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn weighted_index_rejects_mismatched_weights() {
        let step = DerivedStep::WeightedIndex {
            class_cols: vec!["score0".to_string()],
            weights: vec![0.0, 1.0],
            out: "ppi".to_string(),
        };
        assert!(apply(&score_table(), &step).is_err());
    }
}

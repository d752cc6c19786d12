//! Wide/long reshaping and composite grouping keys.

use indexmap::IndexMap;

use crate::data::frame::{Column, DataTable};
use crate::error::{PhytostatError, Result};

/// Pivot fixed wide value columns into long format.
///
/// Each wide row becomes one long row per entry of `value_cols`; the source
/// column name lands in `name_col`, its value in `value_col`, and every other
/// column is replicated unchanged. No information is lost: `pivot_wider` is
/// the exact inverse.
pub fn pivot_longer(
    table: &DataTable,
    value_cols: &[&str],
    name_col: &str,
    value_col: &str,
) -> Result<DataTable> {
    let n = table.n_rows();
    let k = value_cols.len();
    let wide: Vec<&[f64]> = value_cols
        .iter()
        .map(|c| table.numeric(c))
        .collect::<Result<_>>()?;

    let mut names = Vec::with_capacity(n * k);
    let mut values = Vec::with_capacity(n * k);
    let mut source_rows = Vec::with_capacity(n * k);
    for row in 0..n {
        for (j, col_name) in value_cols.iter().enumerate() {
            names.push(col_name.to_string());
            values.push(wide[j][row]);
            source_rows.push(row);
        }
    }

    let mut pairs: Vec<(String, Column)> = Vec::new();
    for name in table.column_names() {
        if value_cols.contains(&name) {
            continue;
        }
        let replicated = match table.column(name)? {
            Column::Categorical(v) => {
                Column::Categorical(source_rows.iter().map(|&i| v[i].clone()).collect())
            }
            Column::Numeric(v) => Column::Numeric(source_rows.iter().map(|&i| v[i]).collect()),
        };
        pairs.push((name.to_string(), replicated));
    }
    pairs.push((name_col.to_string(), Column::Categorical(names)));
    pairs.push((value_col.to_string(), Column::Numeric(values)));

    DataTable::from_columns(pairs)
}

/// Inverse of `pivot_longer`: spread `name_col`/`value_col` back into one
/// column per name, grouping rows by `key_cols`.
///
/// Every key combination must carry every name exactly once; a duplicate or
/// a missing cell is an error rather than a silent overwrite or NaN.
pub fn pivot_wider(
    table: &DataTable,
    key_cols: &[&str],
    name_col: &str,
    value_col: &str,
) -> Result<DataTable> {
    let names = table.categorical(name_col)?;
    let values = table.numeric(value_col)?;
    let keys: Vec<&[String]> = key_cols
        .iter()
        .map(|c| table.categorical(c))
        .collect::<Result<_>>()?;

    let mut wide_names: Vec<String> = names.to_vec();
    wide_names.sort();
    wide_names.dedup();

    // First appearance order of each key combination
    let mut groups: IndexMap<Vec<String>, usize> = IndexMap::new();
    for row in 0..table.n_rows() {
        let key: Vec<String> = keys.iter().map(|k| k[row].clone()).collect();
        let next = groups.len();
        groups.entry(key).or_insert(next);
    }

    let n_groups = groups.len();
    let mut wide: IndexMap<String, Vec<Option<f64>>> = wide_names
        .iter()
        .map(|n| (n.clone(), vec![None; n_groups]))
        .collect();
    for row in 0..table.n_rows() {
        let key: Vec<String> = keys.iter().map(|k| k[row].clone()).collect();
        let group = groups[&key];
        let cell = &mut wide[&names[row]][group];
        if cell.is_some() {
            return Err(PhytostatError::Unbalanced(format!(
                "'{}' appears more than once for key [{}]",
                names[row],
                key.join(", ")
            )));
        }
        *cell = Some(values[row]);
    }

    let mut pairs: Vec<(String, Column)> = Vec::new();
    for (i, key_col) in key_cols.iter().enumerate() {
        let col: Vec<String> = groups.keys().map(|k| k[i].clone()).collect();
        pairs.push((key_col.to_string(), Column::Categorical(col)));
    }
    for (name, col) in wide {
        let filled: Vec<f64> = col
            .into_iter()
            .enumerate()
            .map(|(g, cell)| {
                cell.ok_or_else(|| {
                    let key = groups
                        .get_index(g)
                        .map(|(k, _)| k.join(", "))
                        .unwrap_or_default();
                    PhytostatError::Unbalanced(format!(
                        "'{}' is missing for key [{}]",
                        name, key
                    ))
                })
            })
            .collect::<Result<_>>()?;
        pairs.push((name, Column::Numeric(filled)));
    }

    DataTable::from_columns(pairs)
}

/// Concatenate two categorical columns into a composite grouping key.
///
/// The left column must not contain the separator, so that `split_composite`
/// can always recover both source values exactly.
pub fn derive_composite(
    table: &DataTable,
    left: &str,
    right: &str,
    out: &str,
    sep: &str,
) -> Result<DataTable> {
    let left_vals = table.categorical(left)?;
    let right_vals = table.categorical(right)?;

    if let Some(level) = left_vals.iter().find(|v| v.contains(sep)) {
        return Err(PhytostatError::SeparatorClash {
            column: left.to_string(),
            level: level.clone(),
            sep: sep.to_string(),
        });
    }

    let composite: Vec<String> = left_vals
        .iter()
        .zip(right_vals.iter())
        .map(|(l, r)| format!("{}{}{}", l, sep, r))
        .collect();
    table.with_column(out, Column::Categorical(composite))
}

/// Split a composite key back into its two source columns.
pub fn split_composite(
    table: &DataTable,
    composite: &str,
    left_out: &str,
    right_out: &str,
    sep: &str,
) -> Result<DataTable> {
    let values = table.categorical(composite)?;
    let mut lefts = Vec::with_capacity(values.len());
    let mut rights = Vec::with_capacity(values.len());
    for value in values {
        match value.split_once(sep) {
            Some((l, r)) => {
                lefts.push(l.to_string());
                rights.push(r.to_string());
            }
            None => {
                return Err(PhytostatError::SeparatorClash {
                    column: composite.to_string(),
                    level: value.clone(),
                    sep: sep.to_string(),
                })
            }
        }
    }
    table
        .with_column(left_out, Column::Categorical(lefts))?
        .with_column(right_out, Column::Categorical(rights))
}

//! Column-oriented observation tables.
//!
//! A `DataTable` is an ordered map of named columns, each either categorical
//! (string levels) or numeric. Columns are selected by name, never by
//! position, and schemas are validated at load time.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PhytostatError, Result};

/// A single column of observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Categorical(Vec<String>),
    Numeric(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Categorical(v) => v.len(),
            Column::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Categorical(_) => ColumnKind::Categorical,
            Column::Numeric(_) => ColumnKind::Numeric,
        }
    }

    fn take_rows(&self, rows: &[usize]) -> Column {
        match self {
            Column::Categorical(v) => {
                Column::Categorical(rows.iter().map(|&i| v[i].clone()).collect())
            }
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Categorical,
    Numeric,
}

impl ColumnKind {
    fn name(self) -> &'static str {
        match self {
            ColumnKind::Categorical => "categorical",
            ColumnKind::Numeric => "numeric",
        }
    }
}

/// Expected name and kind of one column, used for load-time validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSchema {
    pub fn categorical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Categorical,
        }
    }

    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Numeric,
        }
    }
}

/// Declarative row filter on a categorical column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Predicate {
    /// Keep rows where the column equals the level
    Eq(String, String),
    /// Keep rows where the column differs from the level
    Ne(String, String),
    /// Keep rows where the column is one of the levels
    In(String, Vec<String>),
}

impl Predicate {
    fn column(&self) -> &str {
        match self {
            Predicate::Eq(c, _) | Predicate::Ne(c, _) => c,
            Predicate::In(c, _) => c,
        }
    }

    fn keep(&self, value: &str) -> bool {
        match self {
            Predicate::Eq(_, level) => value == level,
            Predicate::Ne(_, level) => value != level,
            Predicate::In(_, levels) => levels.iter().any(|l| l == value),
        }
    }
}

/// An immutable rectangular table with named, typed columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    columns: IndexMap<String, Column>,
    n_rows: usize,
}

impl DataTable {
    /// Build a table from (name, column) pairs, checking that all columns
    /// share a length.
    pub fn from_columns(pairs: Vec<(String, Column)>) -> Result<Self> {
        let n_rows = pairs.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut columns = IndexMap::with_capacity(pairs.len());
        for (name, col) in pairs {
            if col.len() != n_rows {
                return Err(PhytostatError::LengthMismatch {
                    column: name,
                    expected: n_rows,
                    actual: col.len(),
                });
            }
            columns.insert(name, col);
        }
        Ok(Self { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| PhytostatError::MissingColumn(name.to_string()))
    }

    /// Typed accessor for a categorical column.
    pub fn categorical(&self, name: &str) -> Result<&[String]> {
        match self.column(name)? {
            Column::Categorical(v) => Ok(v),
            Column::Numeric(_) => Err(PhytostatError::ColumnType {
                column: name.to_string(),
                expected: "categorical",
                actual: "numeric",
            }),
        }
    }

    /// Typed accessor for a numeric column.
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v),
            Column::Categorical(_) => Err(PhytostatError::ColumnType {
                column: name.to_string(),
                expected: "numeric",
                actual: "categorical",
            }),
        }
    }

    /// Return a new table with an extra (or replaced) column appended.
    pub fn with_column(&self, name: &str, col: Column) -> Result<Self> {
        if col.len() != self.n_rows {
            return Err(PhytostatError::LengthMismatch {
                column: name.to_string(),
                expected: self.n_rows,
                actual: col.len(),
            });
        }
        let mut columns = self.columns.clone();
        columns.insert(name.to_string(), col);
        Ok(Self {
            columns,
            n_rows: self.n_rows,
        })
    }

    /// Return a new table without the named columns. Unknown names are an
    /// error so that schema drift is caught instead of silently ignored.
    pub fn drop_columns(&self, names: &[&str]) -> Result<Self> {
        for name in names {
            if !self.columns.contains_key(*name) {
                return Err(PhytostatError::MissingColumn(name.to_string()));
            }
        }
        let columns: IndexMap<String, Column> = self
            .columns
            .iter()
            .filter(|(k, _)| !names.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self {
            columns,
            n_rows: self.n_rows,
        })
    }

    /// Return a new table keeping only rows satisfying every predicate.
    pub fn filter(&self, predicates: &[Predicate]) -> Result<Self> {
        let mut keep: Vec<usize> = (0..self.n_rows).collect();
        for pred in predicates {
            let values = self.categorical(pred.column())?;
            keep.retain(|&i| pred.keep(&values[i]));
        }
        if keep.is_empty() && self.n_rows > 0 {
            return Err(PhytostatError::EmptySelection(format!(
                " with {} predicate(s)",
                predicates.len()
            )));
        }
        Ok(self.select_rows(&keep))
    }

    /// Return a new table with the given row indices, in order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let columns: IndexMap<String, Column> = self
            .columns
            .iter()
            .map(|(k, v)| (k.clone(), v.take_rows(rows)))
            .collect();
        Self {
            columns,
            n_rows: rows.len(),
        }
    }

    /// Sorted unique levels of a categorical column.
    pub fn levels(&self, name: &str) -> Result<Vec<String>> {
        let values = self.categorical(name)?;
        let mut levels: Vec<String> = values.to_vec();
        levels.sort();
        levels.dedup();
        Ok(levels)
    }

    /// Check that every expected column is present with the expected kind.
    /// Extra columns are allowed.
    pub fn validate_schema(&self, schema: &[ColumnSchema]) -> Result<()> {
        for expected in schema {
            let col = self.column(&expected.name)?;
            if col.kind() != expected.kind {
                return Err(PhytostatError::ColumnType {
                    column: expected.name.clone(),
                    expected: expected.kind.name(),
                    actual: col.kind().name(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> DataTable {
        DataTable::from_columns(vec![
            (
                "species".to_string(),
                Column::Categorical(vec![
                    "graminearum".into(),
                    "graminearum".into(),
                    "asiaticum".into(),
                    "asiaticum".into(),
                ]),
            ),
            (
                "isolate".to_string(),
                Column::Categorical(vec![
                    "Fg1".into(),
                    "Fg2".into(),
                    "Fa1".into(),
                    "control".into(),
                ]),
            ),
            (
                "score".to_string(),
                Column::Numeric(vec![10.0, 20.0, 30.0, 40.0]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let result = DataTable::from_columns(vec![
            ("a".to_string(), Column::Numeric(vec![1.0, 2.0])),
            ("b".to_string(), Column::Numeric(vec![1.0])),
        ]);
        assert!(matches!(
            result,
            Err(PhytostatError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_typed_accessors() {
        let t = sample_table();
        assert_eq!(t.numeric("score").unwrap(), &[10.0, 20.0, 30.0, 40.0]);
        assert!(t.numeric("species").is_err());
        assert!(t.categorical("score").is_err());
        assert!(t.column("missing").is_err());
    }

    #[test]
    fn test_filter_removes_control_rows() {
        let t = sample_table();
        let filtered = t
            .filter(&[Predicate::Ne("isolate".into(), "control".into())])
            .unwrap();
        assert_eq!(filtered.n_rows(), 3);
        // The control row must actually be absent, not relabeled
        assert!(!filtered
            .categorical("isolate")
            .unwrap()
            .iter()
            .any(|v| v == "control"));
    }

    #[test]
    fn test_filter_eq_and_in() {
        let t = sample_table();
        let g = t
            .filter(&[Predicate::Eq("species".into(), "graminearum".into())])
            .unwrap();
        assert_eq!(g.n_rows(), 2);

        let two = t
            .filter(&[Predicate::In(
                "isolate".into(),
                vec!["Fg1".into(), "Fa1".into()],
            )])
            .unwrap();
        assert_eq!(two.n_rows(), 2);
    }

    #[test]
    fn test_filter_to_nothing_is_an_error() {
        let t = sample_table();
        let result = t.filter(&[Predicate::Eq("species".into(), "nivale".into())]);
        assert!(matches!(result, Err(PhytostatError::EmptySelection(_))));
    }

    #[test]
    fn test_drop_columns_by_name() {
        let t = sample_table();
        let dropped = t.drop_columns(&["score"]).unwrap();
        assert_eq!(dropped.n_columns(), 2);
        assert!(!dropped.has_column("score"));
        // unknown names are caught
        assert!(t.drop_columns(&["no_such"]).is_err());
    }

    #[test]
    fn test_levels_sorted_unique() {
        let t = sample_table();
        assert_eq!(
            t.levels("species").unwrap(),
            vec!["asiaticum".to_string(), "graminearum".to_string()]
        );
    }

    #[test]
    fn test_schema_validation() {
        let t = sample_table();
        let ok = vec![
            ColumnSchema::categorical("species"),
            ColumnSchema::numeric("score"),
        ];
        assert!(t.validate_schema(&ok).is_ok());

        let wrong_kind = vec![ColumnSchema::numeric("species")];
        assert!(t.validate_schema(&wrong_kind).is_err());

        let missing = vec![ColumnSchema::categorical("cultivar")];
        assert!(t.validate_schema(&missing).is_err());
    }

    #[test]
    fn test_with_column_preserves_input() {
        let t = sample_table();
        let extended = t
            .with_column("double", Column::Numeric(vec![20.0, 40.0, 60.0, 80.0]))
            .unwrap();
        assert_eq!(extended.n_columns(), 4);
        assert_eq!(t.n_columns(), 3);
    }
}

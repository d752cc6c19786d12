//! Error taxonomy for the analysis library.
//!
//! Malformed input fails loudly at load time; a model that does not converge
//! is surfaced as a distinct error instead of a degenerate fit. A significant
//! interaction term is *not* an error (see `stratify`): it is a data condition
//! that changes the downstream analysis policy.

use thiserror::Error;

/// Library-wide result alias.
pub type Result<T> = std::result::Result<T, PhytostatError>;

#[derive(Debug, Error)]
pub enum PhytostatError {
    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("column '{column}' is {actual}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("column '{column}' has {actual} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("no rows left after filtering{0}")]
    EmptySelection(String),

    #[error("row {row}: cannot parse '{value}' as a number for column '{column}'")]
    NumericParse {
        row: usize,
        column: String,
        value: String,
    },

    #[error("row {row}: {message}")]
    InvalidValue { row: usize, message: String },

    #[error("pivot is not balanced: {0}")]
    Unbalanced(String),

    #[error("separator '{sep}' occurs inside level '{level}' of column '{column}'")]
    SeparatorClash {
        column: String,
        level: String,
        sep: String,
    },

    #[error("model did not converge after {iterations} iterations (deviance {deviance})")]
    NonConvergence { iterations: usize, deviance: f64 },

    #[error("design matrix is rank deficient: {0}")]
    Singular(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown experiment '{0}'")]
    UnknownExperiment(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

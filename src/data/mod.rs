//! Tabular data layer: observation tables, reshaping, CSV ingestion.
//!
//! Every operation produces a new table; nothing mutates its input in place.

mod frame;
mod load;
mod reshape;

pub use frame::{Column, ColumnKind, ColumnSchema, DataTable, Predicate};
pub use load::load_csv;
pub use reshape::{derive_composite, pivot_longer, pivot_wider, split_composite};

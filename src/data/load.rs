//! CSV ingestion with schema validation.

use std::path::Path;

use tracing::{debug, info};

use crate::data::frame::{Column, ColumnKind, ColumnSchema, DataTable};
use crate::error::{PhytostatError, Result};

/// Read a delimited file into a `DataTable`.
///
/// The header row is required and must contain every schema column; columns
/// not named in the schema are loaded as categorical. A numeric cell that
/// fails to parse is a hard error carrying its row number, so malformed input
/// fails at load time instead of propagating.
pub fn load_csv(path: &Path, schema: &[ColumnSchema]) -> Result<DataTable> {
    info!("Loading {}", path.display());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let kinds: Vec<ColumnKind> = headers
        .iter()
        .map(|h| {
            schema
                .iter()
                .find(|s| &s.name == h)
                .map(|s| s.kind)
                .unwrap_or(ColumnKind::Categorical)
        })
        .collect();

    let mut columns: Vec<Column> = kinds
        .iter()
        .map(|k| match k {
            ColumnKind::Categorical => Column::Categorical(Vec::new()),
            ColumnKind::Numeric => Column::Numeric(Vec::new()),
        })
        .collect();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        for (col_idx, cell) in record.iter().enumerate() {
            match &mut columns[col_idx] {
                Column::Categorical(v) => v.push(cell.to_string()),
                Column::Numeric(v) => {
                    let parsed =
                        cell.parse::<f64>()
                            .map_err(|_| PhytostatError::NumericParse {
                                row: row_idx + 2, // 1-based, after header
                                column: headers[col_idx].clone(),
                                value: cell.to_string(),
                            })?;
                    v.push(parsed);
                }
            }
        }
    }

    let table = DataTable::from_columns(headers.into_iter().zip(columns).collect())?;
    table.validate_schema(schema)?;
    debug!(
        "Loaded {} rows x {} columns",
        table.n_rows(),
        table.n_columns()
    );
    Ok(table)
}

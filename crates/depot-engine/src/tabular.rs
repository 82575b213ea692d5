//! Canonical tabular encoding.
//!
//! Batches are flattened into one CSV document. The encoding is a pure
//! function of the batch contents, which is what makes the checksum of the
//! output a stable content address.

use depot_core::{Error, Result, fetch::RowBatch};
use serde_json::Value;

/// Render one cell. `null` becomes an empty cell, strings are written
/// verbatim, nested values as compact JSON.
fn cell(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::Array(_) | Value::Object(_) => value.to_string(),
  }
}

/// Concatenate `batches` into CSV bytes. The header comes from the first
/// batch; every later batch must carry the same columns and every row must
/// have one value per column.
pub fn encode_csv(batches: &[RowBatch]) -> Result<Vec<u8>> {
  let Some(first) = batches.first() else {
    return Ok(Vec::new());
  };
  let columns = &first.columns;

  let mut writer = csv::WriterBuilder::new()
    .terminator(csv::Terminator::Any(b'\n'))
    .from_writer(Vec::new());
  writer.write_record(columns).map_err(csv_error)?;

  for (index, batch) in batches.iter().enumerate() {
    if &batch.columns != columns {
      return Err(Error::Transport(format!(
        "batch {index} has columns {:?}, expected {:?}",
        batch.columns, columns
      )));
    }
    for (row_index, row) in batch.rows.iter().enumerate() {
      if row.len() != columns.len() {
        return Err(Error::Transport(format!(
          "batch {index} row {row_index} has {} values for {} columns",
          row.len(),
          columns.len()
        )));
      }
      writer
        .write_record(row.iter().map(cell))
        .map_err(csv_error)?;
    }
  }

  writer
    .into_inner()
    .map_err(|e| Error::storage("flushing csv buffer", e.into_error()))
}

fn csv_error(e: csv::Error) -> Error {
  Error::storage("encoding csv", std::io::Error::other(e))
}

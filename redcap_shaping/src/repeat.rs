use std::collections::HashMap;

use log::{debug, warn};

use crate::config::*;
use crate::table::Table;

fn has_record_id(v: Option<&str>) -> bool {
    v.map(|s| !s.trim().is_empty()).unwrap_or(false)
}

/// Copies the values of `source` into the `record_id` column.
///
/// The column is created at the end of the table if it does not exist yet.
pub fn inject_record_id(table: &mut Table, source: &str) -> Result<(), ShapeError> {
    let values: Vec<Cell> = table
        .column_values(source)?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()))
        .collect();
    table.set_column(RECORD_ID, values)
}

/// Removes the rows that have no record identifier. Returns how many were removed.
pub fn drop_missing_record_id(table: &mut Table) -> Result<usize, ShapeError> {
    table.require_columns(&[RECORD_ID])?;
    let before = table.len();
    table.retain_rows(|r| has_record_id(r.get(RECORD_ID)));
    let dropped = before - table.len();
    if dropped > 0 {
        warn!("drop_missing_record_id: dropped {} row(s) without record_id", dropped);
    }
    Ok(dropped)
}

/// Numbers the rows of each record.
///
/// Appends `redcap_repeat_instrument` (always `instrument`) and
/// `redcap_repeat_instance`, a running count per `record_id` starting at 1,
/// in the order the rows appear. Rows are never reordered. The ids are
/// written without surrounding whitespace.
///
/// Every row must carry a non-empty `record_id`.
pub fn number_repeat_instances(table: &Table, instrument: &str) -> Result<Table, ShapeError> {
    let ids = table.column_values(RECORD_ID)?;
    let missing: Vec<usize> = ids
        .iter()
        .enumerate()
        .filter(|(_, v)| !has_record_id(**v))
        .map(|(idx, _)| idx)
        .collect();
    if !missing.is_empty() {
        return Err(ShapeError::MissingRecordId { rows: missing });
    }

    // Rows are grouped on the trimmed id, which is also the id written out.
    let mut counters: HashMap<&str, u64> = HashMap::new();
    let mut trimmed: Vec<Cell> = Vec::with_capacity(ids.len());
    let mut instances: Vec<Cell> = Vec::with_capacity(ids.len());
    for id in ids.iter().flatten() {
        let id = id.trim();
        let count = counters.entry(id).or_insert(0);
        *count += 1;
        trimmed.push(Some(id.to_string()));
        instances.push(Some(count.to_string()));
    }
    debug!(
        "number_repeat_instances: {} rows, {} records",
        instances.len(),
        counters.len()
    );

    let mut res = table.clone();
    res.set_column(RECORD_ID, trimmed)?;
    res.set_column(REPEAT_INSTRUMENT, vec![Some(instrument.to_string()); table.len()])?;
    res.set_column(REPEAT_INSTANCE, instances)?;
    Ok(res)
}

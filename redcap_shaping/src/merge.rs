use std::collections::HashMap;

use log::{debug, info};

use crate::config::*;
use crate::table::Table;

/// Row-wise union of several tables.
///
/// Columns are aligned by name, in the order they are first seen; a column
/// missing from one of the tables is null in the rows coming from it.
pub fn concatenate(tables: &[Table]) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for t in tables.iter() {
        for c in t.columns() {
            if !columns.contains(c) {
                columns.push(c.clone());
            }
        }
    }
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for t in tables.iter() {
        let positions: Vec<Option<usize>> = columns.iter().map(|c| t.column_index(c)).collect();
        for r in t.rows() {
            rows.push(
                positions
                    .iter()
                    .map(|p| p.and_then(|idx| r[idx].clone()))
                    .collect(),
            );
        }
    }
    debug!(
        "concatenate: {} tables -> {} rows, {} columns",
        tables.len(),
        rows.len(),
        columns.len()
    );
    Table::from_parts(columns, rows)
}

/// Full outer join of several tables on the `key` column.
///
/// The output columns are the key followed by the other columns of each table,
/// in table order. Keys appear in the order they are first seen. A key
/// present in several rows of the same table produces one output row per
/// combination, as a relational join does. Rows without a key never match
/// anything and are kept on their own.
///
/// Apart from the key, the tables must not share column names.
pub fn outer_join(tables: &[Table], key: &str) -> Result<Table, ShapeError> {
    let mut key_positions: Vec<usize> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for t in tables.iter() {
        match t.column_index(key) {
            Some(idx) => key_positions.push(idx),
            None => missing.push(key.to_string()),
        }
    }
    if !missing.is_empty() {
        missing.dedup();
        return Err(ShapeError::MissingColumns { columns: missing });
    }

    // Output layout: the key, then the payload columns of every table.
    let mut columns: Vec<String> = vec![key.to_string()];
    let mut owners: HashMap<String, usize> = HashMap::new();
    for (t_idx, t) in tables.iter().enumerate() {
        for c in t.columns().iter().filter(|c| *c != key) {
            if let Some(other) = owners.insert(c.clone(), t_idx) {
                return Err(ShapeError::DuplicateHeader {
                    header: c.clone(),
                    sources: vec![format!("file {}", other + 1), format!("file {}", t_idx + 1)],
                });
            }
            columns.push(c.clone());
        }
    }

    // For every table: key -> rows holding it.
    let mut key_order: Vec<String> = Vec::new();
    let mut unkeyed: Vec<(usize, usize)> = Vec::new();
    let mut index: Vec<HashMap<&str, Vec<usize>>> = vec![HashMap::new(); tables.len()];
    for (t_idx, t) in tables.iter().enumerate() {
        for (r_idx, r) in t.rows().iter().enumerate() {
            match r[key_positions[t_idx]].as_deref() {
                Some(k) if !k.is_empty() => {
                    if !index.iter().any(|m| m.contains_key(k)) {
                        key_order.push(k.to_string());
                    }
                    index[t_idx].entry(k).or_default().push(r_idx);
                }
                _ => unkeyed.push((t_idx, r_idx)),
            }
        }
    }

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for k in key_order.iter() {
        // Each table contributes its matching rows, or a single null block.
        let mut partials: Vec<Vec<Cell>> = vec![vec![Some(k.clone())]];
        for (t_idx, t) in tables.iter().enumerate() {
            let blocks: Vec<Vec<Cell>> = match index[t_idx].get(k.as_str()) {
                Some(r_idxs) => r_idxs
                    .iter()
                    .map(|r_idx| payload(t, key_positions[t_idx], &t.rows()[*r_idx]))
                    .collect(),
                None => vec![vec![None; t.columns().len() - 1]],
            };
            partials = partials
                .iter()
                .flat_map(|p| {
                    blocks.iter().map(move |b| {
                        let mut row = p.clone();
                        row.extend(b.iter().cloned());
                        row
                    })
                })
                .collect();
        }
        rows.extend(partials);
    }
    for (t_idx, r_idx) in unkeyed {
        let mut row: Vec<Cell> = vec![None];
        for (other_idx, t) in tables.iter().enumerate() {
            if other_idx == t_idx {
                row.extend(payload(t, key_positions[t_idx], &t.rows()[r_idx]));
            } else {
                row.extend(vec![None; t.columns().len() - 1]);
            }
        }
        rows.push(row);
    }
    info!(
        "outer_join: {} tables -> {} rows ({} keys)",
        tables.len(),
        rows.len(),
        key_order.len()
    );
    Ok(Table::from_parts(columns, rows))
}

// The cells of a row without its key.
fn payload(t: &Table, key_idx: usize, row: &[Cell]) -> Vec<Cell> {
    debug_assert_eq!(row.len(), t.columns().len());
    row.iter()
        .enumerate()
        .filter(|(idx, _)| *idx != key_idx)
        .map(|(_, v)| v.clone())
        .collect()
}

/// Combines the tables according to the merge mode. Outer joins use `record_id`.
pub fn merge(tables: Vec<Table>, mode: MergeMode) -> Result<Table, ShapeError> {
    match (mode, tables.len()) {
        (_, 1) => Ok(tables.into_iter().next().unwrap_or_default()),
        (MergeMode::Concatenate, _) => Ok(concatenate(&tables)),
        (MergeMode::OuterJoin, _) => outer_join(&tables, RECORD_ID),
    }
}

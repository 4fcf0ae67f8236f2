use std::collections::HashSet;

use log::debug;

use crate::config::*;
use crate::table::Table;

/// Cleans one segment of a multi-value cell: surrounding whitespace and
/// leading marker characters are removed.
pub fn clean_segment(segment: &str, strip_marker: Option<char>) -> String {
    let s = segment.trim();
    match strip_marker {
        Some(m) => s.trim_start_matches(m).trim().to_string(),
        None => s.to_string(),
    }
}

/// Splits a multi-value field into one row per value.
///
/// Every other field is copied unchanged into each produced row. A null or
/// empty cell is a single empty segment, kept or dropped according to
/// `keep_empty`. Segments in the exclusion set are dropped.
pub fn expand_rows(table: &Table, rules: &ExpansionRules) -> Result<Table, ShapeError> {
    let idx = table.require_columns(&[rules.field.as_str()])?[0];
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for row in table.rows().iter() {
        let raw = row[idx].as_deref().unwrap_or("");
        for segment in raw.split(rules.delimiter) {
            let value = clean_segment(segment, rules.strip_marker);
            if value.is_empty() && !rules.keep_empty {
                continue;
            }
            if rules.exclude.contains(&value) {
                continue;
            }
            let mut expanded = row.clone();
            expanded[idx] = if value.is_empty() { None } else { Some(value) };
            rows.push(expanded);
        }
    }
    debug!(
        "expand_rows: field {:?}: {} rows -> {} rows",
        rules.field,
        table.len(),
        rows.len()
    );
    Ok(Table::from_parts(table.columns().to_vec(), rows))
}

/// The distinct non-null values of a column, in the order they first appear.
pub fn observed_values(table: &Table, field: &str) -> Result<Vec<String>, ShapeError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut res: Vec<String> = Vec::new();
    for v in table.column_values(field)?.into_iter().flatten() {
        if seen.insert(v) {
            res.push(v.to_string());
        }
    }
    Ok(res)
}

/// Keeps only the rows whose value for `field` is in the allowed set.
pub fn filter_values(
    table: &Table,
    field: &str,
    allowed: &HashSet<String>,
) -> Result<Table, ShapeError> {
    table.require_columns(&[field])?;
    let mut res = table.clone();
    res.retain_rows(|r| r.get(field).map(|v| allowed.contains(v)).unwrap_or(false));
    debug!(
        "filter_values: field {:?}: {} rows -> {} rows",
        field,
        table.len(),
        res.len()
    );
    Ok(res)
}

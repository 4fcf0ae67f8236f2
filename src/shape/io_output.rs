// Writers for the final table.

use log::debug;
use redcap_shaping::{Table, RECORD_ID};
use snafu::prelude::*;

use crate::shape::config_reader::OutputKind;
use crate::shape::*;

pub fn render(table: &Table, output: &OutputKind) -> ReshapeResult<String> {
    match output {
        OutputKind::Csv => render_csv(table),
        OutputKind::EmailMapping { email_field } => render_email_mapping(table, email_field),
    }
}

/// The REDCap import file: header, then one line per row. Nulls are empty fields.
pub fn render_csv(table: &Table) -> ReshapeResult<String> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(table.columns()).context(CsvWriteSnafu)?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))
            .context(CsvWriteSnafu)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| e.into_error())
        .context(OutputBufferSnafu)?;
    String::from_utf8(bytes).context(OutputEncodingSnafu)
}

/// One `record_id, email` line per row that has both.
pub fn render_email_mapping(table: &Table, email_field: &str) -> ReshapeResult<String> {
    table
        .require_columns(&[RECORD_ID, email_field])
        .context(ShapeSnafu)?;
    let mut res = String::new();
    let mut skipped = 0;
    for row in table.iter() {
        match (row.get(RECORD_ID), row.get(email_field)) {
            (Some(id), Some(email)) => {
                res.push_str(&format!("{}, {}\n", id.trim(), email.trim()));
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(
            "render_email_mapping: {} row(s) without record_id or email",
            skipped
        );
    }
    Ok(res)
}

// Primitives for reading CSV files.

use std::io::Read;

use log::debug;
use redcap_shaping::builder::TableBuilder;
use redcap_shaping::Table;
use snafu::prelude::*;

use crate::shape::*;

const BOM: char = '\u{feff}';

/// Reads a CSV file. Every cell is text, empty cells are null.
pub fn read_csv_table(path: &str) -> ReshapeResult<Table> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    read_records(rdr, path)
}

pub fn read_csv_from<R: Read>(input: R, path: &str) -> ReshapeResult<Table> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    read_records(rdr, path)
}

fn read_records<R: Read>(rdr: csv::Reader<R>, path: &str) -> ReshapeResult<Table> {
    let mut records = rdr.into_records();
    let header_record = match records.next() {
        Some(r) => r.context(CsvLineParseSnafu { path, lineno: 1usize })?,
        None => return EmptyInputSnafu { path }.fail(),
    };
    let header: Vec<String> = header_record
        .iter()
        .enumerate()
        .map(|(idx, s)| {
            if idx == 0 {
                s.trim_start_matches(BOM).to_string()
            } else {
                s.to_string()
            }
        })
        .collect();
    // Columns without a header (trailing commas) are dropped, as in Excel files.
    let kept: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.trim().is_empty())
        .map(|(idx, _)| idx)
        .collect();
    if kept.len() < header.len() {
        debug!(
            "read_csv_table: {}: dropping {} column(s) without header",
            path,
            header.len() - kept.len()
        );
    }
    let names: Vec<String> = kept.iter().map(|idx| header[*idx].clone()).collect();
    debug!("read_csv_table: {}: header: {:?}", path, names);

    let mut builder = TableBuilder::new(&names).context(ReadingInputSnafu { path })?;
    for (idx, line_r) in records.enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        if line.len() > header.len() {
            return Err(ShapeError::RowLength {
                row: idx,
                expected: header.len(),
                actual: line.len(),
            })
            .context(ReadingInputSnafu { path });
        }
        let values: Vec<String> = kept
            .iter()
            .map(|i| line.get(*i).unwrap_or("").to_string())
            .collect();
        builder
            .add_row_simple(&values)
            .context(ReadingInputSnafu { path })?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_text_and_nulls() {
        let data = "\u{feff}Student ID,Score,Comment\n007,15,\n008,,\"a, b\"\n";
        let t = read_csv_from(data.as_bytes(), "mem.csv").unwrap();
        assert_eq!(t.columns(), &["Student ID", "Score", "Comment"]);
        assert_eq!(t.len(), 2);
        // No type inference: leading zeros stay.
        assert_eq!(t.value(0, "Student ID"), Some("007"));
        assert_eq!(t.value(0, "Comment"), None);
        assert_eq!(t.value(1, "Score"), None);
        assert_eq!(t.value(1, "Comment"), Some("a, b"));
    }

    #[test]
    fn short_rows_are_padded() {
        let data = "a,b,c\n1\n1,2,3\n";
        let t = read_csv_from(data.as_bytes(), "mem.csv").unwrap();
        assert_eq!(t.rows()[0], vec![Some("1".to_string()), None, None]);
        assert_eq!(t.value(1, "c"), Some("3"));
    }

    #[test]
    fn long_rows_and_empty_files_fail() {
        let data = "a,b\n1,2,3\n";
        assert!(matches!(
            read_csv_from(data.as_bytes(), "mem.csv"),
            Err(ReshapeError::ReadingInput { .. })
        ));
        assert!(matches!(
            read_csv_from("".as_bytes(), "mem.csv"),
            Err(ReshapeError::EmptyInput { .. })
        ));
    }

    #[test]
    fn unnamed_columns_are_dropped() {
        let data = "Student ID,Email,,\n1,ann@school.edu,,\n2,,x,\n";
        let t = read_csv_from(data.as_bytes(), "mem.csv").unwrap();
        assert_eq!(t.columns(), &["Student ID", "Email"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.value(0, "Email"), Some("ann@school.edu"));
        assert_eq!(t.value(1, "Student ID"), Some("2"));
        assert_eq!(t.value(1, "Email"), None);
        // The full width still bounds the rows.
        let data = "a,,\n1,2,3,4\n";
        assert!(matches!(
            read_csv_from(data.as_bytes(), "mem.csv"),
            Err(ReshapeError::ReadingInput {
                source: ShapeError::RowLength { .. },
                ..
            })
        ));
    }

    #[test]
    fn duplicate_headers_fail() {
        let data = "a,a\n1,2\n";
        assert!(matches!(
            read_csv_from(data.as_bytes(), "mem.csv"),
            Err(ReshapeError::ReadingInput {
                source: ShapeError::DuplicateHeader { .. },
                ..
            })
        ));
    }
}

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use log::debug;
use redcap_shaping::builder::TableBuilder;
use redcap_shaping::{Cell, Table};
use snafu::prelude::*;

use crate::shape::*;

/// Reads one worksheet of an Excel file.
///
/// The worksheet is the one given by name. Without a name, the workbook must
/// contain a single worksheet.
pub fn read_excel_table(path: &str, worksheet: Option<&str>) -> ReshapeResult<Table> {
    let wrange = get_range(path, worksheet)?;
    table_from_range(&wrange, path)
}

fn get_range(path: &str, worksheet: Option<&str>) -> ReshapeResult<Range<Data>> {
    debug!("get_range: path: {:?} worksheet: {:?}", path, worksheet);
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(name) = worksheet {
        let available = workbook.sheet_names();
        if !available.iter().any(|n| n == name) {
            return MissingWorksheetSnafu {
                path,
                name,
                available,
            }
            .fail();
        }
        return workbook
            .worksheet_range(name)
            .context(OpeningExcelSnafu { path });
    }

    let mut all_worksheets = workbook.worksheets();
    match all_worksheets.len() {
        0 => EmptyExcelSnafu { path }.fail(),
        1 => {
            let (name, wrange) = all_worksheets.remove(0);
            debug!("get_range: path: {:?} using worksheet {:?}", path, name);
            Ok(wrange)
        }
        _ => AmbiguousWorksheetSnafu {
            path,
            available: all_worksheets
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<String>>(),
        }
        .fail(),
    }
}

pub fn table_from_range(wrange: &Range<Data>, path: &str) -> ReshapeResult<Table> {
    let mut rows = wrange.rows();
    let header_cells = rows.next().context(EmptyExcelSnafu { path })?;
    // Columns without a header are dropped.
    let kept: Vec<(usize, String)> = header_cells
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| cell_text(c).map(|h| (idx, h)))
        .collect();
    if kept.len() < header_cells.len() {
        debug!(
            "table_from_range: {}: dropping {} column(s) without header",
            path,
            header_cells.len() - kept.len()
        );
    }
    let header: Vec<String> = kept.iter().map(|(_, h)| h.clone()).collect();
    debug!("table_from_range: {}: header: {:?}", path, header);

    let mut builder = TableBuilder::new(&header).context(ReadingInputSnafu { path })?;
    for row in rows {
        let cells: Vec<Cell> = kept
            .iter()
            .map(|(idx, _)| row.get(*idx).and_then(cell_text))
            .collect();
        // Fully empty lines at the end of a sheet are skipped.
        if cells.iter().all(|c| c.is_none()) {
            continue;
        }
        builder.add_row(cells).context(ReadingInputSnafu { path })?;
    }
    Ok(builder.build())
}

/// The text of a cell, as a spreadsheet would display it.
pub fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(float_text(*f)),
        Data::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => Some(match dt.as_datetime() {
            Some(x) => x.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => float_text(dt.as_f64()),
        }),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(e) => {
            debug!("cell_text: error cell {:?}, using null", e);
            None
        }
    }
}

// 15.0 is written 15, like the spreadsheet shows it.
fn float_text(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{CellErrorType, ExcelDateTime, ExcelDateTimeType};

    #[test]
    fn cell_conversion() {
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::String("".to_string())), None);
        assert_eq!(cell_text(&Data::String("007".to_string())), Some("007".to_string()));
        assert_eq!(cell_text(&Data::Float(15.0)), Some("15".to_string()));
        assert_eq!(cell_text(&Data::Float(37.5)), Some("37.5".to_string()));
        assert_eq!(cell_text(&Data::Int(-3)), Some("-3".to_string()));
        assert_eq!(cell_text(&Data::Bool(true)), Some("TRUE".to_string()));
        assert_eq!(cell_text(&Data::Error(CellErrorType::Div0)), None);
        let noon = ExcelDateTime::new(45294.5, ExcelDateTimeType::DateTime, false);
        assert_eq!(
            cell_text(&Data::DateTime(noon)),
            Some("2024-01-03 12:00:00".to_string())
        );
    }

    fn grade_book() -> Range<Data> {
        let mut r: Range<Data> = Range::new((0, 0), (3, 3));
        r.set_value((0, 0), Data::String("Student ID".to_string()));
        r.set_value((0, 1), Data::String("Raw Score".to_string()));
        // (0, 2) has no header.
        r.set_value((0, 3), Data::String("Exam".to_string()));
        r.set_value((1, 0), Data::Float(1001.0));
        r.set_value((1, 1), Data::Float(15.0));
        r.set_value((1, 2), Data::String("ignored".to_string()));
        r.set_value((1, 3), Data::String("Midterm".to_string()));
        r.set_value((2, 0), Data::Float(1002.0));
        r.set_value((2, 1), Data::String("N/A".to_string()));
        r
    }

    #[test]
    fn range_to_table() {
        let t = table_from_range(&grade_book(), "gradebook.xlsx").unwrap();
        assert_eq!(t.columns(), &["Student ID", "Raw Score", "Exam"]);
        // The last line is empty.
        assert_eq!(t.len(), 2);
        assert_eq!(t.value(0, "Student ID"), Some("1001"));
        assert_eq!(t.value(0, "Raw Score"), Some("15"));
        assert_eq!(t.value(0, "Exam"), Some("Midterm"));
        assert_eq!(t.value(1, "Raw Score"), Some("N/A"));
        assert_eq!(t.value(1, "Exam"), None);
    }

    fn testdata(path: &str) -> String {
        format!("{}/testdata/{}", env!("CARGO_MANIFEST_DIR"), path)
    }

    #[test]
    fn named_worksheet() {
        let book = testdata("exam_scores/grade_book.xlsx");
        let t = read_excel_table(&book, Some("GradeBook")).unwrap();
        assert_eq!(
            t.columns(),
            &["Student ID", "Exam", "Exam Date", "Raw Score", "Comments"]
        );
        assert_eq!(t.len(), 5);
        assert_eq!(t.value(0, "Student ID"), Some("1001"));
        assert_eq!(t.value(2, "Raw Score"), Some("17.5"));
        assert_eq!(t.value(4, "Raw Score"), None);
        let notes = read_excel_table(&book, Some("Notes")).unwrap();
        assert_eq!(notes.value(0, "Note"), Some("Scores out of 20"));
    }

    #[test]
    fn unknown_worksheet_lists_the_others() {
        let book = testdata("exam_scores/grade_book.xlsx");
        match read_excel_table(&book, Some("Scores")) {
            Err(ReshapeError::MissingWorksheet { name, available, .. }) => {
                assert_eq!(name, "Scores");
                assert_eq!(available, vec!["Notes".to_string(), "GradeBook".to_string()]);
            }
            x => panic!("{:?}", x),
        }
    }

    #[test]
    fn worksheet_needed_when_several() {
        let book = testdata("exam_scores/grade_book.xlsx");
        match read_excel_table(&book, None) {
            Err(ReshapeError::AmbiguousWorksheet { available, .. }) => {
                assert_eq!(available, vec!["Notes".to_string(), "GradeBook".to_string()]);
            }
            x => panic!("{:?}", x),
        }
        // A single worksheet needs no name.
        let t = read_excel_table(&testdata("exam_scores/single_sheet.xlsx"), None).unwrap();
        assert_eq!(t.len(), 5);
        assert_eq!(t.value(3, "Exam"), Some("Final"));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_excel_table("does/not/exist.xlsx", Some("GradeBook")),
            Err(ReshapeError::OpeningExcel { .. })
        ));
    }
}

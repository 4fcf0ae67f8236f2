use std::collections::HashMap;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::config::*;
use crate::table::Table;

/// Applies a column mapping: renames, selects and reorders the columns.
///
/// The output has exactly the target columns of the mapping, in mapping order.
/// Every source column listed in the mapping must be present in the input,
/// otherwise all the absent ones are reported at once.
pub fn map_columns(table: &Table, mapping: &ColumnMapping) -> Result<Table, ShapeError> {
    table.require_columns(&mapping.sources())?;
    debug!(
        "map_columns: {} columns -> {} columns, {} rows",
        table.columns().len(),
        mapping.len(),
        table.len()
    );
    // None for the columns left empty.
    let positions: Vec<Option<usize>> = mapping
        .pairs()
        .iter()
        .map(|(source, target)| {
            if mapping.is_blank(target) {
                None
            } else {
                table.column_index(source)
            }
        })
        .collect();
    let columns: Vec<String> = mapping.targets().iter().map(|t| t.to_string()).collect();
    let rows = table
        .rows()
        .iter()
        .map(|r| {
            positions
                .iter()
                .map(|p| p.and_then(|idx| r[idx].clone()))
                .collect()
        })
        .collect();
    Ok(Table::from_parts(columns, rows))
}

fn question_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s+(.+)$").unwrap())
}

/// Turns a raw export header into a column name.
///
/// `"3 Question Text"` gives `q3_question_text`: only a leading integer
/// followed by whitespace is treated as a question number. Anything else is
/// lower-cased with spaces replaced by underscores (`"10a Extra"` gives `10a_extra`).
pub fn normalize_header(raw: &str) -> String {
    let header = raw.trim();
    if let Some(caps) = question_prefix().captures(header) {
        let rest = caps[2].to_lowercase().replace(' ', "_");
        return format!("q{}_{}", &caps[1], rest);
    }
    header.to_lowercase().replace(' ', "_")
}

/// Renames every column of the table with [normalize_header].
///
/// Fails if two different headers end up with the same name.
pub fn normalize_headers(table: Table) -> Result<Table, ShapeError> {
    let (columns, rows) = table.into_parts();
    let mut by_target: HashMap<String, Vec<String>> = HashMap::new();
    let renamed: Vec<String> = columns
        .iter()
        .map(|raw| {
            let target = normalize_header(raw);
            by_target
                .entry(target.clone())
                .or_default()
                .push(raw.clone());
            target
        })
        .collect();
    // Report the first collision in column order.
    for target in renamed.iter() {
        if let Some(sources) = by_target.get(target) {
            if sources.len() > 1 {
                return Err(ShapeError::DuplicateHeader {
                    header: target.clone(),
                    sources: sources.clone(),
                });
            }
        }
    }
    debug!("normalize_headers: {:?}", renamed);
    Ok(Table::from_parts(renamed, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            columns.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| Some(s.to_string())).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn output_follows_mapping_order() {
        let t = table(&["C", "A", "B", "Extra"], &[&["c", "a", "b", "e"]]);
        let mapping = ColumnMapping::new(vec![
            ("A".to_string(), "alpha".to_string()),
            ("B".to_string(), "beta".to_string()),
            ("C".to_string(), "gamma".to_string()),
        ])
        .unwrap();
        let res = map_columns(&t, &mapping).unwrap();
        assert_eq!(res.columns(), &["alpha", "beta", "gamma"]);
        assert_eq!(
            res.rows()[0],
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("c".to_string())
            ]
        );
    }

    #[test]
    fn same_order_for_any_input_order() {
        let mapping = ColumnMapping::identity(&["x", "y", "z"]).unwrap();
        let t1 = table(&["x", "y", "z"], &[&["1", "2", "3"]]);
        let t2 = table(&["z", "x", "y"], &[&["3", "1", "2"]]);
        assert_eq!(
            map_columns(&t1, &mapping).unwrap(),
            map_columns(&t2, &mapping).unwrap()
        );
    }

    #[test]
    fn all_missing_columns_are_reported() {
        let t = table(&["A"], &[&["a"]]);
        let mapping = ColumnMapping::identity(&["A", "B", "C"]).unwrap();
        assert_eq!(
            map_columns(&t, &mapping),
            Err(ShapeError::MissingColumns {
                columns: vec!["B".to_string(), "C".to_string()]
            })
        );
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let res = ColumnMapping::new(vec![
            ("A".to_string(), "a".to_string()),
            ("B".to_string(), "a".to_string()),
        ]);
        assert_eq!(
            res,
            Err(ShapeError::DuplicateHeader {
                header: "a".to_string(),
                sources: vec!["A".to_string(), "B".to_string()]
            })
        );
    }

    #[test]
    fn one_source_may_feed_two_targets() {
        let t = table(&["Student ID"], &[&["7"]]);
        let mapping = ColumnMapping::new(vec![
            ("Student ID".to_string(), "record_id".to_string()),
            ("Student ID".to_string(), "student_id".to_string()),
        ])
        .unwrap();
        let res = map_columns(&t, &mapping).unwrap();
        assert_eq!(res.value(0, "record_id"), Some("7"));
        assert_eq!(res.value(0, "student_id"), Some("7"));
    }

    #[test]
    fn blank_targets_need_no_source() {
        let t = table(&["Student ID"], &[&["7"]]);
        let mut mapping = ColumnMapping::identity(&["Student ID"]).unwrap();
        mapping.push_blank("form_complete").unwrap();
        let res = map_columns(&t, &mapping).unwrap();
        assert_eq!(res.columns(), &["Student ID", "form_complete"]);
        assert_eq!(res.value(0, "form_complete"), None);
        assert!(mapping.push("Other", "form_complete").is_err());
    }

    #[test]
    fn normalizes_headers() {
        assert_eq!(normalize_header("3 Question Text"), "q3_question_text");
        assert_eq!(normalize_header("Course ID"), "course_id");
        assert_eq!(normalize_header("10a Extra"), "10a_extra");
        assert_eq!(normalize_header("  12 Answer Text "), "q12_answer_text");
        assert_eq!(normalize_header("1 Question 2 Part"), "q1_question_2_part");
        assert_eq!(normalize_header("Step 2 Score"), "step_2_score");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["3 Question Text", "Course ID", "10a Extra", "Who Completed"] {
            let once = normalize_header(raw);
            assert_eq!(normalize_header(&once), once);
        }
    }

    #[test]
    fn colliding_headers_are_rejected() {
        let t = table(&["Course ID", "course id"], &[]);
        let res = normalize_headers(t);
        assert_eq!(
            res,
            Err(ShapeError::DuplicateHeader {
                header: "course_id".to_string(),
                sources: vec!["Course ID".to_string(), "course id".to_string()]
            })
        );
    }
}

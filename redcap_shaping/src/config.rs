// ********* Input data structures ***********

use std::collections::HashSet;
use std::error::Error;
use std::fmt::Display;

use chrono::Weekday;
use chrono_tz::Tz;

use crate::table::Table;

/// The name of the column that groups the rows of one person or entity.
pub const RECORD_ID: &str = "record_id";
/// The column holding the name of the repeating instrument.
pub const REPEAT_INSTRUMENT: &str = "redcap_repeat_instrument";
/// The column holding the 1-based sequence number within a record.
pub const REPEAT_INSTANCE: &str = "redcap_repeat_instance";

/// A single value in a table. Empty source cells are `None`.
pub type Cell = Option<String>;

/// An ordered list of `(source, target)` column names.
///
/// The mapping defines both the renaming and the final order of the columns:
/// any column of the input that is not listed is dropped.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ColumnMapping {
    pairs: Vec<(String, String)>,
    // Targets that are not read from the input and stay empty.
    blanks: HashSet<String>,
}

impl ColumnMapping {
    /// Builds a mapping. Two pairs targeting the same column are rejected.
    pub fn new(pairs: Vec<(String, String)>) -> Result<ColumnMapping, ShapeError> {
        let mut res = ColumnMapping::default();
        for (source, target) in pairs {
            res.push(&source, &target)?;
        }
        Ok(res)
    }

    /// A mapping that keeps the given columns, in this order, without renaming them.
    pub fn identity(names: &[&str]) -> Result<ColumnMapping, ShapeError> {
        ColumnMapping::new(
            names
                .iter()
                .map(|n| (n.to_string(), n.to_string()))
                .collect(),
        )
    }

    pub fn push(&mut self, source: &str, target: &str) -> Result<(), ShapeError> {
        self.check_target(source, target)?;
        self.pairs.push((source.to_string(), target.to_string()));
        Ok(())
    }

    /// Appends a target column that is not read from the input and is left
    /// empty, such as the form status fields that REDCap fills itself.
    pub fn push_blank(&mut self, target: &str) -> Result<(), ShapeError> {
        self.check_target("(blank)", target)?;
        self.pairs.push((String::new(), target.to_string()));
        self.blanks.insert(target.to_string());
        Ok(())
    }

    fn check_target(&self, source: &str, target: &str) -> Result<(), ShapeError> {
        let previous: Vec<String> = self
            .pairs
            .iter()
            .filter(|(_, t)| t == target)
            .map(|(s, t)| {
                if self.blanks.contains(t) {
                    "(blank)".to_string()
                } else {
                    s.clone()
                }
            })
            .collect();
        if previous.is_empty() {
            return Ok(());
        }
        let mut sources = previous;
        sources.push(source.to_string());
        Err(ShapeError::DuplicateHeader {
            header: target.to_string(),
            sources,
        })
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// True if the target is left empty instead of being read from a source column.
    pub fn is_blank(&self, target: &str) -> bool {
        self.blanks.contains(target)
    }

    /// The source columns that must be present in the input, in mapping order.
    pub fn sources(&self) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(_, t)| !self.blanks.contains(t))
            .map(|(s, _)| s.as_str())
            .collect()
    }

    pub fn targets(&self) -> Vec<&str> {
        self.pairs.iter().map(|(_, t)| t.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// How the raw headers of a file are turned into column names.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum HeaderStyle {
    /// Headers are used as they appear in the file.
    Verbatim,
    /// The OASIS convention: `"3 Question Text"` becomes `q3_question_text`,
    /// everything else is lower-cased with spaces replaced by underscores.
    Normalized,
}

/// How several uploaded files are combined into one table.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum MergeMode {
    /// Row-wise union, columns aligned by name.
    Concatenate,
    /// Full outer join on the record identifier.
    OuterJoin,
}

/// Rules for splitting a multi-value cell into one row per value.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ExpansionRules {
    pub field: String,
    pub delimiter: char,
    /// Leading marker characters removed from every segment (for example `*`).
    pub strip_marker: Option<char>,
    /// Cleaned segments with one of these exact values are dropped.
    pub exclude: HashSet<String>,
    /// Whether a row whose cleaned segment is empty is kept.
    pub keep_empty: bool,
}

impl ExpansionRules {
    pub fn new(field: &str) -> ExpansionRules {
        ExpansionRules {
            field: field.to_string(),
            delimiter: '|',
            strip_marker: None,
            exclude: HashSet::new(),
            keep_empty: true,
        }
    }
}

/// A field computed from one or more source fields.
///
/// All derivations are tolerant: a value that cannot be parsed becomes null
/// and is reported as an [UnparseableValue].
#[derive(PartialEq, Debug, Clone)]
pub enum Derivation {
    /// Dated milestones spaced by whole weeks, anchored on the first
    /// `weekday` on or after the source date. One target per milestone.
    WeeklyDueDates {
        source: String,
        targets: Vec<String>,
        weekday: Weekday,
    },
    /// A single milestone at a fixed number of weeks after the source date.
    EndRelativeDue {
        source: String,
        target: String,
        weeks: i64,
    },
    /// A timestamp read in `from` (unless it carries its own offset),
    /// converted to `to`, and pinned to the end of that calendar day.
    ZoneDue {
        source: String,
        target: String,
        from: Tz,
        to: Tz,
    },
    /// `raw / divisor * 100`.
    Percentage {
        source: String,
        target: String,
        divisor: f64,
    },
}

/// The column mappings applied to each input file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum FileMappings {
    /// The same mapping for every file.
    Shared(ColumnMapping),
    /// One mapping per file, in upload order.
    PerFile(Vec<ColumnMapping>),
}

/// The full recipe of one instrument.
#[derive(PartialEq, Debug, Clone)]
pub struct InstrumentPlan {
    /// The repeating instrument name written in `redcap_repeat_instrument`.
    pub name: String,
    pub file_count: Option<usize>,
    pub header_style: HeaderStyle,
    /// If provided, `record_id` is copied from this (post-normalization) column.
    pub record_id_from: Option<String>,
    pub mappings: FileMappings,
    pub merge_mode: MergeMode,
    pub expansion: Option<ExpansionRules>,
    pub derivations: Vec<Derivation>,
    pub sort_by: Option<String>,
    pub drop_columns: Vec<String>,
    pub drop_missing_record_id: bool,
    pub repeating: bool,
}

impl InstrumentPlan {
    /// A plan that only applies the given mapping and numbers the rows.
    pub fn simple(name: &str, mapping: ColumnMapping) -> InstrumentPlan {
        InstrumentPlan {
            name: name.to_string(),
            file_count: None,
            header_style: HeaderStyle::Verbatim,
            record_id_from: None,
            mappings: FileMappings::Shared(mapping),
            merge_mode: MergeMode::Concatenate,
            expansion: None,
            derivations: Vec::new(),
            sort_by: None,
            drop_columns: Vec::new(),
            drop_missing_record_id: false,
            repeating: true,
        }
    }
}

// ******** Output data structures *********

/// A cell that could not be interpreted and was replaced by null.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UnparseableValue {
    /// 0-based data row index in the table the derivation ran on.
    pub row: usize,
    pub column: String,
    pub value: String,
}

/// The result of running an instrument.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ShapeOutcome {
    pub table: Table,
    pub unparseable: Vec<UnparseableValue>,
    /// Distinct expanded values, in the order they were first seen.
    /// Empty if the instrument does not expand rows.
    pub observed_values: Vec<String>,
}

/// Errors that abort a run. No partial output should be produced after any of them.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ShapeError {
    /// Required source columns are absent. Lists all of them.
    MissingColumns { columns: Vec<String> },
    /// An instrument received the wrong number of files.
    WrongFileCount { expected: usize, actual: usize },
    /// Several source headers end up with the same column name.
    DuplicateHeader { header: String, sources: Vec<String> },
    /// Rows without a record identifier reached the numbering step.
    MissingRecordId { rows: Vec<usize> },
    /// A row does not have as many cells as the table has columns.
    RowLength {
        row: usize,
        expected: usize,
        actual: usize,
    },
    InvalidRule { message: String },
}

impl Error for ShapeError {}

impl Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeError::MissingColumns { columns } => {
                write!(f, "missing columns: {}", columns.join(", "))
            }
            ShapeError::WrongFileCount { expected, actual } => write!(
                f,
                "this instrument requires exactly {} file(s), {} provided",
                expected, actual
            ),
            ShapeError::DuplicateHeader { header, sources } => write!(
                f,
                "column {:?} is produced by several headers: {}",
                header,
                sources.join(", ")
            ),
            ShapeError::MissingRecordId { rows } => {
                let lines: Vec<String> = rows.iter().map(|r| (r + 1).to_string()).collect();
                write!(f, "empty record_id in data row(s) {}", lines.join(", "))
            }
            ShapeError::RowLength {
                row,
                expected,
                actual,
            } => write!(
                f,
                "row {} has {} values, {} expected",
                row + 1,
                actual,
                expected
            ),
            ShapeError::InvalidRule { message } => write!(f, "invalid rule: {}", message),
        }
    }
}

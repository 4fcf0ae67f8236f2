use std::path::Path;

use redcap_shaping::Table;

use crate::shape::config_reader::{InstrumentConfig, OutputKind};
use crate::shape::io_csv::read_csv_table;
use crate::shape::io_excel::read_excel_table;
use crate::shape::*;

pub fn is_excel(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "xlsx" | "xlsm"))
        .unwrap_or(false)
}

/// Reads a CSV or an Excel file, depending on its extension.
pub fn read_table(path: &str, worksheet: Option<&str>) -> ReshapeResult<Table> {
    if is_excel(path) {
        read_excel_table(path, worksheet)
    } else {
        read_csv_table(path)
    }
}

/// `<instrument>_formatted.csv` (or `.txt` for the email listing), next to the first input.
pub fn default_output_path(first_input: &str, config: &InstrumentConfig) -> ReshapeResult<String> {
    let extension = match config.output_kind()? {
        OutputKind::Csv => "csv",
        OutputKind::EmailMapping { .. } => "txt",
    };
    let file_name = format!("{}_formatted.{}", config.instrument, extension);
    let p = match Path::new(first_input).parent() {
        Some(dir) => dir.join(file_name),
        None => Path::new(&file_name).to_path_buf(),
    };
    Ok(p.display().to_string())
}

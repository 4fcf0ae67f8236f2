use log::{debug, info, warn};

use redcap_shaping::*;
use snafu::{prelude::*, Snafu};

use std::collections::HashSet;
use std::fs;

use difference::print_diff;

use crate::args::Args;
use crate::shape::config_reader::*;
use crate::shape::io_common::{default_output_path, read_table};
use crate::shape::io_output::render;

pub mod config_reader;
pub mod instruments;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;
pub mod io_output;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReshapeError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The workbook {path} contains no data"))]
    EmptyExcel { path: String },
    #[snafu(display(
        "Worksheet {name:?} not found in {path}, available worksheets: {}",
        available.join(", ")
    ))]
    MissingWorksheet {
        path: String,
        name: String,
        available: Vec<String>,
    },
    #[snafu(display(
        "The workbook {path} has several worksheets ({}), select one with --excel-worksheet-name",
        available.join(", ")
    ))]
    AmbiguousWorksheet { path: String, available: Vec<String> },

    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("The file {path} has no header row"))]
    EmptyInput { path: String },
    #[snafu(display("Malformed table in {path}: {source}"))]
    ReadingInput { source: ShapeError, path: String },

    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the instrument description {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Unknown instrument {name:?}, known instruments: {}", known.join(", ")))]
    UnknownInstrument { name: String, known: Vec<String> },
    #[snafu(display("Instrument {instrument}: {message}"))]
    InvalidConfig { instrument: String, message: String },

    #[snafu(display("{source}"))]
    Shape { source: ShapeError },

    #[snafu(display("Error writing the output"))]
    CsvWrite { source: csv::Error },
    #[snafu(display("Error writing the output"))]
    OutputBuffer { source: std::io::Error },
    #[snafu(display("The output is not valid UTF-8"))]
    OutputEncoding {
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("Error opening the reference file {path}"))]
    OpeningReference {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Difference detected between the output and the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ReshapeResult<T> = Result<T, ReshapeError>;

/// Entry point of the command line.
pub fn run(args: &Args) -> ReshapeResult<()> {
    if args.list_instruments {
        for config in instruments::builtin_instruments()? {
            println!(
                "{:<22}{}",
                config.instrument,
                config.description.unwrap_or_default()
            );
        }
        return Ok(());
    }

    let config = match (&args.config, &args.instrument) {
        (Some(path), _) => read_instrument_config(path)?,
        (None, Some(name)) => instruments::builtin_instrument(name)?,
        (None, None) => {
            whatever!("Either --instrument or --config must be provided (see --list-instruments)")
        }
    };
    debug!("run: config: {:?}", config);

    if args.input.is_empty() {
        whatever!("No input file, pass at least one with --input")
    }

    let selection: Option<HashSet<String>> = if args.select.is_empty() {
        None
    } else {
        Some(args.select.iter().cloned().collect())
    };

    let rendered = run_instrument(
        &config,
        &args.input,
        args.excel_worksheet_name.as_deref(),
        selection.as_ref(),
    )?;

    match args.out.as_deref() {
        Some("stdout") => print!("{}", rendered),
        Some(path) => write_output(path, &rendered)?,
        None => {
            let path = default_output_path(&args.input[0], &config)?;
            write_output(&path, &rendered)?
        }
    }

    // The reference output, if provided for comparison
    if let Some(reference_path) = &args.reference {
        check_reference(&rendered, reference_path)?;
    }
    Ok(())
}

/// Reads the inputs, runs the instrument and renders the result.
///
/// Nothing is written here: the caller only gets the output once the whole
/// run succeeded.
pub fn run_instrument(
    config: &InstrumentConfig,
    inputs: &[String],
    worksheet: Option<&str>,
    selection: Option<&HashSet<String>>,
) -> ReshapeResult<String> {
    let plan = config.plan()?;
    let output = config.output_kind()?;
    let worksheet = worksheet.or(config.worksheet_name.as_deref());
    info!(
        "run_instrument: {} with {} input(s)",
        config.instrument,
        inputs.len()
    );

    let mut tables: Vec<Table> = Vec::with_capacity(inputs.len());
    for path in inputs.iter() {
        let table = read_table(path, worksheet)?;
        info!(
            "run_instrument: read {}: {} rows, {} columns",
            path,
            table.len(),
            table.columns().len()
        );
        debug!("run_instrument: {} header: {:?}", path, table.columns());
        tables.push(table);
    }

    let outcome = run_plan(tables, &plan, selection).context(ShapeSnafu)?;
    report_outcome(&outcome, selection);
    render(&outcome.table, &output)
}

fn report_outcome(outcome: &ShapeOutcome, selection: Option<&HashSet<String>>) {
    if !outcome.observed_values.is_empty() {
        info!(
            "Observed values (use --select to keep only some of them): {}",
            outcome.observed_values.join(", ")
        );
    }
    if let Some(selected) = selection {
        let mut unknown: Vec<&String> = selected
            .iter()
            .filter(|v| !outcome.observed_values.contains(*v))
            .collect();
        unknown.sort();
        if !unknown.is_empty() {
            warn!("Selected values never observed in the input: {:?}", unknown);
        }
    }
    for issue in outcome.unparseable.iter() {
        debug!(
            "report_outcome: row {} column {:?}: {:?} left empty",
            issue.row + 1,
            issue.column,
            issue.value
        );
    }
    info!(
        "Result: {} rows, {} values could not be interpreted",
        outcome.table.len(),
        outcome.unparseable.len()
    );
}

fn write_output(path: &str, rendered: &str) -> ReshapeResult<()> {
    info!("Writing output to {}", path);
    fs::write(path, rendered).context(WritingOutputSnafu { path })
}

/// Compares the output with a reference file, line by line.
pub fn check_reference(rendered: &str, reference_path: &str) -> ReshapeResult<()> {
    let reference = fs::read_to_string(reference_path).context(OpeningReferenceSnafu {
        path: reference_path,
    })?;
    let reference = reference.replace("\r\n", "\n");
    let rendered = rendered.replace("\r\n", "\n");
    if reference.trim_end() != rendered.trim_end() {
        warn!("Found differences with the reference {}", reference_path);
        print_diff(reference.trim_end(), rendered.trim_end(), "\n");
        return ReferenceMismatchSnafu {
            path: reference_path,
        }
        .fail();
    }
    info!("The output matches the reference {}", reference_path);
    Ok(())
}

use clap::Parser;

/// Reshapes exports (evaluations, checklists, quizzes) into REDCap repeating-instrument imports.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (name) The built-in instrument to run. Use --list-instruments to see them all.
    #[clap(long, value_parser)]
    pub instrument: Option<String>,

    /// (file path, optional) A JSON file describing an instrument. It takes precedence over
    /// --instrument. See the manual of the redcap_shaping library for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, repeatable) An input file, in CSV or Excel (.xlsx) format. Pass the option
    /// several times for the instruments that take several files. The order matters.
    #[clap(short, long, value_parser)]
    pub input: Vec<String>,

    /// (file path, 'stdout' or empty) Where to write the result. By default, the result is
    /// written next to the first input as <instrument>_formatted.csv.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// When using an Excel file, indicates the name of the worksheet to use. This overrides
    /// the worksheet set by the instrument.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// (value, repeatable) For the instruments that split a multi-value column, only keep
    /// the rows with these values. By default all the values are kept.
    #[clap(long, value_parser)]
    pub select: Vec<String>,

    /// (file path) A reference output. If provided, reshape checks that its output
    /// matches the reference and prints the differences otherwise.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// Prints the built-in instruments and exits.
    #[clap(long, takes_value = false)]
    pub list_instruments: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

// The instruments shipped with the program.

use snafu::prelude::*;

use crate::shape::config_reader::*;
use crate::shape::*;

const BUILTIN: &[(&str, &str)] = &[
    (
        "oasis_eval",
        include_str!("../../instruments/oasis_eval.json"),
    ),
    (
        "clinical_checklist",
        include_str!("../../instruments/clinical_checklist.json"),
    ),
    (
        "quiz_due_dates",
        include_str!("../../instruments/quiz_due_dates.json"),
    ),
    (
        "quiz_results",
        include_str!("../../instruments/quiz_results.json"),
    ),
    (
        "exam_scores",
        include_str!("../../instruments/exam_scores.json"),
    ),
    (
        "weekly_reflections",
        include_str!("../../instruments/weekly_reflections.json"),
    ),
    (
        "procedure_log",
        include_str!("../../instruments/procedure_log.json"),
    ),
    (
        "email_mapping",
        include_str!("../../instruments/email_mapping.json"),
    ),
];

pub fn builtin_names() -> Vec<String> {
    BUILTIN.iter().map(|(name, _)| name.to_string()).collect()
}

pub fn builtin_instrument(name: &str) -> ReshapeResult<InstrumentConfig> {
    let (_, contents) = BUILTIN
        .iter()
        .find(|(n, _)| *n == name)
        .context(UnknownInstrumentSnafu {
            name,
            known: builtin_names(),
        })?;
    parse_instrument_config(contents, &format!("instruments/{}.json", name))
}

pub fn builtin_instruments() -> ReshapeResult<Vec<InstrumentConfig>> {
    BUILTIN
        .iter()
        .map(|(name, _)| builtin_instrument(name))
        .collect()
}

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::config::*;
use crate::expand::{expand_rows, filter_values, observed_values};
use crate::mapping::{map_columns, normalize_headers};
use crate::merge::merge;
use crate::repeat::{drop_missing_record_id, inject_record_id, number_repeat_instances};
use crate::table::Table;
use crate::temporal::{apply_derivation, parse_naive_datetime};

/// Runs an instrument on the uploaded tables.
///
/// Arguments:
/// * `inputs` the uploaded files, in upload order
/// * `plan` the recipe of the instrument
/// * `selection` if provided, only the expanded values in this set are kept.
///   Without it, every observed value is kept.
///
/// The whole run either succeeds or fails: nothing is returned for a
/// partially transformed table.
pub fn run_plan(
    inputs: Vec<Table>,
    plan: &InstrumentPlan,
    selection: Option<&HashSet<String>>,
) -> Result<ShapeOutcome, ShapeError> {
    info!(
        "run_plan: instrument {:?}: {} file(s), {} row(s)",
        plan.name,
        inputs.len(),
        inputs.iter().map(|t| t.len()).sum::<usize>()
    );
    check_file_count(&inputs, plan)?;

    let mut mapped: Vec<Table> = Vec::with_capacity(inputs.len());
    for (idx, input) in inputs.into_iter().enumerate() {
        let mapping = match &plan.mappings {
            FileMappings::Shared(m) => m,
            FileMappings::PerFile(ms) => &ms[idx],
        };
        mapped.push(prepare_file(input, plan, mapping)?);
    }

    let mut table = merge(mapped, plan.merge_mode)?;
    debug!("run_plan: merged table: {} rows", table.len());

    let mut observed: Vec<String> = Vec::new();
    if let Some(rules) = &plan.expansion {
        table = expand_rows(&table, rules)?;
        observed = observed_values(&table, &rules.field)?;
        if let Some(allowed) = selection {
            table = filter_values(&table, &rules.field, allowed)?;
        }
    } else if selection.is_some() {
        warn!(
            "run_plan: instrument {:?} does not expand rows, ignoring the selection",
            plan.name
        );
    }

    let mut unparseable: Vec<UnparseableValue> = Vec::new();
    for d in plan.derivations.iter() {
        apply_derivation(&mut table, d, &mut unparseable)?;
    }
    if !unparseable.is_empty() {
        warn!(
            "run_plan: {} value(s) could not be interpreted and were left empty",
            unparseable.len()
        );
    }

    if let Some(column) = &plan.sort_by {
        sort_by_date(&mut table, column)?;
    }
    if plan.drop_missing_record_id {
        drop_missing_record_id(&mut table)?;
    }
    if plan.repeating {
        table = number_repeat_instances(&table, &plan.name)?;
    }

    let dropped: Vec<&str> = plan.drop_columns.iter().map(|s| s.as_str()).collect();
    table.drop_columns(&dropped);
    table.move_to_front(&[RECORD_ID, REPEAT_INSTRUMENT, REPEAT_INSTANCE]);

    info!(
        "run_plan: instrument {:?}: {} row(s), {} column(s)",
        plan.name,
        table.len(),
        table.columns().len()
    );
    Ok(ShapeOutcome {
        table,
        unparseable,
        observed_values: observed,
    })
}

fn check_file_count(inputs: &[Table], plan: &InstrumentPlan) -> Result<(), ShapeError> {
    let expected = match (&plan.mappings, plan.file_count) {
        (_, Some(n)) => Some(n),
        (FileMappings::PerFile(ms), None) => Some(ms.len()),
        (FileMappings::Shared(_), None) => None,
    };
    if let Some(expected) = expected {
        if inputs.len() != expected {
            return Err(ShapeError::WrongFileCount {
                expected,
                actual: inputs.len(),
            });
        }
    }
    if let FileMappings::PerFile(ms) = &plan.mappings {
        if ms.len() != inputs.len() {
            return Err(ShapeError::WrongFileCount {
                expected: ms.len(),
                actual: inputs.len(),
            });
        }
    }
    if inputs.is_empty() {
        return Err(ShapeError::WrongFileCount {
            expected: expected.unwrap_or(1),
            actual: 0,
        });
    }
    Ok(())
}

// Header normalization, record_id injection and column mapping of one file.
fn prepare_file(
    input: Table,
    plan: &InstrumentPlan,
    mapping: &ColumnMapping,
) -> Result<Table, ShapeError> {
    let mut table = match plan.header_style {
        HeaderStyle::Verbatim => input,
        HeaderStyle::Normalized => normalize_headers(input)?,
    };
    if let Some(source) = &plan.record_id_from {
        // record_id does not exist yet: check its source and every other
        // mapped column together so that all the missing ones are named.
        let mut required: Vec<&str> = mapping
            .sources()
            .into_iter()
            .filter(|s| *s != RECORD_ID)
            .collect();
        if !required.contains(&source.as_str()) {
            required.push(source.as_str());
        }
        table.require_columns(&required)?;
        inject_record_id(&mut table, source)?;
    }
    map_columns(&table, mapping)
}

/// Stable sort on a date column. Rows whose date cannot be read go last,
/// in their original order.
pub fn sort_by_date(table: &mut Table, column: &str) -> Result<(), ShapeError> {
    let keys: Vec<_> = table
        .column_values(column)?
        .into_iter()
        .map(|v| v.and_then(parse_naive_datetime))
        .collect();
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by_key(|idx| (keys[*idx].is_none(), keys[*idx]));
    table.reorder_rows(&order);
    Ok(())
}

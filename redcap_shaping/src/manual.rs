/*!

This is the long-form manual for `redcap_shaping` and `reshape`.

## Overview

REDCap imports repeating instruments from a flat CSV file in which every row carries
three special columns:

* `record_id` the record (student, person) the row belongs to
* `redcap_repeat_instrument` the name of the repeating instrument
* `redcap_repeat_instance` the position of the row within the record: `1` for the first row
  of a record, `2` for the second, and so on

The exports of most evaluation and scheduling systems are not in this shape. An
*instrument* is a recipe that turns one kind of export into one repeating instrument.
Recipes are data ([crate::InstrumentPlan]); the same engine runs all of them.

## Pipeline

[crate::run_plan] applies the steps below, in this order. The run stops at the first
fatal error and returns nothing else.

1. The number of files is checked against the instrument.
2. Each file is renamed and reordered by its column mapping, after an optional header
   normalization and an optional copy of an identifier column into `record_id`.
3. The files are combined, either by concatenation or by an outer join on `record_id`.
4. A multi-value column may be split into one row per value, and filtered.
5. Derived fields are computed: due dates, time zone conversions, percentages.
6. The rows may be sorted by a date column.
7. Rows are numbered within each record.
8. Auxiliary columns are dropped and the three REDCap columns are moved to the front.

### Column mappings

A [crate::ColumnMapping] is an ordered list of `(source, target)` pairs. The output of
the mapping contains exactly the target columns, in this order. If any source column is
absent from the input, the run fails and all the absent columns are listed.

Some targets are not read from the file (for example the `*_complete` status columns of
REDCap forms): they are declared as blank and left empty.

### Header normalization

Exports such as OASIS number their question columns (`1 Question Number`,
`1 Answer Text`, ...). With [crate::HeaderStyle::Normalized], every header is trimmed and:

| raw header        | column name         |
|-------------------|---------------------|
| `3 Question Text` | `q3_question_text`  |
| `Course ID`       | `course_id`         |
| `10a Extra`       | `10a_extra`         |

Only a leading integer followed by a space counts as a question number.

### Row expansion

A cell such as `*IV placement|Suturing|None` can be split on `|` into one row per value.
Each segment is trimmed and stripped of a leading marker (`*`). Segments in the exclusion
list (`None`) are dropped. Empty cells give one row with an empty value, unless the
instrument drops them.

The distinct values that were observed are reported back, so that a caller can offer a
selection. Without a selection, every value is kept.

### Derived fields

* weekly due dates: the first Sunday on or after the start date, then one week apart.
  A start on Wednesday 2024-01-03 gives `2024-01-07 23:59`, `2024-01-14 23:59`, ...
* end relative due date: the end date plus a number of weeks, at 23:59. The offset is
  limited to [crate::temporal::MAX_WEEK_OFFSET] weeks either way.
* zone due date: a timestamp read in UTC (unless it carries an offset), converted to
  US/Eastern, and moved to 23:59 on that day
* percentage: `raw / divisor * 100`, so `15` out of `20` is `75.0`

A value that cannot be read, or whose due date would fall outside the calendar, becomes
empty. It is reported as a warning and in [crate::ShapeOutcome::unparseable]; it never
stops the run.

### Merging files

Files that hold the same kind of rows (one per category) are concatenated. Files that
hold different fields for the same records (one per week) are outer joined on
`record_id`: a record present in only one file is kept, with empty values for the fields
of the other files.

## Errors

See [crate::ShapeError]. Every fatal error names all the offending columns or rows, so that
the export can be fixed in one go.

*/

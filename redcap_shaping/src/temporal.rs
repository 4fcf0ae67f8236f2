use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Weekday,
};
use chrono_tz::Tz;
use log::{debug, warn};

use crate::config::*;
use crate::table::Table;

/// The format of every derived date/time value (REDCap `datetime_ymd`).
pub const DUE_FORMAT: &str = "%Y-%m-%d %H:%M";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d", "%d-%b-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%y %H:%M",
];

const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S %z"];

/// 23:59, the time every due date is pinned to.
pub fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default()
}

/// The same calendar day at 23:59.
pub fn at_end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(end_of_day())
}

/// Parses a timestamp without time zone information.
/// Plain dates are read as midnight.
pub fn parse_naive_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parses a calendar date, discarding any time of day or offset.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Some(dt) = parse_naive_datetime(raw) {
        return Some(dt.date());
    }
    parse_zoned(raw.trim()).map(|dt| dt.date_naive())
}

fn parse_zoned(s: &str) -> Option<DateTime<chrono::FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    ZONED_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
}

/// Reads a timestamp in `from` unless it carries its own offset, and converts it to `to`.
pub fn convert_timestamp(raw: &str, from: Tz, to: Tz) -> Option<DateTime<Tz>> {
    let s = raw.trim();
    if let Some(dt) = parse_zoned(s) {
        return Some(dt.with_timezone(&to));
    }
    let naive = parse_naive_datetime(s)?;
    // Ambiguous local times (fall back) resolve to the earliest instant.
    let local = from.from_local_datetime(&naive).earliest()?;
    Some(local.with_timezone(&to))
}

/// Largest week offset accepted for a due date, about a century.
pub const MAX_WEEK_OFFSET: i64 = 5_300;

/// The first `target` weekday on or after `start`, if it is a representable date.
pub fn first_weekday_on_or_after(start: NaiveDate, target: Weekday) -> Option<NaiveDate> {
    let days_to_target = (target.num_days_from_monday() as i64
        - start.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    start.checked_add_signed(Duration::try_days(days_to_target)?)
}

/// `count` due dates, one week apart, starting on the first `weekday` on or after `start`.
///
/// `None` if any of them falls outside the calendar range.
pub fn weekly_due_dates(
    start: NaiveDate,
    weekday: Weekday,
    count: usize,
) -> Option<Vec<NaiveDateTime>> {
    let anchor = first_weekday_on_or_after(start, weekday)?;
    (0..count)
        .map(|k| {
            let offset = Duration::try_weeks(i64::try_from(k).ok()?)?;
            anchor.checked_add_signed(offset).map(at_end_of_day)
        })
        .collect()
}

/// The due date at `weeks` whole weeks after `end`, if it is a representable date.
pub fn end_relative_due(end: NaiveDate, weeks: i64) -> Option<NaiveDateTime> {
    end.checked_add_signed(Duration::try_weeks(weeks)?)
        .map(at_end_of_day)
}

/// The end of the day, in `to`, of a timestamp recorded in `from`.
pub fn zone_due(raw: &str, from: Tz, to: Tz) -> Option<NaiveDateTime> {
    convert_timestamp(raw, from, to).map(|dt| at_end_of_day(dt.date_naive()))
}

/// `raw / divisor * 100`. Anything that is not a finite number gives `None`.
pub fn rescore_percentage(raw: &str, divisor: f64) -> Option<f64> {
    if divisor == 0.0 || !divisor.is_finite() {
        return None;
    }
    let x: f64 = raw.trim().parse().ok()?;
    if !x.is_finite() {
        return None;
    }
    Some(x / divisor * 100.0)
}

/// Writes a number the way a spreadsheet export does: always with a decimal part.
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

fn format_due(dt: NaiveDateTime) -> String {
    dt.format(DUE_FORMAT).to_string()
}

/// Computes one derived field (or several for weekly due dates) for every row.
///
/// Values that cannot be parsed become null and are appended to `issues`.
/// An empty source cell is simply null and is not reported.
pub fn apply_derivation(
    table: &mut Table,
    derivation: &Derivation,
    issues: &mut Vec<UnparseableValue>,
) -> Result<(), ShapeError> {
    match derivation {
        Derivation::WeeklyDueDates {
            source,
            targets,
            weekday,
        } => {
            if targets.is_empty() {
                return Err(ShapeError::InvalidRule {
                    message: format!("no due date columns for {:?}", source),
                });
            }
            // A start date too close to the end of the calendar counts as unreadable.
            let dues = parse_column(table, source, issues, |s| {
                parse_date(s).and_then(|d| weekly_due_dates(d, *weekday, targets.len()))
            })?;
            let mut columns: Vec<Vec<Cell>> = vec![Vec::with_capacity(dues.len()); targets.len()];
            for row_dues in dues.iter() {
                match row_dues {
                    Some(ds) => {
                        for (col, due) in columns.iter_mut().zip(ds.iter()) {
                            col.push(Some(format_due(*due)));
                        }
                    }
                    None => columns.iter_mut().for_each(|col| col.push(None)),
                }
            }
            for (target, values) in targets.iter().zip(columns) {
                table.set_column(target, values)?;
            }
        }
        Derivation::EndRelativeDue {
            source,
            target,
            weeks,
        } => {
            check_week_offset(source, *weeks)?;
            let dues = parse_column(table, source, issues, |s| {
                parse_date(s).and_then(|d| end_relative_due(d, *weeks))
            })?;
            let values = dues.into_iter().map(|d| d.map(format_due)).collect();
            table.set_column(target, values)?;
        }
        Derivation::ZoneDue {
            source,
            target,
            from,
            to,
        } => {
            let dues = parse_column(table, source, issues, |s| zone_due(s, *from, *to))?;
            let values = dues.into_iter().map(|d| d.map(format_due)).collect();
            table.set_column(target, values)?;
        }
        Derivation::Percentage {
            source,
            target,
            divisor,
        } => {
            if *divisor == 0.0 || !divisor.is_finite() {
                return Err(ShapeError::InvalidRule {
                    message: format!("invalid divisor {} for {:?}", divisor, source),
                });
            }
            let scores = parse_column(table, source, issues, |s| rescore_percentage(s, *divisor))?;
            let values = scores.into_iter().map(|x| x.map(format_number)).collect();
            table.set_column(target, values)?;
        }
    }
    Ok(())
}

/// Rejects week offsets beyond [MAX_WEEK_OFFSET].
pub fn check_week_offset(source: &str, weeks: i64) -> Result<(), ShapeError> {
    if weeks.abs() > MAX_WEEK_OFFSET {
        return Err(ShapeError::InvalidRule {
            message: format!(
                "week offset {} for {:?} is out of range (at most {})",
                weeks, source, MAX_WEEK_OFFSET
            ),
        });
    }
    Ok(())
}

// Parses every cell of a column, recording the non-empty cells that fail.
fn parse_column<T, F>(
    table: &Table,
    source: &str,
    issues: &mut Vec<UnparseableValue>,
    parse: F,
) -> Result<Vec<Option<T>>, ShapeError>
where
    F: Fn(&str) -> Option<T>,
{
    let values = table.column_values(source)?;
    let mut res: Vec<Option<T>> = Vec::with_capacity(values.len());
    for (row, v) in values.into_iter().enumerate() {
        let parsed = match v {
            Some(s) if !s.trim().is_empty() => {
                let p = parse(s);
                if p.is_none() {
                    warn!(
                        "row {}: cannot interpret {:?} in column {:?}, using null",
                        row + 1,
                        s,
                        source
                    );
                    issues.push(UnparseableValue {
                        row,
                        column: source.to_string(),
                        value: s.to_string(),
                    });
                }
                p
            }
            _ => None,
        };
        res.push(parsed);
    }
    debug!("parse_column: {:?}: {} values", source, res.len());
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn one_column(name: &str, values: &[Option<&str>]) -> Table {
        Table::from_rows(
            vec![name.to_string()],
            values.iter().map(|v| vec![v.map(|s| s.to_string())]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn first_sunday_on_or_after() {
        // 2024-01-03 is a Wednesday.
        assert_eq!(
            first_weekday_on_or_after(ymd(2024, 1, 3), Weekday::Sun),
            Some(ymd(2024, 1, 7))
        );
        // A Sunday is its own anchor.
        assert_eq!(
            first_weekday_on_or_after(ymd(2024, 1, 7), Weekday::Sun),
            Some(ymd(2024, 1, 7))
        );
        assert_eq!(
            first_weekday_on_or_after(ymd(2024, 1, 8), Weekday::Sun),
            Some(ymd(2024, 1, 14))
        );
    }

    #[test]
    fn weekly_quiz_due_dates() {
        let dues: Vec<String> = weekly_due_dates(ymd(2024, 1, 3), Weekday::Sun, 4)
            .unwrap()
            .into_iter()
            .map(format_due)
            .collect();
        assert_eq!(
            dues,
            vec![
                "2024-01-07 23:59",
                "2024-01-14 23:59",
                "2024-01-21 23:59",
                "2024-01-28 23:59"
            ]
        );
    }

    #[test]
    fn end_relative() {
        assert_eq!(
            end_relative_due(ymd(2024, 2, 29), 1).map(format_due),
            Some("2024-03-07 23:59".to_string())
        );
    }

    #[test]
    fn due_dates_past_the_calendar_end() {
        assert_eq!(end_relative_due(ymd(2024, 1, 1), 100_000_000), None);
        assert_eq!(end_relative_due(NaiveDate::MAX, 1), None);
        let near_end = parse_date("+262142-12-30").unwrap();
        assert_eq!(weekly_due_dates(near_end, Weekday::Sun, 4), None);
    }

    #[test]
    fn overflowing_dates_become_null() {
        let mut t = one_column(
            "start_date",
            &[Some("2024-01-03"), Some("+262142-12-30")],
        );
        let mut issues = Vec::new();
        let d = Derivation::WeeklyDueDates {
            source: "start_date".to_string(),
            targets: vec!["quiz_due_1".to_string(), "quiz_due_2".to_string()],
            weekday: Weekday::Sun,
        };
        apply_derivation(&mut t, &d, &mut issues).unwrap();
        assert_eq!(t.value(0, "quiz_due_2"), Some("2024-01-14 23:59"));
        assert_eq!(t.value(1, "quiz_due_1"), None);
        assert_eq!(t.value(1, "quiz_due_2"), None);
        assert_eq!(
            issues,
            vec![UnparseableValue {
                row: 1,
                column: "start_date".to_string(),
                value: "+262142-12-30".to_string()
            }]
        );
    }

    #[test]
    fn huge_week_offsets_are_rejected() {
        let mut t = one_column("end_date", &[Some("2024-01-01")]);
        let d = Derivation::EndRelativeDue {
            source: "end_date".to_string(),
            target: "final_due".to_string(),
            weeks: 100_000_000,
        };
        assert!(matches!(
            apply_derivation(&mut t, &d, &mut Vec::new()),
            Err(ShapeError::InvalidRule { .. })
        ));
        assert!(check_week_offset("end_date", -MAX_WEEK_OFFSET).is_ok());
    }

    #[test]
    fn time_of_day_is_discarded() {
        assert_eq!(parse_date("2024-01-03 14:35:00"), Some(ymd(2024, 1, 3)));
        assert_eq!(parse_date("1/3/2024"), Some(ymd(2024, 1, 3)));
        assert_eq!(parse_date("2024-01-03T08:00:00-05:00"), Some(ymd(2024, 1, 3)));
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn converts_utc_to_eastern() {
        let eastern: Tz = "US/Eastern".parse().unwrap();
        // 02:30 UTC is still the previous evening in New York (EST, UTC-5).
        assert_eq!(
            zone_due("2024-01-08 02:30:00", Tz::UTC, eastern).map(format_due),
            Some("2024-01-07 23:59".to_string())
        );
        // Daylight saving time (EDT, UTC-4).
        assert_eq!(
            zone_due("2024-07-01 03:59:00", Tz::UTC, eastern).map(format_due),
            Some("2024-06-30 23:59".to_string())
        );
        assert_eq!(
            zone_due("2024-07-01 04:00:00", Tz::UTC, eastern).map(format_due),
            Some("2024-07-01 23:59".to_string())
        );
        // Explicit offsets win over the assumed zone.
        assert_eq!(
            zone_due("2024-01-08T02:30:00+09:00", Tz::UTC, eastern).map(format_due),
            Some("2024-01-07 23:59".to_string())
        );
        assert_eq!(zone_due("not a date", Tz::UTC, eastern), None);
    }

    #[test]
    fn percentage_rescoring() {
        assert_eq!(rescore_percentage("15", 20.0), Some(75.0));
        assert_eq!(rescore_percentage(" 7.5 ", 20.0), Some(37.5));
        assert_eq!(rescore_percentage("N/A", 20.0), None);
        assert_eq!(rescore_percentage("NaN", 20.0), None);
        assert_eq!(rescore_percentage("15", 0.0), None);
        assert_eq!(format_number(75.0), "75.0");
        assert_eq!(format_number(37.5), "37.5");
    }

    #[test]
    fn derivation_nulls_unparseable_cells() {
        let mut t = one_column("raw_score", &[Some("15"), Some("N/A"), None, Some("20")]);
        let mut issues = Vec::new();
        let d = Derivation::Percentage {
            source: "raw_score".to_string(),
            target: "score_pct".to_string(),
            divisor: 20.0,
        };
        apply_derivation(&mut t, &d, &mut issues).unwrap();
        assert_eq!(
            t.column_values("score_pct").unwrap(),
            vec![Some("75.0"), None, None, Some("100.0")]
        );
        assert_eq!(
            issues,
            vec![UnparseableValue {
                row: 1,
                column: "raw_score".to_string(),
                value: "N/A".to_string()
            }]
        );
    }

    #[test]
    fn weekly_derivation_on_table() {
        let mut t = one_column("start_date", &[Some("2024-01-03"), Some("tbd")]);
        let mut issues = Vec::new();
        let targets: Vec<String> = (1..=4).map(|i| format!("quiz_due_{}", i)).collect();
        let d = Derivation::WeeklyDueDates {
            source: "start_date".to_string(),
            targets: targets.clone(),
            weekday: Weekday::Sun,
        };
        apply_derivation(&mut t, &d, &mut issues).unwrap();
        assert_eq!(t.value(0, "quiz_due_1"), Some("2024-01-07 23:59"));
        assert_eq!(t.value(0, "quiz_due_4"), Some("2024-01-28 23:59"));
        for target in targets.iter() {
            assert_eq!(t.value(1, target), None);
        }
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn derivation_requires_its_source() {
        let mut t = one_column("x", &[Some("1")]);
        let d = Derivation::EndRelativeDue {
            source: "end_date".to_string(),
            target: "final_due".to_string(),
            weeks: 1,
        };
        assert!(matches!(
            apply_derivation(&mut t, &d, &mut Vec::new()),
            Err(ShapeError::MissingColumns { .. })
        ));
    }
}

use std::collections::HashSet;
use std::fs;

use chrono::Weekday;
use chrono_tz::Tz;
use log::debug;
use redcap_shaping::*;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::shape::*;

/// One entry of a column list.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnEntry {
    /// The column is kept under the same name.
    Same(String),
    Renamed {
        source: String,
        target: String,
    },
    /// A column that is not read from the input and is left empty.
    Blank {
        blank: String,
    },
    /// A grid of numbered question columns.
    Questions {
        questions: QuestionBlock,
    },
}

/// Expands to `q<i>_<suffix>` for every question `i` in `from..=to` and every suffix.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBlock {
    pub from: u32,
    pub to: u32,
    pub suffixes: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ExpandConfig {
    pub field: String,
    pub delimiter: Option<String>,
    #[serde(rename = "stripMarker")]
    pub strip_marker: Option<String>,
    pub exclude: Option<Vec<String>>,
    #[serde(rename = "keepEmpty")]
    pub keep_empty: Option<bool>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeriveConfig {
    WeeklyDueDates {
        source: String,
        targets: Vec<String>,
        weekday: Option<String>,
    },
    EndRelativeDue {
        source: String,
        target: String,
        weeks: i64,
    },
    ZoneDue {
        source: String,
        target: String,
        #[serde(rename = "fromZone")]
        from_zone: Option<String>,
        #[serde(rename = "toZone")]
        to_zone: Option<String>,
    },
    Percentage {
        source: String,
        target: String,
        divisor: f64,
    },
}

/// The description of an instrument, as written in the JSON files.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub instrument: String,
    pub description: Option<String>,
    #[serde(rename = "fileCount")]
    pub file_count: Option<usize>,
    #[serde(rename = "worksheetName")]
    pub worksheet_name: Option<String>,
    #[serde(rename = "normalizeHeaders")]
    pub normalize_headers: Option<bool>,
    #[serde(rename = "recordIdFrom")]
    pub record_id_from: Option<String>,
    pub columns: Option<Vec<ColumnEntry>>,
    #[serde(rename = "fileColumns")]
    pub file_columns: Option<Vec<Vec<ColumnEntry>>>,
    pub merge: Option<String>,
    pub expand: Option<ExpandConfig>,
    pub derive: Option<Vec<DeriveConfig>>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "dropColumns")]
    pub drop_columns: Option<Vec<String>>,
    #[serde(rename = "dropMissingRecordId")]
    pub drop_missing_record_id: Option<bool>,
    pub repeating: Option<bool>,
    pub output: Option<String>,
    #[serde(rename = "emailField")]
    pub email_field: Option<String>,
}

/// How the final table is written.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum OutputKind {
    Csv,
    /// One `record_id, email` line per row.
    EmailMapping { email_field: String },
}

impl InstrumentConfig {
    /// Validates the description and turns it into a plan for the engine.
    pub fn plan(&self) -> ReshapeResult<InstrumentPlan> {
        if self.instrument.trim().is_empty() {
            whatever!("The instrument name cannot be empty")
        }
        let mappings = match (&self.columns, &self.file_columns) {
            (Some(columns), None) => FileMappings::Shared(self.mapping(columns)?),
            (None, Some(files)) if !files.is_empty() => {
                let mut res: Vec<ColumnMapping> = Vec::with_capacity(files.len());
                for columns in files.iter() {
                    res.push(self.mapping(columns)?);
                }
                FileMappings::PerFile(res)
            }
            (Some(_), Some(_)) => {
                return self.invalid("columns and fileColumns cannot be used together")
            }
            _ => return self.invalid("no columns defined"),
        };
        let merge_mode = match self.merge.as_deref() {
            None | Some("concatenate") => MergeMode::Concatenate,
            Some("outerJoin") => MergeMode::OuterJoin,
            Some(x) => return self.invalid(&format!("unknown merge mode {:?}", x)),
        };
        let expansion = match &self.expand {
            Some(e) => Some(self.expansion(e)?),
            None => None,
        };
        let mut derivations: Vec<Derivation> = Vec::new();
        for d in self.derive.iter().flatten() {
            derivations.push(self.derivation(d)?);
        }

        let plan = InstrumentPlan {
            name: self.instrument.clone(),
            file_count: self.file_count,
            header_style: if self.normalize_headers.unwrap_or(false) {
                HeaderStyle::Normalized
            } else {
                HeaderStyle::Verbatim
            },
            record_id_from: self.record_id_from.clone(),
            mappings,
            merge_mode,
            expansion,
            derivations,
            sort_by: self.sort_by.clone(),
            drop_columns: self.drop_columns.clone().unwrap_or_default(),
            drop_missing_record_id: self.drop_missing_record_id.unwrap_or(false),
            repeating: self.repeating.unwrap_or(true),
        };
        debug!("plan: {:?}", plan);
        Ok(plan)
    }

    pub fn output_kind(&self) -> ReshapeResult<OutputKind> {
        match self.output.as_deref() {
            None | Some("csv") => Ok(OutputKind::Csv),
            Some("emailMapping") => Ok(OutputKind::EmailMapping {
                email_field: self
                    .email_field
                    .clone()
                    .unwrap_or_else(|| "email".to_string()),
            }),
            Some(x) => self.invalid(&format!("unknown output {:?}", x)),
        }
    }

    fn invalid<T>(&self, message: &str) -> ReshapeResult<T> {
        InvalidConfigSnafu {
            instrument: self.instrument.as_str(),
            message,
        }
        .fail()
    }

    fn mapping(&self, entries: &[ColumnEntry]) -> ReshapeResult<ColumnMapping> {
        let mut mapping = ColumnMapping::default();
        for entry in entries.iter() {
            let res = match entry {
                ColumnEntry::Same(name) => mapping.push(name, name),
                ColumnEntry::Renamed { source, target } => mapping.push(source, target),
                ColumnEntry::Blank { blank } => mapping.push_blank(blank),
                ColumnEntry::Questions { questions } => {
                    if questions.from > questions.to || questions.suffixes.is_empty() {
                        return self.invalid(&format!("empty question block {:?}", questions));
                    }
                    question_columns(questions)
                        .iter()
                        .try_for_each(|c| mapping.push(c, c))
                }
            };
            res.context(ShapeSnafu)?;
        }
        if mapping.is_empty() {
            return self.invalid("no columns defined");
        }
        Ok(mapping)
    }

    fn expansion(&self, e: &ExpandConfig) -> ReshapeResult<ExpansionRules> {
        let mut rules = ExpansionRules::new(&e.field);
        if let Some(d) = &e.delimiter {
            rules.delimiter = self.single_char("delimiter", d)?;
        }
        if let Some(m) = &e.strip_marker {
            rules.strip_marker = Some(self.single_char("stripMarker", m)?);
        }
        rules.exclude = e
            .exclude
            .iter()
            .flatten()
            .cloned()
            .collect::<HashSet<String>>();
        rules.keep_empty = e.keep_empty.unwrap_or(true);
        Ok(rules)
    }

    fn derivation(&self, d: &DeriveConfig) -> ReshapeResult<Derivation> {
        let res = match d {
            DeriveConfig::WeeklyDueDates {
                source,
                targets,
                weekday,
            } => {
                let weekday_s = weekday.as_deref().unwrap_or("Sun");
                let weekday: Weekday = match weekday_s.parse() {
                    Ok(w) => w,
                    Err(_) => return self.invalid(&format!("unknown weekday {:?}", weekday_s)),
                };
                Derivation::WeeklyDueDates {
                    source: source.clone(),
                    targets: targets.clone(),
                    weekday,
                }
            }
            DeriveConfig::EndRelativeDue {
                source,
                target,
                weeks,
            } => {
                if let Err(e) = redcap_shaping::temporal::check_week_offset(source, *weeks) {
                    return self.invalid(&e.to_string());
                }
                Derivation::EndRelativeDue {
                    source: source.clone(),
                    target: target.clone(),
                    weeks: *weeks,
                }
            }
            DeriveConfig::ZoneDue {
                source,
                target,
                from_zone,
                to_zone,
            } => Derivation::ZoneDue {
                source: source.clone(),
                target: target.clone(),
                from: self.zone(from_zone.as_deref().unwrap_or("UTC"))?,
                to: self.zone(to_zone.as_deref().unwrap_or("US/Eastern"))?,
            },
            DeriveConfig::Percentage {
                source,
                target,
                divisor,
            } => {
                if *divisor == 0.0 || !divisor.is_finite() {
                    return self.invalid(&format!("invalid divisor {} for {:?}", divisor, source));
                }
                Derivation::Percentage {
                    source: source.clone(),
                    target: target.clone(),
                    divisor: *divisor,
                }
            }
        };
        Ok(res)
    }

    fn zone(&self, name: &str) -> ReshapeResult<Tz> {
        match name.parse::<Tz>() {
            Ok(tz) => Ok(tz),
            Err(_) => self.invalid(&format!("unknown time zone {:?}", name)),
        }
    }

    fn single_char(&self, key: &str, s: &str) -> ReshapeResult<char> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => self.invalid(&format!("{} must be a single character, got {:?}", key, s)),
        }
    }
}

/// The column names of a question grid, question by question.
pub fn question_columns(block: &QuestionBlock) -> Vec<String> {
    (block.from..=block.to)
        .flat_map(|i| block.suffixes.iter().map(move |s| format!("q{}_{}", i, s)))
        .collect()
}

pub fn parse_instrument_config(contents: &str, path: &str) -> ReshapeResult<InstrumentConfig> {
    let config: InstrumentConfig =
        serde_json::from_str(contents).context(ParsingJsonSnafu { path })?;
    Ok(config)
}

pub fn read_instrument_config(path: &str) -> ReshapeResult<InstrumentConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    parse_instrument_config(&contents, path)
}

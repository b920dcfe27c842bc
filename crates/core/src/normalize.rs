//! Per-field value transforms and validation.

use crate::error::ConfigError;
use crate::model::{MappedTable, NormalizedTable, Severity, ValidationIssue};
use crate::patterns::PatternCache;
use crate::schema::{CanonicalSchema, TransformSpec, ValidatorRule};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tablemill_sheet::{CellValue, ValueKind};
use validator::ValidateEmail;

/// Formats tried by `date` transforms that declare none.
const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%b %d, %Y",
];

/// Largest serial date a worksheet can hold (9999-12-31).
const MAX_SERIAL_DATE: f64 = 2_958_465.999_999;

#[derive(Debug, Clone)]
enum Transform {
    Trim,
    CollapseWhitespace,
    Lowercase,
    Uppercase,
    Text,
    Number,
    Integer,
    Boolean,
    Date(Vec<String>),
    Replace { regex: Regex, with: String },
}

impl Transform {
    fn compile(spec: &TransformSpec, patterns: &mut PatternCache) -> Result<Self, ConfigError> {
        Ok(match spec {
            TransformSpec::Trim => Transform::Trim,
            TransformSpec::CollapseWhitespace => Transform::CollapseWhitespace,
            TransformSpec::Lowercase => Transform::Lowercase,
            TransformSpec::Uppercase => Transform::Uppercase,
            TransformSpec::Text => Transform::Text,
            TransformSpec::Number => Transform::Number,
            TransformSpec::Integer => Transform::Integer,
            TransformSpec::Boolean => Transform::Boolean,
            TransformSpec::Date { formats } if formats.is_empty() => {
                Transform::Date(DEFAULT_DATE_FORMATS.iter().map(|f| (*f).to_string()).collect())
            }
            TransformSpec::Date { formats } => Transform::Date(formats.clone()),
            TransformSpec::Replace { pattern, with } => Transform::Replace {
                regex: patterns.get(pattern)?,
                with: with.clone(),
            },
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Transform::Trim => "trim",
            Transform::CollapseWhitespace => "collapse_whitespace",
            Transform::Lowercase => "lowercase",
            Transform::Uppercase => "uppercase",
            Transform::Text => "text",
            Transform::Number => "number",
            Transform::Integer => "integer",
            Transform::Boolean => "boolean",
            Transform::Date(_) => "date",
            Transform::Replace { .. } => "replace",
        }
    }

    /// Apply to a non-empty value. The error is a human-readable reason.
    fn apply(&self, value: CellValue) -> Result<CellValue, String> {
        match self {
            Transform::Trim => Ok(map_text(value, |s| s.trim().to_string())),
            Transform::CollapseWhitespace => Ok(map_text(value, |s| {
                s.split_whitespace().collect::<Vec<_>>().join(" ")
            })),
            Transform::Lowercase => Ok(map_text(value, |s| s.to_lowercase())),
            Transform::Uppercase => Ok(map_text(value, |s| s.to_uppercase())),
            Transform::Text => Ok(CellValue::String(value.as_text())),
            Transform::Number => match value.kind() {
                ValueKind::Number => value
                    .as_float()
                    .map(CellValue::Float)
                    .ok_or_else(|| format!("'{value}' is not a number")),
                _ => Err(format!("'{value}' is not a number")),
            },
            Transform::Integer => match value.kind() {
                ValueKind::Number => value
                    .as_int()
                    .map(CellValue::Int)
                    .ok_or_else(|| format!("'{value}' is not a whole number")),
                _ => Err(format!("'{value}' is not a whole number")),
            },
            Transform::Boolean => match value {
                CellValue::Bool(_) | CellValue::Int(_) | CellValue::Float(_) | CellValue::String(_) => value
                    .as_bool()
                    .map(CellValue::Bool)
                    .ok_or_else(|| format!("'{value}' is not a boolean")),
                _ => Err(format!("'{value}' is not a boolean")),
            },
            Transform::Date(formats) => parse_date(&value, formats)
                .map(CellValue::DateTime)
                .ok_or_else(|| format!("'{value}' is not a recognised date")),
            Transform::Replace { regex, with } => {
                let text = value.as_text();
                Ok(CellValue::String(regex.replace_all(&text, with.as_str()).into_owned()))
            }
        }
    }
}

fn map_text(value: CellValue, f: impl FnOnce(&str) -> String) -> CellValue {
    match value {
        CellValue::String(s) => CellValue::String(f(&s)),
        other => other,
    }
}

fn parse_date(value: &CellValue, formats: &[String]) -> Option<NaiveDateTime> {
    match value {
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Int(_) | CellValue::Float(_) => from_serial(value.as_float()?),
        CellValue::String(s) => {
            let s = s.trim();
            formats.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(s, format).ok().or_else(|| {
                    NaiveDate::parse_from_str(s, format)
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
            })
        }
        _ => None,
    }
}

/// Spreadsheet serial date (days since 1899-12-30) to a date-time.
fn from_serial(serial: f64) -> Option<NaiveDateTime> {
    if !(0.0..=MAX_SERIAL_DATE).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

#[derive(Debug, Clone)]
enum Check {
    Required,
    Pattern(Regex),
    Range { min: Option<f64>, max: Option<f64> },
    Email,
    OneOf { values: Vec<String>, case_insensitive: bool },
    MaxLength(usize),
    Unique,
}

#[derive(Debug, Clone)]
struct Rule {
    check: Check,
    name: &'static str,
    severity: Severity,
}

impl Rule {
    fn compile(rule: &ValidatorRule, severity: Severity, patterns: &mut PatternCache) -> Result<Self, ConfigError> {
        let check = match rule {
            ValidatorRule::Required => Check::Required,
            ValidatorRule::Pattern { pattern } => Check::Pattern(patterns.get(pattern)?),
            ValidatorRule::Range { min, max } => Check::Range {
                min: *min,
                max: *max,
            },
            ValidatorRule::Email => Check::Email,
            ValidatorRule::OneOf {
                values,
                case_insensitive,
            } => Check::OneOf {
                values: if *case_insensitive {
                    values.iter().map(|v| v.to_lowercase()).collect()
                } else {
                    values.clone()
                },
                case_insensitive: *case_insensitive,
            },
            ValidatorRule::MaxLength { max } => Check::MaxLength(*max),
            ValidatorRule::Unique => Check::Unique,
        };
        Ok(Self {
            check,
            name: rule.name(),
            severity,
        })
    }

    /// Reason the value fails, if it does. `seen` holds earlier values of
    /// the column for uniqueness.
    fn violation(&self, value: &CellValue, seen: &mut HashSet<String>) -> Option<String> {
        if value.is_blank() {
            return matches!(self.check, Check::Required).then(|| "value is required".to_string());
        }
        let text = value.as_text();
        match &self.check {
            Check::Required => None,
            Check::Pattern(regex) => {
                (!regex.is_match(&text)).then(|| format!("'{text}' does not match {}", regex.as_str()))
            }
            Check::Range { min, max } => match value.as_float() {
                Some(n) if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) => {
                    Some(format!("{n} is outside {}", describe_range(*min, *max)))
                }
                Some(_) => None,
                None => Some(format!("'{text}' is not a number")),
            },
            Check::Email => (!text.validate_email()).then(|| format!("'{text}' is not an email address")),
            Check::OneOf {
                values,
                case_insensitive,
            } => {
                let probe = if *case_insensitive {
                    text.to_lowercase()
                } else {
                    text.clone()
                };
                (!values.contains(&probe)).then(|| format!("'{text}' is not one of {}", values.join(", ")))
            }
            Check::MaxLength(max) => {
                let len = text.chars().count();
                (len > *max).then(|| format!("length {len} exceeds {max}"))
            }
            Check::Unique => (!seen.insert(text.clone())).then(|| format!("'{text}' is a duplicate")),
        }
    }
}

fn describe_range(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("[{lo}, {hi}]"),
        (Some(lo), None) => format!(">= {lo}"),
        (None, Some(hi)) => format!("<= {hi}"),
        (None, None) => "any range".to_string(),
    }
}

#[derive(Debug, Clone, Default)]
struct FieldRules {
    transforms: Vec<Transform>,
    rules: Vec<Rule>,
    default: Option<CellValue>,
}

/// Collects issues for one table.
struct Findings<'a> {
    field: &'a str,
    row: usize,
    issues: &'a mut Vec<ValidationIssue>,
}

impl Findings<'_> {
    fn push(&mut self, severity: Severity, code: String, message: String) {
        self.issues.push(ValidationIssue {
            field: self.field.to_string(),
            row: self.row,
            severity,
            code,
            message,
        });
    }
}

impl FieldRules {
    /// Transform a raw value, falling back to the default on empty input
    /// or a failed transform.
    fn clean(&self, raw: &CellValue, findings: &mut Findings<'_>) -> CellValue {
        if raw.is_empty() {
            return self.default.clone().unwrap_or_default();
        }
        let mut value = raw.clone();
        for transform in &self.transforms {
            match transform.apply(value) {
                Ok(next) => value = next,
                Err(reason) => {
                    findings.push(
                        Severity::Error,
                        format!("transform.{}", transform.name()),
                        reason,
                    );
                    return self.default.clone().unwrap_or_else(|| raw.clone());
                }
            }
        }
        if value.is_blank() {
            return self.default.clone().unwrap_or_default();
        }
        value
    }

    fn check(&self, value: &CellValue, seen: &mut HashSet<String>, findings: &mut Findings<'_>) {
        for rule in &self.rules {
            if let Some(reason) = rule.violation(value, seen) {
                findings.push(rule.severity, format!("validate.{}", rule.name), reason);
            }
        }
    }
}

/// Applies each canonical field's transforms and validators. Passthrough
/// columns are copied unchanged.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    fields: HashMap<String, FieldRules>,
}

impl Normalizer {
    /// Compile the schema's transforms and validators.
    ///
    /// # Errors
    ///
    /// Returns an error when a pattern does not compile.
    pub fn from_schema(schema: &CanonicalSchema, patterns: &mut PatternCache) -> Result<Self, ConfigError> {
        let mut fields = HashMap::new();
        for field in &schema.fields {
            let rules = FieldRules {
                transforms: field
                    .transforms
                    .iter()
                    .map(|t| Transform::compile(t, patterns))
                    .collect::<Result<_, _>>()?,
                rules: field
                    .validators
                    .iter()
                    .map(|v| Rule::compile(&v.rule, v.severity, patterns))
                    .collect::<Result<_, _>>()?,
                default: field.default.clone(),
            };
            fields.insert(field.name.clone(), rules);
        }
        Ok(Self { fields })
    }

    /// Produce the output table and its issues. Issues are ordered by row,
    /// then column.
    #[must_use]
    pub fn normalize(&self, table: &MappedTable) -> NormalizedTable {
        let mapped_fields = table.mapping().fields();
        let rules: Vec<Option<&FieldRules>> = mapped_fields
            .iter()
            .map(|f| self.fields.get(&f.field))
            .collect();
        let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); mapped_fields.len()];
        let mut issues = Vec::new();
        let mut rows = Vec::with_capacity(table.extracted().row_count());

        for (row_index, view) in table.rows().enumerate() {
            let mut out = Vec::with_capacity(view.len());
            for (column, raw) in view.iter().enumerate() {
                let Some(Some(field_rules)) = rules.get(column) else {
                    out.push(raw.clone());
                    continue;
                };
                let mut findings = Findings {
                    field: &mapped_fields[column].field,
                    row: row_index,
                    issues: &mut issues,
                };
                let value = field_rules.clean(raw, &mut findings);
                field_rules.check(&value, &mut seen[column], &mut findings);
                out.push(value);
            }
            rows.push(out);
        }

        if !issues.is_empty() {
            tracing::debug!(issues = issues.len(), "normalization found issues");
        }
        NormalizedTable::new(table.header(), rows, issues)
    }
}

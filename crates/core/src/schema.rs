//! Canonical schema: the fields a run maps tables onto, with their
//! detectors, transforms and validators.

use crate::error::ConfigError;
use crate::model::Severity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tablemill_sheet::CellValue;

fn default_threshold() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    "extra_".to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_sample() -> usize {
    50
}

/// Ordered set of canonical fields plus mapping policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    pub fields: Vec<FieldSchema>,
    /// Minimum score a column needs to be assigned to a field.
    #[serde(default = "default_threshold")]
    pub mapping_threshold: f64,
    /// Carry unmapped source columns into the output.
    #[serde(default = "default_true")]
    pub append_unmapped_columns: bool,
    #[serde(default = "default_prefix")]
    pub unmapped_prefix: String,
    /// Emit an empty column for fields no source column maps to.
    #[serde(default)]
    pub include_missing_fields: bool,
}

impl CanonicalSchema {
    /// Schema with default mapping policy.
    #[must_use]
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self {
            fields,
            mapping_threshold: default_threshold(),
            append_unmapped_columns: true,
            unmapped_prefix: default_prefix(),
            include_missing_fields: false,
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.mapping_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_unmapped_columns(mut self, append: bool) -> Self {
        self.append_unmapped_columns = append;
        self
    }

    #[must_use]
    pub fn with_missing_fields(mut self, include: bool) -> Self {
        self.include_missing_fields = include;
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declaration position of a field.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check structural consistency.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or duplicate field names, a non-finite
    /// threshold, or a signal detector naming an undeclared field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mapping_threshold.is_finite() {
            return Err(ConfigError::schema("mapping_threshold must be finite"));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ConfigError::schema("field names must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::schema(format!(
                    "field '{}' is declared twice",
                    field.name
                )));
            }
        }
        for field in &self.fields {
            for detector in &field.detectors {
                if let DetectorSpec::Signal { deltas, .. } = detector {
                    if let Some(unknown) = deltas.keys().find(|k| !seen.contains(k.as_str())) {
                        return Err(ConfigError::schema(format!(
                            "signal on '{}' scores unknown field '{unknown}'",
                            field.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// One canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Scoring rules. A field with none is matched on its name and synonyms.
    #[serde(default)]
    pub detectors: Vec<DetectorSpec>,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
    /// Value used for empty cells and cells whose transform failed.
    #[serde(default)]
    pub default: Option<CellValue>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            synonyms: Vec::new(),
            detectors: Vec::new(),
            transforms: Vec::new(),
            validators: Vec::new(),
            default: None,
        }
    }

    #[must_use]
    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms.extend(synonyms.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: DetectorSpec) -> Self {
        self.detectors.push(detector);
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: TransformSpec) -> Self {
        self.transforms.push(transform);
        self
    }

    #[must_use]
    pub fn with_validator(mut self, rule: ValidatorRule) -> Self {
        self.validators.push(ValidatorSpec {
            rule,
            severity: Severity::Error,
        });
        self
    }

    #[must_use]
    pub fn with_warning(mut self, rule: ValidatorRule) -> Self {
        self.validators.push(ValidatorSpec {
            rule,
            severity: Severity::Warning,
        });
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<CellValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Field name followed by its synonyms.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

/// Declarative column detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorSpec {
    /// Header text equals one of `names` (full weight) or contains all of
    /// its words (half weight). Empty `names` means name plus synonyms.
    Header {
        #[serde(default)]
        names: Vec<String>,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    /// Header text matches a regex.
    HeaderPattern {
        pattern: String,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    /// Share of sampled non-empty values matching a regex, times weight.
    ValuePattern {
        pattern: String,
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default = "default_sample")]
        sample: usize,
    },
    /// Share of sampled non-empty values that are numbers, times weight.
    Numeric {
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default = "default_sample")]
        sample: usize,
    },
    /// Share of sampled non-empty values that are dates, times weight.
    Dates {
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default = "default_sample")]
        sample: usize,
    },
    /// When the header matches, add a delta to several fields at once.
    /// Negative deltas push competing fields away from the column.
    Signal {
        pattern: String,
        deltas: IndexMap<String, f64>,
    },
}

/// Per-cell value transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    Trim,
    CollapseWhitespace,
    Lowercase,
    Uppercase,
    /// Render any value as text.
    Text,
    /// Parse to a float; currency symbols and separators are accepted.
    Number,
    /// Parse to an integer; fractional values fail.
    Integer,
    Boolean,
    /// Parse to a date-time with the given chrono formats, tried in order.
    /// Numbers are read as spreadsheet serial dates.
    Date {
        #[serde(default)]
        formats: Vec<String>,
    },
    /// Regex replace on the text form.
    Replace { pattern: String, with: String },
}

impl TransformSpec {
    /// Name used in issue codes (`transform.<name>`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trim => "trim",
            Self::CollapseWhitespace => "collapse_whitespace",
            Self::Lowercase => "lowercase",
            Self::Uppercase => "uppercase",
            Self::Text => "text",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date { .. } => "date",
            Self::Replace { .. } => "replace",
        }
    }
}

/// A validator with its severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    #[serde(flatten)]
    pub rule: ValidatorRule,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidatorRule {
    Required,
    Pattern {
        pattern: String,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Email,
    OneOf {
        values: Vec<String>,
        #[serde(default)]
        case_insensitive: bool,
    },
    MaxLength {
        max: usize,
    },
    Unique,
}

impl ValidatorRule {
    /// Name used in issue codes (`validate.<name>`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Pattern { .. } => "pattern",
            Self::Range { .. } => "range",
            Self::Email => "email",
            Self::OneOf { .. } => "one_of",
            Self::MaxLength { .. } => "max_length",
            Self::Unique => "unique",
        }
    }
}

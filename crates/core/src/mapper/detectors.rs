//! Column scoring detectors.

use crate::error::ConfigError;
use crate::patterns::PatternCache;
use crate::schema::{CanonicalSchema, DetectorSpec};
use indexmap::IndexMap;
use regex::Regex;
use tablemill_sheet::{CellValue, ValueKind};

/// Output of one detector for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Score {
    /// Applies to the detector's own field.
    Single(f64),
    /// Deltas for several fields at once. Negative values steer a column
    /// away from a field.
    Multi(IndexMap<String, f64>),
}

impl Score {
    #[must_use]
    pub fn zero() -> Self {
        Score::Single(0.0)
    }
}

/// What a detector sees of one extracted column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnView<'a> {
    index: usize,
    header: &'a str,
    rows: &'a [Vec<CellValue>],
}

impl<'a> ColumnView<'a> {
    #[must_use]
    pub fn new(index: usize, header: &'a str, rows: &'a [Vec<CellValue>]) -> Self {
        Self {
            index,
            header,
            rows,
        }
    }

    /// Position of the column in the extracted table.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Flattened header text.
    #[must_use]
    pub fn header(&self) -> &'a str {
        self.header
    }

    pub fn values(&self) -> impl Iterator<Item = &'a CellValue> + 'a {
        let (index, rows) = (self.index, self.rows);
        rows.iter().filter_map(move |row| row.get(index))
    }

    /// Up to `n` non-blank values from the top of the column.
    pub fn sample(&self, n: usize) -> impl Iterator<Item = &'a CellValue> + 'a {
        self.values().filter(|v| !v.is_blank()).take(n)
    }
}

/// Scores how well a column fits a canonical field.
pub trait ColumnDetector: Send + Sync {
    /// Field a [`Score::Single`] is credited to.
    fn field(&self) -> &str;

    fn score(&self, column: &ColumnView<'_>) -> Score;
}

/// Lowercase words of a header, separated by single spaces.
/// `"Amount ($)"` becomes `"amount"`, `"E-Mail_Address"` becomes
/// `"e mail address"`.
#[must_use]
pub fn normalize_header(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exact header match on any name scores `weight`; a header containing
/// every word of a name scores half of it.
#[derive(Debug, Clone)]
pub struct HeaderDetector {
    field: String,
    names: Vec<String>,
    weight: f64,
}

impl HeaderDetector {
    pub fn new<I, S>(field: impl Into<String>, names: I, weight: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            field: field.into(),
            names: names
                .into_iter()
                .map(|n| normalize_header(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
            weight,
        }
    }
}

impl ColumnDetector for HeaderDetector {
    fn field(&self) -> &str {
        &self.field
    }

    fn score(&self, column: &ColumnView<'_>) -> Score {
        let header = normalize_header(column.header());
        if header.is_empty() {
            return Score::zero();
        }
        let words: Vec<&str> = header.split(' ').collect();
        let mut best = 0.0_f64;
        for name in &self.names {
            if *name == header {
                return Score::Single(self.weight);
            }
            if name.split(' ').all(|w| words.contains(&w)) {
                best = best.max(self.weight / 2.0);
            }
        }
        Score::Single(best)
    }
}

#[derive(Debug, Clone)]
pub struct HeaderPatternDetector {
    field: String,
    pattern: Regex,
    weight: f64,
}

impl ColumnDetector for HeaderPatternDetector {
    fn field(&self) -> &str {
        &self.field
    }

    fn score(&self, column: &ColumnView<'_>) -> Score {
        if self.pattern.is_match(column.header().trim()) {
            Score::Single(self.weight)
        } else {
            Score::zero()
        }
    }
}

#[derive(Debug, Clone)]
enum ValueTest {
    Pattern(Regex),
    Numeric,
    Date,
}

impl ValueTest {
    fn matches(&self, value: &CellValue) -> bool {
        match self {
            ValueTest::Pattern(regex) => regex.is_match(value.as_text().trim()),
            ValueTest::Numeric => value.kind() == ValueKind::Number,
            ValueTest::Date => value.as_datetime().is_some(),
        }
    }
}

/// Scores the share of sampled values passing a test.
#[derive(Debug, Clone)]
pub struct ValueShareDetector {
    field: String,
    test: ValueTest,
    weight: f64,
    sample: usize,
}

impl ValueShareDetector {
    pub fn numeric(field: impl Into<String>, weight: f64, sample: usize) -> Self {
        Self {
            field: field.into(),
            test: ValueTest::Numeric,
            weight,
            sample,
        }
    }

    pub fn dates(field: impl Into<String>, weight: f64, sample: usize) -> Self {
        Self {
            field: field.into(),
            test: ValueTest::Date,
            weight,
            sample,
        }
    }

    pub fn pattern(field: impl Into<String>, pattern: Regex, weight: f64, sample: usize) -> Self {
        Self {
            field: field.into(),
            test: ValueTest::Pattern(pattern),
            weight,
            sample,
        }
    }
}

impl ColumnDetector for ValueShareDetector {
    fn field(&self) -> &str {
        &self.field
    }

    fn score(&self, column: &ColumnView<'_>) -> Score {
        let (mut seen, mut hits) = (0usize, 0usize);
        for value in column.sample(self.sample.max(1)) {
            seen += 1;
            if self.test.matches(value) {
                hits += 1;
            }
        }
        if seen == 0 {
            return Score::zero();
        }
        Score::Single(self.weight * hits as f64 / seen as f64)
    }
}

/// Header regex that moves several fields at once.
#[derive(Debug, Clone)]
pub struct SignalDetector {
    field: String,
    pattern: Regex,
    deltas: IndexMap<String, f64>,
}

impl ColumnDetector for SignalDetector {
    fn field(&self) -> &str {
        &self.field
    }

    fn score(&self, column: &ColumnView<'_>) -> Score {
        if self.pattern.is_match(column.header().trim()) {
            Score::Multi(self.deltas.clone())
        } else {
            Score::Multi(IndexMap::new())
        }
    }
}

/// All detectors used for a run, in registration order.
#[derive(Default)]
pub struct DetectorSet {
    detectors: Vec<Box<dyn ColumnDetector>>,
}

impl std::fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSet")
            .field("detectors", &self.detectors.len())
            .finish()
    }
}

impl DetectorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the schema's declarative detectors. Header and header-pattern
    /// regexes match case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error when a pattern does not compile.
    pub fn from_schema(schema: &CanonicalSchema, patterns: &mut PatternCache) -> Result<Self, ConfigError> {
        let mut set = Self::new();
        for field in &schema.fields {
            let name = field.name.as_str();
            if field.detectors.is_empty() {
                set.push(Box::new(HeaderDetector::new(name, field.names(), 1.0)));
                continue;
            }
            for spec in &field.detectors {
                let detector: Box<dyn ColumnDetector> = match spec {
                    DetectorSpec::Header { names, weight } if names.is_empty() => {
                        Box::new(HeaderDetector::new(name, field.names(), *weight))
                    }
                    DetectorSpec::Header { names, weight } => {
                        Box::new(HeaderDetector::new(name, names, *weight))
                    }
                    DetectorSpec::HeaderPattern { pattern, weight } => Box::new(HeaderPatternDetector {
                        field: name.to_string(),
                        pattern: patterns.get_case_insensitive(pattern)?,
                        weight: *weight,
                    }),
                    DetectorSpec::ValuePattern {
                        pattern,
                        weight,
                        sample,
                    } => Box::new(ValueShareDetector::pattern(
                        name,
                        patterns.get(pattern)?,
                        *weight,
                        *sample,
                    )),
                    DetectorSpec::Numeric { weight, sample } => {
                        Box::new(ValueShareDetector::numeric(name, *weight, *sample))
                    }
                    DetectorSpec::Dates { weight, sample } => {
                        Box::new(ValueShareDetector::dates(name, *weight, *sample))
                    }
                    DetectorSpec::Signal { pattern, deltas } => Box::new(SignalDetector {
                        field: name.to_string(),
                        pattern: patterns.get_case_insensitive(pattern)?,
                        deltas: deltas.clone(),
                    }),
                };
                set.push(detector);
            }
        }
        Ok(set)
    }

    /// Add a detector, e.g. a host-defined one.
    pub fn push(&mut self, detector: Box<dyn ColumnDetector>) {
        self.detectors.push(detector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Summed score of every (column, field) pair, indexed
    /// `[column][field]` with fields in schema order. Deltas for fields the
    /// schema does not declare are ignored.
    #[must_use]
    pub fn score_matrix(
        &self,
        header: &[String],
        rows: &[Vec<CellValue>],
        schema: &CanonicalSchema,
    ) -> Vec<Vec<f64>> {
        let fields = schema.fields.len();
        header
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let view = ColumnView::new(index, text, rows);
                let mut totals = vec![0.0; fields];
                for detector in &self.detectors {
                    match detector.score(&view) {
                        Score::Single(value) => {
                            credit(&mut totals, schema, detector.field(), value);
                        }
                        Score::Multi(deltas) => {
                            for (field, value) in &deltas {
                                credit(&mut totals, schema, field, *value);
                            }
                        }
                    }
                }
                totals
            })
            .collect()
    }
}

fn credit(totals: &mut [f64], schema: &CanonicalSchema, field: &str, value: f64) {
    if !value.is_finite() {
        return;
    }
    match schema.field_index(field) {
        Some(i) => totals[i] += value,
        None => tracing::warn!(field, "detector scored a field the schema does not declare"),
    }
}

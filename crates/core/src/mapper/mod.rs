//! Assigning extracted columns to canonical fields.

mod detectors;

pub use detectors::{
    normalize_header, ColumnDetector, ColumnView, DetectorSet, HeaderDetector, Score,
    ValueShareDetector,
};

use crate::error::ConfigError;
use crate::model::{ColumnMapping, ExtractedTable, MappedField, MappedTable, PassthroughField};
use crate::patterns::PatternCache;
use crate::schema::CanonicalSchema;
use std::collections::HashSet;
use tablemill_sheet::column_letters;

/// Scores columns against the schema and builds the initial mapping.
#[derive(Debug, Default)]
pub struct ColumnMapper {
    detectors: DetectorSet,
}

impl ColumnMapper {
    #[must_use]
    pub fn new(detectors: DetectorSet) -> Self {
        Self { detectors }
    }

    /// Mapper over the schema's declarative detectors.
    ///
    /// # Errors
    ///
    /// Returns an error when a detector pattern does not compile.
    pub fn from_schema(schema: &CanonicalSchema, patterns: &mut PatternCache) -> Result<Self, ConfigError> {
        Ok(Self::new(DetectorSet::from_schema(schema, patterns)?))
    }

    /// Add a host-defined detector.
    pub fn add_detector(&mut self, detector: Box<dyn ColumnDetector>) {
        self.detectors.push(detector);
    }

    #[must_use]
    pub fn detectors(&self) -> &DetectorSet {
        &self.detectors
    }

    /// Map a table and wrap it with its mapping.
    #[must_use]
    pub fn map(&self, table: ExtractedTable, schema: &CanonicalSchema) -> MappedTable {
        let mapping = self.propose(&table, schema);
        MappedTable::new(table, mapping)
    }

    /// Build the mapping for a table.
    ///
    /// Columns are visited left to right. Each takes its best-scoring field
    /// that is still unclaimed, provided the score is positive and reaches
    /// the threshold; equal scores go to the field declared first.
    #[must_use]
    pub fn propose(&self, table: &ExtractedTable, schema: &CanonicalSchema) -> ColumnMapping {
        let matrix = self
            .detectors
            .score_matrix(table.header(), table.rows(), schema);

        let mut claimed: Vec<Option<(usize, f64)>> = vec![None; schema.fields.len()];
        let mut unmapped = Vec::new();
        for (column, scores) in matrix.iter().enumerate() {
            let mut candidates: Vec<(usize, f64)> = scores
                .iter()
                .copied()
                .enumerate()
                .filter(|(field, score)| {
                    claimed[*field].is_none() && *score > 0.0 && *score >= schema.mapping_threshold
                })
                .collect();
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

            match candidates.first() {
                Some(&(field, score)) => {
                    tracing::debug!(
                        column,
                        header = %table.header()[column],
                        field = %schema.fields[field].name,
                        score,
                        "mapped column"
                    );
                    claimed[field] = Some((column, score));
                }
                None => unmapped.push(column),
            }
        }

        let fields: Vec<MappedField> = schema
            .fields
            .iter()
            .zip(&claimed)
            .filter_map(|(field, claim)| match claim {
                Some((column, score)) => Some(MappedField {
                    field: field.name.clone(),
                    source_index: Some(*column),
                    source_header: Some(table.header()[*column].clone()),
                    score: Some(*score),
                }),
                None if schema.include_missing_fields => Some(MappedField {
                    field: field.name.clone(),
                    source_index: None,
                    source_header: None,
                    score: None,
                }),
                None => None,
            })
            .collect();

        let mut taken: HashSet<String> = fields.iter().map(|f| f.field.clone()).collect();
        let (passthrough, dropped) = route_unmapped(&unmapped, table.header(), schema, &mut taken);
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "dropped unmapped columns");
        }

        ColumnMapping::new(fields, passthrough, dropped, table.header().to_vec())
    }
}

/// Turn unmapped source columns into passthrough columns or drop them,
/// following the schema's policy. `taken` holds output names already in
/// use and is extended with the new ones.
pub(crate) fn route_unmapped(
    columns: &[usize],
    headers: &[String],
    schema: &CanonicalSchema,
    taken: &mut HashSet<String>,
) -> (Vec<PassthroughField>, Vec<usize>) {
    if !schema.append_unmapped_columns {
        return (Vec::new(), columns.to_vec());
    }
    let passthrough = columns
        .iter()
        .map(|&index| {
            let header = headers.get(index).cloned().unwrap_or_default();
            let output_name = unique_name(&passthrough_name(&schema.unmapped_prefix, &header, index), taken);
            PassthroughField {
                source_index: index,
                source_header: header,
                output_name,
            }
        })
        .collect();
    (passthrough, Vec::new())
}

fn passthrough_name(prefix: &str, header: &str, index: usize) -> String {
    let header = header.trim();
    if header.is_empty() {
        format!("{prefix}column_{}", column_letters(index as u32 + 1))
    } else {
        format!("{prefix}{header}")
    }
}

/// `base`, or `base_2`, `base_3`, … whichever is free first.
pub(crate) fn unique_name(base: &str, taken: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{base}_{n}");
        n += 1;
    }
    taken.insert(name.clone());
    name
}

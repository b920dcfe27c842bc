//! Values that flow between pipeline stages.
//!
//! Every stage produces a new value rather than mutating the previous one:
//! a [`TableRegion`] becomes an [`ExtractedTable`], which is wrapped with a
//! [`ColumnMapping`] into a [`MappedTable`], normalized into a
//! [`NormalizedTable`] and finally placed at a [`TablePlacement`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use tablemill_sheet::{CellRange, CellValue};

static EMPTY: CellValue = CellValue::Empty;

/// Stable identity of a detected table: source workbook, sheet and the
/// table's position in reading order on that sheet.
///
/// Ordering follows processing order: source, then sheet index, then table
/// index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableOrigin {
    source: PathBuf,
    sheet_name: String,
    sheet_index: usize,
    table_index: usize,
}

impl TableOrigin {
    pub fn new(
        source: impl Into<PathBuf>,
        sheet_name: impl Into<String>,
        sheet_index: usize,
        table_index: usize,
    ) -> Self {
        Self {
            source: source.into(),
            sheet_name: sheet_name.into(),
            sheet_index,
            table_index,
        }
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    #[must_use]
    pub fn sheet_index(&self) -> usize {
        self.sheet_index
    }

    #[must_use]
    pub fn table_index(&self) -> usize {
        self.table_index
    }
}

impl Ord for TableOrigin {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source
            .cmp(&other.source)
            .then(self.sheet_index.cmp(&other.sheet_index))
            .then(self.table_index.cmp(&other.table_index))
            .then_with(|| self.sheet_name.cmp(&other.sheet_name))
    }
}

impl PartialOrd for TableOrigin {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TableOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{}#{}",
            self.source.display(),
            self.sheet_name,
            self.table_index
        )
    }
}

/// A rectangular block of a sheet holding one table. The first
/// `header_rows` rows are the header band; the rest is the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRegion {
    bounds: CellRange,
    header_rows: u32,
}

impl TableRegion {
    /// Build a region. `header_rows` is clamped to `1..=height`.
    #[must_use]
    pub fn new(bounds: CellRange, header_rows: u32) -> Self {
        Self {
            bounds,
            header_rows: header_rows.clamp(1, bounds.height()),
        }
    }

    #[must_use]
    pub fn bounds(&self) -> CellRange {
        self.bounds
    }

    #[must_use]
    pub fn min_row(&self) -> u32 {
        self.bounds.first_row
    }

    #[must_use]
    pub fn max_row(&self) -> u32 {
        self.bounds.last_row
    }

    #[must_use]
    pub fn min_col(&self) -> u32 {
        self.bounds.first_col
    }

    #[must_use]
    pub fn max_col(&self) -> u32 {
        self.bounds.last_col
    }

    #[must_use]
    pub fn header_rows(&self) -> u32 {
        self.header_rows
    }

    /// First row below the header band.
    #[must_use]
    pub fn body_first_row(&self) -> u32 {
        self.bounds.first_row + self.header_rows
    }

    #[must_use]
    pub fn overlaps(&self, other: &TableRegion) -> bool {
        self.bounds.overlaps(&other.bounds)
    }
}

impl fmt::Display for TableRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.bounds.fmt(f)
    }
}

/// One table lifted out of a sheet: a flattened header and rectangular
/// rows of raw cell values.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTable {
    origin: TableOrigin,
    region: TableRegion,
    header: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ExtractedTable {
    /// Build a table. Rows are padded with `Empty` or truncated to the
    /// header width.
    #[must_use]
    pub fn new(
        origin: TableOrigin,
        region: TableRegion,
        header: Vec<String>,
        mut rows: Vec<Vec<CellValue>>,
    ) -> Self {
        let width = header.len();
        for row in &mut rows {
            row.resize(width, CellValue::Empty);
        }
        Self {
            origin,
            region,
            header,
            rows,
        }
    }

    #[must_use]
    pub fn origin(&self) -> &TableOrigin {
        &self.origin
    }

    #[must_use]
    pub fn region(&self) -> &TableRegion {
        &self.region
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.header.len()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The first `n` body rows.
    #[must_use]
    pub fn preview(&self, n: usize) -> &[Vec<CellValue>] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Iterate the values of one source column.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &CellValue> {
        self.rows
            .iter()
            .map(move |row| row.get(index).unwrap_or(&EMPTY))
    }
}

/// A canonical field and the source column feeding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedField {
    pub field: String,
    pub source_index: Option<usize>,
    pub source_header: Option<String>,
    /// Detector score behind the assignment; `None` when set by a patch or
    /// when the field has no source.
    pub score: Option<f64>,
}

/// A source column carried into the output without a canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassthroughField {
    pub source_index: usize,
    pub source_header: String,
    pub output_name: String,
}

/// Assignment of source columns to canonical fields plus passthrough
/// columns. No source column feeds more than one field.
///
/// Built by [`crate::ColumnMapper`] and changed only through
/// [`crate::patch::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    fields: Vec<MappedField>,
    passthrough: Vec<PassthroughField>,
    dropped: Vec<usize>,
    source_headers: Vec<String>,
}

impl ColumnMapping {
    pub(crate) fn new(
        fields: Vec<MappedField>,
        passthrough: Vec<PassthroughField>,
        dropped: Vec<usize>,
        source_headers: Vec<String>,
    ) -> Self {
        Self {
            fields,
            passthrough,
            dropped,
            source_headers,
        }
    }

    /// Canonical fields in output order.
    #[must_use]
    pub fn fields(&self) -> &[MappedField] {
        &self.fields
    }

    /// Passthrough columns in output order, after the canonical fields.
    #[must_use]
    pub fn passthrough(&self) -> &[PassthroughField] {
        &self.passthrough
    }

    /// Source columns that appear nowhere in the output.
    #[must_use]
    pub fn dropped(&self) -> &[usize] {
        &self.dropped
    }

    /// Headers of the extracted table this mapping was built for.
    #[must_use]
    pub fn source_headers(&self) -> &[String] {
        &self.source_headers
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&MappedField> {
        self.fields.iter().find(|f| f.field == name)
    }

    /// Source column feeding a canonical field.
    #[must_use]
    pub fn source_index_of(&self, name: &str) -> Option<usize> {
        self.field(name).and_then(|f| f.source_index)
    }

    #[must_use]
    pub fn is_passthrough(&self, source_index: usize) -> bool {
        self.passthrough
            .iter()
            .any(|p| p.source_index == source_index)
    }

    /// Output column names: canonical fields, then passthrough columns.
    #[must_use]
    pub fn output_header(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| f.field.clone())
            .chain(self.passthrough.iter().map(|p| p.output_name.clone()))
            .collect()
    }

    /// Source column behind each output column.
    #[must_use]
    pub fn projection(&self) -> Vec<Option<usize>> {
        self.fields
            .iter()
            .map(|f| f.source_index)
            .chain(self.passthrough.iter().map(|p| Some(p.source_index)))
            .collect()
    }
}

/// An extracted table seen through its column mapping. Row views project
/// source rows into output column order without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedTable {
    extracted: ExtractedTable,
    mapping: ColumnMapping,
    projection: Vec<Option<usize>>,
}

impl MappedTable {
    #[must_use]
    pub fn new(extracted: ExtractedTable, mapping: ColumnMapping) -> Self {
        let projection = mapping.projection();
        Self {
            extracted,
            mapping,
            projection,
        }
    }

    #[must_use]
    pub fn extracted(&self) -> &ExtractedTable {
        &self.extracted
    }

    #[must_use]
    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    #[must_use]
    pub fn header(&self) -> Vec<String> {
        self.mapping.output_header()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.projection.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        self.extracted.rows().iter().map(|cells| RowView {
            cells,
            projection: &self.projection,
        })
    }

    #[must_use]
    pub fn into_parts(self) -> (ExtractedTable, ColumnMapping) {
        (self.extracted, self.mapping)
    }
}

/// One source row in output column order.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    cells: &'a [CellValue],
    projection: &'a [Option<usize>],
}

impl<'a> RowView<'a> {
    /// Value of an output column; `Empty` for fields with no source.
    #[must_use]
    pub fn get(&self, column: usize) -> &'a CellValue {
        self.projection
            .get(column)
            .copied()
            .flatten()
            .and_then(|i| self.cells.get(i))
            .unwrap_or(&EMPTY)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.projection.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projection.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a CellValue> + 'a {
        let view = *self;
        (0..view.len()).map(move |i| view.get(i))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<CellValue> {
        self.iter().cloned().collect()
    }
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    #[default]
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A transform or validation finding for one cell. `row` counts body rows
/// from 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub row: usize,
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

/// Output-ready table: final header, cleaned values, findings.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    header: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    issues: Vec<ValidationIssue>,
}

impl NormalizedTable {
    #[must_use]
    pub fn new(
        header: Vec<String>,
        rows: Vec<Vec<CellValue>>,
        issues: Vec<ValidationIssue>,
    ) -> Self {
        Self {
            header,
            rows,
            issues,
        }
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Output column of a header name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

/// Where a table landed in the output workbook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TablePlacement {
    sheet_name: String,
    sheet_index: usize,
    range: CellRange,
}

impl TablePlacement {
    #[must_use]
    pub fn new(sheet_name: impl Into<String>, sheet_index: usize, range: CellRange) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            sheet_index,
            range,
        }
    }

    #[must_use]
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    #[must_use]
    pub fn sheet_index(&self) -> usize {
        self.sheet_index
    }

    #[must_use]
    pub fn range(&self) -> CellRange {
        self.range
    }
}

impl fmt::Display for TablePlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet_name, self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(sheet_index: usize, table_index: usize) -> TableOrigin {
        TableOrigin::new("book.xlsx", format!("S{sheet_index}"), sheet_index, table_index)
    }

    #[test]
    fn test_origin_orders_by_processing_position() {
        let mut origins = vec![origin(1, 0), origin(0, 2), origin(0, 0)];
        origins.sort();
        assert_eq!(origins, vec![origin(0, 0), origin(0, 2), origin(1, 0)]);
        assert_eq!(origin(0, 2).to_string(), "book.xlsx!S0#2");
    }

    #[test]
    fn test_region_clamps_header_rows() {
        let region = TableRegion::new(CellRange::new(2, 1, 2, 3), 4);
        assert_eq!(region.header_rows(), 1);
        assert_eq!(region.body_first_row(), 3);
        assert_eq!(region.to_string(), "A2:C2");
    }

    #[test]
    fn test_extracted_rows_are_rectangular() {
        let region = TableRegion::new(CellRange::new(1, 1, 3, 2), 1);
        let table = ExtractedTable::new(
            origin(0, 0),
            region,
            vec!["a".into(), "b".into()],
            vec![vec![CellValue::Int(1)], vec![1.into(), 2.into(), 3.into()]],
        );
        assert!(table.rows().iter().all(|r| r.len() == 2));
        assert_eq!(table.preview(1).len(), 1);
        assert_eq!(table.preview(10).len(), 2);
        let second: Vec<_> = table.column(1).collect();
        assert_eq!(second, vec![&CellValue::Empty, &CellValue::Int(2)]);
    }

    #[test]
    fn test_row_view_projects_columns() {
        let region = TableRegion::new(CellRange::new(1, 1, 2, 3), 1);
        let table = ExtractedTable::new(
            origin(0, 0),
            region,
            vec!["x".into(), "name".into(), "misc".into()],
            vec![vec!["skip".into(), "Ann".into(), "m".into()]],
        );
        let mapping = ColumnMapping::new(
            vec![
                MappedField {
                    field: "name".into(),
                    source_index: Some(1),
                    source_header: Some("name".into()),
                    score: Some(1.0),
                },
                MappedField {
                    field: "email".into(),
                    source_index: None,
                    source_header: None,
                    score: None,
                },
            ],
            vec![PassthroughField {
                source_index: 2,
                source_header: "misc".into(),
                output_name: "extra_misc".into(),
            }],
            vec![0],
            table.header().to_vec(),
        );
        let mapped = MappedTable::new(table, mapping);
        assert_eq!(mapped.header(), vec!["name", "email", "extra_misc"]);
        let row = mapped.rows().next().unwrap();
        assert_eq!(
            row.to_vec(),
            vec![CellValue::from("Ann"), CellValue::Empty, CellValue::from("m")]
        );
    }
}

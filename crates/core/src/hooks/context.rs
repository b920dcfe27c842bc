//! Per-stage inputs handed to hooks.
//!
//! Contexts only expose accessors, so new inputs can be added without
//! breaking existing hooks.

use crate::error::RenderError;
use crate::model::{
    ColumnMapping, ExtractedTable, NormalizedTable, TableOrigin, TablePlacement, TableRegion,
};
use crate::output::{OutputWorkbook, TableAnnotator};
use crate::schema::CanonicalSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tablemill_sheet::{CellValue, Grid};

/// Key/value store shared by all hooks of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookState {
    values: Map<String, Value>,
}

impl HookState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize a stored value.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored value does not have shape `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> serde_json::Result<Option<T>> {
        self.values
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Serialize and store a value.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` cannot be represented as JSON.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> serde_json::Result<()> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn entry(&mut self, key: impl Into<String>) -> serde_json::map::Entry<'_> {
        self.values.entry(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

/// `on_workbook_start`
#[non_exhaustive]
pub struct RunContext<'a> {
    source: &'a Path,
    target: &'a Path,
    sheet_names: &'a [String],
    schema: &'a CanonicalSchema,
    state: &'a mut HookState,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        source: &'a Path,
        target: &'a Path,
        sheet_names: &'a [String],
        schema: &'a CanonicalSchema,
        state: &'a mut HookState,
    ) -> Self {
        Self {
            source,
            target,
            sheet_names,
            schema,
            state,
        }
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        self.source
    }

    #[must_use]
    pub fn target(&self) -> &Path {
        self.target
    }

    /// Source sheets, which are also the output sheets, in order.
    #[must_use]
    pub fn sheet_names(&self) -> &[String] {
        self.sheet_names
    }

    #[must_use]
    pub fn schema(&self) -> &CanonicalSchema {
        self.schema
    }

    pub fn state(&mut self) -> &mut HookState {
        self.state
    }
}

/// `on_sheet_start`, fired before regions are detected.
#[non_exhaustive]
pub struct SheetContext<'a> {
    source: &'a Path,
    sheet_index: usize,
    grid: &'a Grid,
    state: &'a mut HookState,
}

impl<'a> SheetContext<'a> {
    pub(crate) fn new(source: &'a Path, sheet_index: usize, grid: &'a Grid, state: &'a mut HookState) -> Self {
        Self {
            source,
            sheet_index,
            grid,
            state,
        }
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        self.source
    }

    #[must_use]
    pub fn sheet_name(&self) -> &str {
        self.grid.name()
    }

    #[must_use]
    pub fn sheet_index(&self) -> usize {
        self.sheet_index
    }

    /// Raw cells of the source sheet.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        self.grid
    }

    pub fn state(&mut self) -> &mut HookState {
        self.state
    }
}

/// `on_table_detected`
#[non_exhaustive]
pub struct TableDetectedContext<'a> {
    table: &'a ExtractedTable,
    state: &'a mut HookState,
}

impl<'a> TableDetectedContext<'a> {
    pub(crate) fn new(table: &'a ExtractedTable, state: &'a mut HookState) -> Self {
        Self { table, state }
    }

    #[must_use]
    pub fn origin(&self) -> &TableOrigin {
        self.table.origin()
    }

    #[must_use]
    pub fn region(&self) -> &TableRegion {
        self.table.region()
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        self.table.header()
    }

    /// First `n` body rows.
    #[must_use]
    pub fn preview(&self, n: usize) -> &[Vec<CellValue>] {
        self.table.preview(n)
    }

    #[must_use]
    pub fn table(&self) -> &ExtractedTable {
        self.table
    }

    pub fn state(&mut self) -> &mut HookState {
        self.state
    }
}

/// `on_table_mapped`. The mapping already includes patches returned by
/// earlier hooks of this stage.
#[non_exhaustive]
pub struct TableMappedContext<'a> {
    table: &'a ExtractedTable,
    mapping: &'a ColumnMapping,
    schema: &'a CanonicalSchema,
    state: &'a mut HookState,
}

impl<'a> TableMappedContext<'a> {
    pub(crate) fn new(
        table: &'a ExtractedTable,
        mapping: &'a ColumnMapping,
        schema: &'a CanonicalSchema,
        state: &'a mut HookState,
    ) -> Self {
        Self {
            table,
            mapping,
            schema,
            state,
        }
    }

    #[must_use]
    pub fn origin(&self) -> &TableOrigin {
        self.table.origin()
    }

    #[must_use]
    pub fn table(&self) -> &ExtractedTable {
        self.table
    }

    #[must_use]
    pub fn mapping(&self) -> &ColumnMapping {
        self.mapping
    }

    #[must_use]
    pub fn schema(&self) -> &CanonicalSchema {
        self.schema
    }

    pub fn state(&mut self) -> &mut HookState {
        self.state
    }
}

/// `on_table_written`. Cells may be styled or annotated through
/// [`annotator`](Self::annotator), but only inside the placement.
#[non_exhaustive]
pub struct TableWrittenContext<'a> {
    origin: &'a TableOrigin,
    mapping: &'a ColumnMapping,
    table: &'a NormalizedTable,
    annotator: TableAnnotator<'a>,
    state: &'a mut HookState,
}

impl<'a> TableWrittenContext<'a> {
    pub(crate) fn new(
        origin: &'a TableOrigin,
        mapping: &'a ColumnMapping,
        table: &'a NormalizedTable,
        annotator: TableAnnotator<'a>,
        state: &'a mut HookState,
    ) -> Self {
        Self {
            origin,
            mapping,
            table,
            annotator,
            state,
        }
    }

    #[must_use]
    pub fn origin(&self) -> &TableOrigin {
        self.origin
    }

    #[must_use]
    pub fn placement(&self) -> &TablePlacement {
        self.annotator.placement()
    }

    #[must_use]
    pub fn mapping(&self) -> &ColumnMapping {
        self.mapping
    }

    /// The normalized table, including its validation issues.
    #[must_use]
    pub fn table(&self) -> &NormalizedTable {
        self.table
    }

    pub fn annotator(&mut self) -> &mut TableAnnotator<'a> {
        &mut self.annotator
    }

    pub fn state(&mut self) -> &mut HookState {
        self.state
    }
}

/// `on_workbook_before_save`
#[non_exhaustive]
pub struct BeforeSaveContext<'a> {
    target: &'a Path,
    workbook: &'a mut OutputWorkbook,
    state: &'a mut HookState,
}

impl<'a> BeforeSaveContext<'a> {
    pub(crate) fn new(target: &'a Path, workbook: &'a mut OutputWorkbook, state: &'a mut HookState) -> Self {
        Self {
            target,
            workbook,
            state,
        }
    }

    #[must_use]
    pub fn target(&self) -> &Path {
        self.target
    }

    #[must_use]
    pub fn workbook(&self) -> &OutputWorkbook {
        self.workbook
    }

    /// Style or annotate any table placed during the run.
    ///
    /// # Errors
    ///
    /// Returns an error when no table sits at `placement`.
    pub fn annotate(&mut self, placement: &TablePlacement) -> Result<TableAnnotator<'_>, RenderError> {
        self.workbook.annotate(placement)
    }

    pub fn state(&mut self) -> &mut HookState {
        self.state
    }
}

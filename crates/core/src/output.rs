//! In-memory output workbook.
//!
//! Tables are staged per worksheet and only written to disk by
//! [`OutputWorkbook::save`], so a table whose post-write hook fails can be
//! rolled back without leaving partial cells behind.

use crate::error::RenderError;
use crate::model::TablePlacement;
use rust_xlsxwriter::{Color, DocProperties, ExcelDateTime, Format, Note, Workbook, Worksheet, XlsxError};
use std::collections::BTreeMap;
use std::path::Path;
use tablemill_sheet::CellValue;

/// Visual style of one output cell. Unset fields keep the cell's default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CellStyle {
    pub bold: bool,
    pub italic: bool,
    /// `0xRRGGBB`
    pub font_color: Option<u32>,
    /// `0xRRGGBB`
    pub fill_color: Option<u32>,
    pub num_format: Option<String>,
}

impl CellStyle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    #[must_use]
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    #[must_use]
    pub fn font_color(mut self, rgb: u32) -> Self {
        self.font_color = Some(rgb);
        self
    }

    #[must_use]
    pub fn fill_color(mut self, rgb: u32) -> Self {
        self.fill_color = Some(rgb);
        self
    }

    #[must_use]
    pub fn num_format(mut self, format: impl Into<String>) -> Self {
        self.num_format = Some(format.into());
        self
    }

    /// Layer `other` on top of this style.
    fn merge(&mut self, other: CellStyle) {
        self.bold |= other.bold;
        self.italic |= other.italic;
        if other.font_color.is_some() {
            self.font_color = other.font_color;
        }
        if other.fill_color.is_some() {
            self.fill_color = other.fill_color;
        }
        if other.num_format.is_some() {
            self.num_format = other.num_format;
        }
    }
}

/// One table's cells, header row first, with styles and notes keyed by
/// offset from the placement's top-left cell.
#[derive(Debug, Clone)]
struct StagedTable {
    placement: TablePlacement,
    cells: Vec<Vec<CellValue>>,
    styles: BTreeMap<(u32, u32), CellStyle>,
    notes: BTreeMap<(u32, u32), String>,
}

impl StagedTable {
    fn check_offset(&self, row: u32, col: u32) -> Result<(), RenderError> {
        let range = self.placement.range();
        if row < range.height() && col < range.width() {
            Ok(())
        } else {
            Err(RenderError::OutsidePlacement {
                placement: self.placement.to_string(),
                row,
                col,
            })
        }
    }
}

/// An output worksheet: staged tables plus the layout cursor.
#[derive(Debug, Clone)]
pub struct OutputWorksheet {
    name: String,
    index: usize,
    next_row: u32,
    tables: Vec<StagedTable>,
}

impl OutputWorksheet {
    fn new(name: String, index: usize) -> Self {
        Self {
            name,
            index,
            next_row: 1,
            tables: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Row where the next table will start.
    #[must_use]
    pub fn next_row(&self) -> u32 {
        self.next_row
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn placements(&self) -> impl Iterator<Item = &TablePlacement> {
        self.tables.iter().map(|t| &t.placement)
    }

    /// Staged value at an absolute 1-based cell.
    #[must_use]
    pub fn cell(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.tables.iter().find_map(|table| {
            let range = table.placement.range();
            if !range.contains(row, col) {
                return None;
            }
            table
                .cells
                .get((row - range.first_row) as usize)
                .and_then(|r| r.get((col - range.first_col) as usize))
        })
    }

    /// Stage a table and move the cursor past it plus `gap` blank rows.
    pub(crate) fn push_table(
        &mut self,
        placement: TablePlacement,
        cells: Vec<Vec<CellValue>>,
        styles: BTreeMap<(u32, u32), CellStyle>,
        gap: u32,
    ) {
        // Saturates so an oversized gap leaves the sheet full instead of wrapping
        self.next_row = placement.range().last_row.saturating_add(1).saturating_add(gap);
        self.tables.push(StagedTable {
            placement,
            cells,
            styles,
            notes: BTreeMap::new(),
        });
    }

    /// Remove the most recently placed table and restore the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownPlacement`] unless `placement` is the
    /// last table on this worksheet.
    pub fn rollback(&mut self, placement: &TablePlacement) -> Result<(), RenderError> {
        match self.tables.last() {
            Some(last) if last.placement == *placement => {
                self.tables.pop();
                self.next_row = placement.range().first_row;
                tracing::debug!(placement = %placement, "rolled back table");
                Ok(())
            }
            _ => Err(RenderError::UnknownPlacement(placement.to_string())),
        }
    }

    /// Styling access to one placed table.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownPlacement`] when no table sits there.
    pub fn annotate(&mut self, placement: &TablePlacement) -> Result<TableAnnotator<'_>, RenderError> {
        self.tables
            .iter_mut()
            .find(|t| t.placement == *placement)
            .map(|table| TableAnnotator { table })
            .ok_or_else(|| RenderError::UnknownPlacement(placement.to_string()))
    }

    fn write_to(&self, worksheet: &mut Worksheet) -> Result<(), XlsxError> {
        worksheet.set_name(&self.name)?;
        for table in &self.tables {
            let range = table.placement.range();
            for (r, row) in table.cells.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    let offset = (r as u32, c as u32);
                    let format = cell_format(table.styles.get(&offset), value);
                    let (row_num, col_num) = (range.first_row - 1 + offset.0, range.first_col - 1 + offset.1);
                    write_cell(worksheet, row_num, col_num as u16, value, &format)?;
                }
            }
            for (&(r, c), text) in &table.notes {
                let note = Note::new(text.as_str()).add_author_prefix(false);
                worksheet.insert_note(range.first_row - 1 + r, (range.first_col - 1 + c) as u16, &note)?;
            }
        }
        Ok(())
    }
}

fn cell_format(style: Option<&CellStyle>, value: &CellValue) -> Format {
    let mut format = Format::new();
    let mut num_format = match value {
        CellValue::DateTime(dt) if dt.time() == chrono::NaiveTime::MIN => Some("yyyy-mm-dd"),
        CellValue::DateTime(_) => Some("yyyy-mm-dd hh:mm:ss"),
        _ => None,
    };
    if let Some(style) = style {
        if style.bold {
            format = format.set_bold();
        }
        if style.italic {
            format = format.set_italic();
        }
        if let Some(rgb) = style.font_color {
            format = format.set_font_color(Color::RGB(rgb));
        }
        if let Some(rgb) = style.fill_color {
            format = format.set_background_color(Color::RGB(rgb));
        }
        if let Some(custom) = style.num_format.as_deref() {
            num_format = Some(custom);
        }
    }
    if let Some(num_format) = num_format {
        format = format.set_num_format(num_format);
    }
    format
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    format: &Format,
) -> Result<(), XlsxError> {
    match value {
        CellValue::Empty => worksheet.write_blank(row, col, format)?,
        CellValue::Bool(b) => worksheet.write_boolean_with_format(row, col, *b, format)?,
        // Worksheet numbers are f64; integers past 2^53 lose precision
        CellValue::Int(i) => worksheet.write_number_with_format(row, col, *i as f64, format)?,
        CellValue::Float(f) => worksheet.write_number_with_format(row, col, *f, format)?,
        CellValue::String(s) | CellValue::Error(s) => {
            worksheet.write_string_with_format(row, col, s, format)?
        }
        CellValue::DateTime(dt) => worksheet.write_datetime_with_format(row, col, dt, format)?,
    };
    Ok(())
}

/// Restricted handle for styling one placed table. Offsets are relative to
/// the placement's top-left cell; row 0 is the header.
#[derive(Debug)]
pub struct TableAnnotator<'a> {
    table: &'a mut StagedTable,
}

impl TableAnnotator<'_> {
    #[must_use]
    pub fn placement(&self) -> &TablePlacement {
        &self.table.placement
    }

    /// Rows including the header.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.table.placement.range().height()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.table.placement.range().width()
    }

    #[must_use]
    pub fn value(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.table
            .cells
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
    }

    #[must_use]
    pub fn style_at(&self, row: u32, col: u32) -> Option<&CellStyle> {
        self.table.styles.get(&(row, col))
    }

    #[must_use]
    pub fn note_at(&self, row: u32, col: u32) -> Option<&str> {
        self.table.notes.get(&(row, col)).map(String::as_str)
    }

    /// Layer a style onto one cell.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::OutsidePlacement`] for offsets outside the
    /// table.
    pub fn style_cell(&mut self, row: u32, col: u32, style: CellStyle) -> Result<(), RenderError> {
        self.table.check_offset(row, col)?;
        self.table.styles.entry((row, col)).or_default().merge(style);
        Ok(())
    }

    /// Layer a style onto every cell of one row.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::OutsidePlacement`] for rows outside the table.
    pub fn style_row(&mut self, row: u32, style: &CellStyle) -> Result<(), RenderError> {
        for col in 0..self.width() {
            self.style_cell(row, col, style.clone())?;
        }
        if self.width() == 0 {
            self.table.check_offset(row, 0)?;
        }
        Ok(())
    }

    /// Attach a note to one cell, replacing any earlier note.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::OutsidePlacement`] for offsets outside the
    /// table.
    pub fn note(&mut self, row: u32, col: u32, text: impl Into<String>) -> Result<(), RenderError> {
        self.table.check_offset(row, col)?;
        self.table.notes.insert((row, col), text.into());
        Ok(())
    }
}

/// The workbook being produced: one worksheet per source sheet, in source
/// order, created before any table is placed.
#[derive(Debug, Clone, Default)]
pub struct OutputWorkbook {
    sheets: Vec<OutputWorksheet>,
}

impl OutputWorkbook {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sheets: names
                .into_iter()
                .enumerate()
                .map(|(index, name)| OutputWorksheet::new(name.into(), index))
                .collect(),
        }
    }

    #[must_use]
    pub fn sheets(&self) -> &[OutputWorksheet] {
        &self.sheets
    }

    #[must_use]
    pub fn sheet(&self, index: usize) -> Option<&OutputWorksheet> {
        self.sheets.get(index)
    }

    pub(crate) fn sheets_mut(&mut self) -> &mut [OutputWorksheet] {
        &mut self.sheets
    }

    /// # Errors
    ///
    /// Returns [`RenderError::UnknownSheet`] for an index past the last
    /// worksheet.
    pub fn sheet_mut(&mut self, index: usize) -> Result<&mut OutputWorksheet, RenderError> {
        self.sheets
            .get_mut(index)
            .ok_or(RenderError::UnknownSheet(index))
    }

    /// Styling access to a placed table anywhere in the workbook.
    ///
    /// # Errors
    ///
    /// Returns an error when the placement is unknown.
    pub fn annotate(&mut self, placement: &TablePlacement) -> Result<TableAnnotator<'_>, RenderError> {
        self.sheet_mut(placement.sheet_index())?.annotate(placement)
    }

    /// Total tables staged across all worksheets.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.sheets.iter().map(OutputWorksheet::table_count).sum()
    }

    fn build(&self) -> Result<Workbook, RenderError> {
        let mut workbook = Workbook::new();
        // Fixed creation time so identical runs produce identical files
        let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
        workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));
        for sheet in &self.sheets {
            sheet.write_to(workbook.add_worksheet())?;
        }
        Ok(workbook)
    }

    /// Write the workbook to disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written or a sheet name is
    /// not valid in the output format.
    pub fn save(&self, path: &Path) -> Result<(), RenderError> {
        self.build()?.save(path)?;
        tracing::info!(path = %path.display(), tables = self.table_count(), "saved output workbook");
        Ok(())
    }

    /// Serialize the workbook to xlsx bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the workbook cannot be assembled.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RenderError> {
        Ok(self.build()?.save_to_buffer()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablemill_sheet::CellRange;

    fn staged() -> (OutputWorkbook, TablePlacement) {
        let mut book = OutputWorkbook::new(["Data", "Empty"]);
        let placement = TablePlacement::new("Data", 0, CellRange::new(1, 1, 2, 2));
        let cells = vec![
            vec![CellValue::from("name"), CellValue::from("amount")],
            vec![CellValue::from("Ann"), CellValue::Int(3)],
        ];
        book.sheet_mut(0)
            .unwrap()
            .push_table(placement.clone(), cells, BTreeMap::new(), 1);
        (book, placement)
    }

    #[test]
    fn test_sheets_exist_up_front() {
        let book = OutputWorkbook::new(["B", "A"]);
        let names: Vec<&str> = book.sheets().iter().map(OutputWorksheet::name).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(book.sheet(1).unwrap().next_row(), 1);
    }

    #[test]
    fn test_annotator_stays_inside_placement() {
        let (mut book, placement) = staged();
        let mut annotator = book.annotate(&placement).unwrap();
        assert_eq!((annotator.height(), annotator.width()), (2, 2));
        assert!(annotator.style_cell(1, 1, CellStyle::new().fill_color(0xFF_C7_CE)).is_ok());
        assert!(annotator.note(1, 0, "checked").is_ok());
        assert!(matches!(
            annotator.style_cell(2, 0, CellStyle::new().bold()),
            Err(RenderError::OutsidePlacement { .. })
        ));
        assert!(annotator.note(0, 2, "x").is_err());
        assert_eq!(annotator.value(1, 1), Some(&CellValue::Int(3)));
    }

    #[test]
    fn test_rollback_restores_cursor() {
        let (mut book, placement) = staged();
        let sheet = book.sheet_mut(0).unwrap();
        assert_eq!(sheet.next_row(), 4);
        assert_eq!(sheet.cell(2, 1), Some(&CellValue::from("Ann")));

        sheet.rollback(&placement).unwrap();
        assert_eq!(sheet.next_row(), 1);
        assert_eq!(sheet.table_count(), 0);
        assert!(sheet.cell(2, 1).is_none());
        assert!(sheet.rollback(&placement).is_err());
    }

    #[test]
    fn test_style_merge() {
        let mut style = CellStyle::new().bold().fill_color(1);
        style.merge(CellStyle::new().italic().fill_color(2));
        assert!(style.bold && style.italic);
        assert_eq!(style.fill_color, Some(2));
    }

    #[test]
    fn test_bytes_are_deterministic() {
        let (mut book, placement) = staged();
        book.annotate(&placement)
            .unwrap()
            .note(1, 1, "three")
            .unwrap();
        let first = book.to_bytes().unwrap();
        let second = book.to_bytes().unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}

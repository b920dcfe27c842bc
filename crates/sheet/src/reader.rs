use crate::a1_notation::{MAX_COLS, MAX_ROWS};
use crate::book::Book;
use crate::cell::CellValue;
use crate::error::{Result, SheetError};
use crate::grid::Grid;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;

/// Convert calamine Data to CellValue. No coercion beyond representation:
/// dates become `DateTime`, blanks become the explicit `Empty` marker.
fn data_to_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => CellValue::String(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) => CellValue::DateTime(value),
            // Durations and out-of-range serials keep their numeric form
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso(s).map_or_else(|| CellValue::String(s.clone()), CellValue::DateTime),
        Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Read every worksheet of a workbook into grids, preserving sheet order
/// and absolute cell positions.
pub(crate) fn read_book(path: &Path) -> Result<Book> {
    let mut workbook = open_workbook_auto(path).map_err(|e| SheetError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut book = Book::with_path(path);
    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| SheetError::ReadSheet {
                path: path.to_path_buf(),
                sheet: sheet_name.clone(),
                message: e.to_string(),
            })?;

        let mut grid = Grid::new(&sheet_name);
        // used_cells() is relative to the range start, which is the first
        // used cell rather than A1
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        for (row, col, data) in range.used_cells() {
            let row = u64::from(row_offset) + row as u64 + 1;
            let col = u64::from(col_offset) + col as u64 + 1;
            if row > u64::from(MAX_ROWS) || col > u64::from(MAX_COLS) {
                return Err(SheetError::TooLarge {
                    sheet: sheet_name.clone(),
                    rows: row,
                    cols: col,
                });
            }
            grid.set(row as u32, col as u32, data_to_cell_value(data));
        }

        tracing::debug!(
            sheet = %sheet_name,
            rows = grid.max_row(),
            cols = grid.max_col(),
            "loaded worksheet"
        );
        book.add_sheet(grid)?;
    }

    Ok(book)
}

//! Placing normalized tables on output worksheets.

use crate::error::RenderError;
use crate::model::{NormalizedTable, TablePlacement};
use crate::output::{CellStyle, OutputWorksheet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tablemill_sheet::{CellRange, CellValue, MAX_COLS, MAX_ROWS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Blank rows left after each table.
    pub blank_rows_between_tables: u32,
    pub bold_header: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            blank_rows_between_tables: 1,
            bold_header: true,
        }
    }
}

/// The only writer of output cells. Tables go in column A, stacked
/// downward from each worksheet's cursor.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    #[must_use]
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Write header and rows at the worksheet cursor and return the range
    /// they occupy.
    ///
    /// # Errors
    ///
    /// Returns an error when the table has no columns or would not fit on
    /// the worksheet. The worksheet is unchanged in that case.
    pub fn write_table(
        &self,
        sheet: &mut OutputWorksheet,
        table: &NormalizedTable,
    ) -> Result<TablePlacement, RenderError> {
        let width = table.header().len();
        if width == 0 {
            return Err(RenderError::NoColumns);
        }
        let height = table.rows().len() + 1;
        let first_row = sheet.next_row();
        let last_row = u64::from(first_row) + height as u64 - 1;
        if last_row > u64::from(MAX_ROWS) || width > MAX_COLS as usize {
            return Err(RenderError::SheetFull {
                sheet: sheet.name().to_string(),
                row: first_row,
                rows: height,
                cols: width,
            });
        }

        let range = CellRange::new(first_row, 1, last_row as u32, width as u32);
        let placement = TablePlacement::new(sheet.name(), sheet.index(), range);

        let mut cells = Vec::with_capacity(height);
        cells.push(table.header().iter().map(|h| CellValue::from(h.as_str())).collect());
        cells.extend(table.rows().iter().cloned());

        let mut styles = BTreeMap::new();
        if self.config.bold_header {
            for col in 0..width as u32 {
                styles.insert((0, col), CellStyle::new().bold());
            }
        }

        tracing::debug!(placement = %placement, rows = height - 1, "rendered table");
        sheet.push_table(placement.clone(), cells, styles, self.config.blank_rows_between_tables);
        Ok(placement)
    }
}

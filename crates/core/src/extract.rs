//! Turning detected regions into header and row data.

use crate::model::{ExtractedTable, TableOrigin, TableRegion};
use tablemill_sheet::{CellRange, CellValue, Grid};

/// Lifts a detected region out of its sheet, flattening stacked headers.
#[derive(Debug, Clone)]
pub struct Extractor {
    separator: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(" ")
    }
}

impl Extractor {
    /// `separator` joins the parts of a stacked header.
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Build the extracted table for one region. Body values are copied as
    /// read; only the header is trimmed and joined.
    #[must_use]
    pub fn extract(&self, grid: &Grid, origin: TableOrigin, region: &TableRegion) -> ExtractedTable {
        let header = self.header(grid, region);
        let rows = if region.body_first_row() > region.max_row() {
            Vec::new()
        } else {
            grid.slice(&CellRange::new(
                region.body_first_row(),
                region.min_col(),
                region.max_row(),
                region.max_col(),
            ))
        };
        ExtractedTable::new(origin, *region, header, rows)
    }

    /// One header string per column of the region.
    ///
    /// Upper header rows are forward-filled from the left so a group label
    /// spanning several columns applies to each of them. Per column, the
    /// trimmed parts are read top to bottom; empty parts are skipped and
    /// repeats of the part directly above are collapsed.
    fn header(&self, grid: &Grid, region: &TableRegion) -> Vec<String> {
        let header_end = region.min_row() + region.header_rows() - 1;
        let band: Vec<Vec<String>> = (region.min_row()..=header_end)
            .enumerate()
            .map(|(depth, row)| {
                let texts = grid
                    .row_cells(row, region.min_col(), region.max_col())
                    .map(|cell| header_text(cell));
                if depth + 1 < region.header_rows() as usize {
                    forward_fill(texts)
                } else {
                    texts.collect()
                }
            })
            .collect();

        (0..region.bounds().width() as usize)
            .map(|col| {
                let mut parts: Vec<&str> = Vec::with_capacity(band.len());
                for row in &band {
                    let part = row[col].as_str();
                    if !part.is_empty() && parts.last() != Some(&part) {
                        parts.push(part);
                    }
                }
                parts.join(&self.separator)
            })
            .collect()
    }
}

fn header_text(cell: &CellValue) -> String {
    cell.as_text().trim().to_string()
}

fn forward_fill(texts: impl Iterator<Item = String>) -> Vec<String> {
    let mut last = String::new();
    texts
        .map(|text| {
            if !text.is_empty() {
                last.clone_from(&text);
            }
            last.clone()
        })
        .collect()
}

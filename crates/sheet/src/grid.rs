use crate::a1_notation::CellRange;
use crate::cell::CellValue;

static EMPTY: CellValue = CellValue::Empty;

/// The raw cell grid of one worksheet (row-major storage).
///
/// Addressing is 1-based like the spreadsheet itself: `cell(1, 1)` is `A1`.
/// Reads outside the stored area return [`CellValue::Empty`].
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    name: String,
    rows: Vec<Vec<CellValue>>,
    width: u32,
}

impl Grid {
    /// Create a new empty grid with a name
    #[must_use]
    pub fn new(name: &str) -> Self {
        Grid {
            name: name.to_string(),
            rows: Vec::new(),
            width: 0,
        }
    }

    /// Create a grid from a 2D vector of values, anchored at `A1`
    #[must_use]
    pub fn from_rows<T: Into<CellValue>>(name: &str, data: Vec<Vec<T>>) -> Self {
        let rows: Vec<Vec<CellValue>> = data
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);

        Grid {
            name: name.to_string(),
            rows,
            width: u32::try_from(width).unwrap_or(u32::MAX),
        }
    }

    /// Get the sheet name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last row holding storage (not necessarily a non-empty cell)
    #[must_use]
    pub fn max_row(&self) -> u32 {
        u32::try_from(self.rows.len()).unwrap_or(u32::MAX)
    }

    /// Last column holding storage
    #[must_use]
    pub fn max_col(&self) -> u32 {
        self.width
    }

    /// Check if the grid has no cells at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(CellValue::is_blank))
    }

    /// Read a cell by 1-based row and column
    #[must_use]
    pub fn cell(&self, row: u32, col: u32) -> &CellValue {
        if row == 0 || col == 0 {
            return &EMPTY;
        }
        self.rows
            .get(row as usize - 1)
            .and_then(|r| r.get(col as usize - 1))
            .unwrap_or(&EMPTY)
    }

    /// Write a cell by 1-based row and column, growing storage as needed.
    /// Writes to row or column 0 are ignored.
    pub fn set(&mut self, row: u32, col: u32, value: CellValue) {
        if row == 0 || col == 0 {
            return;
        }
        let (r, c) = (row as usize - 1, col as usize - 1);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let target = &mut self.rows[r];
        if target.len() <= c {
            target.resize(c + 1, CellValue::Empty);
        }
        target[c] = value;
        self.width = self.width.max(col);
    }

    /// Iterate a row between two columns (inclusive), padding with `Empty`
    pub fn row_cells(&self, row: u32, first_col: u32, last_col: u32) -> impl Iterator<Item = &CellValue> {
        (first_col..=last_col).map(move |col| self.cell(row, col))
    }

    /// True when every cell of the row within the column span is blank
    #[must_use]
    pub fn is_row_blank(&self, row: u32, first_col: u32, last_col: u32) -> bool {
        self.row_cells(row, first_col, last_col).all(CellValue::is_blank)
    }

    /// Leftmost and rightmost non-blank columns of a row
    #[must_use]
    pub fn row_extent(&self, row: u32) -> Option<(u32, u32)> {
        let cells = self.rows.get((row as usize).checked_sub(1)?)?;
        let first = cells.iter().position(|c| !c.is_blank())?;
        let last = cells.iter().rposition(|c| !c.is_blank())?;
        Some((first as u32 + 1, last as u32 + 1))
    }

    /// Copy a rectangle out of the grid, row by row
    #[must_use]
    pub fn slice(&self, range: &CellRange) -> Vec<Vec<CellValue>> {
        (range.first_row..=range.last_row)
            .map(|row| {
                self.row_cells(row, range.first_col, range.last_col)
                    .cloned()
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_and_read() {
        let grid = Grid::from_rows("Data", vec![vec!["Name", "Amount"], vec!["Ann", "3"]]);
        assert_eq!(grid.name(), "Data");
        assert_eq!(grid.max_row(), 2);
        assert_eq!(grid.max_col(), 2);
        assert_eq!(grid.cell(1, 1), &CellValue::from("Name"));
        assert_eq!(grid.cell(9, 9), &CellValue::Empty);
        assert_eq!(grid.cell(0, 1), &CellValue::Empty);
    }

    #[test]
    fn test_set_grows() {
        let mut grid = Grid::new("S");
        grid.set(3, 4, CellValue::Int(7));
        assert_eq!(grid.max_row(), 3);
        assert_eq!(grid.max_col(), 4);
        assert_eq!(grid.cell(3, 4), &CellValue::Int(7));
        assert!(grid.is_row_blank(1, 1, 4));
        assert_eq!(grid.row_extent(3), Some((4, 4)));
        assert_eq!(grid.row_extent(1), None);
    }

    #[test]
    fn test_slice_pads_short_rows() {
        let grid = Grid::from_rows("S", vec![vec![1, 2, 3], vec![4]]);
        let block = grid.slice(&CellRange::new(1, 2, 2, 3));
        assert_eq!(
            block,
            vec![
                vec![CellValue::Int(2), CellValue::Int(3)],
                vec![CellValue::Empty, CellValue::Empty],
            ]
        );
    }
}

use crate::error::{Result, SheetError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest row number a worksheet can address.
pub const MAX_ROWS: u32 = 1_048_576;
/// Largest column number a worksheet can address.
pub const MAX_COLS: u32 = 16_384;

/// Parse A1-style cell notation (e.g., "A1", "Z99", "AA1")
/// Returns (row, column) as 1-based numbers
pub fn parse_a1(notation: &str) -> Result<(u32, u32)> {
    let notation = notation.trim().replace('$', "").to_uppercase();
    if notation.is_empty() {
        return Err(SheetError::InvalidCellNotation(notation));
    }

    // Find where letters end and numbers begin
    let Some(split_pos) = notation.bytes().position(|b| b.is_ascii_digit()) else {
        return Err(SheetError::InvalidCellNotation(notation));
    };
    if split_pos == 0 {
        return Err(SheetError::InvalidCellNotation(notation));
    }

    let col = parse_column_letters(&notation[..split_pos])?;
    let row = notation[split_pos..]
        .parse::<u32>()
        .map_err(|_| SheetError::InvalidCellNotation(notation.clone()))?;

    if row == 0 || row > MAX_ROWS || col > MAX_COLS {
        return Err(SheetError::InvalidCellNotation(notation));
    }

    Ok((row, col))
}

/// Convert column letters to a 1-based column number
/// A=1, B=2, ... Z=26, AA=27, ...
pub fn parse_column_letters(col_str: &str) -> Result<u32> {
    if col_str.is_empty() || col_str.len() > 3 {
        return Err(SheetError::InvalidCellNotation(col_str.to_string()));
    }

    let mut col: u32 = 0;
    for b in col_str.bytes() {
        if !b.is_ascii_uppercase() {
            return Err(SheetError::InvalidCellNotation(col_str.to_string()));
        }
        col = col * 26 + u32::from(b - b'A') + 1;
    }

    Ok(col)
}

/// Convert a 1-based column number to column letters
/// 1=A, 2=B, ... 26=Z, 27=AA, ...
pub fn column_letters(col: u32) -> String {
    let mut result = Vec::new();
    let mut col = col;

    while col > 0 {
        col -= 1;
        result.push(b'A' + (col % 26) as u8);
        col /= 26;
    }
    result.reverse();

    String::from_utf8(result).unwrap_or_default()
}

/// Convert 1-based (row, col) to A1 notation
pub fn to_a1_notation(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row)
}

/// Inclusive rectangle of cells in 1-based spreadsheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl CellRange {
    /// Build a range; corners are normalized so `first <= last`.
    #[must_use]
    pub fn new(first_row: u32, first_col: u32, last_row: u32, last_col: u32) -> Self {
        Self {
            first_row: first_row.min(last_row),
            first_col: first_col.min(last_col),
            last_row: first_row.max(last_row),
            last_col: first_col.max(last_col),
        }
    }

    /// Parse "A1:C3" (or a single cell "B2").
    pub fn parse(notation: &str) -> Result<Self> {
        match notation.split_once(':') {
            Some((start, end)) => {
                let (r1, c1) = parse_a1(start)?;
                let (r2, c2) = parse_a1(end)?;
                Ok(Self::new(r1, c1, r2, c2))
            }
            None => {
                let (r, c) = parse_a1(notation)?;
                Ok(Self::new(r, c, r, c))
            }
        }
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.last_row - self.first_row + 1
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.last_col - self.first_col + 1
    }

    #[must_use]
    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }

    #[must_use]
    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.first_row <= other.last_row
            && other.first_row <= self.last_row
            && self.first_col <= other.last_col
            && other.first_col <= self.last_col
    }

    #[must_use]
    pub fn to_a1(&self) -> String {
        format!(
            "{}:{}",
            to_a1_notation(self.first_row, self.first_col),
            to_a1_notation(self.last_row, self.last_col)
        )
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

impl FromStr for CellRange {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).map_err(|_| SheetError::InvalidRange(s.to_string()))
    }
}

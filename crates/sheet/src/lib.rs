//! Raw worksheet access for tablemill
//!
//! Provides the scalar [`CellValue`], the 1-based [`Grid`] of a worksheet,
//! A1 notation helpers and [`Book`], which loads every worksheet of a
//! workbook (xlsx, xlsm, xlsb, xls, ods) in order.
//!
//! # Examples
//!
//! ```
//! use tablemill_sheet::{CellRange, CellValue, Grid};
//!
//! let grid = Grid::from_rows("Data", vec![
//!     vec!["Name", "Amount"],
//!     vec!["Ann", "12"],
//! ]);
//!
//! assert_eq!(grid.cell(2, 1), &CellValue::from("Ann"));
//! assert_eq!(CellRange::new(1, 1, 2, 2).to_a1(), "A1:B2");
//! ```
//!
//! ```no_run
//! use tablemill_sheet::Book;
//!
//! let book = Book::open("input.xlsx").unwrap();
//! for grid in book.sheets() {
//!     println!("{}: {} rows", grid.name(), grid.max_row());
//! }
//! ```

mod a1_notation;
mod book;
mod cell;
mod error;
mod grid;
mod reader;

/// Re-export A1 helpers and the range type.
pub use a1_notation::{
    column_letters, parse_a1, parse_column_letters, to_a1_notation, CellRange, MAX_COLS, MAX_ROWS,
};
/// Re-export the workbook type.
pub use book::Book;
/// Re-export cell value types.
pub use cell::{CellValue, ValueKind};
/// Re-export sheet error types.
pub use error::{Result, SheetError};
/// Re-export the worksheet grid.
pub use grid::Grid;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading workbooks or addressing cells
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Invalid cell notation: {0}")]
    InvalidCellNotation(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Sheet not found: {name}")]
    SheetNotFound { name: String },

    #[error("Sheet already exists: {name}")]
    SheetAlreadyExists { name: String },

    #[error("Cannot open workbook {}: {message}", path.display())]
    Open { path: PathBuf, message: String },

    #[error("Cannot read sheet '{sheet}' of {}: {message}", path.display())]
    ReadSheet {
        path: PathBuf,
        sheet: String,
        message: String,
    },

    #[error("Sheet '{sheet}' exceeds the addressable size ({rows} rows, {cols} columns)")]
    TooLarge { sheet: String, rows: u64, cols: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SheetError>;

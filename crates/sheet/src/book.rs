use crate::error::{Result, SheetError};
use crate::grid::Grid;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// A source workbook: every worksheet's raw grid, in workbook order.
#[derive(Debug, Clone, Default)]
pub struct Book {
    path: Option<PathBuf>,
    sheets: IndexMap<String, Grid>,
}

impl Book {
    /// Create a new empty book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every worksheet of a workbook file (xlsx, xlsm, xlsb, xls, ods)
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or a sheet cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::reader::read_book(path.as_ref())
    }

    pub(crate) fn with_path(path: &Path) -> Self {
        Book {
            path: Some(path.to_path_buf()),
            sheets: IndexMap::new(),
        }
    }

    /// Path the book was loaded from, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the number of sheets
    #[must_use]
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Check if the book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Get all sheet names in order
    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.keys().map(String::as_str).collect()
    }

    /// Get a sheet by name
    pub fn get_sheet(&self, name: &str) -> Result<&Grid> {
        self.sheets
            .get(name)
            .ok_or_else(|| SheetError::SheetNotFound {
                name: name.to_string(),
            })
    }

    /// Get a sheet by index (0-based)
    pub fn get_sheet_by_index(&self, index: usize) -> Result<&Grid> {
        self.sheets
            .get_index(index)
            .map(|(_, sheet)| sheet)
            .ok_or_else(|| SheetError::SheetNotFound {
                name: format!("index {index}"),
            })
    }

    /// Iterate sheets in workbook order
    pub fn sheets(&self) -> impl Iterator<Item = &Grid> {
        self.sheets.values()
    }

    /// Add a sheet at the end of the book
    pub fn add_sheet(&mut self, grid: Grid) -> Result<()> {
        if self.sheets.contains_key(grid.name()) {
            return Err(SheetError::SheetAlreadyExists {
                name: grid.name().to_string(),
            });
        }
        self.sheets.insert(grid.name().to_string(), grid);
        Ok(())
    }
}

//! Error types for the tablemill pipeline.
//!
//! Each stage has its own error enum. Table-scoped failures are wrapped in
//! [`TableError`] so the engine can apply its error policy; anything that
//! must stop the whole run surfaces as [`EngineError`].

use crate::hooks::HookEvent;
use crate::model::TableOrigin;
use std::path::PathBuf;
use std::time::Duration;
use tablemill_sheet::SheetError;
use thiserror::Error;

/// Errors raised while loading or compiling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML document failed to parse.
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON document failed to parse.
    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file extension is not one we know how to parse.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A regular expression in the schema does not compile.
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// Schema content is inconsistent.
    #[error("Invalid schema: {0}")]
    Schema(String),

    /// A fixed region could not be parsed.
    #[error("Invalid region '{region}': {source}")]
    Region {
        region: String,
        #[source]
        source: SheetError,
    },

    /// A hook manifest names an event that does not exist.
    #[error("Unknown hook event: {0}")]
    UnknownEvent(String),

    /// A hook manifest names a hook the catalog does not provide.
    #[error("Unknown hook '{name}' for event {event}")]
    UnknownHook { name: String, event: HookEvent },
}

impl ConfigError {
    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }
}

/// Region detection could not produce a consistent set of tables.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Two detected regions share at least one cell.
    #[error("Regions {first} and {second} overlap on sheet '{sheet}'")]
    Overlap {
        sheet: String,
        first: String,
        second: String,
    },

    /// A detector implementation gave up on the sheet.
    #[error("Detection failed on sheet '{sheet}': {message}")]
    Failed { sheet: String, message: String },
}

/// A column mapping patch was rejected. The mapping is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// Patch names a canonical field the schema does not declare.
    #[error("Unknown field: {field}")]
    UnknownField { field: String },

    /// The same field is both assigned and unmapped.
    #[error("Field '{field}' is both assigned and unmapped")]
    ConflictingInstruction { field: String },

    /// Assigned source index is outside the extracted table.
    #[error("Source index {index} for field '{field}' is out of range (table has {width} columns)")]
    SourceIndexOutOfRange {
        field: String,
        index: usize,
        width: usize,
    },

    /// Two fields would read from the same source column.
    #[error("Source column {index} assigned to both '{first}' and '{second}'")]
    DuplicateAssignment {
        index: usize,
        first: String,
        second: String,
    },

    /// `order` is malformed.
    #[error("Invalid order entry '{field}': {reason}")]
    InvalidOrder { field: String, reason: String },

    /// Passthrough instruction targets a column that is not passthrough.
    #[error("Source column {index} is not a passthrough column")]
    NotPassthrough { index: usize },

    /// Two output columns would share a name.
    #[error("Duplicate output column name: {name}")]
    DuplicateOutputName { name: String },
}

impl PatchError {
    /// Stable identifier of the violated rule, used in run reports.
    #[must_use]
    pub fn rule(&self) -> &'static str {
        match self {
            Self::UnknownField { .. } => "unknown_field",
            Self::ConflictingInstruction { .. } => "conflicting_instruction",
            Self::SourceIndexOutOfRange { .. } => "source_index_out_of_range",
            Self::DuplicateAssignment { .. } => "duplicate_assignment",
            Self::InvalidOrder { .. } => "invalid_order",
            Self::NotPassthrough { .. } => "not_passthrough",
            Self::DuplicateOutputName { .. } => "duplicate_output_name",
        }
    }
}

/// Errors raised while placing, annotating or saving output tables.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A normalized table with no columns cannot be placed.
    #[error("Table has no output columns")]
    NoColumns,

    /// The table does not fit in the worksheet.
    #[error("Table of {rows}x{cols} does not fit on sheet '{sheet}' at row {row}")]
    SheetFull {
        sheet: String,
        row: u32,
        rows: usize,
        cols: usize,
    },

    /// No output worksheet at this index.
    #[error("No output worksheet at index {0}")]
    UnknownSheet(usize),

    /// The placement does not belong to a table on this worksheet.
    #[error("No table placed at {0}")]
    UnknownPlacement(String),

    /// A hook tried to touch a cell outside its table.
    #[error("Cell offset ({row}, {col}) is outside placement {placement}")]
    OutsidePlacement {
        placement: String,
        row: u32,
        col: u32,
    },

    /// The xlsx writer failed.
    #[error("Workbook write failed: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
}

/// A hook returned an error.
#[derive(Debug, Error)]
#[error("Hook '{hook}' failed during {event}: {source}")]
pub struct HookError {
    pub event: HookEvent,
    pub hook: String,
    #[source]
    pub source: anyhow::Error,
}

/// A failure scoped to one table. The engine's error policy decides whether
/// processing moves on to the next table.
#[derive(Debug, Error)]
pub enum TableError {
    /// A table-level hook failed.
    #[error("{origin}: {source}")]
    Hook {
        origin: TableOrigin,
        #[source]
        source: HookError,
    },

    /// A hook returned a patch that failed validation.
    #[error("{origin}: patch from hook '{hook}' rejected ({}): {source}", .source.rule())]
    Patch {
        origin: TableOrigin,
        hook: String,
        #[source]
        source: PatchError,
    },

    /// The table could not be rendered.
    #[error("{origin}: {source}")]
    Render {
        origin: TableOrigin,
        #[source]
        source: RenderError,
    },
}

impl TableError {
    /// Origin of the failing table.
    #[must_use]
    pub fn origin(&self) -> &TableOrigin {
        match self {
            Self::Hook { origin, .. } | Self::Patch { origin, .. } | Self::Render { origin, .. } => {
                origin
            }
        }
    }

    /// Pipeline stage the failure happened in.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Hook { source, .. } => source.event.as_str(),
            Self::Patch { .. } => HookEvent::OnTableMapped.as_str(),
            Self::Render { .. } => "render",
        }
    }

    /// Name of the hook involved, if any.
    #[must_use]
    pub fn hook(&self) -> Option<&str> {
        match self {
            Self::Hook { source, .. } => Some(&source.hook),
            Self::Patch { hook, .. } => Some(hook),
            Self::Render { .. } => None,
        }
    }

    /// Violated patch rule, if this is a patch rejection.
    #[must_use]
    pub fn rule(&self) -> Option<&'static str> {
        match self {
            Self::Patch { source, .. } => Some(source.rule()),
            _ => None,
        }
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Source workbook could not be read.
    #[error("Cannot read source workbook: {0}")]
    Source(#[from] SheetError),

    /// Output workbook could not be written.
    #[error("Cannot write output workbook {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: RenderError,
    },

    /// A workbook- or sheet-level hook failed under the abort-run policy.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// A table failed under the abort-run policy.
    #[error(transparent)]
    Table(#[from] TableError),

    /// The configured time budget ran out before the next table.
    #[error("Time budget of {budget:?} exceeded after {elapsed:?}")]
    TimeBudgetExceeded { budget: Duration, elapsed: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_rules_are_stable() {
        let err = PatchError::DuplicateAssignment {
            index: 2,
            first: "name".to_string(),
            second: "amount".to_string(),
        };
        assert_eq!(err.rule(), "duplicate_assignment");
        assert_eq!(
            err.to_string(),
            "Source column 2 assigned to both 'name' and 'amount'"
        );
        assert_eq!(
            PatchError::NotPassthrough { index: 1 }.rule(),
            "not_passthrough"
        );
    }

    #[test]
    fn test_table_error_accessors() {
        let origin = TableOrigin::new("in.xlsx", "Data", 0, 1);
        let err = TableError::Patch {
            origin: origin.clone(),
            hook: "fixer".to_string(),
            source: PatchError::UnknownField {
                field: "ghost".to_string(),
            },
        };
        assert_eq!(err.origin(), &origin);
        assert_eq!(err.stage(), "on_table_mapped");
        assert_eq!(err.hook(), Some("fixer"));
        assert_eq!(err.rule(), Some("unknown_field"));
    }
}

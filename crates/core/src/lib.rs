//! # tablemill-core
//!
//! Turns arbitrary spreadsheet workbooks into tables that follow a canonical
//! schema.
//!
//! For every worksheet of a source workbook the [`Engine`]:
//! - detects rectangular table regions ([`detect`])
//! - extracts header and rows ([`extract`])
//! - scores columns against the schema and maps them ([`mapper`]), letting
//!   hooks patch the mapping ([`patch`], [`hooks`])
//! - applies the schema's transforms and validators ([`normalize`])
//! - writes the result into an output worksheet of the same name
//!   ([`render`], [`output`])
//!
//! ```no_run
//! use std::path::Path;
//! use tablemill_core::{CanonicalSchema, Engine, FieldSchema};
//!
//! let schema = CanonicalSchema::new(vec![
//!     FieldSchema::new("name").with_synonyms(["customer"]),
//!     FieldSchema::new("amount"),
//! ]);
//! let engine = Engine::builder(schema).build()?;
//! let report = engine.run(Path::new("input.xlsx"), Path::new("output.xlsx"))?;
//! println!("{} tables written", report.table_count());
//! # Ok::<(), tablemill_core::EngineError>(())
//! ```

/// Schema documents with all configuration sections.
pub mod config;
/// Region detection.
pub mod detect;
/// Run orchestration.
pub mod engine;
/// Error types.
pub mod error;
/// Raw table extraction.
pub mod extract;
/// Extension hooks.
pub mod hooks;
/// Column scoring and mapping.
pub mod mapper;
/// Pipeline data model.
pub mod model;
/// Cell transforms and validators.
pub mod normalize;
/// Staged output workbook.
pub mod output;
/// Mapping patches.
pub mod patch;
/// Compiled regex cache.
pub mod patterns;
/// Table placement.
pub mod render;
/// Run results.
pub mod report;
/// Canonical schema.
pub mod schema;

pub use config::SchemaConfig;
pub use detect::{DetectionConfig, FixedRegionDetector, HeaderRowDetector, RegionDetector};
pub use engine::{Engine, EngineBuilder, EngineOptions, ErrorPolicy};
pub use error::{
    ConfigError, DetectionError, EngineError, HookError, PatchError, RenderError, TableError,
};
pub use extract::Extractor;
pub use hooks::{Hook, HookCatalog, HookEvent, HookManifest, HookRegistry, HookState};
pub use mapper::{ColumnDetector, ColumnMapper, ColumnView, Score};
pub use model::{
    ColumnMapping, ExtractedTable, MappedField, MappedTable, NormalizedTable, PassthroughField,
    Severity, TableOrigin, TablePlacement, TableRegion, ValidationIssue,
};
pub use normalize::Normalizer;
pub use output::{CellStyle, OutputWorkbook, OutputWorksheet, TableAnnotator};
pub use patch::{ColumnMappingPatch, PassthroughPatch};
pub use patterns::PatternCache;
pub use render::{RenderConfig, Renderer};
pub use report::{FailureRecord, RunReport, SheetPreview, SheetReport, TableReport};
pub use schema::{CanonicalSchema, DetectorSpec, FieldSchema, TransformSpec, ValidatorRule, ValidatorSpec};

/// Re-export the sheet crate.
pub use tablemill_sheet as sheet;

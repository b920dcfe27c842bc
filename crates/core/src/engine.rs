//! Workbook-level orchestration.

use crate::config::SchemaConfig;
use crate::detect::{detector_from_config, ensure_disjoint, DetectionConfig, RegionDetector};
use crate::error::{ConfigError, DetectionError, EngineError, HookError, TableError};
use crate::extract::Extractor;
use crate::hooks::{
    BeforeSaveContext, Hook, HookCatalog, HookEvent, HookRegistry, HookState, RunContext,
    SheetContext, TableDetectedContext, TableWrittenContext,
};
use crate::mapper::{ColumnDetector, ColumnMapper};
use crate::model::{MappedTable, Severity, TableOrigin, TableRegion};
use crate::normalize::Normalizer;
use crate::output::{OutputWorkbook, OutputWorksheet};
use crate::patterns::PatternCache;
use crate::render::{RenderConfig, Renderer};
use crate::report::{DetectedTable, FailureRecord, RunReport, SheetPreview, SheetReport, TableReport};
use crate::schema::CanonicalSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablemill_sheet::{Book, Grid};

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Skip the failing table and continue.
    #[default]
    AbortTable,
    /// Skip the rest of the failing table's sheet.
    AbortSheet,
    /// Stop the run on the first failure.
    AbortRun,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub error_policy: ErrorPolicy,
    /// Wall-clock budget in seconds, checked before each table starts.
    pub time_budget_secs: Option<f64>,
}

impl EngineOptions {
    #[must_use]
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Configures an [`Engine`].
pub struct EngineBuilder {
    schema: CanonicalSchema,
    detection: DetectionConfig,
    render: RenderConfig,
    options: EngineOptions,
    hooks: HookRegistry,
    column_detectors: Vec<Box<dyn ColumnDetector>>,
    region_detector: Option<Box<dyn RegionDetector>>,
    patterns: PatternCache,
}

impl EngineBuilder {
    #[must_use]
    pub fn detection(mut self, config: DetectionConfig) -> Self {
        self.detection = config;
        self
    }

    #[must_use]
    pub fn render(mut self, config: RenderConfig) -> Self {
        self.render = config;
        self
    }

    #[must_use]
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.options.error_policy = policy;
        self
    }

    /// Replace the hook registry.
    #[must_use]
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn hook(mut self, event: HookEvent, name: impl Into<String>, priority: i32, hook: Arc<dyn Hook>) -> Self {
        self.hooks.register(event, name, priority, hook);
        self
    }

    /// Add a scoring detector next to the schema's declared ones.
    #[must_use]
    pub fn column_detector(mut self, detector: Box<dyn ColumnDetector>) -> Self {
        self.column_detectors.push(detector);
        self
    }

    /// Use a custom region detector instead of the one the detection
    /// config describes.
    #[must_use]
    pub fn region_detector(mut self, detector: Box<dyn RegionDetector>) -> Self {
        self.region_detector = Some(detector);
        self
    }

    /// Start from an existing pattern cache.
    #[must_use]
    pub fn patterns(mut self, patterns: PatternCache) -> Self {
        self.patterns = patterns;
        self
    }

    /// # Errors
    ///
    /// Returns an error when the schema is inconsistent, a pattern does not
    /// compile, or a fixed region is malformed.
    pub fn build(self) -> Result<Engine, ConfigError> {
        self.schema.validate()?;
        let mut patterns = self.patterns;
        let mut mapper = ColumnMapper::from_schema(&self.schema, &mut patterns)?;
        for detector in self.column_detectors {
            mapper.add_detector(detector);
        }
        let normalizer = Normalizer::from_schema(&self.schema, &mut patterns)?;
        let detector = match self.region_detector {
            Some(detector) => detector,
            None => detector_from_config(&self.detection)?,
        };

        Ok(Engine {
            extractor: Extractor::new(self.detection.header_separator.clone()),
            schema: self.schema,
            detector,
            mapper,
            normalizer,
            renderer: Renderer::new(self.render),
            hooks: self.hooks,
            options: self.options,
            patterns,
        })
    }
}

/// Runs the pipeline over one workbook at a time.
///
/// An engine holds no per-run state, so one instance can serve any number
/// of sequential or concurrent runs.
pub struct Engine {
    schema: CanonicalSchema,
    detector: Box<dyn RegionDetector>,
    extractor: Extractor,
    mapper: ColumnMapper,
    normalizer: Normalizer,
    renderer: Renderer,
    hooks: HookRegistry,
    options: EngineOptions,
    patterns: PatternCache,
}

impl Engine {
    #[must_use]
    pub fn builder(schema: CanonicalSchema) -> EngineBuilder {
        EngineBuilder {
            schema,
            detection: DetectionConfig::default(),
            render: RenderConfig::default(),
            options: EngineOptions::default(),
            hooks: HookRegistry::new(),
            column_detectors: Vec::new(),
            region_detector: None,
            patterns: PatternCache::new(),
        }
    }

    /// Engine for a loaded config file, resolving its hook manifest
    /// against `catalog`.
    ///
    /// # Errors
    ///
    /// Returns an error when the config is invalid or names unknown hooks.
    pub fn from_config(config: SchemaConfig, catalog: &HookCatalog) -> Result<Self, ConfigError> {
        let hooks = HookRegistry::from_manifest(&config.hooks, catalog)?;
        Self::builder(config.schema)
            .detection(config.detection)
            .render(config.render)
            .options(config.engine)
            .hooks(hooks)
            .build()
    }

    #[must_use]
    pub fn schema(&self) -> &CanonicalSchema {
        &self.schema
    }

    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compiled patterns shared by the mapper and normalizer.
    #[must_use]
    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    /// Process `source` and write the result to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be read, the target cannot be
    /// written, the time budget runs out, or any failure occurs under
    /// [`ErrorPolicy::AbortRun`]. Table failures under the other policies
    /// are recorded in the report instead.
    pub fn run(&self, source: &Path, target: &Path) -> Result<RunReport, EngineError> {
        let span = tracing::info_span!("run", source = %source.display());
        let _guard = span.enter();
        let started = Instant::now();

        let book = Book::open(source)?;
        let sheet_names: Vec<String> = book.sheet_names().into_iter().map(str::to_string).collect();
        tracing::info!(sheets = sheet_names.len(), target = %target.display(), "starting run");

        let mut output = OutputWorkbook::new(sheet_names.iter().cloned());
        let mut state = HookState::new();
        let mut report = RunReport::new(source, target);

        let started_hooks = {
            let mut ctx = RunContext::new(source, target, &sheet_names, &self.schema, &mut state);
            self.hooks.dispatch_workbook_start(&mut ctx)
        };
        if let Err(err) = started_hooks {
            self.workbook_hook_failed(err, &mut report)?;
        }

        for ((index, grid), sheet) in book.sheets().enumerate().zip(output.sheets_mut()) {
            let sheet_report = self.process_sheet(source, index, grid, sheet, &mut state, started)?;
            report.sheets.push(sheet_report);
        }

        let saving_hooks = {
            let mut ctx = BeforeSaveContext::new(target, &mut output, &mut state);
            self.hooks.dispatch_before_save(&mut ctx)
        };
        if let Err(err) = saving_hooks {
            self.workbook_hook_failed(err, &mut report)?;
        }

        output.save(target).map_err(|source| EngineError::Save {
            path: target.to_path_buf(),
            source,
        })?;
        tracing::info!(
            tables = report.table_count(),
            errors = report.issue_count(Severity::Error),
            warnings = report.issue_count(Severity::Warning),
            failures = report.failure_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }

    /// Detect tables in every sheet of `source` without mapping or writing
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be read.
    pub fn detect(&self, source: &Path) -> Result<Vec<SheetPreview>, EngineError> {
        let book = Book::open(source)?;
        let previews = book
            .sheets()
            .enumerate()
            .map(|(index, grid)| {
                let mut preview = SheetPreview {
                    name: grid.name().to_string(),
                    index,
                    error: None,
                    tables: Vec::new(),
                };
                match self.detect_regions(grid) {
                    Ok(regions) => {
                        preview.tables = regions
                            .iter()
                            .enumerate()
                            .map(|(table_index, region)| {
                                let origin = TableOrigin::new(source, grid.name(), index, table_index);
                                let table = self.extractor.extract(grid, origin, region);
                                DetectedTable {
                                    region: *region,
                                    header: table.header().to_vec(),
                                    rows: table.row_count(),
                                }
                            })
                            .collect();
                    }
                    Err(err) => preview.error = Some(err.to_string()),
                }
                preview
            })
            .collect();
        Ok(previews)
    }

    fn detect_regions(&self, grid: &Grid) -> Result<Vec<TableRegion>, DetectionError> {
        let regions = self.detector.detect(grid)?;
        ensure_disjoint(grid.name(), &regions)?;
        Ok(regions)
    }

    fn workbook_hook_failed(&self, err: HookError, report: &mut RunReport) -> Result<(), EngineError> {
        if self.options.error_policy == ErrorPolicy::AbortRun {
            return Err(err.into());
        }
        tracing::warn!(event = %err.event, hook = %err.hook, error = %err.source, "workbook hook failed");
        report.failures.push(FailureRecord::from(&err));
        Ok(())
    }

    fn process_sheet(
        &self,
        source: &Path,
        index: usize,
        grid: &Grid,
        output: &mut OutputWorksheet,
        state: &mut HookState,
        started: Instant,
    ) -> Result<SheetReport, EngineError> {
        let span = tracing::info_span!("sheet", name = grid.name(), index);
        let _guard = span.enter();
        let mut report = SheetReport::new(grid.name(), index);

        let hooked = self
            .hooks
            .dispatch_sheet_start(&mut SheetContext::new(source, index, grid, state));
        if let Err(err) = hooked {
            if self.options.error_policy == ErrorPolicy::AbortRun {
                return Err(err.into());
            }
            tracing::warn!(hook = %err.hook, error = %err.source, "sheet skipped");
            report.skipped = Some(FailureRecord::from(&err));
            return Ok(report);
        }

        let regions = match self.detect_regions(grid) {
            Ok(regions) => regions,
            Err(err) => {
                tracing::warn!(error = %err, "detection failed, sheet has no tables");
                report.detection_error = Some(err.to_string());
                return Ok(report);
            }
        };
        tracing::info!(tables = regions.len(), "detected tables");

        for (table_index, region) in regions.iter().enumerate() {
            if let Some(budget) = self.options.time_budget() {
                let elapsed = started.elapsed();
                if elapsed > budget {
                    return Err(EngineError::TimeBudgetExceeded { budget, elapsed });
                }
            }
            let origin = TableOrigin::new(source, grid.name(), index, table_index);
            match self.process_table(grid, origin, region, output, state) {
                Ok(table) => report.tables.push(table),
                Err(err) => {
                    tracing::warn!(table = table_index, stage = err.stage(), error = %err, "table aborted");
                    match self.options.error_policy {
                        ErrorPolicy::AbortRun => return Err(err.into()),
                        ErrorPolicy::AbortSheet => {
                            report.failures.push(FailureRecord::from(&err));
                            break;
                        }
                        ErrorPolicy::AbortTable => report.failures.push(FailureRecord::from(&err)),
                    }
                }
            }
        }
        Ok(report)
    }

    /// Extract, map, normalize and render one table. On failure nothing of
    /// the table remains in the output.
    fn process_table(
        &self,
        grid: &Grid,
        origin: TableOrigin,
        region: &TableRegion,
        output: &mut OutputWorksheet,
        state: &mut HookState,
    ) -> Result<TableReport, TableError> {
        let span = tracing::info_span!("table", index = origin.table_index(), region = %region);
        let _guard = span.enter();

        let extracted = self.extractor.extract(grid, origin, region);
        self.hooks
            .dispatch_table_detected(&mut TableDetectedContext::new(&extracted, state))?;

        let proposed = self.mapper.propose(&extracted, &self.schema);
        let mapping = self
            .hooks
            .dispatch_table_mapped(&extracted, &self.schema, state, proposed)?;
        let mapped = MappedTable::new(extracted, mapping);
        let normalized = self.normalizer.normalize(&mapped);
        let (extracted, mapping) = mapped.into_parts();
        let origin = extracted.origin();

        let placement = self
            .renderer
            .write_table(output, &normalized)
            .map_err(|source| TableError::Render {
                origin: origin.clone(),
                source,
            })?;

        let written = match output.annotate(&placement) {
            Ok(annotator) => {
                let mut ctx = TableWrittenContext::new(origin, &mapping, &normalized, annotator, state);
                self.hooks.dispatch_table_written(&mut ctx)
            }
            Err(source) => Err(TableError::Render {
                origin: origin.clone(),
                source,
            }),
        };
        if let Err(err) = written {
            if let Err(rollback) = output.rollback(&placement) {
                tracing::error!(error = %rollback, "could not roll back table");
            }
            return Err(err);
        }

        tracing::debug!(
            placement = %placement,
            rows = normalized.rows().len(),
            issues = normalized.issues().len(),
            "table written"
        );
        Ok(TableReport {
            origin: origin.clone(),
            region: *extracted.region(),
            placement,
            rows: normalized.rows().len(),
            dropped_columns: mapping.dropped().len(),
            issues: normalized.issues().to_vec(),
            mapping,
        })
    }
}

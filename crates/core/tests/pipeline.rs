use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tablemill_core::detect::FixedRegionSpec;
use tablemill_core::hooks::{
    BeforeSaveContext, RunContext, SheetContext, TableDetectedContext, TableMappedContext,
    TableWrittenContext,
};
use tablemill_core::sheet::{Book, CellValue};
use tablemill_core::{
    CanonicalSchema, CellStyle, ColumnMappingPatch, DetectionConfig, Engine, EngineError,
    ErrorPolicy, FieldSchema, Hook, HookCatalog, HookEvent, SchemaConfig, Severity,
};
use tempfile::{tempdir, TempDir};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Write a workbook; each sheet is a list of (first row, rows). Cells that
/// parse as numbers are written as numbers, empty strings are skipped.
fn write_fixture(path: &Path, sheets: &[(&str, Vec<(u32, Vec<Vec<&str>>)>)]) {
    let mut workbook = Workbook::new();
    for (name, blocks) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        for (first_row, rows) in blocks {
            for (r, row) in rows.iter().enumerate() {
                for (c, text) in row.iter().enumerate() {
                    let (r, c) = (first_row - 1 + r as u32, c as u16);
                    if text.is_empty() {
                        continue;
                    }
                    match text.parse::<f64>() {
                        Ok(n) => worksheet.write_number(r, c, n).unwrap(),
                        Err(_) => worksheet.write_string(r, c, *text).unwrap(),
                    };
                }
            }
        }
    }
    workbook.save(path).unwrap();
}

fn name_amount() -> Vec<Vec<&'static str>> {
    vec![
        vec!["Name", "Amount"],
        vec!["Ann", "12"],
        vec!["Bob", "7.5"],
    ]
}

fn two_table_fixture() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.xlsx");
    write_fixture(
        &source,
        &[
            ("Data", vec![(1, name_amount()), (6, name_amount())]),
            ("Notes", vec![]),
        ],
    );
    (dir, source)
}

fn schema() -> CanonicalSchema {
    CanonicalSchema::new(vec![FieldSchema::new("name"), FieldSchema::new("amount")])
}

fn text(value: &str) -> CellValue {
    CellValue::from(value)
}

#[test]
fn test_two_tables_are_stacked_in_output() -> TestResult {
    let (dir, source) = two_table_fixture();
    let target = dir.path().join("out.xlsx");

    let report = Engine::builder(schema()).build()?.run(&source, &target)?;

    let regions: Vec<String> = report.tables().map(|t| t.region.to_string()).collect();
    assert_eq!(regions, vec!["A1:B3", "A6:B8"]);
    let placements: Vec<String> = report.tables().map(|t| t.placement.to_string()).collect();
    assert_eq!(placements, vec!["Data!A1:B3", "Data!A5:B7"]);

    let output = Book::open(&target)?;
    assert_eq!(output.sheet_names(), vec!["Data", "Notes"]);
    let data = output.get_sheet("Data")?;
    assert_eq!(data.cell(1, 1), &text("name"));
    assert_eq!(data.cell(1, 2), &text("amount"));
    assert_eq!(data.cell(2, 2), &CellValue::Float(12.0));
    assert!(data.is_row_blank(4, 1, 2));
    assert_eq!(data.cell(5, 1), &text("name"));
    assert_eq!(data.cell(7, 1), &text("Bob"));
    assert_eq!(data.cell(7, 2), &CellValue::Float(7.5));
    assert!(output.get_sheet("Notes")?.is_empty());
    Ok(())
}

#[test]
fn test_unmapped_column_is_passed_through() -> TestResult {
    let dir = tempdir()?;
    let source = dir.path().join("source.xlsx");
    let target = dir.path().join("out.xlsx");
    write_fixture(
        &source,
        &[("Data", vec![(1, vec![vec!["Name", "Misc"], vec!["Ann", "x"]])])],
    );

    let schema = CanonicalSchema::new(vec![FieldSchema::new("name")]);
    let report = Engine::builder(schema).build()?.run(&source, &target)?;
    let table = report.tables().next().unwrap();
    assert_eq!(table.mapping.output_header(), vec!["name", "extra_Misc"]);

    let data = Book::open(&target)?;
    let data = data.get_sheet("Data")?;
    assert_eq!(data.cell(1, 2), &text("extra_Misc"));
    assert_eq!(data.cell(2, 2), &text("x"));
    Ok(())
}

#[test]
fn test_runs_are_byte_identical() -> TestResult {
    let (dir, source) = two_table_fixture();
    let first = dir.path().join("first.xlsx");
    let second = dir.path().join("second.xlsx");

    let engine = Engine::from_config(
        SchemaConfig::from_yaml_str(
            "fields:\n  - name: name\n  - name: amount\n    validators:\n      - type: range\n        max: 10\nhooks:\n  on_table_written:\n    - hook: highlight_issues\n",
        )?,
        &HookCatalog::new(),
    )?;
    engine.run(&source, &first)?;
    engine.run(&source, &second)?;
    assert_eq!(std::fs::read(&first)?, std::fs::read(&second)?);
    Ok(())
}

/// Records every event it sees.
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl Hook for Recorder {
    fn on_workbook_start(&self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
        self.push(format!("workbook_start {}", ctx.sheet_names().join(",")));
        Ok(())
    }

    fn on_sheet_start(&self, ctx: &mut SheetContext<'_>) -> anyhow::Result<()> {
        self.push(format!("sheet_start {}", ctx.sheet_name()));
        Ok(())
    }

    fn on_table_detected(&self, ctx: &mut TableDetectedContext<'_>) -> anyhow::Result<()> {
        self.push(format!("detected {}", ctx.region()));
        Ok(())
    }

    fn on_table_mapped(
        &self,
        ctx: &mut TableMappedContext<'_>,
    ) -> anyhow::Result<Option<ColumnMappingPatch>> {
        self.push(format!("mapped {}", ctx.mapping().output_header().join(",")));
        Ok(None)
    }

    fn on_table_written(&self, ctx: &mut TableWrittenContext<'_>) -> anyhow::Result<()> {
        self.push(format!("written {}", ctx.placement()));
        Ok(())
    }

    fn on_workbook_before_save(&self, ctx: &mut BeforeSaveContext<'_>) -> anyhow::Result<()> {
        self.push(format!("before_save {}", ctx.workbook().table_count()));
        Ok(())
    }
}

#[test]
fn test_hooks_fire_in_lifecycle_order() -> TestResult {
    let (dir, source) = two_table_fixture();
    let log = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::new(Recorder {
        log: Arc::clone(&log),
    });
    let mut registry = tablemill_core::HookRegistry::new();
    registry.register_all("recorder", 0, recorder);

    Engine::builder(schema())
        .hooks(registry)
        .build()?
        .run(&source, &dir.path().join("out.xlsx"))?;

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "workbook_start Data,Notes",
            "sheet_start Data",
            "detected A1:B3",
            "mapped name,amount",
            "written Data!A1:B3",
            "detected A6:B8",
            "mapped name,amount",
            "written Data!A5:B7",
            "sheet_start Notes",
            "before_save 2",
        ]
    );
    Ok(())
}

/// Returns the same patch for every table.
struct Patcher(ColumnMappingPatch);

impl Hook for Patcher {
    fn on_table_mapped(
        &self,
        _ctx: &mut TableMappedContext<'_>,
    ) -> anyhow::Result<Option<ColumnMappingPatch>> {
        Ok(Some(self.0.clone()))
    }
}

#[test]
fn test_duplicate_assignment_skips_table_before_writing() -> TestResult {
    let dir = tempdir()?;
    let source = dir.path().join("source.xlsx");
    let target = dir.path().join("out.xlsx");
    write_fixture(
        &source,
        &[(
            "Data",
            vec![(1, vec![vec!["Name", "Amount", "Misc"], vec!["Ann", "3", "x"]])],
        )],
    );

    let patch = ColumnMappingPatch::new().assign("name", 2).assign("amount", 2);
    let report = Engine::builder(schema())
        .hook(HookEvent::OnTableMapped, "reviewer", 0, Arc::new(Patcher(patch)))
        .build()?
        .run(&source, &target)?;

    assert_eq!(report.table_count(), 0);
    let failure = &report.sheets[0].failures[0];
    assert_eq!(failure.stage, "on_table_mapped");
    assert_eq!(failure.hook.as_deref(), Some("reviewer"));
    assert_eq!(failure.rule.as_deref(), Some("duplicate_assignment"));
    assert_eq!(failure.origin.as_ref().map(|o| o.table_index()), Some(0));

    assert!(Book::open(&target)?.get_sheet("Data")?.is_empty());
    Ok(())
}

/// Styles the table, then fails for the first table of each sheet.
struct FailFirstWrite;

impl Hook for FailFirstWrite {
    fn on_table_written(&self, ctx: &mut TableWrittenContext<'_>) -> anyhow::Result<()> {
        ctx.annotator().style_cell(0, 0, CellStyle::new().italic())?;
        if ctx.origin().table_index() == 0 {
            anyhow::bail!("refusing first table");
        }
        Ok(())
    }
}

#[test]
fn test_failed_written_hook_rolls_table_back() -> TestResult {
    let (dir, source) = two_table_fixture();
    let target = dir.path().join("out.xlsx");

    let report = Engine::builder(schema())
        .hook(HookEvent::OnTableWritten, "picky", 0, Arc::new(FailFirstWrite))
        .build()?
        .run(&source, &target)?;

    let placements: Vec<String> = report.tables().map(|t| t.placement.to_string()).collect();
    assert_eq!(placements, vec!["Data!A1:B3"]);
    assert_eq!(report.tables().next().unwrap().origin.table_index(), 1);
    assert_eq!(report.sheets[0].failures[0].stage, "on_table_written");

    let output = Book::open(&target)?;
    let data = output.get_sheet("Data")?;
    assert_eq!(data.cell(1, 1), &text("name"));
    assert!(data.is_row_blank(4, 1, 2));
    assert!(data.is_row_blank(5, 1, 2));
    Ok(())
}

#[test]
fn test_abort_sheet_moves_to_next_sheet() -> TestResult {
    let dir = tempdir()?;
    let source = dir.path().join("source.xlsx");
    write_fixture(
        &source,
        &[
            ("First", vec![(1, name_amount()), (6, name_amount())]),
            ("Second", vec![(1, name_amount())]),
        ],
    );

    let report = Engine::builder(schema())
        .hook(HookEvent::OnTableWritten, "picky", 0, Arc::new(FailFirstWrite))
        .error_policy(ErrorPolicy::AbortSheet)
        .build()?
        .run(&source, &dir.path().join("out.xlsx"))?;

    assert!(report.sheets[0].tables.is_empty());
    assert_eq!(report.sheets[0].failures.len(), 1);
    assert!(report.sheets[1].tables.is_empty());
    assert_eq!(report.failure_count(), 2);
    Ok(())
}

#[test]
fn test_abort_run_fails_without_output() -> TestResult {
    let (dir, source) = two_table_fixture();
    let target = dir.path().join("out.xlsx");

    let result = Engine::builder(schema())
        .hook(HookEvent::OnTableWritten, "picky", 0, Arc::new(FailFirstWrite))
        .error_policy(ErrorPolicy::AbortRun)
        .build()?
        .run(&source, &target);

    match result {
        Err(EngineError::Table(err)) => {
            assert_eq!(err.stage(), "on_table_written");
            assert_eq!(err.origin().sheet_name(), "Data");
        }
        other => panic!("expected table error, got {other:?}"),
    }
    assert!(!target.exists());
    Ok(())
}

#[test]
fn test_unreadable_source_is_fatal() {
    let dir = tempdir().unwrap();
    let engine = Engine::builder(schema()).build().unwrap();
    let err = engine
        .run(&dir.path().join("missing.xlsx"), &dir.path().join("out.xlsx"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Source(_)));
}

#[test]
fn test_unwritable_target_is_fatal() {
    let (dir, source) = two_table_fixture();
    let engine = Engine::builder(schema()).build().unwrap();
    let err = engine
        .run(&source, &dir.path().join("no-such-dir").join("out.xlsx"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Save { .. }));
}

#[test]
fn test_overlapping_regions_reported_per_sheet() -> TestResult {
    let (dir, source) = two_table_fixture();
    let region = |range: &str| FixedRegionSpec {
        sheet: Some("Data".to_string()),
        range: range.to_string(),
        header_rows: None,
    };
    let detection = DetectionConfig {
        regions: Some(vec![region("A1:B3"), region("B3:C5")]),
        ..DetectionConfig::default()
    };

    let report = Engine::builder(schema())
        .detection(detection)
        .build()?
        .run(&source, &dir.path().join("out.xlsx"))?;

    assert!(report.sheets[0].detection_error.is_some());
    assert!(report.sheets[0].tables.is_empty());
    assert!(report.sheets[1].detection_error.is_none());
    Ok(())
}

#[test]
fn test_config_run_with_stacked_header_and_issues() -> TestResult {
    let dir = tempdir()?;
    let source = dir.path().join("source.xlsx");
    let target = dir.path().join("out.xlsx");
    write_fixture(
        &source,
        &[(
            "Contacts",
            vec![(
                2,
                vec![
                    vec!["Contact", "", "Since"],
                    vec!["Name", "Email", "Year"],
                    vec!["  Ann ", "ann@example.com", "2019"],
                    vec!["Bob", "not-an-email", "2021"],
                ],
            )],
        )],
    );
    let config = SchemaConfig::from_yaml_str(
        r"
fields:
  - name: name
    synonyms: [contact name]
    transforms:
      - type: trim
  - name: email
    synonyms: [contact email]
    validators:
      - type: email
  - name: year
    synonyms: [since year]
    transforms:
      - type: integer
detection:
  header_rows: 2
hooks:
  on_table_written:
    - hook: highlight_issues
",
    )?;

    let report = Engine::from_config(config, &HookCatalog::new())?.run(&source, &target)?;
    let table = report.tables().next().unwrap();
    assert_eq!(table.region.to_string(), "A2:C5");
    assert_eq!(table.mapping.output_header(), vec!["name", "email", "year"]);
    assert_eq!(report.issue_count(Severity::Error), 1);
    let issues = report.issues_by_origin();
    let (_, issues) = issues.iter().next().unwrap();
    assert_eq!((issues[0].row, issues[0].code.as_str()), (1, "validate.email"));

    let output = Book::open(&target)?;
    let data = output.get_sheet("Contacts")?;
    assert_eq!(data.cell(2, 1), &text("Ann"));
    assert_eq!(data.cell(3, 2), &text("not-an-email"));
    assert_eq!(data.cell(3, 3), &CellValue::Float(2021.0));
    Ok(())
}

#[test]
fn test_detect_previews_without_writing() -> TestResult {
    let (_dir, source) = two_table_fixture();
    let previews = Engine::builder(schema()).build()?.detect(&source)?;
    assert_eq!(previews.len(), 2);
    assert_eq!(previews[0].tables.len(), 2);
    assert_eq!(previews[0].tables[1].header, vec!["Name", "Amount"]);
    assert_eq!(previews[0].tables[1].rows, 2);
    assert!(previews[1].tables.is_empty());
    Ok(())
}

//! Run results for callers that surface data-quality feedback.

use crate::error::{HookError, TableError};
use crate::model::{ColumnMapping, Severity, TableOrigin, TablePlacement, TableRegion, ValidationIssue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A failure that was recovered from by skipping a table, a sheet, or a
/// hook stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<TableOrigin>,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub message: String,
}

impl From<&TableError> for FailureRecord {
    fn from(err: &TableError) -> Self {
        Self {
            origin: Some(err.origin().clone()),
            stage: err.stage().to_string(),
            hook: err.hook().map(str::to_string),
            rule: err.rule().map(str::to_string),
            message: err.to_string(),
        }
    }
}

impl From<&HookError> for FailureRecord {
    fn from(err: &HookError) -> Self {
        Self {
            origin: None,
            stage: err.event.to_string(),
            hook: Some(err.hook.clone()),
            rule: None,
            message: err.to_string(),
        }
    }
}

/// One table that made it into the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub origin: TableOrigin,
    /// Where the table was found in the source sheet.
    pub region: TableRegion,
    pub placement: TablePlacement,
    pub mapping: ColumnMapping,
    pub rows: usize,
    /// Unmapped source columns left out of the output.
    pub dropped_columns: usize,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetReport {
    pub name: String,
    pub index: usize,
    /// Set when region detection failed; the sheet then has no tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_error: Option<String>,
    /// Set when an `on_sheet_start` hook failed and the sheet was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<FailureRecord>,
    pub tables: Vec<TableReport>,
    pub failures: Vec<FailureRecord>,
}

impl SheetReport {
    pub(crate) fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            detection_error: None,
            skipped: None,
            tables: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Everything a run produced besides the output workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub source: PathBuf,
    pub target: PathBuf,
    pub sheets: Vec<SheetReport>,
    /// Failures of workbook-level hooks.
    pub failures: Vec<FailureRecord>,
}

impl RunReport {
    pub(crate) fn new(source: &Path, target: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            sheets: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableReport> {
        self.sheets.iter().flat_map(|s| &s.tables)
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables().count()
    }

    /// Table, sheet and workbook-level failures, in run order.
    pub fn all_failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.sheets
            .iter()
            .flat_map(|s| s.skipped.iter().chain(&s.failures))
            .chain(&self.failures)
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.all_failures().count()
    }

    /// Issues of the given severity across all tables.
    #[must_use]
    pub fn issue_count(&self, severity: Severity) -> usize {
        self.tables()
            .flat_map(|t| &t.issues)
            .filter(|issue| issue.severity == severity)
            .count()
    }

    /// Validation issues per table, for tables that have any.
    #[must_use]
    pub fn issues_by_origin(&self) -> BTreeMap<&TableOrigin, &[ValidationIssue]> {
        self.tables()
            .filter(|t| !t.issues.is_empty())
            .map(|t| (&t.origin, t.issues.as_slice()))
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A table found by detection, without mapping or output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedTable {
    pub region: TableRegion,
    pub header: Vec<String>,
    pub rows: usize,
}

/// Detection results for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetPreview {
    pub name: String,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tables: Vec<DetectedTable>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PatchError;
    use tablemill_sheet::CellRange;

    fn table_report(sheet: &str, sheet_index: usize, issues: Vec<ValidationIssue>) -> TableReport {
        TableReport {
            origin: TableOrigin::new("in.xlsx", sheet, sheet_index, 0),
            region: TableRegion::new(CellRange::new(1, 1, 3, 2), 1),
            placement: TablePlacement::new(sheet, sheet_index, CellRange::new(1, 1, 3, 2)),
            mapping: ColumnMapping::new(Vec::new(), Vec::new(), Vec::new(), Vec::new()),
            rows: 2,
            dropped_columns: 0,
            issues,
        }
    }

    fn issue(severity: Severity) -> ValidationIssue {
        ValidationIssue {
            field: "email".to_string(),
            row: 0,
            severity,
            code: "validate.email".to_string(),
            message: "not an email".to_string(),
        }
    }

    #[test]
    fn test_counts_and_issue_index() {
        let mut report = RunReport::new(Path::new("in.xlsx"), Path::new("out.xlsx"));
        let mut first = SheetReport::new("A", 0);
        first.tables.push(table_report("A", 0, vec![issue(Severity::Error), issue(Severity::Warning)]));
        let mut second = SheetReport::new("B", 1);
        second.tables.push(table_report("B", 1, Vec::new()));
        second.failures.push(FailureRecord::from(&TableError::Patch {
            origin: TableOrigin::new("in.xlsx", "B", 1, 1),
            hook: "fixer".to_string(),
            source: PatchError::NotPassthrough { index: 3 },
        }));
        report.sheets = vec![first, second];

        assert_eq!(report.table_count(), 2);
        assert_eq!(report.issue_count(Severity::Error), 1);
        assert_eq!(report.issue_count(Severity::Warning), 1);
        assert_eq!(report.failure_count(), 1);

        let by_origin = report.issues_by_origin();
        assert_eq!(by_origin.len(), 1);
        let (origin, issues) = by_origin.iter().next().unwrap();
        assert_eq!(origin.sheet_name(), "A");
        assert_eq!(issues.len(), 2);

        let failure = report.all_failures().next().unwrap();
        assert_eq!(failure.stage, "on_table_mapped");
        assert_eq!(failure.rule.as_deref(), Some("not_passthrough"));
    }

    #[test]
    fn test_json_omits_empty_optionals() {
        let mut report = RunReport::new(Path::new("in.xlsx"), Path::new("out.xlsx"));
        report.sheets.push(SheetReport::new("A", 0));
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let sheet = &json["sheets"][0];
        assert_eq!(sheet["name"], "A");
        assert!(sheet.get("detection_error").is_none());
        assert!(sheet.get("skipped").is_none());
    }
}

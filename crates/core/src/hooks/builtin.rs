use super::{Hook, TableWrittenContext};
use crate::model::Severity;
use crate::output::CellStyle;
use std::collections::BTreeMap;

/// Fills cells that have validation issues and attaches the issue messages
/// as notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightIssues {
    pub error_fill: u32,
    pub warning_fill: u32,
    pub notes: bool,
}

impl HighlightIssues {
    pub const NAME: &'static str = "highlight_issues";
}

impl Default for HighlightIssues {
    fn default() -> Self {
        Self {
            error_fill: 0xFF_C7_CE,
            warning_fill: 0xFF_EB_9C,
            notes: true,
        }
    }
}

impl Hook for HighlightIssues {
    fn on_table_written(&self, ctx: &mut TableWrittenContext<'_>) -> anyhow::Result<()> {
        let mut cells: BTreeMap<(u32, u32), (Severity, Vec<String>)> = BTreeMap::new();
        for issue in ctx.table().issues() {
            let Some(col) = ctx.table().column_index(&issue.field) else {
                continue;
            };
            let entry = cells
                .entry((issue.row as u32 + 1, col as u32))
                .or_insert((issue.severity, Vec::new()));
            entry.0 = entry.0.max(issue.severity);
            entry.1.push(format!("{}: {}", issue.code, issue.message));
        }

        let annotator = ctx.annotator();
        for ((row, col), (severity, messages)) in cells {
            let fill = match severity {
                Severity::Error => self.error_fill,
                Severity::Warning => self.warning_fill,
            };
            annotator.style_cell(row, col, CellStyle::new().fill_color(fill))?;
            if self.notes {
                annotator.note(row, col, messages.join("\n"))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookState;
    use crate::model::{ColumnMapping, NormalizedTable, TableOrigin, TablePlacement, ValidationIssue};
    use crate::output::OutputWorkbook;
    use crate::render::Renderer;
    use tablemill_sheet::CellValue;

    fn issue(field: &str, row: usize, severity: Severity, code: &str) -> ValidationIssue {
        ValidationIssue {
            field: field.to_string(),
            row,
            severity,
            code: code.to_string(),
            message: "bad".to_string(),
        }
    }

    #[test]
    fn test_highlights_issue_cells() {
        let table = NormalizedTable::new(
            vec!["name".into(), "email".into()],
            vec![
                vec![CellValue::from("Ann"), CellValue::from("nope")],
                vec![CellValue::Empty, CellValue::from("b@x.io")],
            ],
            vec![
                issue("email", 0, Severity::Warning, "validate.pattern"),
                issue("email", 0, Severity::Error, "validate.email"),
                issue("name", 1, Severity::Error, "validate.required"),
                issue("gone", 0, Severity::Error, "validate.required"),
            ],
        );
        let mut book = OutputWorkbook::new(["Data"]);
        let placement: TablePlacement = Renderer::default()
            .write_table(book.sheet_mut(0).unwrap(), &table)
            .unwrap();

        let origin = TableOrigin::new("in.xlsx", "Data", 0, 0);
        let mapping = ColumnMapping::new(Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let mut state = HookState::new();
        let annotator = book.annotate(&placement).unwrap();
        let mut ctx = TableWrittenContext::new(&origin, &mapping, &table, annotator, &mut state);
        HighlightIssues::default().on_table_written(&mut ctx).unwrap();

        let annotator = ctx.annotator();
        assert_eq!(annotator.style_at(1, 1).and_then(|s| s.fill_color), Some(0xFF_C7_CE));
        assert_eq!(
            annotator.note_at(1, 1),
            Some("validate.pattern: bad\nvalidate.email: bad")
        );
        assert_eq!(annotator.style_at(2, 0).and_then(|s| s.fill_color), Some(0xFF_C7_CE));
        assert!(annotator.style_at(0, 0).is_some_and(|s| s.bold && s.fill_color.is_none()));
        assert!(annotator.style_at(1, 0).is_none());
        assert!(book.to_bytes().is_ok());
    }
}

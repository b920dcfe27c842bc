//! Finding table regions on a worksheet.

use crate::error::{ConfigError, DetectionError};
use crate::model::TableRegion;
use serde::{Deserialize, Serialize};
use tablemill_sheet::{CellRange, Grid, ValueKind};

/// Region detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Rows in each table's header band.
    pub header_rows: u32,
    /// Joins the parts of a stacked header.
    pub header_separator: String,
    /// Non-empty cells a row needs to be a header candidate.
    pub min_header_cells: usize,
    /// Share of a candidate's non-empty cells that must be text.
    pub min_text_ratio: f64,
    /// Blank rows that end a table body.
    pub blank_rows_between_tables: u32,
    /// Fixed regions; when set, heuristics are not used.
    pub regions: Option<Vec<FixedRegionSpec>>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            header_rows: 1,
            header_separator: " ".to_string(),
            min_header_cells: 2,
            min_text_ratio: 0.5,
            blank_rows_between_tables: 1,
            regions: None,
        }
    }
}

/// A configured region, optionally limited to one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedRegionSpec {
    #[serde(default)]
    pub sheet: Option<String>,
    /// A1 range such as `B2:F40`.
    pub range: String,
    #[serde(default)]
    pub header_rows: Option<u32>,
}

/// Finds the tables on a sheet.
///
/// Implementations return regions in reading order (top-to-bottom, then
/// left-to-right). The engine rejects overlapping results.
pub trait RegionDetector: Send + Sync {
    /// Detect table regions on one sheet.
    ///
    /// # Errors
    ///
    /// Returns an error when the sheet's layout cannot be resolved.
    fn detect(&self, grid: &Grid) -> Result<Vec<TableRegion>, DetectionError>;
}

/// Build the detector described by a config: fixed regions when any are
/// configured, header heuristics otherwise.
///
/// # Errors
///
/// Returns an error when a fixed region is not a valid A1 range.
pub fn detector_from_config(config: &DetectionConfig) -> Result<Box<dyn RegionDetector>, ConfigError> {
    match &config.regions {
        Some(specs) => Ok(Box::new(FixedRegionDetector::from_specs(
            specs,
            config.header_rows,
        )?)),
        None => Ok(Box::new(HeaderRowDetector::new(config.clone()))),
    }
}

/// Check that no two regions share a cell.
///
/// # Errors
///
/// Returns [`DetectionError::Overlap`] naming the first overlapping pair.
pub fn ensure_disjoint(sheet: &str, regions: &[TableRegion]) -> Result<(), DetectionError> {
    for (i, first) in regions.iter().enumerate() {
        if let Some(second) = regions[i + 1..].iter().find(|r| r.overlaps(first)) {
            return Err(DetectionError::Overlap {
                sheet: sheet.to_string(),
                first: first.to_string(),
                second: second.to_string(),
            });
        }
    }
    Ok(())
}

/// Heuristic detector: a table starts at a header-like row and runs until
/// a run of blank rows.
#[derive(Debug, Clone)]
pub struct HeaderRowDetector {
    config: DetectionConfig,
}

impl HeaderRowDetector {
    #[must_use]
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// A row looks like a header when it has enough non-empty cells and
    /// most of them are text rather than numbers or dates.
    fn is_header_candidate(&self, grid: &Grid, row: u32) -> bool {
        let Some((first, last)) = grid.row_extent(row) else {
            return false;
        };
        let (mut filled, mut text) = (0usize, 0usize);
        for cell in grid.row_cells(row, first, last) {
            match cell.kind() {
                ValueKind::Empty => {}
                ValueKind::Text => {
                    filled += 1;
                    text += 1;
                }
                _ => filled += 1,
            }
        }
        let ratio = text as f64 / filled.max(1) as f64;
        filled >= self.config.min_header_cells.max(1) && ratio >= self.config.min_text_ratio
    }

    /// Column span of a header band starting at `row`, if `row` is a header
    /// candidate and every band row below it has content.
    fn header_band(&self, grid: &Grid, row: u32) -> Option<(u32, u32)> {
        let band = self.config.header_rows.max(1);
        let last = row.checked_add(band - 1)?;
        if last > grid.max_row() || !self.is_header_candidate(grid, row) {
            return None;
        }
        let mut span: Option<(u32, u32)> = None;
        for r in row..=last {
            let (first_col, last_col) = grid.row_extent(r)?;
            span = Some(match span {
                Some((a, b)) => (a.min(first_col), b.max(last_col)),
                None => (first_col, last_col),
            });
        }
        span
    }
}

impl Default for HeaderRowDetector {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

impl RegionDetector for HeaderRowDetector {
    fn detect(&self, grid: &Grid) -> Result<Vec<TableRegion>, DetectionError> {
        let band = self.config.header_rows.max(1);
        let gap = self.config.blank_rows_between_tables.max(1);
        let max_row = grid.max_row();
        let mut regions = Vec::new();

        let mut row = 1;
        while row <= max_row {
            let Some((first_col, last_col)) = self.header_band(grid, row) else {
                row += 1;
                continue;
            };

            let header_end = row + band - 1;
            let mut last_row = header_end;
            let mut blank_run = 0;
            for r in header_end + 1..=max_row {
                if grid.is_row_blank(r, first_col, last_col) {
                    blank_run += 1;
                    if blank_run >= gap {
                        break;
                    }
                } else {
                    blank_run = 0;
                    last_row = r;
                }
            }

            let region = TableRegion::new(CellRange::new(row, first_col, last_row, last_col), band);
            tracing::debug!(sheet = grid.name(), region = %region, "detected table region");
            regions.push(region);
            row = last_row + 1;
        }

        Ok(regions)
    }
}

/// Returns configured regions instead of guessing.
#[derive(Debug, Clone, Default)]
pub struct FixedRegionDetector {
    regions: Vec<(Option<String>, TableRegion)>,
}

impl FixedRegionDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region for every sheet (`sheet = None`) or one named sheet.
    #[must_use]
    pub fn with_region(mut self, sheet: Option<&str>, region: TableRegion) -> Self {
        self.regions.push((sheet.map(str::to_string), region));
        self
    }

    /// Build from config entries.
    ///
    /// # Errors
    ///
    /// Returns an error when a range is not valid A1 notation.
    pub fn from_specs(specs: &[FixedRegionSpec], default_header_rows: u32) -> Result<Self, ConfigError> {
        let mut detector = Self::new();
        for spec in specs {
            let bounds: CellRange = spec.range.parse().map_err(|source| ConfigError::Region {
                region: spec.range.clone(),
                source,
            })?;
            let region = TableRegion::new(bounds, spec.header_rows.unwrap_or(default_header_rows));
            detector = detector.with_region(spec.sheet.as_deref(), region);
        }
        Ok(detector)
    }
}

impl RegionDetector for FixedRegionDetector {
    fn detect(&self, grid: &Grid) -> Result<Vec<TableRegion>, DetectionError> {
        let mut regions: Vec<TableRegion> = self
            .regions
            .iter()
            .filter(|(sheet, _)| sheet.as_deref().map_or(true, |s| s == grid.name()))
            .map(|(_, region)| *region)
            .collect();
        regions.sort_by_key(|r| (r.min_row(), r.min_col()));
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablemill_sheet::CellValue;

    fn grid(rows: Vec<Vec<CellValue>>) -> Grid {
        Grid::from_rows("Data", rows)
    }

    fn text(s: &str) -> CellValue {
        CellValue::from(s)
    }

    #[test]
    fn test_two_tables_separated_by_blank_rows() {
        let e = CellValue::Empty;
        let g = grid(vec![
            vec![text("Name"), text("Amount")],
            vec![text("A"), CellValue::Int(1)],
            vec![text("B"), CellValue::Int(2)],
            vec![e.clone(), e.clone()],
            vec![e.clone(), e.clone()],
            vec![text("Name"), text("Amount")],
            vec![text("C"), CellValue::Int(3)],
            vec![text("D"), CellValue::Int(4)],
        ]);
        let regions = HeaderRowDetector::default().detect(&g).unwrap();
        let ranges: Vec<String> = regions.iter().map(ToString::to_string).collect();
        assert_eq!(ranges, vec!["A1:B3", "A6:B8"]);
        assert!(ensure_disjoint("Data", &regions).is_ok());
    }

    #[test]
    fn test_title_row_and_numeric_rows_are_not_headers() {
        let e = CellValue::Empty;
        let g = grid(vec![
            vec![text("Quarterly report"), e.clone(), e.clone()],
            vec![e.clone(), e.clone(), e.clone()],
            vec![CellValue::Int(1), CellValue::Int(2), CellValue::Int(3)],
            vec![e.clone(), e.clone(), e.clone()],
            vec![e.clone(), text("Region"), text("Sales")],
            vec![e.clone(), text("North"), CellValue::Float(1.5)],
        ]);
        let regions = HeaderRowDetector::default().detect(&g).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].to_string(), "B5:C6");
    }

    #[test]
    fn test_wider_gap_keeps_table_together() {
        let e = CellValue::Empty;
        let g = grid(vec![
            vec![text("Name"), text("City")],
            vec![text("A"), text("X")],
            vec![e.clone(), e.clone()],
            vec![text("B"), text("Y")],
        ]);
        let config = DetectionConfig {
            blank_rows_between_tables: 2,
            ..DetectionConfig::default()
        };
        let regions = HeaderRowDetector::new(config).detect(&g).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].to_string(), "A1:B4");
    }

    #[test]
    fn test_stacked_header_band() {
        let e = CellValue::Empty;
        let g = grid(vec![
            vec![text("Customer"), e.clone(), text("Order")],
            vec![text("Name"), text("Email"), text("Total")],
            vec![text("Ann"), text("a@x.io"), CellValue::Int(3)],
        ]);
        let config = DetectionConfig {
            header_rows: 2,
            ..DetectionConfig::default()
        };
        let regions = HeaderRowDetector::new(config).detect(&g).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].header_rows(), 2);
        assert_eq!(regions[0].to_string(), "A1:C3");
    }

    #[test]
    fn test_title_above_stacked_header_is_skipped() {
        let e = CellValue::Empty;
        let g = grid(vec![
            vec![text("Customer export"), e.clone(), e.clone()],
            vec![text("Customer"), e.clone(), text("Order")],
            vec![text("Name"), text("Email"), text("Total")],
            vec![text("Ann"), text("a@x.io"), CellValue::Int(3)],
        ]);
        let config = DetectionConfig {
            header_rows: 2,
            ..DetectionConfig::default()
        };
        let regions = HeaderRowDetector::new(config).detect(&g).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].to_string(), "A2:C4");
        assert_eq!(regions[0].body_first_row(), 4);
    }

    #[test]
    fn test_numeric_only_sheet_has_no_regions() {
        let g = grid(vec![
            vec![CellValue::Int(1), CellValue::Int(2), CellValue::Int(3)],
            vec![CellValue::Float(4.5), CellValue::Int(5), CellValue::Int(6)],
            vec![CellValue::Int(7), CellValue::Int(8), CellValue::Float(9.5)],
        ]);
        let regions = HeaderRowDetector::default().detect(&g).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_header_only_table() {
        let g = grid(vec![vec![text("Name"), text("City")]]);
        let regions = HeaderRowDetector::default().detect(&g).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].to_string(), "A1:B1");
    }

    #[test]
    fn test_fixed_regions_and_overlap() {
        let specs = vec![
            FixedRegionSpec {
                sheet: None,
                range: "A5:B6".into(),
                header_rows: None,
            },
            FixedRegionSpec {
                sheet: Some("Other".into()),
                range: "D1:E2".into(),
                header_rows: None,
            },
            FixedRegionSpec {
                sheet: Some("Data".into()),
                range: "A1:C6".into(),
                header_rows: Some(2),
            },
        ];
        let detector = FixedRegionDetector::from_specs(&specs, 1).unwrap();
        let regions = detector.detect(&Grid::new("Data")).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].to_string(), "A1:C6");
        assert_eq!(regions[0].header_rows(), 2);

        let err = ensure_disjoint("Data", &regions).unwrap_err();
        assert!(matches!(err, DetectionError::Overlap { .. }));
    }

    #[test]
    fn test_bad_fixed_region() {
        let specs = vec![FixedRegionSpec {
            sheet: None,
            range: "nonsense".into(),
            header_rows: None,
        }];
        assert!(matches!(
            FixedRegionDetector::from_specs(&specs, 1),
            Err(ConfigError::Region { .. })
        ));
    }
}

use proptest::prelude::*;
use std::collections::HashSet;
use tablemill_core::mapper::DetectorSet;
use tablemill_core::patch::apply;
use tablemill_core::sheet::CellRange;
use tablemill_core::{
    CanonicalSchema, ColumnDetector, ColumnMapper, ColumnMapping, ColumnMappingPatch, ColumnView,
    ExtractedTable, FieldSchema, PatternCache, Score, TableOrigin, TableRegion,
};

/// Scores each column with a fixed value for one field.
struct FixedScores {
    field: String,
    scores: Vec<f64>,
}

impl ColumnDetector for FixedScores {
    fn field(&self) -> &str {
        &self.field
    }

    fn score(&self, column: &ColumnView<'_>) -> Score {
        Score::Single(self.scores.get(column.index()).copied().unwrap_or(0.0))
    }
}

fn table(header: Vec<String>) -> ExtractedTable {
    let width = header.len().max(1) as u32;
    ExtractedTable::new(
        TableOrigin::new("prop.xlsx", "Data", 0, 0),
        TableRegion::new(CellRange::new(1, 1, 1, width), 1),
        header,
        Vec::new(),
    )
}

fn field_schema(count: usize) -> CanonicalSchema {
    CanonicalSchema::new((0..count).map(|i| FieldSchema::new(format!("f{i}"))).collect())
}

fn assert_consistent(mapping: &ColumnMapping, schema: &CanonicalSchema, width: usize) {
    let mut sources = HashSet::new();
    for field in mapping.fields() {
        assert!(schema.field(&field.field).is_some(), "unknown field {}", field.field);
        if let Some(index) = field.source_index {
            assert!(index < width);
            assert!(sources.insert(index), "column {index} mapped twice");
        }
    }
    for passthrough in mapping.passthrough() {
        assert!(sources.insert(passthrough.source_index), "passthrough overlaps");
    }
    for dropped in mapping.dropped() {
        assert!(sources.insert(*dropped), "dropped overlaps");
    }
    let header = mapping.output_header();
    let unique: HashSet<&String> = header.iter().collect();
    assert_eq!(unique.len(), header.len());
}

/// (fields, columns, scores[field][column])
fn score_grid() -> impl Strategy<Value = (usize, usize, Vec<Vec<f64>>)> {
    (1usize..6, 1usize..8).prop_flat_map(|(fields, columns)| {
        let score = prop_oneof![Just(0.0), Just(0.5), Just(1.0), -1.0f64..2.0];
        (
            Just(fields),
            Just(columns),
            prop::collection::vec(prop::collection::vec(score, columns), fields),
        )
    })
}

proptest! {
    #[test]
    fn no_two_fields_share_a_column((fields, columns, scores) in score_grid(), threshold in 0.0f64..1.5) {
        let schema = field_schema(fields).with_threshold(threshold);
        let mut mapper = ColumnMapper::new(DetectorSet::new());
        for (i, scores) in scores.into_iter().enumerate() {
            mapper.add_detector(Box::new(FixedScores { field: format!("f{i}"), scores }));
        }
        let header: Vec<String> = (0..columns).map(|c| format!("c{c}")).collect();
        let mapping = mapper.propose(&table(header), &schema);

        assert_consistent(&mapping, &schema, columns);
        for field in mapping.fields() {
            let score = field.score.unwrap_or_default();
            prop_assert!(score > 0.0 && score >= threshold);
        }
        prop_assert_eq!(
            mapping.fields().len() + mapping.passthrough().len() + mapping.dropped().len(),
            columns
        );
    }

    #[test]
    fn ties_follow_declaration_order(
        columns in (1usize..5, 0usize..4)
            .prop_flat_map(|(ties, others)| {
                let mut header: Vec<String> = vec!["Value".to_string(); ties];
                header.extend((0..others).map(|i| format!("other {i}")));
                Just(header).prop_shuffle()
            })
    ) {
        let ties = columns.iter().filter(|h| *h == "Value").count();
        let schema = CanonicalSchema::new(
            (0..ties + 1)
                .map(|i| FieldSchema::new(format!("f{i}")).with_synonyms(["value"]))
                .collect(),
        );
        let mapper = ColumnMapper::from_schema(&schema, &mut PatternCache::new()).unwrap();
        let mapping = mapper.propose(&table(columns.clone()), &schema);

        let value_columns: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, h)| *h == "Value")
            .map(|(i, _)| i)
            .collect();
        for (nth, column) in value_columns.iter().enumerate() {
            let field = format!("f{nth}");
            prop_assert_eq!(mapping.source_index_of(&field), Some(*column));
        }
        let tie_field = format!("f{ties}");
        prop_assert!(mapping.field(&tie_field).is_none());
    }

    #[test]
    fn empty_patch_is_identity(
        header in prop::collection::vec(
            prop::sample::select(vec!["Name", "Email", "Amount", "Misc", "", "name"]),
            0..7,
        ),
        append in any::<bool>(),
        missing in any::<bool>(),
    ) {
        let schema = CanonicalSchema::new(vec![
            FieldSchema::new("name"),
            FieldSchema::new("email"),
            FieldSchema::new("amount"),
        ])
        .with_unmapped_columns(append)
        .with_missing_fields(missing);
        let header: Vec<String> = header.into_iter().map(str::to_string).collect();
        let mapping = ColumnMapper::from_schema(&schema, &mut PatternCache::new())
            .unwrap()
            .propose(&table(header), &schema);

        let patched = apply(&mapping, &ColumnMappingPatch::new(), &schema).unwrap();
        prop_assert_eq!(patched, mapping);
    }

    #[test]
    fn patches_apply_fully_or_not_at_all(
        assigns in prop::collection::vec(
            (prop::sample::select(vec!["name", "email", "amount", "ghost"]), 0usize..6),
            0..4,
        ),
        unmaps in prop::collection::vec(prop::sample::select(vec!["name", "email", "ghost"]), 0..2),
        drops in prop::collection::vec(0usize..6, 0..3),
    ) {
        let schema = CanonicalSchema::new(vec![
            FieldSchema::new("name"),
            FieldSchema::new("email"),
            FieldSchema::new("amount"),
        ]);
        let header: Vec<String> = ["Name", "Misc", "Email", "Notes", "Other"]
            .iter()
            .map(|h| (*h).to_string())
            .collect();
        let width = header.len();
        let mapping = ColumnMapper::from_schema(&schema, &mut PatternCache::new())
            .unwrap()
            .propose(&table(header), &schema);
        let before = mapping.clone();

        let mut patch = ColumnMappingPatch::new();
        for (field, index) in assigns {
            patch = patch.assign(field, index);
        }
        for field in unmaps {
            patch = patch.unmap(field);
        }
        for index in drops {
            patch = patch.drop_passthrough(index);
        }

        match apply(&mapping, &patch, &schema) {
            Ok(patched) => {
                assert_consistent(&patched, &schema, width);
                for (field, index) in &patch.assign {
                    prop_assert_eq!(patched.source_index_of(field), Some(*index));
                }
            }
            Err(err) => prop_assert!(!err.rule().is_empty()),
        }
        prop_assert_eq!(mapping, before);
    }
}

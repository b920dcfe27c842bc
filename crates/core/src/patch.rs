//! Validated edits to a column mapping.
//!
//! A [`ColumnMappingPatch`] comes from a hook on `on_table_mapped` (for
//! example a review step). [`apply`] checks the whole patch before building
//! anything, so a rejected patch leaves the mapping exactly as it was.

use crate::error::PatchError;
use crate::mapper::{route_unmapped, unique_name};
use crate::model::{ColumnMapping, MappedField, PassthroughField};
use crate::schema::CanonicalSchema;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Change-set for a [`ColumnMapping`]. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMappingPatch {
    /// Canonical field → source column index.
    pub assign: IndexMap<String, usize>,
    /// Canonical fields to remove from the mapping.
    pub unmap: Vec<String>,
    /// Output order for (a prefix of) the mapped fields.
    pub order: Option<Vec<String>>,
    pub passthrough: PassthroughPatch,
}

/// Edits to passthrough columns, addressed by source column index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughPatch {
    pub rename: IndexMap<usize, String>,
    pub drop: Vec<usize>,
}

impl ColumnMappingPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn assign(mut self, field: impl Into<String>, source_index: usize) -> Self {
        self.assign.insert(field.into(), source_index);
        self
    }

    #[must_use]
    pub fn unmap(mut self, field: impl Into<String>) -> Self {
        self.unmap.push(field.into());
        self
    }

    #[must_use]
    pub fn order<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn rename_passthrough(mut self, source_index: usize, name: impl Into<String>) -> Self {
        self.passthrough.rename.insert(source_index, name.into());
        self
    }

    #[must_use]
    pub fn drop_passthrough(mut self, source_index: usize) -> Self {
        self.passthrough.drop.push(source_index);
        self
    }

    /// True when the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assign.is_empty()
            && self.unmap.is_empty()
            && self.order.is_none()
            && self.passthrough.rename.is_empty()
            && self.passthrough.drop.is_empty()
    }
}

/// Apply a patch, returning a new mapping.
///
/// Checks run in this order: field names exist and are not both assigned
/// and unmapped; assigned indices are in range; no source column feeds two
/// fields; `order` is unique and names mapped fields; passthrough drops and
/// renames address passthrough columns; output names are unique. Columns
/// freed by the patch follow the schema's unmapped-column rule.
///
/// # Errors
///
/// Returns the first violated rule. The input mapping is never modified.
pub fn apply(
    mapping: &ColumnMapping,
    patch: &ColumnMappingPatch,
    schema: &CanonicalSchema,
) -> Result<ColumnMapping, PatchError> {
    if patch.is_empty() {
        return Ok(mapping.clone());
    }
    let headers = mapping.source_headers();
    let width = headers.len();

    for field in patch.assign.keys().chain(&patch.unmap) {
        if schema.field(field).is_none() {
            return Err(PatchError::UnknownField {
                field: field.clone(),
            });
        }
    }
    if let Some(field) = patch.unmap.iter().find(|f| patch.assign.contains_key(*f)) {
        return Err(PatchError::ConflictingInstruction {
            field: field.clone(),
        });
    }
    for (field, &index) in &patch.assign {
        if index >= width {
            return Err(PatchError::SourceIndexOutOfRange {
                field: field.clone(),
                index,
                width,
            });
        }
    }

    let mut fields: Vec<MappedField> = mapping
        .fields()
        .iter()
        .filter(|f| !patch.unmap.contains(&f.field))
        .cloned()
        .collect();
    for (field, &index) in &patch.assign {
        let assigned = MappedField {
            field: field.clone(),
            source_index: Some(index),
            source_header: Some(headers[index].clone()),
            score: None,
        };
        match fields.iter_mut().find(|f| f.field == *field) {
            Some(existing) => *existing = assigned,
            None => fields.push(assigned),
        }
    }

    let mut owners: HashMap<usize, &str> = HashMap::new();
    for field in &fields {
        if let Some(index) = field.source_index {
            if let Some(first) = owners.insert(index, &field.field) {
                return Err(PatchError::DuplicateAssignment {
                    index,
                    first: first.to_string(),
                    second: field.field.clone(),
                });
            }
        }
    }

    if let Some(order) = &patch.order {
        fields = reorder(fields, order, schema)?;
    }

    // Recompute passthrough: claimed columns leave it, freed columns join
    // it (or the dropped list) under the schema's policy
    let claimed: HashSet<usize> = fields.iter().filter_map(|f| f.source_index).collect();
    let freed: Vec<usize> = mapping
        .fields()
        .iter()
        .filter_map(|f| f.source_index)
        .filter(|i| !claimed.contains(i))
        .collect();

    let mut passthrough: Vec<PassthroughField> = mapping
        .passthrough()
        .iter()
        .filter(|p| !claimed.contains(&p.source_index))
        .cloned()
        .collect();
    let mut dropped: Vec<usize> = mapping
        .dropped()
        .iter()
        .copied()
        .filter(|i| !claimed.contains(i))
        .collect();

    let mut taken: HashSet<String> = fields
        .iter()
        .map(|f| f.field.clone())
        .chain(passthrough.iter().map(|p| p.output_name.clone()))
        .collect();
    let (joined, newly_dropped) = route_unmapped(&freed, headers, schema, &mut taken);
    passthrough.extend(joined);
    dropped.extend(newly_dropped);

    for &index in &patch.passthrough.drop {
        let Some(position) = passthrough.iter().position(|p| p.source_index == index) else {
            return Err(PatchError::NotPassthrough { index });
        };
        passthrough.remove(position);
        dropped.push(index);
    }
    for (&index, name) in &patch.passthrough.rename {
        let Some(column) = passthrough.iter_mut().find(|p| p.source_index == index) else {
            return Err(PatchError::NotPassthrough { index });
        };
        column.output_name.clone_from(name);
    }

    passthrough.sort_by_key(|p| p.source_index);
    dropped.sort_unstable();
    dropped.dedup();

    let mut names = HashSet::new();
    for name in fields
        .iter()
        .map(|f| &f.field)
        .chain(passthrough.iter().map(|p| &p.output_name))
    {
        if !names.insert(name) {
            return Err(PatchError::DuplicateOutputName { name: name.clone() });
        }
    }

    tracing::debug!(
        fields = fields.len(),
        passthrough = passthrough.len(),
        dropped = dropped.len(),
        "applied mapping patch"
    );
    Ok(ColumnMapping::new(fields, passthrough, dropped, headers.to_vec()))
}

/// Listed fields first in the given order, the rest keep their relative
/// order.
fn reorder(
    fields: Vec<MappedField>,
    order: &[String],
    schema: &CanonicalSchema,
) -> Result<Vec<MappedField>, PatchError> {
    let mut seen = HashSet::new();
    for name in order {
        if !seen.insert(name.as_str()) {
            return Err(PatchError::InvalidOrder {
                field: name.clone(),
                reason: "listed more than once".to_string(),
            });
        }
        if schema.field(name).is_none() {
            return Err(PatchError::InvalidOrder {
                field: name.clone(),
                reason: "not a schema field".to_string(),
            });
        }
        if !fields.iter().any(|f| f.field == *name) {
            return Err(PatchError::InvalidOrder {
                field: name.clone(),
                reason: "field is not mapped".to_string(),
            });
        }
    }

    let (mut listed, rest): (Vec<_>, Vec<_>) = fields
        .into_iter()
        .partition(|f| seen.contains(f.field.as_str()));
    listed.sort_by_key(|f| order.iter().position(|o| *o == f.field));
    listed.extend(rest);
    Ok(listed)
}

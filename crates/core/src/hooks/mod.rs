//! Extension hooks.
//!
//! Hooks are invoked at six checkpoints of a run:
//!
//! ```text
//! on_workbook_start
//!   on_sheet_start                      (per sheet)
//!     on_table_detected                 (per table)
//!     on_table_mapped   -> Option<ColumnMappingPatch>
//!     on_table_written
//! on_workbook_before_save
//! ```
//!
//! Hooks for one event run by priority (highest first), then by name, then
//! by registration order. Patches returned from `on_table_mapped` are
//! applied one at a time, so each hook sees the mapping left by the hooks
//! before it.

mod builtin;
mod context;
mod manifest;

pub use builtin::HighlightIssues;
pub use context::{
    BeforeSaveContext, HookState, RunContext, SheetContext, TableDetectedContext,
    TableMappedContext, TableWrittenContext,
};
pub use manifest::{HookCatalog, HookEntry, HookManifest};

use crate::error::{ConfigError, HookError, TableError};
use crate::model::{ColumnMapping, ExtractedTable, TableOrigin};
use crate::patch::{self, ColumnMappingPatch};
use crate::schema::CanonicalSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Lifecycle checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    OnWorkbookStart,
    OnSheetStart,
    OnTableDetected,
    OnTableMapped,
    OnTableWritten,
    OnWorkbookBeforeSave,
}

impl HookEvent {
    /// Every event in firing order.
    pub const ALL: [HookEvent; 6] = [
        HookEvent::OnWorkbookStart,
        HookEvent::OnSheetStart,
        HookEvent::OnTableDetected,
        HookEvent::OnTableMapped,
        HookEvent::OnTableWritten,
        HookEvent::OnWorkbookBeforeSave,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::OnWorkbookStart => "on_workbook_start",
            HookEvent::OnSheetStart => "on_sheet_start",
            HookEvent::OnTableDetected => "on_table_detected",
            HookEvent::OnTableMapped => "on_table_mapped",
            HookEvent::OnTableWritten => "on_table_written",
            HookEvent::OnWorkbookBeforeSave => "on_workbook_before_save",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownEvent(s.to_string()))
    }
}

/// Extension code called during a run.
///
/// Every method defaults to doing nothing, so a hook only implements the
/// events it cares about. Errors abort the current table, sheet or run
/// depending on the engine's error policy.
#[allow(unused_variables)]
pub trait Hook: Send + Sync {
    fn on_workbook_start(&self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_sheet_start(&self, ctx: &mut SheetContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_table_detected(&self, ctx: &mut TableDetectedContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Optionally return a patch for the current mapping.
    fn on_table_mapped(
        &self,
        ctx: &mut TableMappedContext<'_>,
    ) -> anyhow::Result<Option<ColumnMappingPatch>> {
        Ok(None)
    }

    /// Style or annotate the table just written.
    fn on_table_written(&self, ctx: &mut TableWrittenContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_workbook_before_save(&self, ctx: &mut BeforeSaveContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct Registration {
    name: String,
    priority: i32,
    seq: usize,
    hook: Arc<dyn Hook>,
}

/// Hooks per event, kept in dispatch order.
#[derive(Clone, Default)]
pub struct HookRegistry {
    events: BTreeMap<HookEvent, Vec<Registration>>,
    next_seq: usize,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (event, regs) in &self.events {
            let names: Vec<(&str, i32)> = regs.iter().map(|r| (r.name.as_str(), r.priority)).collect();
            map.entry(event, &names);
        }
        map.finish()
    }
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for one event.
    pub fn register(
        &mut self,
        event: HookEvent,
        name: impl Into<String>,
        priority: i32,
        hook: Arc<dyn Hook>,
    ) -> &mut Self {
        let registration = Registration {
            name: name.into(),
            priority,
            seq: self.next_seq,
            hook,
        };
        self.next_seq += 1;
        let regs = self.events.entry(event).or_default();
        regs.push(registration);
        regs.sort_by_key(|r| (Reverse(r.priority), r.name.clone(), r.seq));
        self
    }

    /// Register a hook for every event.
    pub fn register_all(&mut self, name: impl Into<String>, priority: i32, hook: Arc<dyn Hook>) -> &mut Self {
        let name = name.into();
        for event in HookEvent::ALL {
            self.register(event, name.clone(), priority, Arc::clone(&hook));
        }
        self
    }

    /// Resolve a manifest against a catalog of named hooks.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown event names or hooks missing from the
    /// catalog.
    pub fn from_manifest(manifest: &HookManifest, catalog: &HookCatalog) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.extend_from_manifest(manifest, catalog)?;
        Ok(registry)
    }

    /// Add the hooks named in a manifest to this registry.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown event names or hooks missing from the
    /// catalog. Nothing is registered in that case.
    pub fn extend_from_manifest(&mut self, manifest: &HookManifest, catalog: &HookCatalog) -> Result<(), ConfigError> {
        let mut resolved = Vec::new();
        for (event, entries) in manifest.entries() {
            let event: HookEvent = event.parse()?;
            for entry in entries {
                let hook = catalog.get(&entry.hook).ok_or_else(|| ConfigError::UnknownHook {
                    name: entry.hook.clone(),
                    event,
                })?;
                resolved.push((event, entry.hook.clone(), entry.priority, hook));
            }
        }
        for (event, name, priority, hook) in resolved {
            self.register(event, name, priority, hook);
        }
        Ok(())
    }

    /// Names and priorities for one event, in dispatch order.
    pub fn hooks_for(&self, event: HookEvent) -> impl Iterator<Item = (&str, i32)> {
        self.registrations(event).iter().map(|r| (r.name.as_str(), r.priority))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn registrations(&self, event: HookEvent) -> &[Registration] {
        self.events.get(&event).map(Vec::as_slice).unwrap_or_default()
    }

    /// Call each hook of `event` in order, stopping at the first failure.
    fn each<C>(
        &self,
        event: HookEvent,
        ctx: &mut C,
        call: impl Fn(&dyn Hook, &mut C) -> anyhow::Result<()>,
    ) -> Result<(), HookError> {
        for reg in self.registrations(event) {
            tracing::trace!(event = %event, hook = %reg.name, "calling hook");
            call(reg.hook.as_ref(), ctx).map_err(|source| HookError {
                event,
                hook: reg.name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first hook failure.
    pub fn dispatch_workbook_start(&self, ctx: &mut RunContext<'_>) -> Result<(), HookError> {
        self.each(HookEvent::OnWorkbookStart, ctx, |hook, ctx| hook.on_workbook_start(ctx))
    }

    /// # Errors
    ///
    /// Returns the first hook failure.
    pub fn dispatch_sheet_start(&self, ctx: &mut SheetContext<'_>) -> Result<(), HookError> {
        self.each(HookEvent::OnSheetStart, ctx, |hook, ctx| hook.on_sheet_start(ctx))
    }

    /// # Errors
    ///
    /// Returns the first hook failure, tagged with the table origin.
    pub fn dispatch_table_detected(&self, ctx: &mut TableDetectedContext<'_>) -> Result<(), TableError> {
        self.each(HookEvent::OnTableDetected, ctx, |hook, ctx| hook.on_table_detected(ctx))
            .map_err(|source| TableError::Hook {
                origin: ctx.origin().clone(),
                source,
            })
    }

    /// Run the `on_table_mapped` hooks, applying each returned patch before
    /// the next hook runs, and return the final mapping.
    ///
    /// # Errors
    ///
    /// Returns the first hook failure or rejected patch. The mapping passed
    /// in is dropped in that case; no partially patched mapping escapes.
    pub fn dispatch_table_mapped(
        &self,
        table: &ExtractedTable,
        schema: &CanonicalSchema,
        state: &mut HookState,
        mapping: ColumnMapping,
    ) -> Result<ColumnMapping, TableError> {
        let origin: &TableOrigin = table.origin();
        let mut current = mapping;
        for reg in self.registrations(HookEvent::OnTableMapped) {
            let returned = {
                let mut ctx = TableMappedContext::new(table, &current, schema, state);
                reg.hook.on_table_mapped(&mut ctx)
            };
            let patch = returned.map_err(|source| TableError::Hook {
                origin: origin.clone(),
                source: HookError {
                    event: HookEvent::OnTableMapped,
                    hook: reg.name.clone(),
                    source,
                },
            })?;
            let Some(patch) = patch else { continue };
            current = patch::apply(&current, &patch, schema).map_err(|source| TableError::Patch {
                origin: origin.clone(),
                hook: reg.name.clone(),
                source,
            })?;
            tracing::debug!(hook = %reg.name, header = ?current.output_header(), "applied mapping patch");
        }
        Ok(current)
    }

    /// # Errors
    ///
    /// Returns the first hook failure, tagged with the table origin.
    pub fn dispatch_table_written(&self, ctx: &mut TableWrittenContext<'_>) -> Result<(), TableError> {
        self.each(HookEvent::OnTableWritten, ctx, |hook, ctx| hook.on_table_written(ctx))
            .map_err(|source| TableError::Hook {
                origin: ctx.origin().clone(),
                source,
            })
    }

    /// # Errors
    ///
    /// Returns the first hook failure.
    pub fn dispatch_before_save(&self, ctx: &mut BeforeSaveContext<'_>) -> Result<(), HookError> {
        self.each(HookEvent::OnWorkbookBeforeSave, ctx, |hook, ctx| {
            hook.on_workbook_before_save(ctx)
        })
    }
}

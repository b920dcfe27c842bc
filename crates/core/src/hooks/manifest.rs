//! Declarative hook registration.

use super::{HighlightIssues, Hook};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One hook reference in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEntry {
    /// Name in the [`HookCatalog`].
    pub hook: String,
    #[serde(default)]
    pub priority: i32,
}

/// Event name to hooks, as written in configuration:
///
/// ```yaml
/// on_table_written:
///   - hook: highlight_issues
///     priority: 10
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookManifest {
    events: IndexMap<String, Vec<HookEntry>>,
}

impl HookManifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_hook(mut self, event: impl Into<String>, hook: impl Into<String>, priority: i32) -> Self {
        self.events.entry(event.into()).or_default().push(HookEntry {
            hook: hook.into(),
            priority,
        });
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[HookEntry])> {
        self.events.iter().map(|(event, entries)| (event.as_str(), entries.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.values().all(Vec::is_empty)
    }
}

/// Named hooks a manifest can refer to.
#[derive(Clone)]
pub struct HookCatalog {
    hooks: HashMap<String, Arc<dyn Hook>>,
}

impl Default for HookCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        catalog.register_builtin_hooks();
        catalog
    }
}

impl fmt::Debug for HookCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.hooks.keys().collect();
        names.sort();
        f.debug_struct("HookCatalog").field("hooks", &names).finish()
    }
}

impl HookCatalog {
    /// Catalog with the built-in hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog without any hooks.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    fn register_builtin_hooks(&mut self) {
        self.register(HighlightIssues::NAME, Arc::new(HighlightIssues::default()));
    }

    /// Add or replace a named hook.
    pub fn register(&mut self, name: impl Into<String>, hook: Arc<dyn Hook>) -> &mut Self {
        self.hooks.insert(name.into(), hook);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Hook>> {
        self.hooks.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hooks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::hooks::{HookEvent, HookRegistry};

    struct Noop;
    impl Hook for Noop {}

    #[test]
    fn test_manifest_from_yaml() {
        let manifest: HookManifest = serde_yaml::from_str(
            "on_table_written:\n  - hook: highlight_issues\n    priority: 10\n  - hook: audit\non_workbook_start:\n  - hook: audit\n",
        )
        .unwrap();
        let events: Vec<&str> = manifest.entries().map(|(e, _)| e).collect();
        assert_eq!(events, vec!["on_table_written", "on_workbook_start"]);

        let mut catalog = HookCatalog::new();
        catalog.register("audit", Arc::new(Noop));
        let registry = HookRegistry::from_manifest(&manifest, &catalog).unwrap();
        let written: Vec<(&str, i32)> = registry.hooks_for(HookEvent::OnTableWritten).collect();
        assert_eq!(written, vec![("highlight_issues", 10), ("audit", 0)]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_unknown_names_are_config_errors() {
        let catalog = HookCatalog::new();
        let unknown_hook = HookManifest::new().with_hook("on_sheet_start", "ghost", 0);
        assert!(matches!(
            HookRegistry::from_manifest(&unknown_hook, &catalog),
            Err(ConfigError::UnknownHook { event: HookEvent::OnSheetStart, .. })
        ));

        let unknown_event = HookManifest::new().with_hook("on_coffee", "highlight_issues", 0);
        assert!(matches!(
            HookRegistry::from_manifest(&unknown_event, &catalog),
            Err(ConfigError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_catalog_builtins() {
        assert_eq!(HookCatalog::new().names(), vec!["highlight_issues"]);
        assert!(HookCatalog::empty().names().is_empty());
    }
}

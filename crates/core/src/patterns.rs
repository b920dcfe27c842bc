use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashMap;

/// Compiled regular expressions keyed by source text.
///
/// One cache belongs to one engine build; detectors, transforms and
/// validators sharing a pattern share the compiled program.
#[derive(Debug, Clone, Default)]
pub struct PatternCache {
    compiled: HashMap<String, Regex>,
}

impl PatternCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a pattern, or return the cached program.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] when the pattern does not compile.
    pub fn get(&mut self, pattern: &str) -> Result<Regex, ConfigError> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern).map_err(|e| ConfigError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.compiled.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    /// Case-insensitive variant, cached separately.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] when the pattern does not compile.
    pub fn get_case_insensitive(&mut self, pattern: &str) -> Result<Regex, ConfigError> {
        self.get(&format!("(?i){pattern}"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

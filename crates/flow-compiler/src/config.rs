//! Configuration for the workflow compiler

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;
use crate::error::{CompileError, Result};

/// Compiler configuration
///
/// Type strictness is not configured here; it is read from the
/// workflow being compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    /// Validation rule ids to skip
    pub disabled_rules: Vec<String>,
    /// Deepest scope nesting to lower
    pub max_scope_depth: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            disabled_rules: Vec::new(),
            max_scope_depth: defaults::MAX_SCOPE_DEPTH,
        }
    }
}

impl CompilerConfig {
    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading compiler config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Whether a validation rule is enabled
    pub fn rule_enabled(&self, rule_id: &str) -> bool {
        !self.disabled_rules.iter().any(|r| r == rule_id)
    }

    fn check(&self) -> Result<()> {
        if self.max_scope_depth == 0 {
            return Err(CompileError::Config(
                "maxScopeDepth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.max_scope_depth, defaults::MAX_SCOPE_DEPTH);
        assert!(config.rule_enabled("data-flow"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CompilerConfig::from_json_str(r#"{"disabledRules": ["data-flow"]}"#).unwrap();
        assert!(!config.rule_enabled("data-flow"));
        assert!(config.rule_enabled("structural"));
        assert_eq!(config.max_scope_depth, defaults::MAX_SCOPE_DEPTH);
    }

    #[test]
    fn test_rejects_zero_depth() {
        let err = CompilerConfig::from_json_str(r#"{"maxScopeDepth": 0}"#).unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxScopeDepth": 4}}"#).unwrap();

        let config = CompilerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_scope_depth, 4);

        let missing = CompilerConfig::from_file(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(CompileError::Io(_))));
    }
}

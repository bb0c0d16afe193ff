//! Configuration for the evaluator and its function registry.
//!
//! Configuration is usually loaded once from a TOML file at startup:
//!
//! ```toml
//! [evaluator]
//! max_depth = 128
//!
//! [functions]
//! disabled = ["fallbackSeries"]
//!
//! [functions.aliases]
//! total = "sumSeries"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Limits applied while walking an expression tree.
    pub evaluator: EvaluatorConfig,
    /// Customisation of the builtin function registry.
    pub functions: FunctionsConfig,
}

/// Limits applied by the [`Evaluator`](crate::Evaluator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Maximum nesting depth of an expression tree.
    ///
    /// Trees nested deeper than this fail with
    /// [`Error::DepthExceeded`](crate::Error::DepthExceeded) instead of
    /// exhausting the stack.
    pub max_depth: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_depth() -> usize {
    256
}

/// Customisation applied on top of the builtin functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionsConfig {
    /// Builtin function names to leave out of the registry.
    pub disabled: Vec<String>,
    /// Additional names, mapped to the registered function they resolve to.
    pub aliases: BTreeMap<String, String>,
}

impl Config {
    /// Parses configuration from a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_defaults_for_empty_document() {
        // when
        let config = Config::from_toml("").unwrap();

        // then
        assert_eq!(config, Config::default());
        assert_eq!(config.evaluator.max_depth, 256);
        assert!(config.functions.disabled.is_empty());
    }

    #[test]
    fn should_parse_full_document() {
        // given
        let contents = r#"
            [evaluator]
            max_depth = 16

            [functions]
            disabled = ["movingSum"]

            [functions.aliases]
            total = "sumSeries"
        "#;

        // when
        let config = Config::from_toml(contents).unwrap();

        // then
        assert_eq!(config.evaluator.max_depth, 16);
        assert_eq!(config.functions.disabled, vec!["movingSum".to_string()]);
        assert_eq!(
            config.functions.aliases.get("total").map(String::as_str),
            Some("sumSeries")
        );
    }

    #[test]
    fn should_reject_malformed_document() {
        // when
        let result = Config::from_toml("[evaluator]\nmax_depth = \"deep\"");

        // then
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn should_report_missing_file() {
        // when
        let result = Config::load("/nonexistent/graphite.toml");

        // then
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("cannot read")));
    }
}

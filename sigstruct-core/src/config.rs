//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust,ignore
/// let config = RuntimeConfig::from_json_str(r#"{ "max_flush_iterations": 64 }"#)?;
/// let rt = Runtime::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on effect runs during one flush. Effects that keep
    /// re-triggering each other past this point are dropped with an error log.
    pub max_flush_iterations: usize,

    /// When false, reading an undeclared struct field yields
    /// `Value::Undefined` instead of `Error::UnknownField`.
    pub strict_reads: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: 10_000,
            strict_reads: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{ "max_flush_iterations": 8 }"#).unwrap();
        assert_eq!(config.max_flush_iterations, 8);
        assert!(config.strict_reads);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(
            RuntimeConfig::from_json_str("{}").unwrap(),
            RuntimeConfig::default()
        );
    }
}

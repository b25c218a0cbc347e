//! kestrel_options: resolver configuration.
//!
//! Options are read from a JSON document with camelCase keys. Every field is
//! optional; missing fields take the defaults below.

use kestrel_diagnostics::{messages, Diagnostic};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_GLOBALS_CAPACITY: u32 = 512;
pub const DEFAULT_GLOBALS_GROWTH: u32 = 512;
pub const DEFAULT_ROOT_CLASS: &str = "Object";
pub const DEFAULT_TEMP_PREFIX: &str = "temp-";
pub const DEFAULT_MAX_SCOPE_DEPTH: usize = 500;

/// Settings consumed by `ResolutionContext::with_options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverOptions {
    /// Slots reserved in the global value table up front.
    pub globals_initial_capacity: u32,
    /// Fixed number of slots added whenever the global table is full.
    pub globals_growth: u32,
    /// Name of the implicit base class of every class without a parent.
    pub root_class_name: String,
    /// Prefix of synthesized temporary names; the slot number follows it.
    pub temp_prefix: String,
    /// Upper bound on parent-chain walks.
    pub max_scope_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            globals_initial_capacity: DEFAULT_GLOBALS_CAPACITY,
            globals_growth: DEFAULT_GLOBALS_GROWTH,
            root_class_name: DEFAULT_ROOT_CLASS.to_string(),
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
            max_scope_depth: DEFAULT_MAX_SCOPE_DEPTH,
        }
    }
}

impl ResolverOptions {
    /// Reject settings the resolver cannot work with.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.globals_growth == 0 {
            return Err(OptionsError::Invalid {
                option: "globalsGrowth",
                reason: "must be greater than zero",
            });
        }
        if self.root_class_name.is_empty() {
            return Err(OptionsError::Invalid {
                option: "rootClassName",
                reason: "must not be empty",
            });
        }
        if self.temp_prefix.is_empty() {
            return Err(OptionsError::Invalid {
                option: "tempPrefix",
                reason: "must not be empty",
            });
        }
        if self.max_scope_depth == 0 {
            return Err(OptionsError::Invalid {
                option: "maxScopeDepth",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid resolver option '{option}': {reason}")]
    Invalid {
        option: &'static str,
        reason: &'static str,
    },
}

impl OptionsError {
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        match self {
            OptionsError::Invalid { option, reason } => Some(Diagnostic::new(
                &messages::INVALID_RESOLVER_OPTION_0_1,
                &[*option, *reason],
            )),
            _ => None,
        }
    }
}

/// Parse and validate options from a JSON string.
pub fn parse_options(content: &str) -> Result<ResolverOptions, OptionsError> {
    let options: ResolverOptions = serde_json::from_str(content)?;
    options.validate()?;
    Ok(options)
}

/// Parse and validate options from a file.
pub fn parse_options_file(path: impl AsRef<Path>) -> Result<ResolverOptions, OptionsError> {
    let content = std::fs::read_to_string(path)?;
    parse_options(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let options = parse_options("{}").unwrap();
        assert_eq!(options, ResolverOptions::default());
        assert_eq!(options.globals_growth, 512);
        assert_eq!(options.root_class_name, "Object");
    }

    #[test]
    fn test_camel_case_keys() {
        let options = parse_options(r#"{ "globalsGrowth": 16, "tempPrefix": "t" }"#).unwrap();
        assert_eq!(options.globals_growth, 16);
        assert_eq!(options.temp_prefix, "t");
        assert_eq!(options.globals_initial_capacity, 512);
    }

    #[test]
    fn test_zero_growth_rejected() {
        let err = parse_options(r#"{ "globalsGrowth": 0 }"#).unwrap_err();
        assert!(matches!(err, OptionsError::Invalid { option: "globalsGrowth", .. }));
        let diag = err.to_diagnostic().unwrap();
        assert_eq!(diag.code, 5001);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_options("{ nope"), Err(OptionsError::Json(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_options_file("/nonexistent/kestrel.json").unwrap_err();
        assert!(matches!(err, OptionsError::Io(_)));
    }
}

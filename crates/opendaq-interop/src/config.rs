//! Bridge configuration.
//!
//! The configuration is process-wide. It is taken from the environment the
//! first time it is needed unless [`init`] was called earlier.

use once_cell::sync::OnceCell;
use serde::Deserialize;

/// Environment variable enabling interface verification of typed views.
pub const ENV_VERIFY_INTERFACES: &str = "DAQ_INTEROP_VERIFY_INTERFACES";
/// Environment variable enabling reference-count tracing.
pub const ENV_TRACE_REFS: &str = "DAQ_INTEROP_TRACE_REFS";

/// Default values.
pub mod defaults {
    /// Typed views are checked against the native object in debug builds.
    pub const VERIFY_INTERFACES: bool = cfg!(debug_assertions);
    pub const TRACE_REFERENCES: bool = false;
}

/// Runtime options of the interop layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Confirm with `borrowInterface` that a pointer wrapped as a typed view
    /// really implements the view's interface.
    pub verify_interfaces: bool,
    /// Log every reference acquired and released at trace level.
    pub trace_references: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            verify_interfaces: defaults::VERIFY_INTERFACES,
            trace_references: defaults::TRACE_REFERENCES,
        }
    }
}

impl BridgeConfig {
    /// Builds a configuration from environment variables, falling back to
    /// defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_VERIFY_INTERFACES).and_then(|v| parse_flag(&v)) {
            config.verify_interfaces = value;
        }
        if let Some(value) = lookup(ENV_TRACE_REFS).and_then(|v| parse_flag(&v)) {
            config.trace_references = value;
        }
        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

static CONFIG: OnceCell<BridgeConfig> = OnceCell::new();

/// Sets the process-wide configuration.
///
/// Returns false if a configuration was already in effect.
pub fn init(config: BridgeConfig) -> bool {
    CONFIG.set(config).is_ok()
}

/// Returns the process-wide configuration.
pub fn get() -> &'static BridgeConfig {
    CONFIG.get_or_init(BridgeConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.verify_interfaces, cfg!(debug_assertions));
        assert!(!config.trace_references);
    }

    #[test]
    fn test_env_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (ENV_VERIFY_INTERFACES, "off"),
            (ENV_TRACE_REFS, "1"),
        ]));
        assert!(!config.verify_interfaces);
        assert!(config.trace_references);
    }

    #[test]
    fn test_unparsable_env_keeps_default() {
        let config = BridgeConfig::from_lookup(lookup(&[(ENV_TRACE_REFS, "maybe")]));
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{ "trace_references": true }"#).unwrap();
        assert!(config.trace_references);
        assert_eq!(config.verify_interfaces, defaults::VERIFY_INTERFACES);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("no"), Some(false));
        assert_eq!(parse_flag(""), None);
    }
}

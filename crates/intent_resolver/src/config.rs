//! Resolver configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty (or
//! missing) file yields a working resolver.

use crate::context::DEFAULT_CONTEXT_PATTERNS;
use crate::error::{ResolverError, Result};
use crate::feedback::DEFAULT_CORRECTION_TRIGGERS;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Fuzzy-match threshold used when the configured one is unusable
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Parameters that vary per query and must never be memorized
pub const DEFAULT_DYNAMIC_PARAMS: &[&str] = &[
    "party",
    "party_name",
    "partyName",
    "ledger_name",
    "ledgerName",
    "date",
    "from_date",
    "fromDate",
    "to_date",
    "toDate",
    "start_date",
    "end_date",
    "invoice",
    "invoice_no",
    "invoice_number",
    "invoiceNumber",
    "voucher_number",
    "company",
    "company_name",
    "companyName",
];

const STORE_FILE_NAME: &str = "learned_patterns.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum Jaccard similarity for a tier-2 match
    #[serde(
        default = "default_confidence_threshold",
        deserialize_with = "lenient_threshold"
    )]
    pub confidence_threshold: f64,

    #[serde(default = "default_pattern_store_path")]
    pub pattern_store_path: PathBuf,

    /// Knowledge document for the transliteration map. `None` uses the
    /// document shipped with the crate.
    #[serde(default)]
    pub knowledge_path: Option<PathBuf>,

    #[serde(default = "default_true", alias = "openai_fallback_enabled")]
    pub fallback_enabled: bool,

    #[serde(default = "default_fallback_timeout")]
    pub fallback_timeout_secs: u64,

    #[serde(default = "default_write_debounce")]
    pub write_debounce_ms: u64,

    #[serde(default = "default_correction_triggers")]
    pub correction_triggers: Vec<String>,

    /// Regex sources, matched case-insensitively
    #[serde(default = "default_context_patterns")]
    pub context_patterns: Vec<String>,

    #[serde(default = "default_dynamic_params")]
    pub dynamic_params: Vec<String>,
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_pattern_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("intent-resolver")
        .join(STORE_FILE_NAME)
}

fn default_true() -> bool {
    true
}

fn default_fallback_timeout() -> u64 {
    20
}

fn default_write_debounce() -> u64 {
    5_000
}

fn default_correction_triggers() -> Vec<String> {
    DEFAULT_CORRECTION_TRIGGERS.iter().map(|s| s.to_string()).collect()
}

fn default_context_patterns() -> Vec<String> {
    DEFAULT_CONTEXT_PATTERNS.iter().map(|s| s.to_string()).collect()
}

fn default_dynamic_params() -> Vec<String> {
    DEFAULT_DYNAMIC_PARAMS.iter().map(|s| s.to_string()).collect()
}

/// Accept any value, `null` included; anything but a finite number in
/// [0, 1] becomes the default.
fn lenient_threshold<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(threshold_from_value(&value))
}

/// Validate a raw threshold. Finite values in [0, 1] pass through unchanged.
pub fn validate_threshold(value: f64) -> f64 {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        value
    } else {
        warn!(
            "Invalid confidence threshold {}, using {}",
            value, DEFAULT_CONFIDENCE_THRESHOLD
        );
        DEFAULT_CONFIDENCE_THRESHOLD
    }
}

/// Validate a threshold of unknown type. Non-finite floats arrive as
/// `null`, which is treated like any other non-number.
pub fn threshold_from_value(value: &serde_json::Value) -> f64 {
    match value.as_f64() {
        Some(f) => validate_threshold(f),
        None => {
            warn!(
                "Non-numeric confidence threshold {}, using {}",
                value, DEFAULT_CONFIDENCE_THRESHOLD
            );
            DEFAULT_CONFIDENCE_THRESHOLD
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            pattern_store_path: default_pattern_store_path(),
            knowledge_path: None,
            fallback_enabled: default_true(),
            fallback_timeout_secs: default_fallback_timeout(),
            write_debounce_ms: default_write_debounce(),
            correction_triggers: default_correction_triggers(),
            context_patterns: default_context_patterns(),
            dynamic_params: default_dynamic_params(),
        }
    }
}

impl ResolverConfig {
    /// Defaults with the pattern store at `path`.
    pub fn with_store_path(path: impl Into<PathBuf>) -> Self {
        Self {
            pattern_store_path: path.into(),
            ..Self::default()
        }
    }

    /// Load from `path`, falling back to defaults on any problem.
    pub fn load(path: &Path) -> Self {
        Self::load_strict(path).unwrap_or_else(|e| {
            warn!("Config not loaded, using defaults: {}", e);
            Self::default()
        })
    }

    /// Load from `path`, reporting a missing or unparseable file.
    pub fn load_strict(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ResolverError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ResolverError::Config(e.to_string()))
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }

    pub fn write_debounce(&self) -> Duration {
        Duration::from_millis(self.write_debounce_ms)
    }

    /// Threshold re-validated, for configs built in code rather than parsed.
    pub fn effective_threshold(&self) -> f64 {
        validate_threshold(self.confidence_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = ResolverConfig::from_toml("").unwrap();
        assert_eq!(config.confidence_threshold, 0.7);
        assert!(config.fallback_enabled);
        assert_eq!(config.write_debounce(), Duration::from_secs(5));
        assert!(config.correction_triggers.contains(&"wrong".to_string()));
        assert!(config.dynamic_params.contains(&"invoice_number".to_string()));
        assert!(config.pattern_store_path.ends_with(STORE_FILE_NAME));
    }

    #[test]
    fn test_parse_full_config() {
        let config = ResolverConfig::from_toml(
            r#"
confidence_threshold = 0.55
pattern_store_path = "/tmp/patterns.json"
openai_fallback_enabled = false
fallback_timeout_secs = 3
correction_triggers = ["nope"]
context_patterns = ["^again$"]
dynamic_params = ["gstin"]
"#,
        )
        .unwrap();
        assert_eq!(config.confidence_threshold, 0.55);
        assert_eq!(config.pattern_store_path, PathBuf::from("/tmp/patterns.json"));
        assert!(!config.fallback_enabled);
        assert_eq!(config.fallback_timeout(), Duration::from_secs(3));
        assert_eq!(config.correction_triggers, vec!["nope".to_string()]);
        assert_eq!(config.dynamic_params, vec!["gstin".to_string()]);
    }

    #[test]
    fn test_invalid_thresholds_fall_back() {
        for raw in [
            "confidence_threshold = 1.5",
            "confidence_threshold = -0.1",
            "confidence_threshold = nan",
            "confidence_threshold = inf",
            "confidence_threshold = \"high\"",
            "confidence_threshold = true",
            "confidence_threshold = 7",
        ] {
            let config = ResolverConfig::from_toml(raw).unwrap();
            assert_eq!(config.confidence_threshold, 0.7, "for {raw}");
        }
    }

    #[test]
    fn test_integer_threshold_bounds_accepted() {
        assert_eq!(ResolverConfig::from_toml("confidence_threshold = 1").unwrap().confidence_threshold, 1.0);
        assert_eq!(ResolverConfig::from_toml("confidence_threshold = 0").unwrap().confidence_threshold, 0.0);
    }

    #[test]
    fn test_json_threshold_values() {
        let parse = |v: serde_json::Value| -> f64 {
            let config: ResolverConfig =
                serde_json::from_value(serde_json::json!({ "confidence_threshold": v })).unwrap();
            config.confidence_threshold
        };
        assert_eq!(parse(serde_json::json!(0.4)), 0.4);
        assert_eq!(parse(serde_json::json!("0.4")), 0.7);
        assert_eq!(parse(serde_json::json!([0.4])), 0.7);
        assert_eq!(parse(serde_json::json!(null)), 0.7);
    }

    #[test]
    fn test_null_threshold_keeps_other_fields() {
        let config: ResolverConfig = serde_json::from_value(serde_json::json!({
            "confidence_threshold": null,
            "fallback_enabled": false,
            "dynamic_params": ["gstin"]
        }))
        .unwrap();
        assert_eq!(config.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert!(!config.fallback_enabled);
        assert_eq!(config.dynamic_params, vec!["gstin".to_string()]);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ResolverConfig::load(Path::new("/nonexistent/resolver.toml"));
        assert_eq!(config.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert!(ResolverConfig::load_strict(Path::new("/nonexistent/resolver.toml")).is_err());
    }

    #[test]
    fn test_effective_threshold_for_code_built_config() {
        let config = ResolverConfig {
            confidence_threshold: f64::NAN,
            ..ResolverConfig::default()
        };
        assert_eq!(config.effective_threshold(), 0.7);
    }

    proptest! {
        #[test]
        fn valid_thresholds_pass_through(t in 0.0f64..=1.0) {
            prop_assert_eq!(validate_threshold(t), t);
        }

        #[test]
        fn out_of_range_thresholds_default(t in prop_oneof![-1e9f64..-1e-9, 1.0000001f64..1e9]) {
            prop_assert_eq!(validate_threshold(t), DEFAULT_CONFIDENCE_THRESHOLD);
        }
    }
}

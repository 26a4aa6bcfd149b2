use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "quote-intake";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix for every environment override read by [`IntakeConfig::from_env`].
pub const ENV_PREFIX: &str = "QUOTE_INTAKE_";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "quote_intake=info,warn"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    Parse { var: String, value: String },

    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Relative weight of each component in the overall confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub pricing: f64,
    pub timeline: f64,
    pub scope: f64,
    pub terms: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            pricing: 0.25,
            timeline: 0.25,
            scope: 0.25,
            terms: 0.25,
        }
    }
}

impl ComponentWeights {
    pub fn sum(&self) -> f64 {
        self.pricing + self.timeline + self.scope + self.terms
    }

    /// Weights scaled to sum to 1.0. Falls back to equal weights when the sum is not positive.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if !(sum > 0.0) || !sum.is_finite() {
            return Self::default();
        }
        Self {
            pricing: self.pricing / sum,
            timeline: self.timeline / sum,
            scope: self.scope / sum,
            terms: self.terms / sum,
        }
    }
}

/// Engine configuration. Every field has a default; environment variables
/// (optionally loaded from a `.env` file) override individual values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Size ceiling for document uploads and inbound messages.
    pub max_document_bytes: u64,
    pub max_photo_bytes: u64,
    /// Largest accepted width or height of a photo capture, in pixels.
    pub max_photo_dimension: u32,
    pub max_form_line_items: usize,
    /// Overall confidence at or above which a quote is standardized.
    pub confidence_threshold: f64,
    pub component_weights: ComponentWeights,
    /// Line-item reconciliation tolerance as a fraction of the total.
    pub reconciliation_tolerance_ratio: f64,
    /// Absolute floor for the reconciliation tolerance, in currency units.
    pub reconciliation_tolerance_min: f64,
    pub fast_pass_timeout_ms: u64,
    pub deep_pass_timeout_ms: u64,
    /// Per-attempt timeout for a single recognizer or extractor call.
    pub backend_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub event_capacity: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 25 * 1024 * 1024,
            max_photo_bytes: 20 * 1024 * 1024,
            max_photo_dimension: 10_000,
            max_form_line_items: 100,
            confidence_threshold: 0.70,
            component_weights: ComponentWeights::default(),
            reconciliation_tolerance_ratio: 0.01,
            reconciliation_tolerance_min: 1.0,
            fast_pass_timeout_ms: 5_000,
            deep_pass_timeout_ms: 30_000,
            backend_timeout_ms: 10_000,
            max_retries: 2,
            retry_backoff_ms: 250,
            event_capacity: 256,
        }
    }
}

impl IntakeConfig {
    /// Defaults overridden by `QUOTE_INTAKE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `QUOTE_INTAKE_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |suffix: &str| {
            let var = format!("{ENV_PREFIX}{suffix}");
            lookup(&var).map(|value| (var, value))
        };

        override_with(read("MAX_DOCUMENT_BYTES"), &mut config.max_document_bytes)?;
        override_with(read("MAX_PHOTO_BYTES"), &mut config.max_photo_bytes)?;
        override_with(read("MAX_PHOTO_DIMENSION"), &mut config.max_photo_dimension)?;
        override_with(read("MAX_FORM_LINE_ITEMS"), &mut config.max_form_line_items)?;
        override_with(read("CONFIDENCE_THRESHOLD"), &mut config.confidence_threshold)?;
        override_with(read("WEIGHT_PRICING"), &mut config.component_weights.pricing)?;
        override_with(read("WEIGHT_TIMELINE"), &mut config.component_weights.timeline)?;
        override_with(read("WEIGHT_SCOPE"), &mut config.component_weights.scope)?;
        override_with(read("WEIGHT_TERMS"), &mut config.component_weights.terms)?;
        override_with(
            read("RECONCILIATION_TOLERANCE_RATIO"),
            &mut config.reconciliation_tolerance_ratio,
        )?;
        override_with(
            read("RECONCILIATION_TOLERANCE_MIN"),
            &mut config.reconciliation_tolerance_min,
        )?;
        override_with(read("FAST_PASS_TIMEOUT_MS"), &mut config.fast_pass_timeout_ms)?;
        override_with(read("DEEP_PASS_TIMEOUT_MS"), &mut config.deep_pass_timeout_ms)?;
        override_with(read("BACKEND_TIMEOUT_MS"), &mut config.backend_timeout_ms)?;
        override_with(read("MAX_RETRIES"), &mut config.max_retries)?;
        override_with(read("RETRY_BACKOFF_MS"), &mut config.retry_backoff_ms)?;
        override_with(read("EVENT_CAPACITY"), &mut config.event_capacity)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid("confidence_threshold", "must be within [0, 1]"));
        }
        let w = &self.component_weights;
        if [w.pricing, w.timeline, w.scope, w.terms]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(invalid("component_weights", "weights must be finite and non-negative"));
        }
        if w.sum() <= 0.0 {
            return Err(invalid("component_weights", "at least one weight must be positive"));
        }
        if self.reconciliation_tolerance_ratio < 0.0 || self.reconciliation_tolerance_min < 0.0 {
            return Err(invalid("reconciliation_tolerance", "must not be negative"));
        }
        if self.max_document_bytes == 0 || self.max_photo_bytes == 0 {
            return Err(invalid("max_bytes", "size limits must be positive"));
        }
        if self.fast_pass_timeout_ms == 0 || self.deep_pass_timeout_ms == 0 || self.backend_timeout_ms == 0 {
            return Err(invalid("timeouts", "timeouts must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", "must be positive"));
        }
        Ok(())
    }

    pub fn fast_pass_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_pass_timeout_ms)
    }

    pub fn deep_pass_timeout(&self) -> Duration {
        Duration::from_millis(self.deep_pass_timeout_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Allowed gap between line-item sum and quoted total.
    pub fn reconciliation_tolerance(&self, total: f64) -> f64 {
        (total.abs() * self.reconciliation_tolerance_ratio).max(self.reconciliation_tolerance_min)
    }
}

fn override_with<T: FromStr>(
    entry: Option<(String, String)>,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some((var, value)) = entry {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Parse { var, value })?;
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = IntakeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.confidence_threshold, 0.70);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.max_form_line_items, 100);
        assert_eq!(config.fast_pass_timeout(), Duration::from_secs(5));
        assert_eq!(config.deep_pass_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn lookup_overrides_individual_fields() {
        let config = IntakeConfig::from_lookup(lookup_from(&[
            ("QUOTE_INTAKE_CONFIDENCE_THRESHOLD", "0.8"),
            ("QUOTE_INTAKE_WEIGHT_PRICING", "2"),
            ("QUOTE_INTAKE_MAX_RETRIES", " 4 "),
        ]))
        .unwrap();
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.component_weights.pricing, 2.0);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.deep_pass_timeout_ms, 30_000);
    }

    #[test]
    fn unparsable_override_names_the_variable() {
        let err = IntakeConfig::from_lookup(lookup_from(&[("QUOTE_INTAKE_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Parse {
                var: "QUOTE_INTAKE_MAX_RETRIES".into(),
                value: "many".into()
            }
        );
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let err = IntakeConfig::from_lookup(lookup_from(&[(
            "QUOTE_INTAKE_CONFIDENCE_THRESHOLD",
            "1.5",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn all_zero_weights_rejected() {
        let mut config = IntakeConfig::default();
        config.component_weights = ComponentWeights {
            pricing: 0.0,
            timeline: 0.0,
            scope: 0.0,
            terms: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn weights_normalize_to_one() {
        let weights = ComponentWeights {
            pricing: 2.0,
            timeline: 1.0,
            scope: 1.0,
            terms: 0.0,
        }
        .normalized();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
        assert!((weights.pricing - 0.5).abs() < 1e-9);
    }

    #[test]
    fn tolerance_has_floor() {
        let config = IntakeConfig::default();
        assert_eq!(config.reconciliation_tolerance(1000.0), 10.0);
        assert_eq!(config.reconciliation_tolerance(50.0), 1.0);
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}

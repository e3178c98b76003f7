use serde::{Deserialize, Serialize};

/// Engine configuration constants and tunable parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Numeric cap substituted for features with unlimited ranks.
    pub unlimited_ranks: i32,

    /// How many hops a single reconcile may cascade through before it is
    /// treated as a runaway cycle.
    pub max_propagation_depth: usize,

    /// Currency charged by features that declare a cost but no currency.
    pub default_currency: String,

    /// Whether failed decisions keep the source location that produced them.
    pub capture_trace: bool,

    /// Whether a negative currency balance makes a character invalid.
    pub enforce_currency: bool,
}

impl EngineConfig {
    // ===== runtime-tunable defaults =====
    pub const DEFAULT_UNLIMITED_RANKS: i32 = 101;
    pub const DEFAULT_MAX_PROPAGATION_DEPTH: usize = 64;
    pub const DEFAULT_CURRENCY: &'static str = "cp";

    pub fn new() -> Self {
        Self {
            unlimited_ranks: Self::DEFAULT_UNLIMITED_RANKS,
            max_propagation_depth: Self::DEFAULT_MAX_PROPAGATION_DEPTH,
            default_currency: Self::DEFAULT_CURRENCY.to_owned(),
            capture_trace: true,
            enforce_currency: true,
        }
    }

    #[must_use]
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    #[must_use]
    pub fn with_capture_trace(mut self, capture_trace: bool) -> Self {
        self.capture_trace = capture_trace;
        self
    }

    #[must_use]
    pub fn with_enforce_currency(mut self, enforce_currency: bool) -> Self {
        self.enforce_currency = enforce_currency;
        self
    }

    #[must_use]
    pub fn with_max_propagation_depth(mut self, depth: usize) -> Self {
        self.max_propagation_depth = depth;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"default_currency": "xp", "capture_trace": false}"#).unwrap();
        assert_eq!(config.default_currency, "xp");
        assert!(!config.capture_trace);
        assert_eq!(config.unlimited_ranks, EngineConfig::DEFAULT_UNLIMITED_RANKS);
    }
}

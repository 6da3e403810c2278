//! Configuration types for the attribution pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry with exponential backoff for model calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    ///
    /// Default: 3.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles on every attempt after.
    ///
    /// Default: 1000ms.
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay.
    ///
    /// Default: 250ms.
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// No delays between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_jitter_ms: 0,
        }
    }

    /// Backoff before attempt `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
    }
}

/// When the undetermined-rate gate aborts a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Candidates at or above this undetermined rate are dropped before
    /// reconciliation.
    ///
    /// Default: 0.75.
    pub max_undetermined_rate: f64,

    /// Abort without reconciling when every surviving candidate has all of
    /// its gate fields undetermined.
    ///
    /// Default: true.
    pub abort_if_fully_undetermined: bool,

    /// Abort when the finalized record has nothing but undetermined gate
    /// fields.
    ///
    /// Default: true.
    pub abort_if_empty_result: bool,

    /// Candidates whose serving size differs from the product's size by more
    /// than this many ounces are dropped. `None` disables the check.
    ///
    /// Default: 0.2.
    #[serde(default = "default_serving_size_margin")]
    pub serving_size_margin_oz: Option<f64>,
}

fn default_serving_size_margin() -> Option<f64> {
    Some(0.2)
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            max_undetermined_rate: 0.75,
            abort_if_fully_undetermined: true,
            abort_if_empty_result: true,
            serving_size_margin_oz: default_serving_size_margin(),
        }
    }
}

impl GatePolicy {
    /// Never drops candidates and never aborts on emptiness.
    pub fn permissive() -> Self {
        Self {
            // rates never exceed 1.0
            max_undetermined_rate: 1.5,
            abort_if_fully_undetermined: false,
            abort_if_empty_result: false,
            serving_size_margin_oz: None,
        }
    }

    pub fn with_max_undetermined_rate(mut self, rate: f64) -> Self {
        self.max_undetermined_rate = rate;
        self
    }

    pub fn with_serving_size_margin(mut self, margin_oz: Option<f64>) -> Self {
        self.serving_size_margin_oz = margin_oz;
        self
    }
}

/// How the reconciler resolves disagreements between sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationMode {
    /// A model call arbitrates; output is validated and provenance repaired
    /// with the deterministic policy.
    #[default]
    Model,

    /// Higher tier wins, then majority, then input order. No model call.
    Deterministic,
}

/// Configuration for the attribution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Token budget for one document payload (estimated at 4 bytes per
    /// token). Longer documents are truncated before the call.
    ///
    /// Default: 100 000.
    pub token_budget: usize,

    /// Retry policy for extraction and reconciliation calls.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Gate thresholds.
    #[serde(default)]
    pub gate: GatePolicy,

    /// Default: model arbitration.
    #[serde(default)]
    pub arbitration: ArbitrationMode,

    /// Confidence reported when no candidate matched the product.
    ///
    /// Default: 0.1.
    pub no_match_confidence: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            token_budget: 100_000,
            retry: RetryPolicy::default(),
            gate: GatePolicy::default(),
            arbitration: ArbitrationMode::Model,
            no_match_confidence: 0.1,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_gate(mut self, gate: GatePolicy) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_arbitration(mut self, mode: ArbitrationMode) -> Self {
        self.arbitration = mode;
        self
    }

    pub fn with_no_match_confidence(mut self, confidence: f64) -> Self {
        self.no_match_confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.token_budget, 100_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.gate.max_undetermined_rate, 0.75);
        assert_eq!(config.gate.serving_size_margin_oz, Some(0.2));
        assert_eq!(config.arbitration, ArbitrationMode::Model);
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.backoff(1), Duration::from_millis(1000));
        assert_eq!(retry.backoff(2), Duration::from_millis(2000));
        assert_eq!(retry.backoff(3), Duration::from_millis(4000));
        assert_eq!(RetryPolicy::immediate(5).backoff(4), Duration::ZERO);
    }

    #[test]
    fn test_builder_clamps_confidence() {
        let config = PipelineConfig::new()
            .with_arbitration(ArbitrationMode::Deterministic)
            .with_no_match_confidence(4.0);
        assert_eq!(config.no_match_confidence, 1.0);
        assert_eq!(config.arbitration, ArbitrationMode::Deterministic);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "token_budget": 5000,
            "no_match_confidence": 0.05,
            "arbitration": "deterministic"
        }))
        .unwrap();
        assert_eq!(config.token_budget, 5000);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.arbitration, ArbitrationMode::Deterministic);
    }
}

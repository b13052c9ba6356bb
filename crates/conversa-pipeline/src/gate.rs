//! Gate
//!
//! Decides, once a turn's final transcript is in hand, whether the turn is
//! allowed to proceed to the LLM. A gate classifier is given a budget
//! (default 400ms); a classifier that doesn't answer in time is treated
//! according to `fail_mode` rather than left pending indefinitely, since a
//! stalled gate would otherwise stall every downstream stage.

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Timeout or classifier error lets the turn through.
    Open,
    /// Timeout or classifier error suppresses the turn.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Suppress { reason: String },
}

#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    pub budget: Duration,
    pub fail_mode: FailMode,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { budget: Duration::from_millis(400), fail_mode: FailMode::Open }
    }
}

/// The classifier contract. Implementations may call out to a moderation
/// model, a keyword list, or anything in between — the gate itself only
/// knows about the budget and the fail-open/fail-closed policy.
#[async_trait]
pub trait GateClassifier: Send + Sync {
    async fn classify(&self, transcript: &str) -> GateDecision;
}

/// Always-allow reference classifier, used when no moderation policy is
/// configured and by tests that don't exercise gating itself.
pub struct AllowAllClassifier;

#[async_trait]
impl GateClassifier for AllowAllClassifier {
    async fn classify(&self, _transcript: &str) -> GateDecision {
        GateDecision::Allow
    }
}

/// Runs `classifier` against `transcript` under the configured budget,
/// applying `fail_mode` if the budget is exceeded.
pub async fn evaluate(classifier: &dyn GateClassifier, transcript: &str, config: &GateConfig) -> GateDecision {
    match tokio::time::timeout(config.budget, classifier.classify(transcript)).await {
        Ok(decision) => decision,
        Err(_) => match config.fail_mode {
            FailMode::Open => GateDecision::Allow,
            FailMode::Closed => GateDecision::Suppress { reason: "gate timed out".into() },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowClassifier(Duration);

    #[async_trait]
    impl GateClassifier for SlowClassifier {
        async fn classify(&self, _transcript: &str) -> GateDecision {
            tokio::time::sleep(self.0).await;
            GateDecision::Allow
        }
    }

    struct SuppressingClassifier;

    #[async_trait]
    impl GateClassifier for SuppressingClassifier {
        async fn classify(&self, _transcript: &str) -> GateDecision {
            GateDecision::Suppress { reason: "policy".into() }
        }
    }

    #[tokio::test]
    async fn allow_all_lets_everything_through() {
        let config = GateConfig::default();
        let decision = evaluate(&AllowAllClassifier, "hello", &config).await;
        assert_eq!(decision, GateDecision::Allow);
    }

    #[tokio::test]
    async fn timeout_with_fail_open_allows() {
        let config = GateConfig { budget: Duration::from_millis(10), fail_mode: FailMode::Open };
        let decision = evaluate(&SlowClassifier(Duration::from_millis(100)), "hello", &config).await;
        assert_eq!(decision, GateDecision::Allow);
    }

    #[tokio::test]
    async fn timeout_with_fail_closed_suppresses() {
        let config = GateConfig { budget: Duration::from_millis(10), fail_mode: FailMode::Closed };
        let decision = evaluate(&SlowClassifier(Duration::from_millis(100)), "hello", &config).await;
        assert!(matches!(decision, GateDecision::Suppress { .. }));
    }

    #[tokio::test]
    async fn classifier_suppression_is_passed_through_within_budget() {
        let config = GateConfig::default();
        let decision = evaluate(&SuppressingClassifier, "hello", &config).await;
        assert!(matches!(decision, GateDecision::Suppress { .. }));
    }
}

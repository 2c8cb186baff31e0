//! Per-attempt saga step labels.

use serde::Serialize;

/// Where one subscription attempt stands.
///
/// Nothing persists these; they label log records and metrics so an
/// operator can follow an attempt across both services.
///
/// ```text
/// Committed ──► Published ──┬──► Applied
///                           └──► CompensationPublished ──► Compensated
/// any hop failing without a way forward ──► Stuck
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SagaStep {
    /// The origin mutation succeeded.
    Committed,

    /// The subscription event left the origin.
    Published,

    /// The downstream mirror applied the mutation (terminal, consistent).
    Applied,

    /// The downstream apply failed and a compensation event left.
    CompensationPublished,

    /// The origin undid its mutation (terminal, consistent).
    Compensated,

    /// No further protocol step will fix this attempt (terminal, divergent).
    Stuck,
}

impl SagaStep {
    /// Returns true if no further step follows.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStep::Applied | SagaStep::Compensated | SagaStep::Stuck
        )
    }

    /// Returns true if both sides agree once this step is reached.
    pub fn is_consistent(&self) -> bool {
        matches!(self, SagaStep::Applied | SagaStep::Compensated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::Committed => "Committed",
            SagaStep::Published => "Published",
            SagaStep::Applied => "Applied",
            SagaStep::CompensationPublished => "CompensationPublished",
            SagaStep::Compensated => "Compensated",
            SagaStep::Stuck => "Stuck",
        }
    }
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_steps() {
        assert!(!SagaStep::Committed.is_terminal());
        assert!(!SagaStep::Published.is_terminal());
        assert!(SagaStep::Applied.is_terminal());
        assert!(!SagaStep::CompensationPublished.is_terminal());
        assert!(SagaStep::Compensated.is_terminal());
        assert!(SagaStep::Stuck.is_terminal());
    }

    #[test]
    fn test_stuck_is_not_consistent() {
        assert!(SagaStep::Applied.is_consistent());
        assert!(SagaStep::Compensated.is_consistent());
        assert!(!SagaStep::Stuck.is_consistent());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaStep::Committed.to_string(), "Committed");
        assert_eq!(
            SagaStep::CompensationPublished.to_string(),
            "CompensationPublished"
        );
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&SagaStep::Stuck).unwrap();
        assert_eq!(json, "\"Stuck\"");
    }
}

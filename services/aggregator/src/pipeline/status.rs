//! Run status machine.

use std::fmt;

use serde::Serialize;

/// Lifecycle of a pipeline run.
///
/// `PENDING -> RUNNING -> {COMPLETED | PARTIALLY_FAILED | FAILED}`. A pending
/// run may also fail before it starts (planning errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    PartiallyFailed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::PartiallyFailed => "PARTIALLY_FAILED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RunStatus::Pending),
            "RUNNING" => Some(RunStatus::Running),
            "COMPLETED" => Some(RunStatus::Completed),
            "PARTIALLY_FAILED" => Some(RunStatus::PartiallyFailed),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::PartiallyFailed | RunStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match self {
            RunStatus::Pending => matches!(next, RunStatus::Running | RunStatus::Failed),
            RunStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    /// Process exit code reported by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::PartiallyFailed => 2,
            RunStatus::Pending | RunStatus::Running | RunStatus::Failed => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(RunStatus::Pending, RunStatus::Running, true)]
    #[case(RunStatus::Pending, RunStatus::Failed, true)]
    #[case(RunStatus::Pending, RunStatus::Completed, false)]
    #[case(RunStatus::Running, RunStatus::Completed, true)]
    #[case(RunStatus::Running, RunStatus::PartiallyFailed, true)]
    #[case(RunStatus::Running, RunStatus::Failed, true)]
    #[case(RunStatus::Running, RunStatus::Pending, false)]
    #[case(RunStatus::Completed, RunStatus::Running, false)]
    #[case(RunStatus::Failed, RunStatus::Completed, false)]
    fn test_transitions(#[case] from: RunStatus, #[case] to: RunStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case(RunStatus::Completed, 0)]
    #[case(RunStatus::PartiallyFailed, 2)]
    #[case(RunStatus::Failed, 1)]
    fn test_exit_codes(#[case] status: RunStatus, #[case] code: u8) {
        assert_eq!(status.exit_code(), code);
    }

    #[test]
    fn test_round_trip_through_ledger_text() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::PartiallyFailed,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("DONE"), None);
        assert_eq!(
            serde_json::to_string(&RunStatus::PartiallyFailed).unwrap(),
            "\"PARTIALLY_FAILED\""
        );
    }
}

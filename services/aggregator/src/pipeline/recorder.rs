//! Where run status and step outcomes are persisted.

use async_trait::async_trait;
use icds_partition::Month;
use uuid::Uuid;

use crate::db::{DbError, RunLedger, StepRow};

use super::RunStatus;

/// Sink for the run lifecycle. The ledger is the production implementation.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Register a new run as PENDING.
    async fn begin(
        &self,
        run_id: Uuid,
        month: Month,
        helper: &str,
        states: &[String],
    ) -> Result<(), DbError>;

    async fn transition(&self, run_id: Uuid, from: RunStatus, to: RunStatus)
        -> Result<(), DbError>;

    async fn record_step(&self, run_id: Uuid, step: &StepRow) -> Result<(), DbError>;

    /// Move the run to a terminal status and attach its summary.
    async fn finish(
        &self,
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
        summary: &serde_json::Value,
    ) -> Result<(), DbError>;
}

#[async_trait]
impl RunRecorder for RunLedger {
    async fn begin(
        &self,
        run_id: Uuid,
        month: Month,
        helper: &str,
        states: &[String],
    ) -> Result<(), DbError> {
        self.insert_run(run_id, month.start(), helper, states, RunStatus::Pending.as_str())
            .await
    }

    async fn transition(
        &self,
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<(), DbError> {
        self.update_status(run_id, from.as_str(), to.as_str()).await
    }

    async fn record_step(&self, run_id: Uuid, step: &StepRow) -> Result<(), DbError> {
        self.insert_step(run_id, step).await
    }

    async fn finish(
        &self,
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
        summary: &serde_json::Value,
    ) -> Result<(), DbError> {
        self.finish_run(run_id, from.as_str(), to.as_str(), summary)
            .await
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Mutex;

    use super::*;

    /// Keeps the lifecycle in memory and enforces the same transitions as the
    /// ledger.
    #[derive(Default)]
    pub(crate) struct MemoryRecorder {
        pub statuses: Mutex<Vec<RunStatus>>,
        pub steps: Mutex<Vec<StepRow>>,
        pub summary: Mutex<Option<serde_json::Value>>,
    }

    impl MemoryRecorder {
        fn advance(&self, run_id: Uuid, from: RunStatus, to: RunStatus) -> Result<(), DbError> {
            let mut statuses = self.statuses.lock().unwrap();
            let current = statuses.last().copied().ok_or(DbError::RunNotFound(run_id))?;
            if current != from || !from.can_transition_to(to) {
                return Err(DbError::StatusConflict {
                    run_id,
                    expected: from.to_string(),
                    actual: current.to_string(),
                });
            }
            statuses.push(to);
            Ok(())
        }

        pub(crate) fn final_status(&self) -> Option<RunStatus> {
            self.statuses.lock().unwrap().last().copied()
        }
    }

    #[async_trait]
    impl RunRecorder for MemoryRecorder {
        async fn begin(
            &self,
            _run_id: Uuid,
            _month: Month,
            _helper: &str,
            _states: &[String],
        ) -> Result<(), DbError> {
            self.statuses.lock().unwrap().push(RunStatus::Pending);
            Ok(())
        }

        async fn transition(
            &self,
            run_id: Uuid,
            from: RunStatus,
            to: RunStatus,
        ) -> Result<(), DbError> {
            self.advance(run_id, from, to)
        }

        async fn record_step(&self, _run_id: Uuid, step: &StepRow) -> Result<(), DbError> {
            self.steps.lock().unwrap().push(step.clone());
            Ok(())
        }

        async fn finish(
            &self,
            run_id: Uuid,
            from: RunStatus,
            to: RunStatus,
            summary: &serde_json::Value,
        ) -> Result<(), DbError> {
            self.advance(run_id, from, to)?;
            *self.summary.lock().unwrap() = Some(summary.clone());
            Ok(())
        }
    }
}

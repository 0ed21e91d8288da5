//! Pipeline orchestrator.
//!
//! Runs the planned helpers for one month in dependency order and records
//! every outcome in the run ledger:
//!
//! - Global helpers run once. A failure stops the run (`FAILED`) and the
//!   remaining helpers are recorded as skipped.
//! - State-scoped helpers run their states concurrently, bounded by
//!   `max_parallel_states`. A failed state is recorded and the run ends
//!   `PARTIALLY_FAILED`, unless every state failed or indexing failed, which
//!   stops the run like a global failure.

mod recorder;
mod states;
mod status;

pub use recorder::RunRecorder;
pub use states::{StateDirectory, StateSource};
pub use status::RunStatus;

use std::{sync::Arc, time::Instant};

use futures_util::{stream, StreamExt};
use icds_partition::Month;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::{DbError, StepRow},
    error::{AggregationError, AggregationResult},
    helpers::{
        registry::HelperSelection, AggregationHelper, HelperRegistry, Scope, StateSelection,
        StepReport,
    },
};

/// What to run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub month: Month,
    pub selection: HelperSelection,
    /// Explicit states; `None` means every active state.
    pub states: Option<Vec<String>>,
}

/// Per-helper outcome counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HelperSummary {
    pub helper: String,
    pub scope: Option<Scope>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub source_rows: i64,
    pub excluded_rows: i64,
    pub rows_written: u64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl HelperSummary {
    fn new(helper: &dyn AggregationHelper) -> Self {
        let d = helper.descriptor();
        Self {
            helper: d.key.to_string(),
            scope: Some(d.scope),
            ..Default::default()
        }
    }

    fn add_report(&mut self, report: &StepReport) {
        self.succeeded += 1;
        self.source_rows += report.source_rows;
        self.excluded_rows += report.excluded_rows;
        self.rows_written += report.rows_written;
        self.warnings.extend(report.warnings.iter().cloned());
    }

    fn add_error(&mut self, state: Option<&str>, error: &AggregationError) {
        self.failed += 1;
        self.errors.push(match state {
            Some(state) => format!("{state}: {error}"),
            None => error.to_string(),
        });
    }
}

/// Outcome of a run, stored as the ledger summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub month: Month,
    pub status: RunStatus,
    pub states: Vec<String>,
    pub helpers: Vec<HelperSummary>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn excluded_rows(&self) -> i64 {
        self.helpers.iter().map(|h| h.excluded_rows).sum()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_parallel_states: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_parallel_states: 1,
        }
    }
}

/// Drives helpers through a month and keeps the ledger current.
pub struct Pipeline<R> {
    registry: Arc<HelperRegistry>,
    states: Arc<dyn StateSource>,
    recorder: R,
    settings: PipelineSettings,
}

impl<R: RunRecorder> Pipeline<R> {
    pub fn new(
        registry: Arc<HelperRegistry>,
        states: Arc<dyn StateSource>,
        recorder: R,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            states,
            recorder,
            settings,
        }
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Run the request. Errors are returned only when the run could not be
    /// planned or the ledger could not be written; helper failures are
    /// reported through the summary status.
    #[instrument(skip(self, request), fields(month = %request.month, helper = %request.selection))]
    pub async fn run(&self, request: &RunRequest) -> AggregationResult<RunSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let requested = request.states.clone().unwrap_or_default();
        self.recorder
            .begin(run_id, request.month, &request.selection.to_string(), &requested)
            .await?;

        let (plan, selection) = match self.plan(request).await {
            Ok(planned) => planned,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Run could not be planned");
                let summary = serde_json::json!({ "error": e.to_string(), "kind": e.kind() });
                self.recorder
                    .finish(run_id, RunStatus::Pending, RunStatus::Failed, &summary)
                    .await?;
                return Err(e);
            }
        };

        self.recorder
            .transition(run_id, RunStatus::Pending, RunStatus::Running)
            .await?;
        info!(
            run_id = %run_id,
            helpers = plan.len(),
            states = selection.states().len(),
            "Run started"
        );

        let mut summaries = Vec::with_capacity(plan.len());
        let mut halted = false;
        let mut partial = false;

        for helper in &plan {
            let mut summary = HelperSummary::new(helper.as_ref());
            if halted {
                summary.skipped = 1;
                self.recorder
                    .record_step(run_id, &skipped_step(helper.as_ref()))
                    .await?;
                summaries.push(summary);
                continue;
            }

            let outcome = match helper.descriptor().scope {
                Scope::Global => self.run_global(run_id, helper, request.month, &mut summary).await?,
                Scope::PerState => {
                    self.run_states(run_id, helper, request.month, &selection, &mut summary)
                        .await?
                }
            };
            match outcome {
                HelperOutcome::Succeeded => {}
                HelperOutcome::Partial => partial = true,
                HelperOutcome::Failed => {
                    warn!(helper = helper.descriptor().key, "Halting run after helper failure");
                    halted = true;
                }
            }
            summaries.push(summary);
        }

        let status = if halted {
            RunStatus::Failed
        } else if partial {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        };

        let summary = RunSummary {
            run_id,
            month: request.month,
            status,
            states: selection.states().to_vec(),
            helpers: summaries,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        let json = serde_json::to_value(&summary).map_err(DbError::from)?;
        self.recorder
            .finish(run_id, RunStatus::Running, status, &json)
            .await?;

        info!(
            run_id = %run_id,
            status = %status,
            excluded_rows = summary.excluded_rows(),
            elapsed_ms = summary.elapsed_ms,
            "Run finished"
        );
        Ok(summary)
    }

    async fn plan(
        &self,
        request: &RunRequest,
    ) -> AggregationResult<(Vec<Arc<dyn AggregationHelper>>, StateSelection)> {
        let plan = self.registry.plan(&request.selection)?;
        let selection = match &request.states {
            Some(states) => StateSelection::Subset(states.clone()),
            None if plan.iter().any(|h| h.descriptor().scope == Scope::PerState) => {
                StateSelection::Active(self.states.active_states().await?)
            }
            None => StateSelection::Active(Vec::new()),
        };
        Ok((plan, selection))
    }

    async fn run_global(
        &self,
        run_id: Uuid,
        helper: &Arc<dyn AggregationHelper>,
        month: Month,
        summary: &mut HelperSummary,
    ) -> AggregationResult<HelperOutcome> {
        let key = helper.descriptor().key;
        let result = match helper.check_sources(month, None).await {
            Ok(()) => helper.aggregate(month, None).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(report) => {
                summary.add_report(&report);
                self.recorder
                    .record_step(run_id, &succeeded_step(&report))
                    .await?;
                Ok(HelperOutcome::Succeeded)
            }
            Err(e) => {
                error!(helper = key, error = %e, kind = e.kind(), "Helper failed");
                summary.add_error(None, &e);
                self.recorder
                    .record_step(run_id, &failed_step(key, None, &e))
                    .await?;
                Ok(HelperOutcome::Failed)
            }
        }
    }

    async fn run_states(
        &self,
        run_id: Uuid,
        helper: &Arc<dyn AggregationHelper>,
        month: Month,
        selection: &StateSelection,
        summary: &mut HelperSummary,
    ) -> AggregationResult<HelperOutcome> {
        let key = helper.descriptor().key;

        if let Err(e) = helper.prepare(month, selection).await {
            error!(helper = key, error = %e, "Failed to prepare month partition");
            summary.add_error(None, &e);
            self.recorder
                .record_step(run_id, &failed_step(key, None, &e))
                .await?;
            return Ok(HelperOutcome::Failed);
        }

        let parallel = self.settings.max_parallel_states.max(1);
        let results: Vec<(String, AggregationResult<StepReport>)> =
            stream::iter(selection.states().iter().cloned())
                .map(|state| {
                    let helper = helper.clone();
                    async move {
                        let result = match helper.check_sources(month, Some(&state)).await {
                            Ok(()) => helper.aggregate(month, Some(&state)).await,
                            Err(e) => Err(e),
                        };
                        (state, result)
                    }
                })
                .buffer_unordered(parallel)
                .collect()
                .await;

        let total = results.len();
        let mut failures = 0;
        for (state, result) in results {
            match result {
                Ok(report) => {
                    summary.add_report(&report);
                    self.recorder
                        .record_step(run_id, &succeeded_step(&report))
                        .await?;
                }
                Err(e) => {
                    failures += 1;
                    warn!(helper = key, state_id = %state, error = %e, kind = e.kind(), "State failed");
                    summary.add_error(Some(&state), &e);
                    self.recorder
                        .record_step(run_id, &failed_step(key, Some(&state), &e))
                        .await?;
                }
            }
        }

        if total > 0 && failures == total {
            error!(helper = key, states = total, "Every state failed");
            return Ok(HelperOutcome::Failed);
        }

        if let Err(e) = helper.finalize(month).await {
            error!(helper = key, error = %e, "Failed to finalize month partition");
            summary.add_error(None, &e);
            self.recorder
                .record_step(run_id, &failed_step(key, None, &e))
                .await?;
            return Ok(HelperOutcome::Failed);
        }

        Ok(if failures > 0 {
            HelperOutcome::Partial
        } else {
            HelperOutcome::Succeeded
        })
    }
}

enum HelperOutcome {
    Succeeded,
    Partial,
    Failed,
}

fn succeeded_step(report: &StepReport) -> StepRow {
    StepRow {
        helper: report.helper.clone(),
        state_id: report.state.clone(),
        outcome: "succeeded".to_string(),
        source_rows: Some(report.source_rows),
        excluded_rows: Some(report.excluded_rows),
        rows_written: i64::try_from(report.rows_written).ok(),
        warnings: report.warnings.clone(),
        error_kind: None,
        error: None,
        elapsed_ms: i64::try_from(report.elapsed_ms).ok(),
    }
}

fn failed_step(helper: &str, state: Option<&str>, error: &AggregationError) -> StepRow {
    StepRow {
        helper: helper.to_string(),
        state_id: state.map(str::to_string),
        outcome: "failed".to_string(),
        source_rows: None,
        excluded_rows: None,
        rows_written: None,
        warnings: Vec::new(),
        error_kind: Some(error.kind().to_string()),
        error: Some(error.to_string()),
        elapsed_ms: None,
    }
}

fn skipped_step(helper: &dyn AggregationHelper) -> StepRow {
    StepRow {
        helper: helper.descriptor().key.to_string(),
        state_id: None,
        outcome: "skipped".to_string(),
        source_rows: None,
        excluded_rows: None,
        rows_written: None,
        warnings: Vec::new(),
        error_kind: None,
        error: None,
        elapsed_ms: None,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Mutex};

    use async_trait::async_trait;

    use super::recorder::memory::MemoryRecorder;
    use super::*;
    use crate::helpers::descriptor::{HelperDescriptor, QueryShape, SelectSpec, TableRef};

    const fn stub(
        key: &'static str,
        scope: Scope,
        depends_on: &'static [&'static str],
    ) -> HelperDescriptor {
        HelperDescriptor {
            key,
            target: "stub",
            scope,
            sources: &[],
            depends_on,
            distribution_column: "supervisor_id",
            state_column: "state_id",
            lookback_months: 0,
            scratch: &[],
            query: QueryShape::Select(SelectSpec {
                from: TableRef::Fact("stub"),
                alias: "s",
                joins: &[],
                filters: &[],
                columns: &[],
                group_by: &[],
            }),
            indexes: &[],
            validations: &[],
        }
    }

    static LOCATION: HelperDescriptor = stub("location", Scope::Global, &[]);
    static FORMS: HelperDescriptor = stub("forms", Scope::PerState, &[]);
    static MONTHLY: HelperDescriptor = stub("monthly", Scope::Global, &["location", "forms"]);

    #[derive(Default)]
    struct FakeHelper {
        descriptor: Option<&'static HelperDescriptor>,
        failing_states: HashSet<&'static str>,
        fail_global: bool,
        fail_finalize: bool,
        aggregated: Mutex<Vec<Option<String>>>,
        prepared: Mutex<Vec<StateSelection>>,
    }

    impl FakeHelper {
        fn new(descriptor: &'static HelperDescriptor) -> Self {
            Self {
                descriptor: Some(descriptor),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AggregationHelper for FakeHelper {
        fn descriptor(&self) -> &'static HelperDescriptor {
            self.descriptor.unwrap()
        }

        async fn check_sources(&self, _month: Month, _state: Option<&str>) -> AggregationResult<()> {
            Ok(())
        }

        async fn prepare(&self, _month: Month, states: &StateSelection) -> AggregationResult<()> {
            self.prepared.lock().unwrap().push(states.clone());
            Ok(())
        }

        async fn aggregate(
            &self,
            _month: Month,
            state: Option<&str>,
        ) -> AggregationResult<StepReport> {
            self.aggregated
                .lock()
                .unwrap()
                .push(state.map(str::to_string));
            let failing = match state {
                Some(state) => self.failing_states.contains(state),
                None => self.fail_global,
            };
            if failing {
                return Err(AggregationError::Compute {
                    helper: self.descriptor().key.to_string(),
                    message: "division by zero".to_string(),
                });
            }
            Ok(StepReport {
                helper: self.descriptor().key.to_string(),
                state: state.map(str::to_string),
                source_rows: 10,
                excluded_rows: 1,
                rows_written: 9,
                ..Default::default()
            })
        }

        async fn finalize(&self, _month: Month) -> AggregationResult<()> {
            if self.fail_finalize {
                return Err(AggregationError::IndexBuild {
                    helper: self.descriptor().key.to_string(),
                    index: "stub_case".to_string(),
                    source: sqlx::Error::RowNotFound,
                });
            }
            Ok(())
        }
    }

    struct FixedStates(Vec<&'static str>);

    #[async_trait]
    impl StateSource for FixedStates {
        async fn active_states(&self) -> AggregationResult<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    fn pipeline(
        helpers: Vec<Arc<FakeHelper>>,
    ) -> Pipeline<MemoryRecorder> {
        let helpers = helpers
            .into_iter()
            .map(|h| h as Arc<dyn AggregationHelper>)
            .collect();
        Pipeline::new(
            Arc::new(HelperRegistry::from_helpers(helpers)),
            Arc::new(FixedStates(vec!["st1", "st2", "st3"])),
            MemoryRecorder::default(),
            PipelineSettings {
                max_parallel_states: 2,
            },
        )
    }

    fn request(states: Option<Vec<&str>>) -> RunRequest {
        RunRequest {
            month: Month::parse("2020-08").unwrap(),
            selection: HelperSelection::All,
            states: states.map(|s| s.into_iter().map(str::to_string).collect()),
        }
    }

    fn outcomes(recorder: &MemoryRecorder) -> Vec<(String, Option<String>, String)> {
        let mut steps: Vec<_> = recorder
            .steps
            .lock()
            .unwrap()
            .iter()
            .map(|s| (s.helper.clone(), s.state_id.clone(), s.outcome.clone()))
            .collect();
        steps.sort();
        steps
    }

    #[tokio::test]
    async fn test_all_helpers_succeed() {
        let forms = Arc::new(FakeHelper::new(&FORMS));
        let pipeline = pipeline(vec![
            Arc::new(FakeHelper::new(&LOCATION)),
            forms.clone(),
            Arc::new(FakeHelper::new(&MONTHLY)),
        ]);

        let summary = pipeline.run(&request(None)).await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.states, vec!["st1", "st2", "st3"]);
        assert_eq!(summary.helpers[1].succeeded, 3);
        assert_eq!(summary.excluded_rows(), 5);
        assert_eq!(
            forms.prepared.lock().unwrap().as_slice(),
            &[StateSelection::Active(vec![
                "st1".to_string(),
                "st2".to_string(),
                "st3".to_string()
            ])]
        );
        assert_eq!(
            pipeline.recorder().statuses.lock().unwrap().as_slice(),
            &[RunStatus::Pending, RunStatus::Running, RunStatus::Completed]
        );
        assert_eq!(pipeline.recorder().steps.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_state_failure_is_isolated() {
        let forms = Arc::new(FakeHelper {
            failing_states: HashSet::from(["st2"]),
            ..FakeHelper::new(&FORMS)
        });
        let monthly = Arc::new(FakeHelper::new(&MONTHLY));
        let pipeline = pipeline(vec![
            Arc::new(FakeHelper::new(&LOCATION)),
            forms,
            monthly.clone(),
        ]);

        let summary = pipeline.run(&request(None)).await.unwrap();

        assert_eq!(summary.status, RunStatus::PartiallyFailed);
        assert_eq!(summary.helpers[1].succeeded, 2);
        assert_eq!(summary.helpers[1].failed, 1);
        assert!(summary.helpers[1].errors[0].starts_with("st2: "));
        assert_eq!(monthly.aggregated.lock().unwrap().len(), 1);
        assert!(outcomes(pipeline.recorder()).contains(&(
            "forms".to_string(),
            Some("st2".to_string()),
            "failed".to_string()
        )));
        assert_eq!(pipeline.recorder().final_status(), Some(RunStatus::PartiallyFailed));
    }

    #[tokio::test]
    async fn test_every_state_failing_halts_the_run() {
        let forms = Arc::new(FakeHelper {
            failing_states: HashSet::from(["st1", "st2"]),
            ..FakeHelper::new(&FORMS)
        });
        let monthly = Arc::new(FakeHelper::new(&MONTHLY));
        let pipeline = pipeline(vec![
            Arc::new(FakeHelper::new(&LOCATION)),
            forms,
            monthly.clone(),
        ]);

        let summary = pipeline
            .run(&request(Some(vec!["st1", "st2"])))
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.helpers[2].skipped, 1);
        assert!(monthly.aggregated.lock().unwrap().is_empty());
        assert!(outcomes(pipeline.recorder()).contains(&(
            "monthly".to_string(),
            None,
            "skipped".to_string()
        )));
    }

    #[tokio::test]
    async fn test_global_failure_skips_the_rest() {
        let pipeline = pipeline(vec![
            Arc::new(FakeHelper {
                fail_global: true,
                ..FakeHelper::new(&LOCATION)
            }),
            Arc::new(FakeHelper::new(&FORMS)),
            Arc::new(FakeHelper::new(&MONTHLY)),
        ]);

        let summary = pipeline.run(&request(None)).await.unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.status.exit_code(), 1);
        assert_eq!(
            outcomes(pipeline.recorder()),
            vec![
                ("forms".to_string(), None, "skipped".to_string()),
                ("location".to_string(), None, "failed".to_string()),
                ("monthly".to_string(), None, "skipped".to_string()),
            ]
        );
        let stored = pipeline.recorder().summary.lock().unwrap().clone().unwrap();
        assert_eq!(stored["status"], "FAILED");
    }

    #[tokio::test]
    async fn test_finalize_failure_is_fatal() {
        let pipeline = pipeline(vec![
            Arc::new(FakeHelper::new(&LOCATION)),
            Arc::new(FakeHelper {
                fail_finalize: true,
                ..FakeHelper::new(&FORMS)
            }),
            Arc::new(FakeHelper::new(&MONTHLY)),
        ]);

        let summary = pipeline.run(&request(None)).await.unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.helpers[2].skipped, 1);
    }

    #[tokio::test]
    async fn test_explicit_states_still_run_global_helpers() {
        let location = Arc::new(FakeHelper::new(&LOCATION));
        let forms = Arc::new(FakeHelper::new(&FORMS));
        let pipeline = pipeline(vec![
            location.clone(),
            forms.clone(),
            Arc::new(FakeHelper::new(&MONTHLY)),
        ]);

        let summary = pipeline.run(&request(Some(vec!["st3"]))).await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(location.aggregated.lock().unwrap().as_slice(), &[None::<String>]);
        assert_eq!(
            forms.aggregated.lock().unwrap().as_slice(),
            &[Some("st3".to_string())]
        );
        assert_eq!(
            forms.prepared.lock().unwrap().as_slice(),
            &[StateSelection::Subset(vec!["st3".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_unknown_helper_fails_before_running() {
        let pipeline = pipeline(vec![Arc::new(FakeHelper::new(&LOCATION))]);
        let request = RunRequest {
            selection: HelperSelection::Only("agg-bihar".to_string()),
            ..request(None)
        };

        let err = pipeline.run(&request).await.unwrap_err();

        assert!(matches!(err, AggregationError::UnknownHelper(_)));
        assert_eq!(
            pipeline.recorder().statuses.lock().unwrap().as_slice(),
            &[RunStatus::Pending, RunStatus::Failed]
        );
    }
}

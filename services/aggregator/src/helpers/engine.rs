//! The shared replace-cycle every descriptor runs through.

use std::{collections::HashMap, sync::Arc, time::Instant};

use async_trait::async_trait;
use icds_partition::{
    attach_partition_sql, distribute_sql, partition_name, staging_name, Ident, Month, NamingError,
};
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info, instrument, warn};

use crate::{
    db::{blocking_partition, PartitionCatalog},
    error::{AggregationError, AggregationResult},
    sources::SourceResolver,
};

use super::{
    catalog,
    descriptor::{HelperDescriptor, Scope},
    render::{
        exclusion_statement, populate_statements, scratch_plans, source_has_rows, RenderContext,
    },
    AggregationHelper, StateSelection, StepReport,
};

/// Engine-wide switches.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Distribute new tables with `create_distributed_table`.
    pub citus: bool,
    /// Share of excluded source rows above which a step reports a warning.
    pub exclusion_warn_ratio: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            citus: false,
            exclusion_warn_ratio: 0.05,
        }
    }
}

/// Database handles and settings shared by every helper.
pub struct Engine {
    pool: PgPool,
    catalog: PartitionCatalog,
    sources: SourceResolver,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(pool: PgPool, sources: SourceResolver, settings: EngineSettings) -> Self {
        Self {
            catalog: PartitionCatalog::new(pool.clone()),
            pool,
            sources,
            settings,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn sources(&self) -> &SourceResolver {
        &self.sources
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn resolve_sources(
        &self,
        descriptor: &HelperDescriptor,
        state: Option<&str>,
    ) -> Result<HashMap<&'static str, Ident>, NamingError> {
        descriptor
            .sources
            .iter()
            .map(|s| Ok((s.id, self.sources.resolve(s.id, state)?)))
            .collect()
    }

    /// Physical scratch tables, unique per month (and state).
    fn scratch_names(
        &self,
        descriptor: &HelperDescriptor,
        month: Month,
        state: Option<&str>,
    ) -> Result<HashMap<&'static str, Ident>, NamingError> {
        let month = month.to_string();
        descriptor
            .scratch
            .iter()
            .map(|s| {
                let table = match state {
                    Some(state) => {
                        Ident::derived(&["tmp", s.name, &month, &Ident::short_hash(state)])?
                    }
                    None => Ident::derived(&["tmp", s.name, &month])?,
                };
                Ok((s.name, table))
            })
            .collect()
    }

    async fn drop_tables(&self, tables: &[Ident]) -> Result<(), sqlx::Error> {
        if tables.is_empty() {
            return Ok(());
        }
        let list = tables
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!("DROP TABLE IF EXISTS {list}"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn distribute(
        &self,
        conn: &mut PgConnection,
        table: &Ident,
        column: &str,
    ) -> AggregationResult<()> {
        if !self.settings.citus {
            return Ok(());
        }
        let column = Ident::new(column)?;
        sqlx::query(&distribute_sql(table, &column))
            .execute(conn)
            .await?;
        Ok(())
    }
}

/// Fails when attaching `partition` to `parent` for `month` would clash with
/// what is already attached.
async fn check_attach_conflict(
    conn: &mut PgConnection,
    parent: &Ident,
    partition: &Ident,
    month: Month,
) -> AggregationResult<()> {
    let attached = PartitionCatalog::attached_on(&mut *conn, parent).await?;
    if let Some(existing) = blocking_partition(&attached, partition, month) {
        return Err(AggregationError::PartitionConflict {
            parent: parent.as_str().to_string(),
            partition: partition.as_str().to_string(),
            existing: existing.name.clone(),
        });
    }
    if let Some(other) = PartitionCatalog::parent_of_on(&mut *conn, partition).await? {
        if other != parent.as_str() {
            return Err(AggregationError::PartitionConflict {
                parent: parent.as_str().to_string(),
                partition: partition.as_str().to_string(),
                existing: format!("{} attached to {other}", partition.as_str()),
            });
        }
    }
    Ok(())
}

/// An [`AggregationHelper`] backed by a static descriptor.
pub struct DescriptorHelper {
    descriptor: &'static HelperDescriptor,
    engine: Arc<Engine>,
}

impl DescriptorHelper {
    pub fn new(descriptor: &'static HelperDescriptor, engine: Arc<Engine>) -> Self {
        Self { descriptor, engine }
    }

    /// Runs `build` between removing leftovers of earlier runs and dropping
    /// staging and scratch tables, whatever `build` returns.
    async fn with_temp_tables<F, Fut>(
        &self,
        leftovers: Vec<Ident>,
        temp: Vec<Ident>,
        build: F,
    ) -> AggregationResult<StepReport>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AggregationResult<StepReport>>,
    {
        self.engine
            .drop_tables(&leftovers)
            .await
            .map_err(|e| AggregationError::compute(self.descriptor.key, e))?;

        let result = build().await;

        if let Err(e) = self.engine.drop_tables(&temp).await {
            warn!(
                helper = self.descriptor.key,
                error = %e,
                "Failed to drop staging tables"
            );
        }
        result
    }

    #[instrument(skip(self), fields(helper = self.descriptor.key, month = %month))]
    async fn aggregate_global(&self, month: Month) -> AggregationResult<StepReport> {
        let d = self.descriptor;
        let started = Instant::now();
        let target = d.target_ident()?;
        let partition = partition_name(&target, month)?;
        let staging = staging_name(&target, month, None)?;
        let stale = staging_name(&target, month.prev(), None)?;
        let sources = self.engine.resolve_sources(d, None)?;
        let scratch = self.engine.scratch_names(d, month, None)?;

        let mut temp = vec![staging.clone()];
        temp.extend(scratch.values().cloned());
        let mut leftovers = vec![stale];
        leftovers.extend(temp.iter().cloned());

        let ctx = RenderContext {
            month,
            lookback_months: d.lookback_months,
            state_id: None,
            staging: &staging,
            sources: &sources,
            scratch: &scratch,
        };

        let mut report = self
            .with_temp_tables(leftovers, temp, || {
                self.build_and_swap(&ctx, &target, &partition)
            })
            .await?;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            rows_written = report.rows_written,
            excluded_rows = report.excluded_rows,
            elapsed_ms = report.elapsed_ms,
            "Partition replaced"
        );
        Ok(report)
    }

    async fn build_and_swap(
        &self,
        ctx: &RenderContext<'_>,
        target: &Ident,
        partition: &Ident,
    ) -> AggregationResult<StepReport> {
        let d = self.descriptor;
        let pool = self.engine.pool();
        let mut conn = pool.acquire().await?;

        let create = format!("CREATE TABLE {} (LIKE {target} INCLUDING DEFAULTS)", ctx.staging);
        sqlx::query(&create).execute(&mut *conn).await?;
        self.engine
            .distribute(&mut conn, ctx.staging, d.distribution_column)
            .await?;
        drop(conn);

        self.build_scratch(ctx).await?;
        let mut report = self.count_rows(ctx).await?;
        report.rows_written = self.populate(ctx).await?;

        for index in d.indexes {
            let columns = index
                .columns
                .iter()
                .map(|c| Ident::new(*c).map(|c| c.to_string()))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ");
            let sql = format!("CREATE INDEX ON {} ({columns})", ctx.staging);
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|source| AggregationError::IndexBuild {
                    helper: d.key.to_string(),
                    index: index.suffix.to_string(),
                    source,
                })?;
        }

        let mut tx = pool.begin().await?;
        check_attach_conflict(&mut tx, target, partition, ctx.month).await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {partition}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("ALTER TABLE {} RENAME TO {partition}", ctx.staging))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&attach_partition_sql(target, partition, ctx.month))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(report)
    }

    #[instrument(skip(self), fields(helper = self.descriptor.key, month = %month))]
    async fn aggregate_state(&self, month: Month, state: &str) -> AggregationResult<StepReport> {
        let d = self.descriptor;
        let started = Instant::now();
        let target = d.target_ident()?;
        let partition = partition_name(&target, month)?;
        let staging = staging_name(&target, month, Some(state))?;
        let sources = self.engine.resolve_sources(d, Some(state))?;
        let scratch = self.engine.scratch_names(d, month, Some(state))?;

        let mut temp = vec![staging.clone()];
        temp.extend(scratch.values().cloned());

        let ctx = RenderContext {
            month,
            lookback_months: d.lookback_months,
            state_id: Some(state),
            staging: &staging,
            sources: &sources,
            scratch: &scratch,
        };

        let mut report = self
            .with_temp_tables(temp.clone(), temp, || {
                self.build_and_replace_slice(&ctx, &target, &partition, state)
            })
            .await?;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            state_id = state,
            rows_written = report.rows_written,
            excluded_rows = report.excluded_rows,
            elapsed_ms = report.elapsed_ms,
            "State slice replaced"
        );
        Ok(report)
    }

    async fn build_and_replace_slice(
        &self,
        ctx: &RenderContext<'_>,
        target: &Ident,
        partition: &Ident,
        state: &str,
    ) -> AggregationResult<StepReport> {
        let d = self.descriptor;
        let pool = self.engine.pool();

        // Per-state staging stays local to the coordinator; only the month
        // partition is distributed.
        let create = format!(
            "CREATE UNLOGGED TABLE {} (LIKE {target} INCLUDING DEFAULTS)",
            ctx.staging
        );
        sqlx::query(&create).execute(pool).await?;

        self.build_scratch(ctx).await?;
        let mut report = self.count_rows(ctx).await?;
        self.populate(ctx).await?;

        let state_column = Ident::new(d.state_column)?;
        let mut tx = pool.begin().await?;
        let deleted = sqlx::query(&format!(
            "DELETE FROM {partition} WHERE {state_column} = $1"
        ))
        .bind(state)
        .execute(&mut *tx)
        .await
        .map_err(|e| AggregationError::compute(d.key, e))?;
        let inserted = sqlx::query(&format!(
            "INSERT INTO {partition} SELECT * FROM {}",
            ctx.staging
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| AggregationError::compute(d.key, e))?;
        tx.commit().await?;

        debug!(
            state_id = state,
            deleted = deleted.rows_affected(),
            inserted = inserted.rows_affected(),
            "Slice swapped"
        );
        report.rows_written = inserted.rows_affected();
        Ok(report)
    }

    async fn build_scratch(&self, ctx: &RenderContext<'_>) -> AggregationResult<()> {
        let d = self.descriptor;
        let pool = self.engine.pool();
        for plan in scratch_plans(d, ctx)? {
            sqlx::query(&plan.create).execute(pool).await?;
            if plan.distribute {
                let mut conn = pool.acquire().await?;
                self.engine
                    .distribute(&mut conn, &plan.table, d.distribution_column)
                    .await?;
            }
            let filled = plan
                .fill
                .query()
                .execute(pool)
                .await
                .map_err(|e| AggregationError::compute(d.key, e))?;
            debug!(
                scratch = plan.name,
                rows = filled.rows_affected(),
                "Scratch table built"
            );
        }
        Ok(())
    }

    /// Counts in-scope and excluded primary-source rows and turns a high
    /// exclusion share into a warning.
    async fn count_rows(&self, ctx: &RenderContext<'_>) -> AggregationResult<StepReport> {
        let d = self.descriptor;
        let mut report = StepReport {
            helper: d.key.to_string(),
            state: ctx.state_id.map(str::to_string),
            ..Default::default()
        };
        let Some(statement) = exclusion_statement(d, ctx)? else {
            return Ok(report);
        };
        let row = statement
            .query()
            .fetch_one(self.engine.pool())
            .await
            .map_err(|e| AggregationError::compute(d.key, e))?;
        report.source_rows = row.try_get("source_rows")?;
        report.excluded_rows = row.try_get("excluded_rows")?;

        let ratio = report.exclusion_ratio();
        if ratio > self.engine.settings.exclusion_warn_ratio {
            let source = d.primary_source().map(|s| s.id).unwrap_or_default();
            warn!(
                helper = d.key,
                state_id = ctx.state_id,
                source_rows = report.source_rows,
                excluded_rows = report.excluded_rows,
                "High share of source rows failed validation"
            );
            report.warnings.push(format!(
                "{} of {} rows from '{source}' failed validation ({:.1}%)",
                report.excluded_rows,
                report.source_rows,
                ratio * 100.0
            ));
        }
        Ok(report)
    }

    async fn populate(&self, ctx: &RenderContext<'_>) -> AggregationResult<u64> {
        let d = self.descriptor;
        let mut written = 0;
        for statement in populate_statements(d, ctx)? {
            let result = statement
                .query()
                .execute(self.engine.pool())
                .await
                .map_err(|e| AggregationError::compute(d.key, e))?;
            written += result.rows_affected();
        }
        Ok(written)
    }
}

#[async_trait]
impl AggregationHelper for DescriptorHelper {
    fn descriptor(&self) -> &'static HelperDescriptor {
        self.descriptor
    }

    async fn check_sources(&self, month: Month, state: Option<&str>) -> AggregationResult<()> {
        let d = self.descriptor;
        let state = match d.scope {
            Scope::PerState => state,
            Scope::Global => None,
        };

        for source in d.sources {
            let table = self.engine.sources.resolve(source.id, state)?;
            if !self.engine.catalog.table_exists(&table).await? {
                return Err(AggregationError::SourceUnavailable {
                    source_id: source.id.to_string(),
                    reason: format!("table {table} does not exist"),
                });
            }
            if source.allow_empty {
                continue;
            }
            let has_rows: bool = source_has_rows(source, &table, month, state)?
                .query()
                .fetch_one(self.engine.pool())
                .await?
                .try_get(0)?;
            if !has_rows {
                let scope = state.map(|s| format!(" for state {s}")).unwrap_or_default();
                return Err(AggregationError::SourceUnavailable {
                    source_id: source.id.to_string(),
                    reason: format!("no rows in {month}{scope}"),
                });
            }
        }

        for dependency in d.depends_on {
            let upstream = catalog::find(dependency)
                .ok_or_else(|| AggregationError::UnknownHelper(dependency.to_string()))?;
            let parent = upstream.target_ident()?;
            if !self.engine.catalog.is_attached(&parent, month).await? {
                return Err(AggregationError::SourceUnavailable {
                    source_id: dependency.to_string(),
                    reason: format!("{} has no partition attached for {month}", upstream.target),
                });
            }
        }
        Ok(())
    }

    #[instrument(skip(self, states), fields(helper = self.descriptor.key, month = %month))]
    async fn prepare(&self, month: Month, states: &StateSelection) -> AggregationResult<()> {
        let d = self.descriptor;
        if d.scope == Scope::Global {
            return Ok(());
        }
        let target = d.target_ident()?;
        let partition = partition_name(&target, month)?;
        let mut tx = self.engine.pool().begin().await?;

        if !PartitionCatalog::table_exists_on(&mut tx, &partition).await? {
            let create = format!("CREATE TABLE {partition} (LIKE {target} INCLUDING DEFAULTS)");
            sqlx::query(&create).execute(&mut *tx).await?;
            self.engine
                .distribute(&mut tx, &partition, d.distribution_column)
                .await?;
            info!(partition = partition.as_str(), "Created month partition");
        }

        let parent = PartitionCatalog::parent_of_on(&mut tx, &partition).await?;
        if parent.as_deref() != Some(target.as_str()) {
            check_attach_conflict(&mut tx, &target, &partition, month).await?;
            sqlx::query(&attach_partition_sql(&target, &partition, month))
                .execute(&mut *tx)
                .await?;
            info!(partition = partition.as_str(), "Attached month partition");
        }

        if let StateSelection::Active(active) = states {
            let state_column = Ident::new(d.state_column)?;
            let removed = sqlx::query(&format!(
                "DELETE FROM {partition} WHERE {state_column} IS NULL OR NOT ({state_column} = ANY($1))"
            ))
            .bind(active)
            .execute(&mut *tx)
            .await?;
            if removed.rows_affected() > 0 {
                info!(
                    rows = removed.rows_affected(),
                    "Removed slices of inactive states"
                );
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn aggregate(&self, month: Month, state: Option<&str>) -> AggregationResult<StepReport> {
        match (self.descriptor.scope, state) {
            (Scope::Global, _) => self.aggregate_global(month).await,
            (Scope::PerState, Some(state)) => self.aggregate_state(month, state).await,
            (Scope::PerState, None) => Err(AggregationError::MissingState(
                self.descriptor.key.to_string(),
            )),
        }
    }

    #[instrument(skip(self), fields(helper = self.descriptor.key, month = %month))]
    async fn finalize(&self, month: Month) -> AggregationResult<()> {
        let d = self.descriptor;
        if d.scope == Scope::Global {
            return Ok(());
        }
        let target = d.target_ident()?;
        let partition = partition_name(&target, month)?;
        for index in d.indexes {
            let name = Ident::derived(&[partition.as_str(), index.suffix])?;
            let columns = index
                .columns
                .iter()
                .map(|c| Ident::new(*c).map(|c| c.to_string()))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ");
            let sql = format!("CREATE INDEX IF NOT EXISTS {name} ON {partition} ({columns})");
            sqlx::query(&sql)
                .execute(self.engine.pool())
                .await
                .map_err(|source| AggregationError::IndexBuild {
                    helper: d.key.to_string(),
                    index: name.as_str().to_string(),
                    source,
                })?;
        }
        debug!(indexes = d.indexes.len(), "Indexes built");
        Ok(())
    }
}

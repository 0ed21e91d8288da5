//! Declarative helper descriptors.
//!
//! A descriptor is everything that distinguishes one fact table's aggregation
//! from another: where rows come from, where they go, and the SQL expressions
//! that turn one into the other. The replace-cycle itself lives in
//! [`super::engine`] and is shared by every descriptor.
//!
//! Column expressions are static SQL fragments. They may reference the bound
//! parameters `:month_start`, `:next_month_start`, `:prev_month_start`,
//! `:lookback_start` and `:state_id`; nothing else is substituted into them.

use icds_partition::{Ident, NamingError};

/// Location hierarchy columns, leaf last. Index `n` is aggregation level `n + 1`.
pub const LOCATION_LEVELS: [&str; 5] = [
    "state_id",
    "district_id",
    "block_id",
    "supervisor_id",
    "awc_id",
];

/// The aggregation level of leaf (AWC) rows.
pub const LEAF_LEVEL: u8 = 5;

/// Whether a helper runs once per month or once per state per month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One replace-cycle per month; the whole partition is swapped.
    Global,
    /// One replace-cycle per state; each state owns a disjoint slice.
    PerState,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::PerState => "per_state",
        }
    }
}

/// An upstream UCR data source.
#[derive(Debug, Clone, Copy)]
pub struct SourceRef {
    /// Stable logical id, e.g. `static-dashboard_thr_forms`.
    pub id: &'static str,
    /// Column used to window rows into a month, if the source is event-like.
    pub time_column: Option<&'static str>,
    /// Column holding the state id, if the source can be filtered per state.
    pub state_column: Option<&'static str>,
    /// Whether an empty month is legitimate (sparse forms) rather than a sign
    /// that the source has not been refreshed.
    pub allow_empty: bool,
}

/// A table a query reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRef {
    /// A UCR source, by logical id.
    Source(&'static str),
    /// A fact table owned by this pipeline, by parent name.
    Fact(&'static str),
    /// A scratch table declared on the same descriptor.
    Scratch(&'static str),
    /// The staging table of the current run.
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub alias: &'static str,
    pub on: &'static str,
}

/// An output column and the expression that computes it.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub expr: &'static str,
}

/// Shorthand for building [`Column`] tables in descriptors.
pub const fn col(name: &'static str, expr: &'static str) -> Column {
    Column { name, expr }
}

/// `SELECT .. FROM .. [JOIN ..] WHERE .. [GROUP BY ..]`.
#[derive(Debug, Clone, Copy)]
pub struct SelectSpec {
    pub from: TableRef,
    pub alias: &'static str,
    pub joins: &'static [Join],
    /// Conditions joined with `AND`.
    pub filters: &'static [&'static str],
    pub columns: &'static [Column],
    pub group_by: &'static [&'static str],
}

/// One event-date column ranked within the month.
#[derive(Debug, Clone, Copy)]
pub struct EventSeries {
    /// Source column holding the event date.
    pub column: &'static str,
    /// Output columns are `{prefix}_1` .. `{prefix}_{count}`.
    pub output_prefix: &'static str,
    pub count: u8,
}

/// First N in-month event dates per entity.
///
/// Rows are ranked per entity by: in-month events first, then event date, then
/// submission time. Ties on date go to the earliest submission; exact
/// duplicates take consecutive slots.
#[derive(Debug, Clone, Copy)]
pub struct RankedEventsSpec {
    pub source: &'static str,
    /// Grouping keys, copied to the output under the same names.
    pub keys: &'static [&'static str],
    /// Output name of the entity key, when it differs from the source column
    /// (the last key).
    pub entity_as: Option<&'static str>,
    pub submitted_at: &'static str,
    pub series: &'static [EventSeries],
}

/// Last non-null value of each column over a lookback window.
#[derive(Debug, Clone, Copy)]
pub struct LatestValuesSpec {
    pub source: &'static str,
    /// Entity key column in the source.
    pub key: &'static str,
    /// Output name of the key.
    pub key_as: &'static str,
    /// Columns copied from the most recent row regardless of nulls.
    pub carry: &'static [&'static str],
    pub time_column: &'static str,
    /// Output column receiving the latest submission time.
    pub latest_as: &'static str,
    pub values: &'static [&'static str],
}

/// How a measure combines when rolling up one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupFn {
    Sum,
    Max,
}

#[derive(Debug, Clone, Copy)]
pub struct Measure {
    pub column: &'static str,
    pub rollup: RollupFn,
}

pub const fn sum(column: &'static str) -> Measure {
    Measure {
        column,
        rollup: RollupFn::Sum,
    }
}

pub const fn max(column: &'static str) -> Measure {
    Measure {
        column,
        rollup: RollupFn::Max,
    }
}

/// A descriptive column that belongs to one hierarchy level (e.g. `state_name`
/// belongs to level 1). It is kept at that level and below, NULL above.
#[derive(Debug, Clone, Copy)]
pub struct LevelAttribute {
    pub level: u8,
    pub column: &'static str,
}

pub const fn attr(level: u8, column: &'static str) -> LevelAttribute {
    LevelAttribute { level, column }
}

/// Leaf-level rows followed by one rollup pass per hierarchy level.
///
/// The leaf select must emit every column the rollup names plus
/// `aggregation_level = 5`. Rollup to level `k` reads level `k + 1` rows from
/// the staging table, replaces collapsed location ids and blanked dimensions
/// with `'All'`, and combines measures.
#[derive(Debug, Clone, Copy)]
pub struct RollupSpec {
    pub leaf: SelectSpec,
    pub level_attributes: &'static [LevelAttribute],
    /// Kept and grouped at every level.
    pub dimensions: &'static [&'static str],
    /// Replaced by `'All'` above the leaf.
    pub blanked: &'static [&'static str],
    pub measures: &'static [Measure],
}

/// The query that fills a helper's staging table.
#[derive(Debug, Clone, Copy)]
pub enum QueryShape {
    Select(SelectSpec),
    RankedEvents(RankedEventsSpec),
    LatestValues(LatestValuesSpec),
    Rollup(RollupSpec),
}

impl QueryShape {
    pub fn name(&self) -> &'static str {
        match self {
            QueryShape::Select(_) => "select",
            QueryShape::RankedEvents(_) => "ranked_events",
            QueryShape::LatestValues(_) => "latest_values",
            QueryShape::Rollup(_) => "rollup",
        }
    }
}

/// Column definition for scratch-table DDL.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
}

pub const fn def(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef { name, sql_type }
}

/// A temporary table built before the main query and dropped after the run,
/// success or failure. Used when an expensive intermediate result is read more
/// than once.
#[derive(Debug, Clone, Copy)]
pub struct ScratchSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub select: SelectSpec,
    /// Shard the scratch table by the descriptor's distribution column.
    pub distribute: bool,
}

/// An index built after bulk load.
#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    pub suffix: &'static str,
    pub columns: &'static [&'static str],
}

pub const fn index(suffix: &'static str, columns: &'static [&'static str]) -> IndexDef {
    IndexDef { suffix, columns }
}

/// What makes a primary-source row usable. Rows failing any rule are
/// excluded from the aggregate and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Join or entity key must be present.
    NotNull(&'static str),
    /// Count or quantity must not be negative when present.
    NonNegative(&'static str),
}

impl Validation {
    pub fn column(&self) -> &'static str {
        match self {
            Validation::NotNull(c) | Validation::NonNegative(c) => c,
        }
    }
}

/// Everything the engine needs to aggregate one fact table.
#[derive(Debug)]
pub struct HelperDescriptor {
    /// Stable key, also the CLI `table_type`.
    pub key: &'static str,
    /// Parent partitioned table.
    pub target: &'static str,
    pub scope: Scope,
    /// UCR sources; the first is the primary source.
    pub sources: &'static [SourceRef],
    /// Helpers whose output this helper reads for the same month.
    pub depends_on: &'static [&'static str],
    pub distribution_column: &'static str,
    /// Target column identifying a state's slice.
    pub state_column: &'static str,
    /// Months of history visible through `:lookback_start`.
    pub lookback_months: u32,
    pub scratch: &'static [ScratchSpec],
    pub query: QueryShape,
    pub indexes: &'static [IndexDef],
    pub validations: &'static [Validation],
}

impl HelperDescriptor {
    /// The primary UCR source, if any.
    pub fn primary_source(&self) -> Option<&SourceRef> {
        self.sources.first()
    }

    /// Whether a temporary scratch table is built during the run.
    pub fn requires_scratch(&self) -> bool {
        !self.scratch.is_empty()
    }

    pub fn target_ident(&self) -> Result<Ident, NamingError> {
        Ident::new(self.target)
    }

    /// Validates every identifier the descriptor contributes to SQL text.
    pub fn validate(&self) -> Result<(), NamingError> {
        Ident::new(self.target)?;
        Ident::new(self.distribution_column)?;
        Ident::new(self.state_column)?;
        for scratch in self.scratch {
            Ident::new(scratch.name)?;
            for column in scratch.columns {
                Ident::new(column.name)?;
            }
            for column in scratch.select.columns {
                Ident::new(column.name)?;
            }
        }
        for validation in self.validations {
            Ident::new(validation.column())?;
        }
        for idx in self.indexes {
            Ident::new(idx.suffix)?;
            for column in idx.columns {
                Ident::new(*column)?;
            }
        }
        match &self.query {
            QueryShape::Select(select) => validate_select(select),
            QueryShape::RankedEvents(spec) => {
                for key in spec.keys {
                    Ident::new(*key)?;
                }
                if let Some(entity) = spec.entity_as {
                    Ident::new(entity)?;
                }
                Ident::new(spec.submitted_at)?;
                for series in spec.series {
                    Ident::new(series.column)?;
                    Ident::new(series.output_prefix)?;
                }
                Ok(())
            }
            QueryShape::LatestValues(spec) => {
                Ident::new(spec.key)?;
                Ident::new(spec.key_as)?;
                Ident::new(spec.time_column)?;
                Ident::new(spec.latest_as)?;
                for column in spec.carry.iter().chain(spec.values) {
                    Ident::new(*column)?;
                }
                Ok(())
            }
            QueryShape::Rollup(spec) => {
                validate_select(&spec.leaf)?;
                for column in spec.dimensions.iter().chain(spec.blanked) {
                    Ident::new(*column)?;
                }
                for attribute in spec.level_attributes {
                    Ident::new(attribute.column)?;
                }
                for measure in spec.measures {
                    Ident::new(measure.column)?;
                }
                Ok(())
            }
        }
    }
}

fn validate_select(select: &SelectSpec) -> Result<(), NamingError> {
    Ident::new(select.alias)?;
    for join in select.joins {
        Ident::new(join.alias)?;
    }
    for column in select.columns {
        Ident::new(column.name)?;
    }
    Ok(())
}

//! Turns descriptors into SQL statements.
//!
//! Identifiers come from validated [`Ident`]s and are always quoted. Runtime
//! values (month bounds, state id) are never spliced into DML: named
//! parameters in expression fragments become `$n` placeholders and the values
//! travel as binds. DDL cannot take binds, which is why partition bounds are
//! rendered from the typed month in `icds_partition` instead.

use std::collections::HashMap;

use chrono::NaiveDate;
use icds_partition::{Ident, Month, NamingError};
use sqlx::{postgres::PgArguments, Postgres};

use super::descriptor::{
    HelperDescriptor, LatestValuesSpec, QueryShape, RankedEventsSpec, RollupFn, RollupSpec,
    ScratchSpec, Scope, SelectSpec, SourceRef, TableRef, Validation, LEAF_LEVEL, LOCATION_LEVELS,
};

/// Names a fragment may reference as `:name`.
pub const PARAMS: [&str; 5] = [
    "month_start",
    "next_month_start",
    "prev_month_start",
    "lookback_start",
    "state_id",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unknown parameter ':{0}' in SQL fragment")]
    UnknownParam(String),

    #[error("fragment references :state_id but no state is bound")]
    MissingState,

    #[error("table reference {0} does not resolve")]
    UnresolvedTable(String),

    #[error(transparent)]
    Naming(#[from] NamingError),
}

/// A value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Date(NaiveDate),
    Text(String),
}

/// SQL text plus the values for its placeholders, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl Statement {
    /// A statement without placeholders.
    pub fn plain(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    /// Build the sqlx query with every bind attached.
    pub fn query(&self) -> sqlx::query::Query<'_, Postgres, PgArguments> {
        let mut query = sqlx::query(&self.sql);
        for bind in &self.binds {
            query = match bind {
                BindValue::Date(date) => query.bind(*date),
                BindValue::Text(text) => query.bind(text.clone()),
            };
        }
        query
    }
}

/// Everything a descriptor's SQL can refer to for one run.
#[derive(Debug)]
pub struct RenderContext<'a> {
    pub month: Month,
    pub lookback_months: u32,
    pub state_id: Option<&'a str>,
    pub staging: &'a Ident,
    /// Logical source id -> physical table.
    pub sources: &'a HashMap<&'static str, Ident>,
    /// Scratch name -> physical table.
    pub scratch: &'a HashMap<&'static str, Ident>,
}

impl RenderContext<'_> {
    fn value(&self, name: &str) -> Result<BindValue, RenderError> {
        let month = self.month;
        match name {
            "month_start" => Ok(BindValue::Date(month.start())),
            "next_month_start" => Ok(BindValue::Date(month.next_start())),
            "prev_month_start" => Ok(BindValue::Date(month.prev().start())),
            "lookback_start" => {
                let back = i32::try_from(self.lookback_months).unwrap_or(i32::MAX);
                Ok(BindValue::Date(month.offset(-back).start()))
            }
            "state_id" => self
                .state_id
                .map(|s| BindValue::Text(s.to_string()))
                .ok_or(RenderError::MissingState),
            other => Err(RenderError::UnknownParam(other.to_string())),
        }
    }

    fn table(&self, table: &TableRef) -> Result<String, RenderError> {
        match table {
            TableRef::Source(id) => self
                .sources
                .get(id)
                .map(|t| t.to_string())
                .ok_or_else(|| RenderError::UnresolvedTable(format!("source {id}"))),
            TableRef::Fact(name) => Ok(Ident::new(*name)?.to_string()),
            TableRef::Scratch(name) => self
                .scratch
                .get(name)
                .map(|t| t.to_string())
                .ok_or_else(|| RenderError::UnresolvedTable(format!("scratch {name}"))),
            TableRef::Staging => Ok(self.staging.to_string()),
        }
    }
}

/// Accumulates binds for one statement. A parameter used twice shares a slot.
struct Binder<'c, 'a> {
    ctx: &'c RenderContext<'a>,
    binds: Vec<BindValue>,
    slots: HashMap<String, usize>,
}

impl<'c, 'a> Binder<'c, 'a> {
    fn new(ctx: &'c RenderContext<'a>) -> Self {
        Self {
            ctx,
            binds: Vec::new(),
            slots: HashMap::new(),
        }
    }

    fn slot(&mut self, name: &str) -> Result<usize, RenderError> {
        if let Some(slot) = self.slots.get(name) {
            return Ok(*slot);
        }
        let value = self.ctx.value(name)?;
        self.binds.push(value);
        let slot = self.binds.len();
        self.slots.insert(name.to_string(), slot);
        Ok(slot)
    }

    /// Rewrite `:name` tokens to `$n`. Casts (`::`) and quoted strings pass
    /// through untouched.
    fn fragment(&mut self, fragment: &str) -> Result<String, RenderError> {
        let mut out = String::with_capacity(fragment.len());
        let mut chars = fragment.char_indices().peekable();
        let mut in_quote = false;

        while let Some((_, ch)) = chars.next() {
            if in_quote {
                out.push(ch);
                if ch == '\'' {
                    in_quote = false;
                }
                continue;
            }
            match ch {
                '\'' => {
                    in_quote = true;
                    out.push(ch);
                }
                ':' => {
                    if matches!(chars.peek(), Some((_, ':'))) {
                        chars.next();
                        out.push_str("::");
                        continue;
                    }
                    let mut name = String::new();
                    while let Some((_, c)) = chars.peek() {
                        if c.is_ascii_alphanumeric() || *c == '_' {
                            name.push(*c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        out.push(':');
                    } else {
                        let slot = self.slot(&name)?;
                        out.push('$');
                        out.push_str(&slot.to_string());
                    }
                }
                _ => out.push(ch),
            }
        }
        Ok(out)
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            binds: self.binds,
        }
    }
}

fn quoted(name: &str) -> Result<String, RenderError> {
    Ok(Ident::new(name)?.to_string())
}

fn column_list(names: &[&str]) -> Result<String, RenderError> {
    let columns = names
        .iter()
        .map(|n| quoted(n))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns.join(", "))
}

/// Conditions every read of the primary source carries: the month window,
/// the state slice and the row validations.
fn primary_filters(
    descriptor: &HelperDescriptor,
    source: &SourceRef,
    alias: &str,
    window: Option<(&str, &str)>,
) -> Result<Vec<String>, RenderError> {
    let alias = quoted(alias)?;
    let mut filters = Vec::new();
    if let (Some(time), Some((from, to))) = (source.time_column, window) {
        let time = quoted(time)?;
        filters.push(format!("{alias}.{time} >= :{from}"));
        filters.push(format!("{alias}.{time} < :{to}"));
    }
    if descriptor.scope == Scope::PerState {
        if let Some(state) = source.state_column {
            filters.push(format!("{alias}.{} = :state_id", quoted(state)?));
        }
    }
    for validation in descriptor.validations {
        filters.push(validation_sql(&alias, validation)?);
    }
    Ok(filters)
}

fn validation_sql(alias: &str, validation: &Validation) -> Result<String, RenderError> {
    Ok(match validation {
        Validation::NotNull(column) => format!("{alias}.{} IS NOT NULL", quoted(column)?),
        Validation::NonNegative(column) => {
            let column = quoted(column)?;
            format!("({alias}.{column} IS NULL OR {alias}.{column} >= 0)")
        }
    })
}

fn is_primary(descriptor: &HelperDescriptor, table: &TableRef) -> Option<&'static SourceRef> {
    let primary = descriptor.sources.first()?;
    match table {
        TableRef::Source(id) if *id == primary.id => Some(primary),
        _ => None,
    }
}

fn select_sql(
    binder: &mut Binder<'_, '_>,
    descriptor: &HelperDescriptor,
    spec: &SelectSpec,
) -> Result<String, RenderError> {
    let ctx = binder.ctx;
    let columns = spec
        .columns
        .iter()
        .map(|c| Ok(format!("{} AS {}", binder.fragment(c.expr)?, quoted(c.name)?)))
        .collect::<Result<Vec<_>, RenderError>>()?;

    let mut sql = format!(
        "SELECT {} FROM {} {}",
        columns.join(", "),
        ctx.table(&spec.from)?,
        quoted(spec.alias)?
    );
    for join in spec.joins {
        sql.push_str(&format!(
            " {} {} {} ON {}",
            join.kind.keyword(),
            ctx.table(&join.table)?,
            quoted(join.alias)?,
            binder.fragment(join.on)?
        ));
    }

    let mut filters = Vec::new();
    if let Some(source) = is_primary(descriptor, &spec.from) {
        for filter in primary_filters(
            descriptor,
            source,
            spec.alias,
            Some(("month_start", "next_month_start")),
        )? {
            filters.push(binder.fragment(&filter)?);
        }
    }
    for filter in spec.filters {
        filters.push(binder.fragment(filter)?);
    }
    if !filters.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filters.join(" AND "));
    }
    if !spec.group_by.is_empty() {
        let groups = spec
            .group_by
            .iter()
            .map(|g| binder.fragment(g))
            .collect::<Result<Vec<_>, _>>()?;
        sql.push_str(" GROUP BY ");
        sql.push_str(&groups.join(", "));
    }
    Ok(sql)
}

fn insert_select(
    ctx: &RenderContext<'_>,
    descriptor: &HelperDescriptor,
    target: &str,
    spec: &SelectSpec,
) -> Result<Statement, RenderError> {
    let mut binder = Binder::new(ctx);
    let names: Vec<&str> = spec.columns.iter().map(|c| c.name).collect();
    let select = select_sql(&mut binder, descriptor, spec)?;
    let sql = format!("INSERT INTO {target} ({}) {select}", column_list(&names)?);
    Ok(binder.finish(sql))
}

fn ranked_events(
    ctx: &RenderContext<'_>,
    descriptor: &HelperDescriptor,
    spec: &RankedEventsSpec,
) -> Result<Statement, RenderError> {
    let mut binder = Binder::new(ctx);
    let source = ctx.table(&TableRef::Source(spec.source))?;
    let keys = spec
        .keys
        .iter()
        .map(|k| quoted(k))
        .collect::<Result<Vec<_>, _>>()?;
    let partition = keys.join(", ");
    let submitted = quoted(spec.submitted_at)?;

    let mut inner_columns = keys.clone();
    let mut in_month_any = Vec::new();
    let mut outer_columns: Vec<String> = Vec::new();
    let mut output_names: Vec<String> = Vec::new();

    for (i, key) in keys.iter().enumerate() {
        let is_entity = i + 1 == keys.len();
        match (is_entity, spec.entity_as) {
            (true, Some(entity)) => {
                outer_columns.push(format!("{key} AS {}", quoted(entity)?));
                output_names.push(quoted(entity)?);
            }
            _ => {
                outer_columns.push(key.clone());
                output_names.push(key.clone());
            }
        }
    }
    outer_columns.push(format!("{} AS \"month\"", binder.fragment(":month_start")?));
    output_names.push("\"month\"".to_string());

    for series in spec.series {
        let column = quoted(series.column)?;
        let rank = Ident::derived(&[series.column, "rank"])?.to_string();
        let in_month = binder.fragment(&format!(
            "{column} >= :month_start AND {column} < :next_month_start"
        ))?;
        inner_columns.push(column.clone());
        inner_columns.push(format!(
            "row_number() OVER (PARTITION BY {partition} ORDER BY CASE WHEN {in_month} THEN 1 ELSE NULL END, {column}, {submitted}) AS {rank}"
        ));
        in_month_any.push(format!("({in_month})"));

        for k in 1..=series.count {
            let output = Ident::derived(&[series.output_prefix, &k.to_string()])?.to_string();
            outer_columns.push(format!(
                "MIN(CASE WHEN {in_month} AND {rank} = {k} THEN {column} ELSE NULL END) AS {output}"
            ));
            output_names.push(output);
        }
    }

    let mut filters = Vec::new();
    if let Some(primary) = is_primary(descriptor, &TableRef::Source(spec.source)) {
        for filter in primary_filters(descriptor, primary, "ucr", None)? {
            filters.push(binder.fragment(&filter)?);
        }
    }
    if !in_month_any.is_empty() {
        filters.push(format!("({})", in_month_any.join(" OR ")));
    }
    let where_clause = if filters.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", filters.join(" AND "))
    };

    let sql = format!(
        "INSERT INTO {staging} ({outputs}) SELECT {outer} FROM (SELECT {inner} FROM {source} \"ucr\"{where_clause}) \"ranked\" GROUP BY {partition}",
        staging = ctx.staging,
        outputs = output_names.join(", "),
        outer = outer_columns.join(", "),
        inner = inner_columns.join(", "),
    );
    Ok(binder.finish(sql))
}

fn latest_values(
    ctx: &RenderContext<'_>,
    descriptor: &HelperDescriptor,
    spec: &LatestValuesSpec,
) -> Result<Statement, RenderError> {
    let mut binder = Binder::new(ctx);
    let source = ctx.table(&TableRef::Source(spec.source))?;
    let key = format!("\"ucr\".{}", quoted(spec.key)?);
    let time = format!("\"ucr\".{}", quoted(spec.time_column)?);
    let full_frame = "ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING";

    let mut names = Vec::new();
    let mut columns = Vec::new();
    for carry in spec.carry {
        let carry = quoted(carry)?;
        columns.push(format!("LAST_VALUE(\"ucr\".{carry}) OVER w AS {carry}"));
        names.push(carry);
    }
    columns.push(format!("{} AS \"month\"", binder.fragment(":month_start")?));
    names.push("\"month\"".to_string());
    columns.push(format!("{key} AS {}", quoted(spec.key_as)?));
    names.push(quoted(spec.key_as)?);
    columns.push(format!("MAX({time}) OVER w AS {}", quoted(spec.latest_as)?));
    names.push(quoted(spec.latest_as)?);
    for value in spec.values {
        let value = quoted(value)?;
        columns.push(format!(
            "LAST_VALUE(\"ucr\".{value}) OVER (PARTITION BY {key} ORDER BY \"ucr\".{value} IS NOT NULL, {time} {full_frame}) AS {value}"
        ));
        names.push(value);
    }

    let mut filters = Vec::new();
    match is_primary(descriptor, &TableRef::Source(spec.source)) {
        Some(primary) => {
            let window_source = SourceRef {
                time_column: Some(spec.time_column),
                ..*primary
            };
            for filter in primary_filters(
                descriptor,
                &window_source,
                "ucr",
                Some(("lookback_start", "next_month_start")),
            )? {
                filters.push(binder.fragment(&filter)?);
            }
        }
        None => {
            filters.push(binder.fragment(&format!(
                "{time} >= :lookback_start AND {time} < :next_month_start"
            ))?);
        }
    }
    filters.push(format!("{key} IS NOT NULL"));

    let sql = format!(
        "INSERT INTO {staging} ({names}) SELECT DISTINCT ON ({key}) {columns} FROM {source} \"ucr\" WHERE {filters} WINDOW w AS (PARTITION BY {key} ORDER BY {time} {full_frame})",
        staging = ctx.staging,
        names = names.join(", "),
        columns = columns.join(", "),
        filters = filters.join(" AND "),
    );
    Ok(binder.finish(sql))
}

/// The statement that derives `level` rows from `level + 1` rows in staging.
pub fn rollup_level(staging: &Ident, spec: &RollupSpec, level: u8) -> Result<Statement, RenderError> {
    let kept = usize::from(level);
    let mut names = Vec::new();
    let mut columns = Vec::new();
    let mut groups = Vec::new();

    for (i, location) in LOCATION_LEVELS.iter().enumerate() {
        let location = quoted(location)?;
        if i < kept {
            columns.push(location.clone());
            groups.push(location.clone());
        } else {
            columns.push(format!("'All' AS {location}"));
        }
        names.push(location);
    }
    names.push("\"month\"".to_string());
    columns.push("\"month\"".to_string());
    groups.push("\"month\"".to_string());
    names.push("\"aggregation_level\"".to_string());
    columns.push(format!("{level} AS \"aggregation_level\""));

    for attribute in spec.level_attributes {
        let column = quoted(attribute.column)?;
        if attribute.level <= level {
            columns.push(column.clone());
            groups.push(column.clone());
        } else {
            columns.push(format!("NULL AS {column}"));
        }
        names.push(column);
    }
    for dimension in spec.dimensions {
        let column = quoted(dimension)?;
        columns.push(column.clone());
        groups.push(column.clone());
        names.push(column);
    }
    for blanked in spec.blanked {
        let column = quoted(blanked)?;
        columns.push(format!("'All' AS {column}"));
        names.push(column);
    }
    for measure in spec.measures {
        let column = quoted(measure.column)?;
        let combine = match measure.rollup {
            RollupFn::Sum => "SUM",
            RollupFn::Max => "MAX",
        };
        columns.push(format!("{combine}({column}) AS {column}"));
        names.push(column);
    }

    let sql = format!(
        "INSERT INTO {staging} ({}) SELECT {} FROM {staging} WHERE \"aggregation_level\" = {} GROUP BY {}",
        names.join(", "),
        columns.join(", "),
        level + 1,
        groups.join(", "),
    );
    Ok(Statement::plain(sql))
}

/// The statements that fill the staging table, in execution order.
pub fn populate_statements(
    descriptor: &HelperDescriptor,
    ctx: &RenderContext<'_>,
) -> Result<Vec<Statement>, RenderError> {
    let staging = ctx.staging.to_string();
    match &descriptor.query {
        QueryShape::Select(spec) => Ok(vec![insert_select(ctx, descriptor, &staging, spec)?]),
        QueryShape::RankedEvents(spec) => Ok(vec![ranked_events(ctx, descriptor, spec)?]),
        QueryShape::LatestValues(spec) => Ok(vec![latest_values(ctx, descriptor, spec)?]),
        QueryShape::Rollup(spec) => {
            let mut statements = vec![insert_select(ctx, descriptor, &staging, &spec.leaf)?];
            for level in (1..LEAF_LEVEL).rev() {
                statements.push(rollup_level(ctx.staging, spec, level)?);
            }
            Ok(statements)
        }
    }
}

/// DDL and fill statement for one scratch table.
#[derive(Debug, Clone)]
pub struct ScratchPlan {
    pub name: &'static str,
    pub table: Ident,
    pub create: String,
    pub fill: Statement,
    pub distribute: bool,
}

pub fn scratch_plans(
    descriptor: &HelperDescriptor,
    ctx: &RenderContext<'_>,
) -> Result<Vec<ScratchPlan>, RenderError> {
    descriptor
        .scratch
        .iter()
        .map(|spec| scratch_plan(descriptor, ctx, spec))
        .collect()
}

fn scratch_plan(
    descriptor: &HelperDescriptor,
    ctx: &RenderContext<'_>,
    spec: &ScratchSpec,
) -> Result<ScratchPlan, RenderError> {
    let table = ctx
        .scratch
        .get(spec.name)
        .cloned()
        .ok_or_else(|| RenderError::UnresolvedTable(format!("scratch {}", spec.name)))?;
    let columns = spec
        .columns
        .iter()
        .map(|c| Ok(format!("{} {}", quoted(c.name)?, c.sql_type)))
        .collect::<Result<Vec<_>, RenderError>>()?;
    let create = format!("CREATE UNLOGGED TABLE {table} ({})", columns.join(", "));
    let fill = insert_select(ctx, descriptor, &table.to_string(), &spec.select)?;
    Ok(ScratchPlan {
        name: spec.name,
        table,
        create,
        fill,
        distribute: spec.distribute,
    })
}

/// Counts primary-source rows in scope and how many of them fail validation.
///
/// Returns `None` when the descriptor has no UCR source.
pub fn exclusion_statement(
    descriptor: &HelperDescriptor,
    ctx: &RenderContext<'_>,
) -> Result<Option<Statement>, RenderError> {
    let Some(source) = descriptor.primary_source() else {
        return Ok(None);
    };
    let mut binder = Binder::new(ctx);
    let table = ctx.table(&TableRef::Source(source.id))?;
    let alias = "\"ucr\"";

    let window = match &descriptor.query {
        QueryShape::LatestValues(_) => Some(("lookback_start", "next_month_start")),
        _ => Some(("month_start", "next_month_start")),
    };
    let mut scope = Vec::new();
    if let (Some(time), Some((from, to))) = (source.time_column, window) {
        let time = quoted(time)?;
        scope.push(format!("{alias}.{time} >= :{from}"));
        scope.push(format!("{alias}.{time} < :{to}"));
    }
    if descriptor.scope == Scope::PerState {
        if let Some(state) = source.state_column {
            scope.push(format!("{alias}.{} = :state_id", quoted(state)?));
        }
    }

    let excluded = if descriptor.validations.is_empty() {
        "0::bigint".to_string()
    } else {
        let valid = descriptor
            .validations
            .iter()
            .map(|v| validation_sql(alias, v))
            .collect::<Result<Vec<_>, _>>()?;
        format!(
            "count(*) FILTER (WHERE NOT COALESCE({}, false))::bigint",
            valid.join(" AND ")
        )
    };

    let mut sql = format!(
        "SELECT count(*)::bigint AS source_rows, {excluded} AS excluded_rows FROM {table} {alias}"
    );
    if !scope.is_empty() {
        let scope = scope
            .iter()
            .map(|f| binder.fragment(f))
            .collect::<Result<Vec<_>, _>>()?;
        sql.push_str(" WHERE ");
        sql.push_str(&scope.join(" AND "));
    }
    Ok(Some(binder.finish(sql)))
}

/// `SELECT EXISTS (..)` over a source's month window, state-filtered when a
/// state is given and the source has a state column.
pub fn source_has_rows(
    source: &SourceRef,
    table: &Ident,
    month: Month,
    state_id: Option<&str>,
) -> Result<Statement, RenderError> {
    let mut filters = Vec::new();
    let mut binds = Vec::new();
    if let Some(time) = source.time_column {
        let time = quoted(time)?;
        binds.push(BindValue::Date(month.start()));
        filters.push(format!("{time} >= ${}", binds.len()));
        binds.push(BindValue::Date(month.next_start()));
        filters.push(format!("{time} < ${}", binds.len()));
    }
    if let (Some(column), Some(state)) = (source.state_column, state_id) {
        binds.push(BindValue::Text(state.to_string()));
        filters.push(format!("{} = ${}", quoted(column)?, binds.len()));
    }
    let mut sql = format!("SELECT EXISTS (SELECT 1 FROM {table}");
    if !filters.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filters.join(" AND "));
    }
    sql.push(')');
    Ok(Statement { sql, binds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::descriptor::{col, sum, attr, EventSeries, Join, JoinKind};

    const THR: SourceRef = SourceRef {
        id: "static-dashboard_thr_forms",
        time_column: Some("timeend"),
        state_column: Some("state_id"),
        allow_empty: true,
    };

    static THR_DESCRIPTOR: HelperDescriptor = HelperDescriptor {
        key: "thr-test",
        target: "thr_test",
        scope: Scope::PerState,
        sources: &[THR],
        depends_on: &[],
        distribution_column: "supervisor_id",
        state_column: "state_id",
        lookback_months: 0,
        scratch: &[],
        query: QueryShape::Select(SelectSpec {
            from: TableRef::Source("static-dashboard_thr_forms"),
            alias: "ucr",
            joins: &[],
            filters: &["ucr.child_health_case_id IS NOT NULL"],
            columns: &[
                col("state_id", "ucr.state_id"),
                col("month", ":month_start"),
                col("days", "LEAST(SUM(ucr.days_ration_given_child), 32767)"),
            ],
            group_by: &["ucr.state_id"],
        }),
        indexes: &[],
        validations: &[Validation::NotNull("supervisor_id")],
    };

    fn fixture() -> (Ident, HashMap<&'static str, Ident>, HashMap<&'static str, Ident>) {
        let staging = Ident::new("tmp_thr_test_2020-08-01").unwrap();
        let mut sources = HashMap::new();
        sources.insert(
            "static-dashboard_thr_forms",
            Ident::new("ucr_icds-cas_static-dashboard_thr_forms_b8bca6ea").unwrap(),
        );
        (staging, sources, HashMap::new())
    }

    fn context<'a>(
        staging: &'a Ident,
        sources: &'a HashMap<&'static str, Ident>,
        scratch: &'a HashMap<&'static str, Ident>,
        state: Option<&'a str>,
    ) -> RenderContext<'a> {
        RenderContext {
            month: Month::parse("2020-08").unwrap(),
            lookback_months: 6,
            state_id: state,
            staging,
            sources,
            scratch,
        }
    }

    #[test]
    fn test_fragment_rewrites_params_and_reuses_slots() {
        let (staging, sources, scratch) = fixture();
        let ctx = context(&staging, &sources, &scratch, Some("st1"));
        let mut binder = Binder::new(&ctx);
        let sql = binder
            .fragment("d >= :month_start AND d < :next_month_start AND s = :state_id AND m = :month_start")
            .unwrap();
        assert_eq!(sql, "d >= $1 AND d < $2 AND s = $3 AND m = $1");
        let stmt = binder.finish(sql);
        assert_eq!(
            stmt.binds,
            vec![
                BindValue::Date(NaiveDate::from_ymd_opt(2020, 8, 1).unwrap()),
                BindValue::Date(NaiveDate::from_ymd_opt(2020, 9, 1).unwrap()),
                BindValue::Text("st1".to_string()),
            ]
        );
    }

    #[test]
    fn test_fragment_leaves_casts_and_strings_alone() {
        let (staging, sources, scratch) = fixture();
        let ctx = context(&staging, &sources, &scratch, None);
        let mut binder = Binder::new(&ctx);
        let sql = binder
            .fragment("x::date = :month_start::date AND y = 'a:b' AND z = 'it''s :state_id'")
            .unwrap();
        assert_eq!(
            sql,
            "x::date = $1::date AND y = 'a:b' AND z = 'it''s :state_id'"
        );
        assert_eq!(binder.binds.len(), 1);
    }

    #[test]
    fn test_lookback_and_prev_month() {
        let (staging, sources, scratch) = fixture();
        let ctx = context(&staging, &sources, &scratch, None);
        assert_eq!(
            ctx.value("lookback_start").unwrap(),
            BindValue::Date(NaiveDate::from_ymd_opt(2020, 2, 1).unwrap())
        );
        assert_eq!(
            ctx.value("prev_month_start").unwrap(),
            BindValue::Date(NaiveDate::from_ymd_opt(2020, 7, 1).unwrap())
        );
    }

    #[test]
    fn test_unknown_param_is_an_error() {
        let (staging, sources, scratch) = fixture();
        let ctx = context(&staging, &sources, &scratch, None);
        let mut binder = Binder::new(&ctx);
        assert_eq!(
            binder.fragment("x = :tomorrow"),
            Err(RenderError::UnknownParam("tomorrow".to_string()))
        );
    }

    #[test]
    fn test_state_param_requires_state() {
        let (staging, sources, scratch) = fixture();
        let ctx = context(&staging, &sources, &scratch, None);
        let result = populate_statements(&THR_DESCRIPTOR, &ctx);
        assert_eq!(result, Err(RenderError::MissingState));
    }

    #[test]
    fn test_select_binds_values_instead_of_literals() {
        let (staging, sources, scratch) = fixture();
        let ctx = context(&staging, &sources, &scratch, Some("st1"));
        let statements = populate_statements(&THR_DESCRIPTOR, &ctx).unwrap();
        assert_eq!(statements.len(), 1);
        let stmt = &statements[0];

        assert!(stmt.sql.starts_with(
            "INSERT INTO \"tmp_thr_test_2020-08-01\" (\"state_id\", \"month\", \"days\") SELECT"
        ));
        assert!(stmt
            .sql
            .contains("FROM \"ucr_icds-cas_static-dashboard_thr_forms_b8bca6ea\" \"ucr\""));
        assert!(stmt.sql.contains("\"ucr\".\"timeend\" >= $1"));
        assert!(stmt.sql.contains("\"ucr\".\"timeend\" < $2"));
        assert!(stmt.sql.contains("\"ucr\".\"state_id\" = $3"));
        assert!(stmt.sql.contains("\"ucr\".\"supervisor_id\" IS NOT NULL"));
        assert!(stmt.sql.ends_with("GROUP BY ucr.state_id"));
        assert!(!stmt.sql.contains("2020-08-01'"));
        assert!(!stmt.sql.contains("st1"));
        assert_eq!(stmt.binds.len(), 3);
    }

    #[test]
    fn test_exclusion_statement_counts_invalid_rows() {
        let (staging, sources, scratch) = fixture();
        let ctx = context(&staging, &sources, &scratch, Some("st1"));
        let stmt = exclusion_statement(&THR_DESCRIPTOR, &ctx).unwrap().unwrap();
        assert!(stmt.sql.contains(
            "count(*) FILTER (WHERE NOT COALESCE(\"ucr\".\"supervisor_id\" IS NOT NULL, false))"
        ));
        assert!(stmt.sql.contains("\"ucr\".\"state_id\" = $3"));
        assert_eq!(stmt.binds.len(), 3);
    }

    static RANKED: HelperDescriptor = HelperDescriptor {
        key: "ranked-test",
        target: "ranked_test",
        scope: Scope::PerState,
        sources: &[SourceRef {
            id: "static-sam_mam_visit",
            time_column: None,
            state_column: Some("state_id"),
            allow_empty: true,
        }],
        depends_on: &[],
        distribution_column: "supervisor_id",
        state_column: "state_id",
        lookback_months: 0,
        scratch: &[],
        query: QueryShape::RankedEvents(RankedEventsSpec {
            source: "static-sam_mam_visit",
            keys: &["state_id", "supervisor_id", "child_health_case_id"],
            entity_as: Some("case_id"),
            submitted_at: "timeend",
            series: &[EventSeries {
                column: "last_visit_date",
                output_prefix: "sam_mam_visit_date",
                count: 2,
            }],
        }),
        indexes: &[],
        validations: &[],
    };

    #[test]
    fn test_ranked_events_orders_in_month_first() {
        let (staging, mut sources, scratch) = fixture();
        sources.insert("static-sam_mam_visit", Ident::new("sam_mam_src").unwrap());
        let ctx = context(&staging, &sources, &scratch, Some("st1"));
        let stmt = &populate_statements(&RANKED, &ctx).unwrap()[0];

        assert!(stmt.sql.contains(
            "row_number() OVER (PARTITION BY \"state_id\", \"supervisor_id\", \"child_health_case_id\" ORDER BY CASE WHEN \"last_visit_date\" >= $1 AND \"last_visit_date\" < $2 THEN 1 ELSE NULL END, \"last_visit_date\", \"timeend\") AS \"last_visit_date_rank\""
        ));
        assert!(stmt.sql.contains("\"last_visit_date_rank\" = 2 THEN"));
        assert!(stmt.sql.contains("\"child_health_case_id\" AS \"case_id\""));
        assert!(stmt.sql.contains(
            "(\"state_id\", \"supervisor_id\", \"case_id\", \"month\", \"sam_mam_visit_date_1\", \"sam_mam_visit_date_2\")"
        ));
        assert!(stmt.sql.contains("\"ucr\".\"state_id\" = $3"));
    }

    static ROLLUP: RollupSpec = RollupSpec {
        leaf: SelectSpec {
            from: TableRef::Fact("child_health_monthly"),
            alias: "chm",
            joins: &[Join {
                kind: JoinKind::Inner,
                table: TableRef::Fact("awc_location_months"),
                alias: "loc",
                on: "loc.awc_id = chm.awc_id AND loc.month = :month_start",
            }],
            filters: &[],
            columns: &[],
            group_by: &[],
        },
        level_attributes: &[attr(1, "state_name"), attr(4, "supervisor_name")],
        dimensions: &["gender"],
        blanked: &["caste"],
        measures: &[sum("valid_in_month")],
    };

    #[test]
    fn test_rollup_level_collapses_lower_levels() {
        let staging = Ident::new("tmp_agg_child_health_2020-08-01").unwrap();
        let stmt = rollup_level(&staging, &ROLLUP, 2).unwrap();
        assert!(stmt.binds.is_empty());
        assert!(stmt.sql.contains(
            "SELECT \"state_id\", \"district_id\", 'All' AS \"block_id\", 'All' AS \"supervisor_id\", 'All' AS \"awc_id\", \"month\", 2 AS \"aggregation_level\", \"state_name\", NULL AS \"supervisor_name\", \"gender\", 'All' AS \"caste\", SUM(\"valid_in_month\") AS \"valid_in_month\""
        ));
        assert!(stmt.sql.contains("WHERE \"aggregation_level\" = 3"));
        assert!(stmt
            .sql
            .ends_with("GROUP BY \"state_id\", \"district_id\", \"month\", \"state_name\", \"gender\""));
    }

    #[test]
    fn test_source_has_rows_filters_window_and_state() {
        let table = Ident::new("thr_src").unwrap();
        let stmt = source_has_rows(&THR, &table, Month::parse("2020-08").unwrap(), Some("st1"))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT EXISTS (SELECT 1 FROM \"thr_src\" WHERE \"timeend\" >= $1 AND \"timeend\" < $2 AND \"state_id\" = $3)"
        );
        assert_eq!(stmt.binds.len(), 3);
    }
}

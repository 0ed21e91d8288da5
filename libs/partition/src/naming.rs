//! Physical table names and partition DDL.
//!
//! DDL cannot take bind parameters, so partition bounds are rendered from a
//! typed [`Month`] and identifiers from validated [`Ident`]s only.

use chrono::NaiveDate;

use crate::{Ident, Month, NamingError};

/// Physical name of the month partition of `logical`.
///
/// `agg_awc` for August 2020 becomes `agg_awc_2020-08-01`.
pub fn partition_name(logical: &Ident, month: Month) -> Result<Ident, NamingError> {
    Ident::derived(&[logical.as_str(), &month.to_string()])
}

/// Name of the staging table a partition is built in before being swapped in.
///
/// State-scoped helpers stage one table per state, suffixed with a short hash
/// of the state id so concurrent states never share a staging table.
pub fn staging_name(
    logical: &Ident,
    month: Month,
    state_id: Option<&str>,
) -> Result<Ident, NamingError> {
    let partition = partition_name(logical, month)?;
    match state_id {
        Some(state) => {
            let hash = Ident::short_hash(state);
            Ident::derived(&["tmp", partition.as_str(), &hash])
        }
        None => Ident::derived(&["tmp", partition.as_str()]),
    }
}

/// `ALTER TABLE .. ATTACH PARTITION` for the range `[month, next month)`.
pub fn attach_partition_sql(parent: &Ident, partition: &Ident, month: Month) -> String {
    format!(
        "ALTER TABLE {parent} ATTACH PARTITION {partition} FOR VALUES FROM ('{}') TO ('{}')",
        month.start().format("%Y-%m-%d"),
        month.next_start().format("%Y-%m-%d"),
    )
}

/// Citus call that shards `table` by `column`.
pub fn distribute_sql(table: &Ident, column: &Ident) -> String {
    format!(
        "SELECT create_distributed_table({}, {})",
        table.literal(),
        column.literal()
    )
}

/// Range bounds of an attached partition, as reported by
/// `pg_get_expr(relpartbound, oid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBounds {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl PartitionBounds {
    /// Parses `FOR VALUES FROM ('2020-08-01') TO ('2020-09-01')`.
    ///
    /// Returns `None` for `DEFAULT` partitions and anything that is not a
    /// single-column date range.
    #[must_use]
    pub fn parse(expr: &str) -> Option<Self> {
        let rest = expr.trim().strip_prefix("FOR VALUES FROM (")?;
        let (from, rest) = rest.split_once(") TO (")?;
        let to = rest.strip_suffix(')')?;
        Some(Self {
            from: parse_bound(from)?,
            to: parse_bound(to)?,
        })
    }

    /// Returns true when the bounds share any day with `month`.
    #[must_use]
    pub fn overlaps(&self, month: Month) -> bool {
        self.from < month.next_start() && month.start() < self.to
    }

    /// Returns true when the bounds are exactly `month`.
    #[must_use]
    pub fn is_exactly(&self, month: Month) -> bool {
        self.from == month.start() && self.to == month.next_start()
    }
}

fn parse_bound(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim().trim_matches('\'');
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    fn month(y: i32, m: u32) -> Month {
        Month::from_ym(y, m).unwrap()
    }

    #[test]
    fn test_partition_name_encodes_month() {
        let name = partition_name(&ident("agg_awc"), month(2020, 8)).unwrap();
        assert_eq!(name.as_str(), "agg_awc_2020-08-01");
        let other = partition_name(&ident("agg_awc"), month(2021, 8)).unwrap();
        assert_ne!(name, other);
    }

    #[test]
    fn test_staging_names() {
        let global = staging_name(&ident("agg_awc"), month(2020, 8), None).unwrap();
        assert_eq!(global.as_str(), "tmp_agg_awc_2020-08-01");

        let a = staging_name(&ident("agg_awc"), month(2020, 8), Some("st1")).unwrap();
        let b = staging_name(&ident("agg_awc"), month(2020, 8), Some("st2")).unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("tmp_agg_awc_2020-08-01_"));
    }

    #[test]
    fn test_attach_sql_uses_half_open_range() {
        let sql = attach_partition_sql(
            &ident("agg_awc"),
            &ident("agg_awc_2019-12-01"),
            month(2019, 12),
        );
        assert_eq!(
            sql,
            "ALTER TABLE \"agg_awc\" ATTACH PARTITION \"agg_awc_2019-12-01\" \
             FOR VALUES FROM ('2019-12-01') TO ('2020-01-01')"
        );
    }

    #[test]
    fn test_distribute_sql() {
        let sql = distribute_sql(&ident("tmp_agg_awc_2020-08-01"), &ident("supervisor_id"));
        assert_eq!(
            sql,
            "SELECT create_distributed_table('tmp_agg_awc_2020-08-01', 'supervisor_id')"
        );
    }

    #[test]
    fn test_bounds_parse_and_overlap() {
        let bounds =
            PartitionBounds::parse("FOR VALUES FROM ('2020-08-01') TO ('2020-09-01')").unwrap();
        assert!(bounds.is_exactly(month(2020, 8)));
        assert!(bounds.overlaps(month(2020, 8)));
        assert!(!bounds.overlaps(month(2020, 9)));
        assert!(!bounds.overlaps(month(2020, 7)));

        let quarter =
            PartitionBounds::parse("FOR VALUES FROM ('2020-07-01') TO ('2020-10-01')").unwrap();
        assert!(quarter.overlaps(month(2020, 8)));
        assert!(!quarter.is_exactly(month(2020, 8)));

        assert!(PartitionBounds::parse("DEFAULT").is_none());
    }
}

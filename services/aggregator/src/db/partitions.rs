//! Catalog queries over month partitions.
//!
//! Everything here reads `pg_catalog`; DDL is issued by the helper engine.

use icds_partition::{Ident, Month, PartitionBounds};
use sqlx::{
    postgres::{PgPool, PgRow},
    PgConnection, Row,
};

use super::DbError;

/// A child table attached to a partitioned parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedPartition {
    pub name: String,
    /// `None` for DEFAULT partitions or bounds that are not a date range.
    pub bounds: Option<PartitionBounds>,
}

impl AttachedPartition {
    /// The month this partition covers, when it covers exactly one.
    pub fn month(&self) -> Option<Month> {
        let bounds = self.bounds?;
        let month = Month::containing(bounds.from);
        bounds.is_exactly(month).then_some(month)
    }

    /// Whether this partition holds any day of `month`.
    pub fn overlaps(&self, month: Month) -> bool {
        match self.bounds {
            Some(bounds) => bounds.overlaps(month),
            // A DEFAULT partition would swallow the month's rows.
            None => true,
        }
    }
}

impl<'r> sqlx::FromRow<'r, PgRow> for AttachedPartition {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let bound: Option<String> = row.try_get("bound")?;
        Ok(Self {
            name: row.try_get("name")?,
            bounds: bound.as_deref().and_then(PartitionBounds::parse),
        })
    }
}

/// Returns the attached partition that stands in the way of attaching
/// `partition` for `month`, if any.
///
/// A partition with the same name is not a conflict: it is the one about to
/// be replaced.
pub fn blocking_partition<'a>(
    attached: &'a [AttachedPartition],
    partition: &Ident,
    month: Month,
) -> Option<&'a AttachedPartition> {
    attached
        .iter()
        .find(|p| p.name != partition.as_str() && p.overlaps(month))
}

/// Read-only view over partition metadata.
#[derive(Clone)]
pub struct PartitionCatalog {
    pool: PgPool,
}

impl PartitionCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether a relation with this name exists in the current schema.
    pub async fn table_exists(&self, table: &Ident) -> Result<bool, DbError> {
        let mut conn = self.pool.acquire().await.map_err(DbError::Query)?;
        Self::table_exists_on(&mut conn, table).await
    }

    pub async fn table_exists_on(conn: &mut PgConnection, table: &Ident) -> Result<bool, DbError> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table.to_string())
            .fetch_one(conn)
            .await
            .map_err(DbError::Query)?;
        Ok(exists)
    }

    /// Partitions attached to `parent`, ordered by name (and therefore month).
    pub async fn attached(&self, parent: &Ident) -> Result<Vec<AttachedPartition>, DbError> {
        let mut conn = self.pool.acquire().await.map_err(DbError::Query)?;
        Self::attached_on(&mut conn, parent).await
    }

    pub async fn attached_on(
        conn: &mut PgConnection,
        parent: &Ident,
    ) -> Result<Vec<AttachedPartition>, DbError> {
        sqlx::query_as::<_, AttachedPartition>(
            r#"
            SELECT c.relname::text AS name,
                   pg_get_expr(c.relpartbound, c.oid) AS bound
            FROM pg_inherits i
            JOIN pg_class c ON c.oid = i.inhrelid
            JOIN pg_class p ON p.oid = i.inhparent
            WHERE p.oid = to_regclass($1)
            ORDER BY c.relname
            "#,
        )
        .bind(parent.to_string())
        .fetch_all(conn)
        .await
        .map_err(DbError::Query)
    }

    /// The parent `table` is attached to, if it is attached anywhere.
    pub async fn parent_of_on(
        conn: &mut PgConnection,
        table: &Ident,
    ) -> Result<Option<String>, DbError> {
        sqlx::query_scalar(
            r#"
            SELECT p.relname::text
            FROM pg_inherits i
            JOIN pg_class p ON p.oid = i.inhparent
            WHERE i.inhrelid = to_regclass($1)
            "#,
        )
        .bind(table.to_string())
        .fetch_optional(conn)
        .await
        .map_err(DbError::Query)
    }

    /// Whether the partition for `month` is attached to `parent`.
    pub async fn is_attached(&self, parent: &Ident, month: Month) -> Result<bool, DbError> {
        let attached = self.attached(parent).await?;
        Ok(attached.iter().any(|p| p.month() == Some(month)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn month(y: i32, m: u32) -> Month {
        Month::from_ym(y, m).unwrap()
    }

    fn attached(name: &str, from: (i32, u32), to: (i32, u32)) -> AttachedPartition {
        AttachedPartition {
            name: name.to_string(),
            bounds: Some(PartitionBounds {
                from: NaiveDate::from_ymd_opt(from.0, from.1, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(to.0, to.1, 1).unwrap(),
            }),
        }
    }

    #[test]
    fn test_month_of_single_month_partition() {
        let p = attached("agg_awc_2020-08-01", (2020, 8), (2020, 9));
        assert_eq!(p.month(), Some(month(2020, 8)));
    }

    #[test]
    fn test_month_of_wide_partition_is_none() {
        let p = attached("agg_awc_2020", (2020, 1), (2021, 1));
        assert_eq!(p.month(), None);
        assert!(p.overlaps(month(2020, 8)));
    }

    #[test]
    fn test_same_name_is_not_blocking() {
        let partition = Ident::new("agg_awc_2020-08-01").unwrap();
        let existing = vec![attached("agg_awc_2020-08-01", (2020, 8), (2020, 9))];
        assert!(blocking_partition(&existing, &partition, month(2020, 8)).is_none());
    }

    #[test]
    fn test_other_table_covering_month_is_blocking() {
        let partition = Ident::new("agg_awc_2020-08-01").unwrap();
        let existing = vec![
            attached("agg_awc_2020-07-01", (2020, 7), (2020, 8)),
            attached("agg_awc_legacy", (2020, 6), (2020, 12)),
        ];
        let blocking = blocking_partition(&existing, &partition, month(2020, 8)).unwrap();
        assert_eq!(blocking.name, "agg_awc_legacy");
    }

    #[test]
    fn test_default_partition_is_blocking() {
        let partition = Ident::new("agg_awc_2020-08-01").unwrap();
        let existing = vec![AttachedPartition {
            name: "agg_awc_default".to_string(),
            bounds: None,
        }];
        assert!(blocking_partition(&existing, &partition, month(2020, 8)).is_some());
    }
}

//! # icds-partition
//!
//! Month arithmetic and physical table naming for the ICDS monthly fact tables.
//!
//! Every fact table is a parent table partitioned by `month`. Each calendar
//! month lives in its own physical child table, named deterministically from the
//! logical table name and the first day of the month:
//!
//! - `agg_child_health` + `2020-08` -> `"agg_child_health_2020-08-01"`
//! - staging for the same month -> `"tmp_agg_child_health_2020-08-01"`
//!
//! All source filters use the half-open window `[month_start, next_month_start)`.
//!
//! Identifiers are never taken from user input. They are built from static table
//! names plus typed months, validated by [`Ident`], and always emitted quoted.

mod error;
mod ident;
mod month;
mod naming;

pub use error::{MonthError, NamingError};
pub use ident::Ident;
pub use month::{Month, MonthRange, MonthWindow};
pub use naming::{
    attach_partition_sql, distribute_sql, partition_name, staging_name, PartitionBounds,
};

//! ICDS monthly aggregation pipeline.
//!
//! Rebuilds the month-partitioned dashboard fact tables from the UCR source
//! tables. See [`pipeline`] for how a run proceeds and [`helpers::catalog`]
//! for the tables it builds.

pub mod backfill;
pub mod config;
pub mod db;
pub mod error;
pub mod helpers;
pub mod pipeline;
pub mod sources;

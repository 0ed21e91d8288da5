//! Active state discovery.

use async_trait::async_trait;
use icds_partition::Ident;
use sqlx::PgPool;

use crate::{
    error::{AggregationError, AggregationResult},
    helpers::catalog::AWC_LOCATION,
    sources::SourceResolver,
};

/// Lists the states a state-scoped helper runs for when none are given.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn active_states(&self) -> AggregationResult<Vec<String>>;
}

/// Reads non-test states from the AWC location source.
pub struct StateDirectory {
    pool: PgPool,
    table: Ident,
}

impl StateDirectory {
    pub fn new(pool: PgPool, sources: &SourceResolver) -> AggregationResult<Self> {
        let table = sources.resolve(AWC_LOCATION.id, None)?;
        Ok(Self { pool, table })
    }
}

#[async_trait]
impl StateSource for StateDirectory {
    async fn active_states(&self) -> AggregationResult<Vec<String>> {
        let states: Vec<String> = sqlx::query_scalar(&format!(
            r#"
            SELECT DISTINCT state_id
            FROM {}
            WHERE state_id IS NOT NULL AND state_is_test IS DISTINCT FROM 1
            ORDER BY state_id
            "#,
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        if states.is_empty() {
            return Err(AggregationError::NoStates(AWC_LOCATION.id.to_string()));
        }
        Ok(states)
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    db::DbConfig,
    helpers::EngineSettings,
    pipeline::PipelineSettings,
    sources::SourceResolver,
};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    /// Project domain the UCR tables were built for.
    pub domain: String,
    /// Distribute new tables with Citus.
    pub citus: bool,
    pub max_parallel_states: usize,
    pub exclusion_warn_ratio: f64,
    /// Optional TOML file with source table overrides.
    pub sources_file: Option<PathBuf>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database = DbConfig::from_env();

        let domain = std::env::var("ICDS_DOMAIN").unwrap_or_else(|_| "icds-cas".to_string());

        let citus = std::env::var("ICDS_CITUS")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        // Leave one connection for the ledger and catalog queries.
        let default_parallel = (database.pool_size as usize).saturating_sub(1).max(1);
        let max_parallel_states = match std::env::var("ICDS_MAX_PARALLEL_STATES") {
            Ok(v) => v
                .parse::<usize>()
                .context("ICDS_MAX_PARALLEL_STATES must be a positive integer")?
                .max(1),
            Err(_) => default_parallel,
        };

        let exclusion_warn_ratio = match std::env::var("ICDS_EXCLUSION_WARN_RATIO") {
            Ok(v) => v
                .parse::<f64>()
                .context("ICDS_EXCLUSION_WARN_RATIO must be a number")?,
            Err(_) => 0.05,
        };
        if !(0.0..=1.0).contains(&exclusion_warn_ratio) {
            anyhow::bail!("ICDS_EXCLUSION_WARN_RATIO must be between 0 and 1");
        }

        let sources_file = std::env::var("ICDS_SOURCES_FILE").ok().map(PathBuf::from);

        let log_level = std::env::var("ICDS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match std::env::var("ICDS_LOG_FORMAT").as_deref() {
            Ok("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        Ok(Self {
            database,
            domain,
            citus,
            max_parallel_states,
            exclusion_warn_ratio,
            sources_file,
            log_level,
            log_format,
        })
    }

    /// Source resolver for the configured domain and override file.
    pub fn source_resolver(&self) -> Result<SourceResolver> {
        match &self.sources_file {
            Some(path) => SourceResolver::load(self.domain.clone(), path)
                .with_context(|| format!("loading {}", path.display())),
            None => Ok(SourceResolver::new(self.domain.clone())),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            citus: self.citus,
            exclusion_warn_ratio: self.exclusion_warn_ratio,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_parallel_states: self.max_parallel_states,
        }
    }
}

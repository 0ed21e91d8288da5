//! Resolution of logical UCR data source ids to physical tables.
//!
//! By default a source `static-dashboard_thr_forms` in domain `icds-cas` lives
//! in `ucr_icds-cas_static-dashboard_thr_forms_<hash8>`, where the hash is the
//! first 8 hex digits of SHA-256 over `"{domain}_{id}"`. Deployments that shard
//! sources by state, or that renamed tables, override names in a TOML file:
//!
//! ```toml
//! [sources."static-dashboard_thr_forms"]
//! table = "ucr_thr_forms"
//!
//! [sources."static-dashboard_thr_forms".states]
//! "st-up" = "ucr_thr_forms_up"
//! ```
//!
//! Per-state entries are only valid for sources read by state-scoped helpers;
//! the helper registry refuses them on sources a global helper reads.

use std::{collections::HashMap, path::Path};

use icds_partition::{Ident, NamingError};
use serde::Deserialize;
use thiserror::Error;

/// Bytes kept for the readable part of a default name: 63 minus `_` and the
/// 8-char hash.
const PREFIX_LEN: usize = 54;

#[derive(Debug, Error)]
pub enum SourceConfigError {
    #[error("failed to read sources file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sources file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid table name for source '{source_id}': {error}")]
    Naming {
        source_id: String,
        #[source]
        error: NamingError,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceOverrides {
    #[serde(default)]
    pub sources: HashMap<String, SourceOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceOverride {
    /// Table used for every state unless listed in `states`.
    pub table: Option<String>,
    /// State id -> table.
    #[serde(default)]
    pub states: HashMap<String, String>,
}

/// Maps logical source ids to validated physical table names.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    domain: String,
    overrides: SourceOverrides,
}

impl SourceResolver {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            overrides: SourceOverrides::default(),
        }
    }

    /// Parse overrides from TOML text. Every configured name is validated up
    /// front so a bad file fails at startup rather than mid-run.
    pub fn from_toml_str(domain: impl Into<String>, text: &str) -> Result<Self, SourceConfigError> {
        let overrides: SourceOverrides = toml::from_str(text)?;
        for (source_id, entry) in &overrides.sources {
            for table in entry.table.iter().chain(entry.states.values()) {
                Ident::new(table.as_str()).map_err(|error| SourceConfigError::Naming {
                    source_id: source_id.clone(),
                    error,
                })?;
            }
        }
        Ok(Self {
            domain: domain.into(),
            overrides,
        })
    }

    pub fn load(domain: impl Into<String>, path: &Path) -> Result<Self, SourceConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| SourceConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(domain, &text)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The conventional physical name, ignoring overrides.
    pub fn default_name(&self, source_id: &str) -> Result<Ident, NamingError> {
        let hash = Ident::short_hash(&format!("{}_{}", self.domain, source_id));
        let mut prefix = format!("ucr_{}_{}", self.domain, source_id);
        if prefix.len() > PREFIX_LEN {
            let mut cut = PREFIX_LEN;
            while !prefix.is_char_boundary(cut) {
                cut -= 1;
            }
            prefix.truncate(cut);
        }
        Ident::new(format!("{prefix}_{hash}"))
    }

    /// Whether `source_id` has at least one per-state table override.
    pub fn has_state_overrides(&self, source_id: &str) -> bool {
        self.overrides
            .sources
            .get(source_id)
            .is_some_and(|entry| !entry.states.is_empty())
    }

    /// Physical table for `source_id`, as seen by `state_id` when given.
    ///
    /// Precedence: per-state override, source-wide override, default name.
    pub fn resolve(&self, source_id: &str, state_id: Option<&str>) -> Result<Ident, NamingError> {
        if let Some(entry) = self.overrides.sources.get(source_id) {
            if let Some(table) = state_id.and_then(|s| entry.states.get(s)) {
                return Ident::new(table.as_str());
            }
            if let Some(table) = &entry.table {
                return Ident::new(table.as_str());
            }
        }
        self.default_name(source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_shape() {
        let resolver = SourceResolver::new("icds-cas");
        let name = resolver.default_name("static-dashboard_thr_forms").unwrap();
        let hash = Ident::short_hash("icds-cas_static-dashboard_thr_forms");
        assert_eq!(
            name.as_str(),
            format!("ucr_icds-cas_static-dashboard_thr_forms_{hash}")
        );
    }

    #[test]
    fn test_default_name_is_capped_and_keeps_hash() {
        let resolver = SourceResolver::new("icds-dashboard-ucr-long-domain-name");
        let id = "static-dashboard_growth_monitoring_forms";
        let name = resolver.default_name(id).unwrap();
        assert_eq!(name.as_str().len(), 63);
        let hash = Ident::short_hash(&format!("icds-dashboard-ucr-long-domain-name_{id}"));
        assert!(name.as_str().ends_with(&format!("_{hash}")));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let resolver = SourceResolver::from_toml_str(
            "icds-cas",
            r#"
            [sources."static-dashboard_thr_forms"]
            table = "thr_all"

            [sources."static-dashboard_thr_forms".states]
            "st-up" = "thr_up"

            [sources."static-sam_mam_visit".states]
            "st-br" = "sam_mam_br"
            "#,
        )
        .unwrap();

        let thr = "static-dashboard_thr_forms";
        assert_eq!(resolver.resolve(thr, Some("st-up")).unwrap().as_str(), "thr_up");
        assert_eq!(resolver.resolve(thr, Some("st-br")).unwrap().as_str(), "thr_all");
        assert_eq!(resolver.resolve(thr, None).unwrap().as_str(), "thr_all");

        let sam = "static-sam_mam_visit";
        assert!(resolver.has_state_overrides(sam));
        assert!(!resolver.has_state_overrides("static-awc_location"));
        assert_eq!(resolver.resolve(sam, Some("st-br")).unwrap().as_str(), "sam_mam_br");
        assert_eq!(
            resolver.resolve(sam, Some("st-up")).unwrap(),
            resolver.default_name(sam).unwrap()
        );
    }

    #[test]
    fn test_invalid_override_rejected_at_load() {
        let err = SourceResolver::from_toml_str(
            "icds-cas",
            r#"
            [sources."static-awc_location"]
            table = "awc; DROP TABLE agg_awc"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SourceConfigError::Naming { .. }));
    }
}
